//! Predicate builders over already-built queries.
//!
//! Subqueries that need the enclosing scope are built through the
//! statement builders' `exists`/`in_query`/`scalar` helpers instead.

use crate::ast::{Expr, Predicate, Query};

pub fn exists(query: Query) -> Predicate {
    Predicate::Exists {
        query: Box::new(query),
        negated: false,
    }
}

pub fn not_exists(query: Query) -> Predicate {
    Predicate::Exists {
        query: Box::new(query),
        negated: true,
    }
}

/// Scalar subquery in expression position.
pub fn subquery(query: Query) -> Expr {
    Expr::Subquery(Box::new(query))
}

/// Conjunction of all predicates; always true when empty.
pub fn all_of(parts: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::all(parts)
}

/// Disjunction of all predicates; always false when empty.
pub fn any_of(parts: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::any(parts)
}

use crate::ast::{Expr, Query};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "="),
            CompareOp::Ne => write!(f, "<>"),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Le => write!(f, "<="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Ge => write!(f, ">="),
        }
    }
}

/// Boolean condition used by WHERE, HAVING, ON and CASE WHEN.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        left: Expr,
        op: CompareOp,
        right: Expr,
    },
    IsNull {
        expr: Expr,
        negated: bool,
    },
    InList {
        expr: Expr,
        list: Vec<Expr>,
        negated: bool,
    },
    InQuery {
        expr: Expr,
        query: Box<Query>,
        negated: bool,
    },
    Between {
        expr: Expr,
        low: Expr,
        high: Expr,
        negated: bool,
    },
    Like {
        expr: Expr,
        pattern: Expr,
        negated: bool,
    },
    Exists {
        query: Box<Query>,
        negated: bool,
    },
    /// Empty conjunction is always true.
    And(Vec<Predicate>),
    /// Empty disjunction is always false.
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            p => Predicate::And(vec![p, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Predicate {
        match self {
            Predicate::Or(mut parts) => {
                parts.push(other);
                Predicate::Or(parts)
            }
            p => Predicate::Or(vec![p, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    /// Conjunction of `parts`, flattened when there is only one.
    pub fn all(parts: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut parts: Vec<Predicate> = parts.into_iter().collect();
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Predicate::And(parts)
        }
    }

    pub fn any(parts: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut parts: Vec<Predicate> = parts.into_iter().collect();
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Predicate::Or(parts)
        }
    }

    /// `existing AND next`, or just `next`.
    pub(crate) fn conjoin(existing: Option<Predicate>, next: Predicate) -> Predicate {
        match existing {
            Some(p) => p.and(next),
            None => next,
        }
    }
}

/// Condition of a CASE arm: a predicate in a searched CASE, a value in a
/// simple `CASE operand WHEN value` form.
#[derive(Debug, Clone)]
pub enum CaseWhen {
    Predicate(Predicate),
    Value(Expr),
}

impl From<Predicate> for CaseWhen {
    fn from(p: Predicate) -> Self {
        CaseWhen::Predicate(p)
    }
}

impl From<Expr> for CaseWhen {
    fn from(e: Expr) -> Self {
        CaseWhen::Value(e)
    }
}

#[derive(Debug, Clone)]
pub struct CaseExpr {
    pub operand: Option<Expr>,
    pub arms: Vec<(CaseWhen, Expr)>,
    pub otherwise: Option<Expr>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{col, lit};

    #[test]
    fn test_and_flattens() {
        let p = col("a")
            .eq(lit(1))
            .and(col("b").eq(lit(2)))
            .and(col("c").eq(lit(3)));
        match p {
            Predicate::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_all_single_unwraps() {
        let p = Predicate::all([col("a").is_null()]);
        assert!(matches!(p, Predicate::IsNull { .. }));
    }
}

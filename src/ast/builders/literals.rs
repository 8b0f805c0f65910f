//! Column, literal and parameter builders.

use crate::ast::{ColumnRef, Expr, Typed, Value};

/// Column reference, `name` or `alias.name`.
pub fn col(path: &str) -> Expr {
    Expr::Column(ColumnRef::parse(path))
}

/// `*`
pub fn star() -> Expr {
    Expr::Star(None)
}

/// `alias.*`
pub fn star_of(qualifier: &str) -> Expr {
    Expr::Star(Some(qualifier.to_string()))
}

/// Value inlined into the SQL text.
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(Typed::new(value.into()))
}

/// Value bound behind a placeholder.
pub fn param(value: impl Into<Value>) -> Expr {
    Expr::Param(Typed::new(value.into()))
}

/// SQL NULL literal
pub fn null() -> Expr {
    Expr::Literal(Typed::new(Value::Null))
}

/// The `DEFAULT` keyword; valid as an INSERT value or SET source.
pub fn default_value() -> Expr {
    Expr::Default(None)
}

/// The dialect's default function over a column, e.g. `DEFAULT(price)`.
pub fn default_of(column: &str) -> Expr {
    Expr::Default(Some(ColumnRef::parse(column)))
}

/// Row constructor `(a, b, ...)`.
pub fn row<I, E>(items: I) -> Expr
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    Expr::Row(items.into_iter().map(Into::into).collect())
}

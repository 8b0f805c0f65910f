//! CASE expression builders.
//!
//! [`CaseBuilder`] fixes the shape at compile time: a `WHEN` must be followed
//! by `THEN`, `ELSE` comes after at least one arm and nothing follows it.
//! [`DynamicCase`] collects arms in a loop and checks the shape on `build`.

use std::marker::PhantomData;

use crate::ast::{CaseExpr, CaseWhen, Expr};
use crate::builder::resolve::validate_case_shape;
use crate::error::BuildError;

/// Waiting for the first `WHEN`.
#[derive(Debug)]
pub struct NeedWhen;
/// `WHEN` given, waiting for `THEN`.
#[derive(Debug)]
pub struct NeedThen;
/// At least one complete arm.
#[derive(Debug)]
pub struct HasArm;
/// `ELSE` given.
#[derive(Debug)]
pub struct Closed;

#[derive(Debug)]
pub struct CaseBuilder<S> {
    operand: Option<Expr>,
    arms: Vec<(CaseWhen, Expr)>,
    pending: Option<CaseWhen>,
    otherwise: Option<Expr>,
    _state: PhantomData<S>,
}

/// Searched CASE: `CASE WHEN predicate THEN ...`.
pub fn case() -> CaseBuilder<NeedWhen> {
    CaseBuilder {
        operand: None,
        arms: Vec::new(),
        pending: None,
        otherwise: None,
        _state: PhantomData,
    }
}

/// Simple CASE: `CASE operand WHEN value THEN ...`.
pub fn case_on(operand: impl Into<Expr>) -> CaseBuilder<NeedWhen> {
    CaseBuilder {
        operand: Some(operand.into()),
        ..case()
    }
}

impl<S> CaseBuilder<S> {
    fn to<T>(self) -> CaseBuilder<T> {
        CaseBuilder {
            operand: self.operand,
            arms: self.arms,
            pending: self.pending,
            otherwise: self.otherwise,
            _state: PhantomData,
        }
    }

    fn finish(self) -> Expr {
        Expr::Case(Box::new(CaseExpr {
            operand: self.operand,
            arms: self.arms,
            otherwise: self.otherwise,
        }))
    }
}

impl CaseBuilder<NeedWhen> {
    pub fn when(mut self, condition: impl Into<CaseWhen>) -> CaseBuilder<NeedThen> {
        self.pending = Some(condition.into());
        self.to()
    }
}

impl CaseBuilder<NeedThen> {
    pub fn then(mut self, result: impl Into<Expr>) -> CaseBuilder<HasArm> {
        if let Some(when) = self.pending.take() {
            self.arms.push((when, result.into()));
        }
        self.to()
    }
}

impl CaseBuilder<HasArm> {
    pub fn when(mut self, condition: impl Into<CaseWhen>) -> CaseBuilder<NeedThen> {
        self.pending = Some(condition.into());
        self.to()
    }

    pub fn otherwise(mut self, result: impl Into<Expr>) -> CaseBuilder<Closed> {
        self.otherwise = Some(result.into());
        self.to()
    }

    pub fn end(self) -> Expr {
        self.finish()
    }
}

impl CaseBuilder<Closed> {
    pub fn end(self) -> Expr {
        self.finish()
    }
}

/// CASE built from a loop; the shape is checked by [`DynamicCase::build`].
#[derive(Debug, Default)]
pub struct DynamicCase {
    operand: Option<Expr>,
    arms: Vec<(CaseWhen, Expr)>,
    otherwise: Option<Expr>,
}

impl DynamicCase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(operand: impl Into<Expr>) -> Self {
        Self {
            operand: Some(operand.into()),
            ..Self::default()
        }
    }

    pub fn when(&mut self, condition: impl Into<CaseWhen>, result: impl Into<Expr>) -> &mut Self {
        self.arms.push((condition.into(), result.into()));
        self
    }

    pub fn otherwise(&mut self, result: impl Into<Expr>) -> &mut Self {
        self.otherwise = Some(result.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.arms.is_empty()
    }

    pub fn build(self) -> Result<Expr, BuildError> {
        validate_case_shape(self.operand.is_some(), &self.arms)?;
        Ok(Expr::Case(Box::new(CaseExpr {
            operand: self.operand,
            arms: self.arms,
            otherwise: self.otherwise,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{col, lit};

    #[test]
    fn test_static_case_shape() {
        let e = case()
            .when(col("a").gt(lit(0)))
            .then(lit("pos"))
            .when(col("a").lt(lit(0)))
            .then(lit("neg"))
            .otherwise(lit("zero"))
            .end();
        let Expr::Case(c) = e else {
            panic!("expected CASE");
        };
        assert_eq!(c.arms.len(), 2);
        assert!(c.otherwise.is_some());
    }

    #[test]
    fn test_dynamic_case_empty_is_error() {
        assert_eq!(DynamicCase::new().build().unwrap_err(), BuildError::EmptyCase);
    }

    #[test]
    fn test_dynamic_simple_case_rejects_predicate_arm() {
        let mut c = DynamicCase::on(col("status"));
        c.when(col("x").is_null(), lit(1));
        assert!(matches!(c.build(), Err(BuildError::MalformedCase(_))));
    }
}

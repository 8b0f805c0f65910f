//! Expression, predicate and window rendering.

use crate::ast::{
    BinaryOp, CaseExpr, CaseWhen, ColumnRef, Expr, NullsOrder, OrderItem, Over, Predicate,
    WindowSpec,
};
use crate::error::RenderError;
use crate::render::{check_function_name, Writer};

impl Writer<'_> {
    /// Write `items` separated by `", "`.
    pub(crate) fn list<T>(
        &mut self,
        items: &[T],
        mut each: impl FnMut(&mut Self, &T) -> Result<(), RenderError>,
    ) -> Result<(), RenderError> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            each(self, item)?;
        }
        Ok(())
    }

    pub(crate) fn column(&mut self, c: &ColumnRef) -> Result<(), RenderError> {
        let (qualifier, name) = match &c.binding {
            Some(b) => (
                b.qualifier.as_deref(),
                b.field.as_ref().map_or(c.name.as_str(), |f| f.name.as_str()),
            ),
            None => (c.qualifier.as_deref(), c.name.as_str()),
        };
        if let Some(q) = qualifier {
            self.ident(q)?;
            self.push(".");
        }
        self.ident(name)
    }

    /// An INSERT value or SET source, where `DEFAULT` is legal.
    pub(crate) fn value_expr(&mut self, e: &Expr) -> Result<(), RenderError> {
        match e {
            Expr::Default(None) => {
                self.push("DEFAULT");
                Ok(())
            }
            other => self.expr(other),
        }
    }

    pub(crate) fn expr(&mut self, e: &Expr) -> Result<(), RenderError> {
        match e {
            Expr::Column(c) => self.column(c)?,
            Expr::Star(None) => self.push("*"),
            Expr::Star(Some(q)) => {
                self.ident(q)?;
                self.push(".*");
            }
            Expr::Literal(t) => self.typed(t, true)?,
            Expr::Param(t) => self.typed(t, false)?,
            Expr::Default(None) => return Err(RenderError::MisplacedDefault),
            Expr::Default(Some(c)) => {
                let Some(func) = self.dialect.default_function else {
                    return Err(self.unsupported("DEFAULT(column)"));
                };
                self.push(func);
                self.push("(");
                self.column(c)?;
                self.push(")");
            }
            Expr::Func(f) => {
                check_function_name(&f.name)?;
                self.push(&f.name);
                self.push("(");
                if f.distinct {
                    self.push("DISTINCT ");
                }
                self.list(&f.args, |w, a| w.expr(a))?;
                self.push(")");
            }
            Expr::Binary { left, op, right } => self.binary(left, *op, right)?,
            Expr::Neg(inner) => {
                self.push("-");
                let start = self.sql.len();
                self.operand(inner)?;
                // `--` would open a line comment.
                if self.sql[start..].starts_with('-') {
                    self.sql.insert(start, '(');
                    self.push(")");
                }
            }
            Expr::Case(c) => self.case(c)?,
            Expr::Window(call) => {
                if !self.dialect.capabilities.window {
                    return Err(self.unsupported("window functions"));
                }
                self.expr(&Expr::Func(call.func.clone()))?;
                self.push(" OVER ");
                match &call.over {
                    Over::Named(name) => self.ident(name)?,
                    Over::Spec(spec) => {
                        self.push("(");
                        self.window_spec(spec)?;
                        self.push(")");
                    }
                }
            }
            Expr::Subquery(q) => {
                self.push("(");
                self.query(q)?;
                self.push(")");
            }
            Expr::Row(items) => {
                self.push("(");
                self.list(items, |w, e| w.expr(e))?;
                self.push(")");
            }
            Expr::Predicate(p) => match p.as_ref() {
                Predicate::And(_) | Predicate::Or(_) => {
                    self.push("(");
                    self.predicate(p)?;
                    self.push(")");
                }
                other => self.predicate(other)?,
            },
        }
        Ok(())
    }

    /// Operand of an arithmetic operator; nested operators are parenthesized.
    fn operand(&mut self, e: &Expr) -> Result<(), RenderError> {
        if matches!(e, Expr::Binary { .. } | Expr::Predicate(_)) {
            self.push("(");
            self.expr(e)?;
            self.push(")");
            Ok(())
        } else {
            self.expr(e)
        }
    }

    fn binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr) -> Result<(), RenderError> {
        if op == BinaryOp::Concat && self.dialect.concat_function {
            self.push("CONCAT(");
            self.expr(left)?;
            self.push(", ");
            self.expr(right)?;
            self.push(")");
            return Ok(());
        }
        self.operand(left)?;
        self.push(&format!(" {} ", op));
        self.operand(right)
    }

    fn case(&mut self, c: &CaseExpr) -> Result<(), RenderError> {
        self.push("CASE");
        if let Some(operand) = &c.operand {
            self.push(" ");
            self.expr(operand)?;
        }
        for (when, then) in &c.arms {
            self.push(" WHEN ");
            match when {
                CaseWhen::Predicate(p) => self.predicate(p)?,
                CaseWhen::Value(v) => self.expr(v)?,
            }
            self.push(" THEN ");
            self.expr(then)?;
        }
        if let Some(otherwise) = &c.otherwise {
            self.push(" ELSE ");
            self.expr(otherwise)?;
        }
        self.push(" END");
        Ok(())
    }

    pub(crate) fn window_spec(&mut self, spec: &WindowSpec) -> Result<(), RenderError> {
        let mut first = true;
        let mut sep = |w: &mut Self| {
            if !first {
                w.push(" ");
            }
            first = false;
        };
        if let Some(base) = &spec.base {
            sep(self);
            self.ident(base)?;
        }
        if !spec.partition_by.is_empty() {
            sep(self);
            self.push("PARTITION BY ");
            self.list(&spec.partition_by, |w, e| w.expr(e))?;
        }
        if !spec.order_by.is_empty() {
            sep(self);
            self.push("ORDER BY ");
            self.order_items(&spec.order_by)?;
        }
        if let Some(frame) = &spec.frame {
            sep(self);
            self.push(&frame.to_string());
        }
        Ok(())
    }

    pub(crate) fn order_items(&mut self, items: &[OrderItem]) -> Result<(), RenderError> {
        self.list(items, |w, item| {
            w.expr(&item.expr)?;
            if item.desc {
                w.push(" DESC");
            }
            if let Some(nulls) = item.nulls {
                if !w.dialect.capabilities.nulls_ordering {
                    return Err(w.unsupported("NULLS FIRST/LAST"));
                }
                w.push(match nulls {
                    NullsOrder::First => " NULLS FIRST",
                    NullsOrder::Last => " NULLS LAST",
                });
            }
            Ok(())
        })
    }

    pub(crate) fn predicate(&mut self, p: &Predicate) -> Result<(), RenderError> {
        let not = |negated: bool| if negated { "NOT " } else { "" };
        match p {
            Predicate::Compare { left, op, right } => {
                self.expr(left)?;
                self.push(&format!(" {} ", op));
                self.expr(right)?;
            }
            Predicate::IsNull { expr, negated } => {
                self.expr(expr)?;
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Predicate::InList { list, negated, .. } if list.is_empty() => {
                // Nothing is IN an empty list.
                self.push(if *negated { "1 = 1" } else { "1 = 0" });
            }
            Predicate::InList { expr, list, negated } => {
                self.expr(expr)?;
                self.push(&format!(" {}IN (", not(*negated)));
                self.list(list, |w, e| w.expr(e))?;
                self.push(")");
            }
            Predicate::InQuery {
                expr,
                query,
                negated,
            } => {
                self.expr(expr)?;
                self.push(&format!(" {}IN (", not(*negated)));
                self.query(query)?;
                self.push(")");
            }
            Predicate::Between {
                expr,
                low,
                high,
                negated,
            } => {
                self.expr(expr)?;
                self.push(&format!(" {}BETWEEN ", not(*negated)));
                self.expr(low)?;
                self.push(" AND ");
                self.expr(high)?;
            }
            Predicate::Like {
                expr,
                pattern,
                negated,
            } => {
                self.expr(expr)?;
                self.push(&format!(" {}LIKE ", not(*negated)));
                self.expr(pattern)?;
            }
            Predicate::Exists { query, negated } => {
                self.push(&format!("{}EXISTS (", not(*negated)));
                self.query(query)?;
                self.push(")");
            }
            Predicate::And(parts) if parts.is_empty() => self.push("1 = 1"),
            Predicate::Or(parts) if parts.is_empty() => self.push("1 = 0"),
            Predicate::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        self.push(" AND ");
                    }
                    if matches!(part, Predicate::Or(inner) if inner.len() > 1) {
                        self.push("(");
                        self.predicate(part)?;
                        self.push(")");
                    } else {
                        self.predicate(part)?;
                    }
                }
            }
            Predicate::Or(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        self.push(" OR ");
                    }
                    self.predicate(part)?;
                }
            }
            Predicate::Not(inner) => {
                self.push("NOT (");
                self.predicate(inner)?;
                self.push(")");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{col, count, lit};
    use crate::dialect::{Dialect, MySqlVersion};
    use pretty_assertions::assert_eq;

    fn expr(e: &Expr, dialect: &Dialect) -> String {
        let mut w = Writer::new(dialect);
        w.expr(e).unwrap();
        w.sql
    }

    fn pred(p: &Predicate) -> String {
        let d = Dialect::standard();
        let mut w = Writer::new(&d);
        w.predicate(p).unwrap();
        w.sql
    }

    #[test]
    fn test_empty_in_list() {
        assert_eq!(pred(&col("a").in_list(Vec::<Expr>::new())), "1 = 0");
        assert_eq!(pred(&col("a").not_in_list(Vec::<Expr>::new())), "1 = 1");
    }

    #[test]
    fn test_or_inside_and_is_grouped() {
        let p = col("a")
            .eq(lit(1))
            .and(col("b").eq(lit(2)).or(col("c").eq(lit(3))));
        assert_eq!(pred(&p), "a = 1 AND (b = 2 OR c = 3)");
    }

    #[test]
    fn test_concat_per_dialect() {
        let e = col("first").concat(col("last"));
        assert_eq!(expr(&e, &Dialect::postgres()), "first || last");
        assert_eq!(
            expr(&e, &Dialect::mysql(MySqlVersion::V80)),
            "CONCAT(first, last)"
        );
    }

    #[test]
    fn test_nested_arithmetic_parenthesized() {
        let e = col("a").plus(col("b")).times(lit(2));
        assert_eq!(expr(&e, &Dialect::standard()), "(a + b) * 2");
    }

    #[test]
    fn test_negation_never_emits_comment() {
        let d = Dialect::postgres();
        assert_eq!(expr(&lit(-5).neg(), &d), "-(-5)");
        assert_eq!(expr(&col("qty").neg().neg(), &d), "-(-qty)");
        assert_eq!(expr(&col("qty").neg(), &d), "-qty");
        assert_eq!(expr(&lit(5).neg(), &d), "-5");
    }

    #[test]
    fn test_misplaced_default() {
        let d = Dialect::standard();
        let mut w = Writer::new(&d);
        let err = w.expr(&crate::ast::builders::default_value()).unwrap_err();
        assert_eq!(err, RenderError::MisplacedDefault);
    }

    #[test]
    fn test_count_distinct() {
        assert_eq!(
            expr(&count(col("a")).distinct().into(), &Dialect::standard()),
            "COUNT(DISTINCT a)"
        );
    }
}

//! Finalization pass: binds column references, infers value codecs and
//! validates CASE shapes, window references and frames.

use crate::ast::{
    CaseWhen, ColumnRef, Expr, JoinCondition, JoinTree, OrderItem, Over, Predicate, Query,
    QueryBody, Select, TableItem, TableSource, WindowSpec,
};
use crate::context::ContextStack;
use crate::error::BuildError;

/// Resolver bound to the statement frame on top of the stack.
pub(crate) struct Resolver<'a> {
    stack: &'a ContextStack,
    /// Walking a nested query: only still-unbound references are touched.
    nested: bool,
    /// Projection names ORDER BY may refer to.
    output_names: Vec<String>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(stack: &'a ContextStack) -> Self {
        Self {
            stack,
            nested: false,
            output_names: Vec::new(),
        }
    }

    pub(crate) fn with_output_names(mut self, names: Vec<String>) -> Self {
        self.output_names = names;
        self
    }

    fn nested(&self) -> Resolver<'a> {
        Resolver {
            stack: self.stack,
            nested: true,
            output_names: Vec::new(),
        }
    }

    fn correlated(&self) -> bool {
        self.stack.current().is_some_and(|f| f.is_correlated())
    }

    pub(crate) fn column(&self, c: &mut ColumnRef) -> Result<(), BuildError> {
        if c.is_bound() {
            return Ok(());
        }
        if let Some(binding) = self
            .stack
            .resolve_column(c.qualifier.as_deref(), &c.name, self.nested)?
        {
            c.binding = Some(binding);
            return Ok(());
        }
        if self.correlated() {
            // Left for the enclosing statement to bind.
            return Ok(());
        }
        match &c.qualifier {
            Some(q) => Err(BuildError::UnresolvedAlias(q.clone())),
            None => Err(BuildError::UnresolvedColumn(c.name.clone())),
        }
    }

    /// Column reference that may also name a projected alias.
    fn order_column(&self, c: &mut ColumnRef) -> Result<(), BuildError> {
        if c.qualifier.is_none() && !c.is_bound() && self.output_names.contains(&c.name) {
            let shadowed = self.stack.resolve_column(None, &c.name, false).ok().flatten();
            c.binding = Some(shadowed.unwrap_or(crate::ast::Binding {
                qualifier: None,
                field: None,
                outer: false,
            }));
            return Ok(());
        }
        self.column(c)
    }

    pub(crate) fn expr(&self, e: &mut Expr) -> Result<(), BuildError> {
        match e {
            Expr::Column(c) => self.column(c),
            Expr::Star(Some(q)) => {
                if self.nested || self.stack.resolve(q).is_some() || self.correlated() {
                    Ok(())
                } else {
                    Err(BuildError::UnresolvedAlias(q.clone()))
                }
            }
            Expr::Star(None) | Expr::Literal(_) | Expr::Param(_) | Expr::Default(None) => Ok(()),
            Expr::Default(Some(c)) => self.column(c),
            Expr::Func(f) => f.args.iter_mut().try_for_each(|a| self.expr(a)),
            Expr::Binary { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)?;
                infer_pair(left, right);
                Ok(())
            }
            Expr::Neg(inner) => self.expr(inner),
            Expr::Case(case) => {
                let case = &mut **case;
                if !self.nested {
                    validate_case_shape(case.operand.is_some(), &case.arms)?;
                }
                if let Some(op) = &mut case.operand {
                    self.expr(op)?;
                }
                for (when, then) in case.arms.iter_mut() {
                    match when {
                        CaseWhen::Predicate(p) => self.predicate(p)?,
                        CaseWhen::Value(v) => {
                            self.expr(v)?;
                            if let Some(op) = &case.operand {
                                infer(op, v);
                            }
                        }
                    }
                    self.expr(then)?;
                }
                if let Some(other) = &mut case.otherwise {
                    self.expr(other)?;
                }
                Ok(())
            }
            Expr::Window(call) => {
                if !self.nested && !self.stack.capabilities().window {
                    return Err(BuildError::Unsupported {
                        feature: "window functions",
                    });
                }
                call.func.args.iter_mut().try_for_each(|a| self.expr(a))?;
                match &mut call.over {
                    Over::Named(name) => {
                        if !self.nested && !self.stack.has_window(name) {
                            return Err(BuildError::UnknownWindow(name.clone()));
                        }
                        Ok(())
                    }
                    Over::Spec(spec) => self.window_spec(spec),
                }
            }
            Expr::Subquery(q) => self.nested().query(q),
            Expr::Row(items) => items.iter_mut().try_for_each(|i| self.expr(i)),
            Expr::Predicate(p) => self.predicate(p),
        }
    }

    pub(crate) fn predicate(&self, p: &mut Predicate) -> Result<(), BuildError> {
        match p {
            Predicate::Compare { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)?;
                infer_pair(left, right);
                Ok(())
            }
            Predicate::IsNull { expr, .. } => self.expr(expr),
            Predicate::InList { expr, list, .. } => {
                self.expr(expr)?;
                for item in list.iter_mut() {
                    self.expr(item)?;
                    infer(expr, item);
                }
                Ok(())
            }
            Predicate::InQuery { expr, query, .. } => {
                self.expr(expr)?;
                self.nested().query(query)
            }
            Predicate::Between {
                expr, low, high, ..
            } => {
                self.expr(expr)?;
                self.expr(low)?;
                self.expr(high)?;
                infer(expr, low);
                infer(expr, high);
                Ok(())
            }
            Predicate::Like { expr, pattern, .. } => {
                self.expr(expr)?;
                self.expr(pattern)?;
                infer(expr, pattern);
                Ok(())
            }
            Predicate::Exists { query, .. } => self.nested().query(query),
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter_mut().try_for_each(|p| self.predicate(p))
            }
            Predicate::Not(inner) => self.predicate(inner),
        }
    }

    pub(crate) fn order_item(&self, item: &mut OrderItem) -> Result<(), BuildError> {
        if item.nulls.is_some() && !self.nested && !self.stack.capabilities().nulls_ordering {
            return Err(BuildError::Unsupported {
                feature: "NULLS FIRST/LAST",
            });
        }
        match &mut item.expr {
            Expr::Column(c) => self.order_column(c),
            e => self.expr(e),
        }
    }

    fn window_spec(&self, spec: &mut WindowSpec) -> Result<(), BuildError> {
        if !self.nested {
            if let Some(base) = &spec.base
                && !self.stack.has_window(base)
            {
                return Err(BuildError::UnknownWindow(base.clone()));
            }
            if let Some(frame) = &spec.frame {
                frame.validate()?;
            }
        }
        spec.partition_by.iter_mut().try_for_each(|e| self.expr(e))?;
        spec.order_by.iter_mut().try_for_each(|o| self.order_item(o))
    }

    pub(crate) fn join_tree(&self, tree: &mut JoinTree) -> Result<(), BuildError> {
        self.table_item(&mut tree.first)?;
        for join in tree.joins.iter_mut() {
            self.table_item(&mut join.item)?;
            if let JoinCondition::On(p) = &mut join.condition {
                self.predicate(p)?;
            }
        }
        Ok(())
    }

    fn table_item(&self, item: &mut TableItem) -> Result<(), BuildError> {
        match item {
            TableItem::Table(t) => match &mut t.source {
                // Derived tables are finalized in their own scope; only a
                // nested walk can still find unbound references there.
                TableSource::Derived(q) if self.nested => self.query(q),
                _ => Ok(()),
            },
            TableItem::Group(tree) => self.join_tree(tree),
        }
    }

    /// Body of a SELECT in the current frame.
    pub(crate) fn select(&self, s: &mut Select) -> Result<(), BuildError> {
        for item in s.items.iter_mut() {
            self.expr(&mut item.expr)?;
        }
        if let Some(from) = &mut s.from {
            self.join_tree(from)?;
        }
        if let Some(w) = &mut s.where_ {
            self.predicate(w)?;
        }
        s.group_by.iter_mut().try_for_each(|e| self.expr(e))?;
        if let Some(h) = &mut s.having {
            self.predicate(h)?;
        }
        for w in s.windows.iter_mut() {
            self.window_spec(&mut w.spec)?;
        }
        Ok(())
    }

    /// Walk a nested query, binding references it deferred to this scope.
    fn query(&self, q: &mut Query) -> Result<(), BuildError> {
        debug_assert!(self.nested);
        if let Some(with) = &mut q.with {
            for cte in with.ctes.iter_mut() {
                self.query(&mut cte.query)?;
            }
        }
        match &mut q.body {
            QueryBody::Select(s) => self.select(s)?,
            QueryBody::SetOp { left, right, .. } => {
                self.query(left)?;
                self.query(right)?;
            }
        }
        q.order_by.iter_mut().try_for_each(|o| self.order_item(o))
    }
}

pub(crate) fn validate_case_shape(simple: bool, arms: &[(CaseWhen, Expr)]) -> Result<(), BuildError> {
    if arms.is_empty() {
        return Err(BuildError::EmptyCase);
    }
    for (when, _) in arms {
        match (simple, when) {
            (true, CaseWhen::Predicate(_)) => {
                return Err(BuildError::MalformedCase(
                    "CASE with an operand takes values in WHEN",
                ));
            }
            (false, CaseWhen::Value(_)) => {
                return Err(BuildError::MalformedCase(
                    "CASE without an operand takes predicates in WHEN",
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Give `value` the codec of the column on the other side, if it has none.
pub(crate) fn infer(column: &Expr, value: &mut Expr) {
    let Expr::Column(c) = column else {
        return;
    };
    let Some(field) = c.field() else {
        return;
    };
    if let Expr::Literal(t) | Expr::Param(t) = value {
        t.infer_from(field);
    }
}

fn infer_pair(a: &mut Expr, b: &mut Expr) {
    infer(a, b);
    infer(b, a);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{col, lit};
    use crate::ast::{table, SqlType, TableMeta};

    #[test]
    fn test_literal_inherits_column_codec() {
        let meta = TableMeta::builder("t")
            .primary_key("id", SqlType::Integer)
            .field("price", SqlType::Decimal { precision: 10, scale: 2 })
            .build()
            .unwrap();
        let mut stack = ContextStack::new();
        stack.push(None);
        stack.register_alias(&table(&meta)).unwrap();

        let mut p = col("price").eq(lit(1));
        Resolver::new(&stack).predicate(&mut p).unwrap();
        let Predicate::Compare {
            right: Expr::Literal(t),
            ..
        } = &p
        else {
            panic!("expected literal");
        };
        assert_eq!(
            t.mapping.as_ref().map(|m| m.sql_type()),
            Some(SqlType::Decimal { precision: 10, scale: 2 })
        );
        assert_eq!(t.column.as_deref(), Some("price"));
    }

    #[test]
    fn test_unresolved_column_is_error() {
        let mut stack = ContextStack::new();
        stack.push(None);
        let mut e = col("missing");
        let err = Resolver::new(&stack).expr(&mut e).unwrap_err();
        assert_eq!(err, BuildError::UnresolvedColumn("missing".to_string()));
    }
}

//! UNION / UNION ALL chaining.

use crate::ast::{Binding, Expr, OrderItem, Query, QueryBody, SetOp, With};
use crate::builder::{Scope, SubqueryStart};
use crate::context::ScopeId;
use crate::dialect::Dialect;
use crate::error::{BuildError, QailResult};
use crate::render::Compiled;

/// Left-associative chain of set operations.
///
/// ORDER BY/LIMIT given before the next `union` apply to the chain built so
/// far, which then becomes the parenthesized left operand.
pub struct UnionBuilder<'s> {
    scope: Scope<'s>,
    with: Option<With>,
    query: Option<Query>,
    /// Outer scope shared by every branch of a correlated chain.
    link: Option<ScopeId>,
    order_by: Vec<OrderItem>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'s> UnionBuilder<'s> {
    pub(crate) fn start(
        mut scope: Scope<'s>,
        with: Option<With>,
        link: Option<ScopeId>,
        left: Result<Query, BuildError>,
    ) -> Self {
        let query = match left {
            Ok(q) => Some(q),
            Err(e) => {
                scope.fail(e);
                None
            }
        };
        Self {
            scope,
            with,
            query,
            link,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub(crate) fn push<F>(mut self, op: SetOp, f: F) -> Self
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        let Some(mut left) = self.query.take() else {
            return self;
        };
        if let Err(e) = self.apply_tail(&mut left) {
            self.scope.fail(e);
            return self;
        }
        let Some(right) = self.scope.branch(self.link, f) else {
            return self;
        };
        self.query = Some(Query::from_body(QueryBody::SetOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }));
        self
    }

    /// Move pending ORDER BY/LIMIT/OFFSET onto `q`.
    fn apply_tail(&mut self, q: &mut Query) -> Result<(), BuildError> {
        let names = q.output_columns();
        let caps = self.scope.stack().capabilities();
        for item in self.order_by.iter_mut() {
            if item.nulls.is_some() && !caps.nulls_ordering {
                return Err(BuildError::Unsupported {
                    feature: "NULLS FIRST/LAST",
                });
            }
            bind_output_column(&names, &mut item.expr)?;
        }
        q.order_by.append(&mut self.order_by);
        if let Some(n) = self.limit.take() {
            q.limit = Some(n);
        }
        if let Some(n) = self.offset.take() {
            q.offset = Some(n);
        }
        Ok(())
    }

    pub fn union<F>(self, f: F) -> Self
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        self.push(SetOp::Union, f)
    }

    pub fn union_all<F>(self, f: F) -> Self
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        self.push(SetOp::UnionAll, f)
    }

    /// ORDER BY over the chain's output columns.
    pub fn order_by<I, O>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<OrderItem>,
    {
        self.order_by.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn as_query(mut self) -> Result<Query, BuildError> {
        self.scope.finish(|_| Ok(()))?;
        let Some(mut query) = self.query.take() else {
            return Err(BuildError::Unsupported {
                feature: "empty UNION chain",
            });
        };
        self.apply_tail(&mut query)?;
        query.with = self.with.take();
        Ok(query)
    }

    pub fn compile(self, dialect: &Dialect) -> QailResult<Compiled> {
        let query = self.as_query()?;
        crate::render::compile(&query.into(), dialect)
    }
}

/// A union's ORDER BY may only name output columns.
fn bind_output_column(names: &[String], expr: &mut Expr) -> Result<(), BuildError> {
    match expr {
        Expr::Column(c) if c.qualifier.is_none() && names.contains(&c.name) => {
            c.binding = Some(Binding {
                qualifier: None,
                field: None,
                outer: false,
            });
            Ok(())
        }
        Expr::Column(c) => Err(BuildError::UnresolvedColumn(c.name.clone())),
        _ => Err(BuildError::Unsupported {
            feature: "expressions in UNION ORDER BY",
        }),
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::builders::col;
    use crate::ast::{table, SqlType, TableMeta};
    use crate::builder::select;
    use crate::error::BuildError;

    #[test]
    fn test_union_order_by_must_name_output_column() {
        let meta = TableMeta::builder("t")
            .primary_key("id", SqlType::Integer)
            .field("name", SqlType::Text)
            .build()
            .unwrap();
        let err = select([col("id")])
            .from(table(&meta))
            .union(|s| s.select([col("id")]).from(table(&meta)).as_query())
            .order_by([col("name")])
            .as_query()
            .unwrap_err();
        assert_eq!(err, BuildError::UnresolvedColumn("name".to_string()));
    }
}

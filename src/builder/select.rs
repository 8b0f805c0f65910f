//! SELECT builder.

use std::marker::PhantomData;

use crate::ast::{
    Expr, Join, JoinCondition, JoinKind, JoinTree, LockMode, NamedWindow, OrderItem, Predicate,
    Query, QueryBody, Select, SelectItem, SetOp, TableItem, TableRef, TableSource, WindowSpec, With,
};
use crate::builder::position::*;
use crate::builder::{subquery_helpers, Resolver, Scope, SubqueryStart, UnionBuilder};
use crate::context::{ContextStack, ScopeId};
use crate::dialect::Dialect;
use crate::error::{BuildError, QailResult};
use crate::render::Compiled;

/// Start a SELECT on a private context stack.
///
/// ```
/// use qail_criteria::prelude::*;
///
/// let table_x = TableMeta::builder("tableX")
///     .primary_key("columnA", SqlType::Integer)
///     .build()
///     .unwrap();
/// let stmt = select([col("columnA")])
///     .from(table(&table_x))
///     .where_(col("columnA").eq(lit(1)))
///     .compile(&Dialect::standard())
///     .unwrap();
/// let stmt = stmt.single().unwrap();
/// assert_eq!(stmt.sql, "SELECT columnA FROM tableX WHERE columnA = 1");
/// assert!(stmt.params.is_empty());
/// ```
pub fn select<I, S>(items: I) -> SelectBuilder<'static, Projection>
where
    I: IntoIterator<Item = S>,
    S: Into<SelectItem>,
{
    SelectBuilder::start(Scope::owned(ContextStack::new()), None, None, false, items)
}

pub fn select_distinct<I, S>(items: I) -> SelectBuilder<'static, Projection>
where
    I: IntoIterator<Item = S>,
    S: Into<SelectItem>,
{
    SelectBuilder::start(Scope::owned(ContextStack::new()), None, None, true, items)
}

impl ContextStack {
    /// Start a SELECT on this stack.
    pub fn select<I, S>(&mut self, items: I) -> SelectBuilder<'_, Projection>
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        SelectBuilder::start(Scope::borrowed(self), None, None, false, items)
    }

    pub fn select_distinct<I, S>(&mut self, items: I) -> SelectBuilder<'_, Projection>
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        SelectBuilder::start(Scope::borrowed(self), None, None, true, items)
    }
}

/// SELECT under construction; `P` is the grammar position.
pub struct SelectBuilder<'s, P> {
    pub(crate) scope: Scope<'s>,
    with: Option<With>,
    select: Select,
    order_by: Vec<OrderItem>,
    limit: Option<u64>,
    offset: Option<u64>,
    lock: Option<LockMode>,
    _pos: PhantomData<P>,
}

/// Check a FROM/JOIN table against the stack and register it.
pub(crate) fn register_table(stack: &mut ContextStack, t: &mut TableRef) -> Result<(), BuildError> {
    if t.only && !stack.capabilities().only_modifier {
        return Err(BuildError::Unsupported { feature: "ONLY" });
    }
    if let TableSource::Cte { name, columns } = &mut t.source {
        let entry = stack
            .lookup_cte(name)
            .ok_or_else(|| BuildError::UnknownCte(name.clone()))?;
        *columns = entry.columns.clone();
    }
    stack.register_alias(t)
}

fn empty_query() -> Query {
    Query::from_body(QueryBody::Select(Box::default()))
}

impl<'s> SelectBuilder<'s, Projection> {
    pub(crate) fn start<I, S>(
        mut scope: Scope<'s>,
        link: Option<ScopeId>,
        with: Option<With>,
        distinct: bool,
        items: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        scope.stack_mut().push(link);
        SelectBuilder {
            scope,
            with,
            select: Select {
                distinct,
                items: items.into_iter().map(Into::into).collect(),
                ..Select::default()
            },
            order_by: Vec::new(),
            limit: None,
            offset: None,
            lock: None,
            _pos: PhantomData,
        }
    }
}

impl<'s, P: Position> SelectBuilder<'s, P> {
    fn to<Q: Position>(self) -> SelectBuilder<'s, Q> {
        SelectBuilder {
            scope: self.scope,
            with: self.with,
            select: self.select,
            order_by: self.order_by,
            limit: self.limit,
            offset: self.offset,
            lock: self.lock,
            _pos: PhantomData,
        }
    }

    subquery_helpers!();

    /// Build a derived table `(SELECT ...) AS alias` for FROM or JOIN.
    pub fn derived<F>(&mut self, alias: &str, f: F) -> TableRef
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        let query = self.scope.subquery(f).unwrap_or_else(empty_query);
        TableRef {
            source: TableSource::Derived(Box::new(query)),
            alias: Some(alias.to_string()),
            only: false,
            physical: false,
        }
    }

    fn add_item(&mut self, item: &mut TableItem) {
        for t in item.tables_mut() {
            self.scope.attempt(|stack| register_table(stack, t));
        }
    }

    fn push_join(&mut self, join: Join) {
        if join.kind == JoinKind::Full {
            let full = self.scope.stack().capabilities().full_join;
            self.scope
                .require(full, || BuildError::Unsupported { feature: "FULL JOIN" });
        }
        if let Some(from) = &mut self.select.from {
            from.joins.push(join);
        }
    }

    /// Resolve this SELECT in its frame and pop the frame.
    pub(crate) fn finish_body(&mut self) -> Result<Query, BuildError> {
        let names: Vec<String> = self
            .select
            .items
            .iter()
            .filter_map(|i| i.output_name().map(str::to_string))
            .collect();
        let mut select = std::mem::take(&mut self.select);
        let mut order_by = std::mem::take(&mut self.order_by);
        let (limit, offset, lock) = (self.limit, self.offset, self.lock);
        self.scope.finish(|stack| {
            let resolver = Resolver::new(stack).with_output_names(names);
            resolver.select(&mut select)?;
            for item in order_by.iter_mut() {
                resolver.order_item(item)?;
            }
            stack.pop();
            Ok(Query {
                with: None,
                body: QueryBody::Select(Box::new(select)),
                order_by,
                limit,
                offset,
                lock,
            })
        })
    }

    /// Finalize into an immutable query, releasing this statement's frames.
    pub fn as_query(mut self) -> Result<Query, BuildError> {
        let mut query = self.finish_body()?;
        query.with = self.with.take();
        Ok(query)
    }

    pub fn compile(self, dialect: &Dialect) -> QailResult<Compiled> {
        let query = self.as_query()?;
        crate::render::compile(&query.into(), dialect)
    }
}

impl<'s, P: CanFrom> SelectBuilder<'s, P> {
    pub fn from(mut self, item: impl Into<TableItem>) -> SelectBuilder<'s, Sourced> {
        let mut item = item.into();
        self.add_item(&mut item);
        self.select.from = Some(JoinTree {
            first: item,
            joins: Vec::new(),
        });
        self.to()
    }

    /// `FROM (SELECT ...) AS alias`
    pub fn from_subquery<F>(mut self, alias: &str, f: F) -> SelectBuilder<'s, Sourced>
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        let t = self.derived(alias, f);
        self.from(t)
    }
}

/// A join waiting for its ON or USING condition.
pub struct JoinOn<'s> {
    builder: SelectBuilder<'s, Sourced>,
    kind: JoinKind,
    item: TableItem,
}

impl<'s> JoinOn<'s> {
    pub fn on(mut self, condition: Predicate) -> SelectBuilder<'s, Sourced> {
        self.builder.push_join(Join {
            kind: self.kind,
            item: self.item,
            condition: JoinCondition::On(condition),
        });
        self.builder
    }

    pub fn using(mut self, columns: &[&str]) -> SelectBuilder<'s, Sourced> {
        self.builder.push_join(Join {
            kind: self.kind,
            item: self.item,
            condition: JoinCondition::Using(columns.iter().map(|c| c.to_string()).collect()),
        });
        self.builder
    }
}

/// Joins collected in a loop.
#[derive(Debug, Default)]
pub struct DynamicJoins {
    joins: Vec<Join>,
}

impl DynamicJoins {
    pub fn join(&mut self, kind: JoinKind, item: impl Into<TableItem>, on: Predicate) -> &mut Self {
        self.joins.push(Join {
            kind,
            item: item.into(),
            condition: JoinCondition::On(on),
        });
        self
    }

    pub fn join_if(
        &mut self,
        condition: bool,
        kind: JoinKind,
        item: impl Into<TableItem>,
        on: Predicate,
    ) -> &mut Self {
        if condition {
            self.join(kind, item, on);
        }
        self
    }

    pub fn cross_join(&mut self, item: impl Into<TableItem>) -> &mut Self {
        self.joins.push(Join {
            kind: JoinKind::Cross,
            item: item.into(),
            condition: JoinCondition::None,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }
}

impl<'s, P: CanJoin> SelectBuilder<'s, P> {
    pub fn join(mut self, kind: JoinKind, item: impl Into<TableItem>) -> JoinOn<'s> {
        let mut item = item.into();
        self.scope.require(kind != JoinKind::Cross, || BuildError::Unsupported {
            feature: "CROSS JOIN with a join condition",
        });
        self.add_item(&mut item);
        JoinOn {
            builder: self.to(),
            kind,
            item,
        }
    }

    pub fn inner_join(self, item: impl Into<TableItem>) -> JoinOn<'s> {
        self.join(JoinKind::Inner, item)
    }

    pub fn left_join(self, item: impl Into<TableItem>) -> JoinOn<'s> {
        self.join(JoinKind::Left, item)
    }

    pub fn cross_join(mut self, item: impl Into<TableItem>) -> SelectBuilder<'s, Sourced> {
        let mut item = item.into();
        self.add_item(&mut item);
        self.push_join(Join {
            kind: JoinKind::Cross,
            item,
            condition: JoinCondition::None,
        });
        self.to()
    }

    /// Join only when `condition` holds.
    pub fn join_if(
        self,
        condition: bool,
        kind: JoinKind,
        item: impl Into<TableItem>,
        on: Predicate,
    ) -> SelectBuilder<'s, Sourced> {
        if condition {
            self.join(kind, item).on(on)
        } else {
            self.to()
        }
    }

    pub fn joins_with(mut self, f: impl FnOnce(&mut DynamicJoins)) -> SelectBuilder<'s, Sourced> {
        let mut dynamic = DynamicJoins::default();
        f(&mut dynamic);
        for mut join in dynamic.joins {
            self.add_item(&mut join.item);
            self.push_join(join);
        }
        self.to()
    }
}

/// WHERE conditions collected in a loop, joined with AND.
#[derive(Debug, Default)]
pub struct DynamicWhere {
    parts: Vec<Predicate>,
}

impl DynamicWhere {
    pub fn and(&mut self, condition: Predicate) -> &mut Self {
        self.parts.push(condition);
        self
    }

    pub fn and_if(&mut self, when: bool, condition: Predicate) -> &mut Self {
        if when {
            self.parts.push(condition);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub(crate) fn into_predicate(self) -> Option<Predicate> {
        (!self.parts.is_empty()).then(|| Predicate::all(self.parts))
    }
}

impl<'s, P: CanWhere> SelectBuilder<'s, P> {
    pub fn where_(mut self, condition: Predicate) -> SelectBuilder<'s, Filtered> {
        self.select.where_ = Some(condition);
        self.to()
    }

    pub fn where_if(self, when: bool, condition: Predicate) -> SelectBuilder<'s, Filtered> {
        if when {
            self.where_(condition)
        } else {
            self.to()
        }
    }

    pub fn where_with(mut self, f: impl FnOnce(&mut DynamicWhere)) -> SelectBuilder<'s, Filtered> {
        let mut dynamic = DynamicWhere::default();
        f(&mut dynamic);
        self.select.where_ = dynamic.into_predicate();
        self.to()
    }
}

impl<'s> SelectBuilder<'s, Filtered> {
    pub fn and(mut self, condition: Predicate) -> Self {
        self.select.where_ = Some(Predicate::conjoin(self.select.where_.take(), condition));
        self
    }

    pub fn and_if(self, when: bool, condition: Predicate) -> Self {
        if when { self.and(condition) } else { self }
    }

    pub fn or(mut self, condition: Predicate) -> Self {
        self.select.where_ = Some(match self.select.where_.take() {
            Some(p) => p.or(condition),
            None => condition,
        });
        self
    }
}

impl<'s, P: CanGroup> SelectBuilder<'s, P> {
    pub fn group_by<I, E>(mut self, exprs: I) -> SelectBuilder<'s, Grouped>
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        self.select.group_by.extend(exprs.into_iter().map(Into::into));
        self.to()
    }
}

impl<'s, P: CanHaving> SelectBuilder<'s, P> {
    pub fn having(mut self, condition: Predicate) -> SelectBuilder<'s, HavingPos> {
        self.select.having = Some(condition);
        self.to()
    }
}

impl<'s, P: CanWindow> SelectBuilder<'s, P> {
    /// `WINDOW name AS (spec)`
    pub fn window(mut self, name: &str, spec: WindowSpec) -> SelectBuilder<'s, Windowed> {
        if self.scope.attempt(|stack| stack.register_window(name)).is_some() {
            self.select.windows.push(NamedWindow {
                name: name.to_string(),
                spec,
            });
        }
        self.to()
    }
}

impl<'s, P: CanOrder> SelectBuilder<'s, P> {
    pub fn order_by<I, O>(mut self, items: I) -> SelectBuilder<'s, Ordered>
    where
        I: IntoIterator<Item = O>,
        O: Into<OrderItem>,
    {
        self.order_by.extend(items.into_iter().map(Into::into));
        self.to()
    }
}

impl<'s, P: CanLimit> SelectBuilder<'s, P> {
    pub fn limit(mut self, n: u64) -> SelectBuilder<'s, Limited> {
        self.limit = Some(n);
        self.to()
    }

    pub fn offset(mut self, n: u64) -> SelectBuilder<'s, Limited> {
        self.offset = Some(n);
        self.to()
    }
}

impl<'s, P: CanLock> SelectBuilder<'s, P> {
    pub fn for_update(mut self) -> SelectBuilder<'s, Locked> {
        self.lock = Some(LockMode::Update);
        self.to()
    }

    pub fn for_share(mut self) -> SelectBuilder<'s, Locked> {
        self.lock = Some(LockMode::Share);
        self.to()
    }
}

impl<'s, P: CanUnion> SelectBuilder<'s, P> {
    /// `this UNION (branch)`; the branch is a complete query of its own.
    pub fn union<F>(self, f: F) -> UnionBuilder<'s>
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        self.set_op(SetOp::Union, f)
    }

    pub fn union_all<F>(self, f: F) -> UnionBuilder<'s>
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        self.set_op(SetOp::UnionAll, f)
    }

    fn set_op<F>(mut self, op: SetOp, f: F) -> UnionBuilder<'s>
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        let link = self.scope.stack().current().and_then(|frame| frame.outer());
        let left = self.finish_body();
        UnionBuilder::start(self.scope, self.with, link, left).push(op, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{col, lit};
    use crate::ast::{table, SqlType, TableMeta};

    #[test]
    fn test_frames_released_after_finalize() {
        let meta = TableMeta::builder("t")
            .primary_key("id", SqlType::Integer)
            .build()
            .unwrap();
        let mut stack = ContextStack::new();
        let query = stack
            .select([col("id")])
            .from(table(&meta))
            .where_(col("id").gt(lit(3)))
            .as_query();
        assert!(query.is_ok());
        assert!(stack.is_balanced());
        assert_eq!(stack.stats().pushes, 1);
    }

    #[test]
    fn test_error_unwinds_and_sticks() {
        let meta = TableMeta::builder("t")
            .primary_key("id", SqlType::Integer)
            .build()
            .unwrap();
        let mut stack = ContextStack::new();
        let result = stack
            .select([col("id")])
            .from(table(&meta).alias("a"))
            .join(JoinKind::Inner, table(&meta).alias("a"))
            .on(col("a.id").eq(col("a.id")))
            .where_(col("nope").eq(lit(1)))
            .as_query();
        assert_eq!(result.unwrap_err(), BuildError::DuplicateAlias("a".to_string()));
        assert!(stack.is_balanced());
    }
}

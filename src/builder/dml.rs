//! INSERT, UPDATE and DELETE builders.

use std::sync::Arc;

use crate::ast::{
    Assignment, Delete, Expr, FieldMeta, Insert, InsertSource, Join, JoinCondition, JoinKind,
    Predicate, Query, Statement, TableItem, TableMeta, TableRef, Update, Visible, table,
};
use crate::builder::select::{register_table, DynamicWhere};
use crate::builder::{subquery_helpers, Resolver, Scope, SubqueryStart};
use crate::context::ContextStack;
use crate::dialect::Dialect;
use crate::error::{BuildError, QailResult};
use crate::render::Compiled;

fn field_of(meta: &TableMeta, name: &str) -> Result<Arc<FieldMeta>, BuildError> {
    meta.resolve_field(name).ok_or_else(|| BuildError::UnknownColumn {
        table: meta.name().to_string(),
        column: name.to_string(),
    })
}

fn fields_of(meta: &TableMeta, names: &[&str]) -> Result<Vec<Arc<FieldMeta>>, BuildError> {
    names.iter().map(|n| field_of(meta, n)).collect()
}

/// Give a literal or parameter the codec of the column it is written to.
fn infer_target(target: &FieldMeta, value: &mut Expr) {
    if let Expr::Literal(t) | Expr::Param(t) = value {
        t.infer_from(target);
    }
}

pub fn insert_into(meta: &Arc<TableMeta>) -> InsertBuilder<'static> {
    InsertBuilder::start(Scope::owned(ContextStack::new()), meta)
}

pub fn update(meta: &Arc<TableMeta>) -> UpdateBuilder<'static> {
    UpdateBuilder::start(Scope::owned(ContextStack::new()), meta)
}

pub fn delete_from(meta: &Arc<TableMeta>) -> DeleteBuilder<'static> {
    DeleteBuilder::start(Scope::owned(ContextStack::new()), meta)
}

impl ContextStack {
    pub fn insert_into(&mut self, meta: &Arc<TableMeta>) -> InsertBuilder<'_> {
        InsertBuilder::start(Scope::borrowed(self), meta)
    }

    pub fn update(&mut self, meta: &Arc<TableMeta>) -> UpdateBuilder<'_> {
        UpdateBuilder::start(Scope::borrowed(self), meta)
    }

    pub fn delete_from(&mut self, meta: &Arc<TableMeta>) -> DeleteBuilder<'_> {
        DeleteBuilder::start(Scope::borrowed(self), meta)
    }
}

/// `INSERT INTO t (columns) VALUES ... | SELECT ...`
///
/// Without an explicit column list, rows cover every column of the entity
/// except server-generated ones (including a child key whose parent key is
/// generated), in declaration order with own columns first.
pub struct InsertBuilder<'s> {
    scope: Scope<'s>,
    table: Arc<TableMeta>,
    columns: Vec<Arc<FieldMeta>>,
    rows: Vec<Vec<Expr>>,
    query: Option<Query>,
    returning: Vec<Arc<FieldMeta>>,
    batch: bool,
}

impl<'s> InsertBuilder<'s> {
    fn start(mut scope: Scope<'s>, meta: &Arc<TableMeta>) -> Self {
        scope.stack_mut().push(None);
        Self {
            scope,
            table: Arc::clone(meta),
            columns: Vec::new(),
            rows: Vec::new(),
            query: None,
            returning: Vec::new(),
            batch: false,
        }
    }

    subquery_helpers!();

    pub fn columns(mut self, names: &[&str]) -> Self {
        let table = Arc::clone(&self.table);
        if let Some(columns) = self.scope.attempt(|_| fields_of(&table, names)) {
            self.columns = columns;
        }
        self
    }

    fn default_columns(&mut self) {
        if self.columns.is_empty() {
            self.columns = self.table.insert_fields();
        }
    }

    /// One row of values in column order.
    pub fn values<I, E>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        self.default_columns();
        let row: Vec<Expr> = row.into_iter().map(Into::into).collect();
        let expected = self.columns.len();
        let found = row.len();
        self.scope
            .require(found == expected, || BuildError::RowWidth { expected, found });
        if self.scope.is_ok() {
            self.rows.push(row);
        }
        self
    }

    /// `INSERT ... SELECT`
    pub fn select<F>(mut self, f: F) -> Self
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        self.default_columns();
        self.query = self.scope.subquery(f);
        self
    }

    pub fn returning(mut self, names: &[&str]) -> Self {
        let supported = self.scope.stack().capabilities().returning;
        self.scope
            .require(supported, || BuildError::Unsupported { feature: "RETURNING" });
        let table = Arc::clone(&self.table);
        if let Some(fields) = self.scope.attempt(|_| fields_of(&table, names)) {
            self.returning = fields;
        }
        self
    }

    /// Compile to one SQL text with a parameter group per row.
    pub fn batch(mut self) -> Self {
        self.batch = true;
        self
    }

    pub fn as_insert(mut self) -> Result<Statement, BuildError> {
        let table = Arc::clone(&self.table);
        let columns = std::mem::take(&mut self.columns);
        let mut rows = std::mem::take(&mut self.rows);
        let query = self.query.take();
        let returning = std::mem::take(&mut self.returning);
        let batch = self.batch;
        self.scope.finish(|stack| {
            let expected = columns.len();
            let source = match query {
                Some(q) => {
                    if let Some(found) = q.projection_width()
                        && found != expected
                    {
                        return Err(BuildError::RowWidth { expected, found });
                    }
                    InsertSource::Query(Box::new(q))
                }
                None if rows.is_empty() => {
                    return Err(BuildError::EmptyInsert(table.name().to_string()));
                }
                None => {
                    // `columns()` may have replaced the list after rows were added.
                    if let Some(row) = rows.iter().find(|r| r.len() != expected) {
                        return Err(BuildError::RowWidth {
                            expected,
                            found: row.len(),
                        });
                    }
                    let resolver = Resolver::new(stack);
                    for row in rows.iter_mut() {
                        for (value, target) in row.iter_mut().zip(&columns) {
                            resolver.expr(value)?;
                            infer_target(target, value);
                        }
                    }
                    InsertSource::Values(rows)
                }
            };
            stack.pop();
            Ok(Statement::Insert(Insert {
                table,
                columns,
                source,
                returning,
                batch,
            }))
        })
    }

    pub fn compile(self, dialect: &Dialect) -> QailResult<Compiled> {
        let stmt = self.as_insert()?;
        crate::render::compile(&stmt, dialect)
    }
}

/// `UPDATE t SET ... [WHERE ...]`
pub struct UpdateBuilder<'s> {
    scope: Scope<'s>,
    table: TableRef,
    joins: Vec<Join>,
    assignments: Vec<Assignment>,
    where_: Option<Predicate>,
    returning: Vec<Arc<FieldMeta>>,
    visible: Visible,
}

/// Builder methods shared by UPDATE and DELETE.
macro_rules! target_helpers {
    ($multi:ident, $feature:literal) => {
        /// Rename the target table.
        pub fn alias(mut self, alias: &str) -> Self {
            let old = self.table.scope_name().map(str::to_string);
            if let Some(old) = old
                && self.scope.attempt(|stack| stack.rename_alias(&old, alias)).is_some()
            {
                self.table.alias = Some(alias.to_string());
            }
            self
        }

        /// Join another table into the statement (multi-table syntax).
        pub fn join(mut self, kind: JoinKind, item: impl Into<TableItem>, on: Predicate) -> Self {
            let supported = self.scope.stack().capabilities().$multi;
            self.scope
                .require(supported, || BuildError::Unsupported { feature: $feature });
            let mut item = item.into();
            for t in item.tables_mut() {
                self.scope.attempt(|stack| register_table(stack, t));
            }
            self.joins.push(Join {
                kind,
                item,
                condition: JoinCondition::On(on),
            });
            self
        }

        pub fn where_(mut self, condition: Predicate) -> Self {
            self.where_ = Some(condition);
            self
        }

        pub fn and(mut self, condition: Predicate) -> Self {
            self.where_ = Some(Predicate::conjoin(self.where_.take(), condition));
            self
        }

        pub fn and_if(self, when: bool, condition: Predicate) -> Self {
            if when { self.and(condition) } else { self }
        }

        pub fn where_with(mut self, f: impl FnOnce(&mut DynamicWhere)) -> Self {
            let mut dynamic = DynamicWhere::default();
            f(&mut dynamic);
            if let Some(p) = dynamic.into_predicate() {
                self.where_ = Some(Predicate::conjoin(self.where_.take(), p));
            }
            self
        }

        pub fn returning(mut self, names: &[&str]) -> Self {
            let supported = self.scope.stack().capabilities().returning;
            self.scope
                .require(supported, || BuildError::Unsupported { feature: "RETURNING" });
            let fields = match self.table.meta() {
                Some(meta) => {
                    let meta = Arc::clone(meta);
                    self.scope.attempt(|_| fields_of(&meta, names))
                }
                None => None,
            };
            if let Some(fields) = fields {
                self.returning = fields;
            }
            self
        }

        /// Soft-delete filtering; [`Visible::Only`] by default.
        pub fn visible(mut self, visible: Visible) -> Self {
            self.visible = visible;
            self
        }
    };
}

impl<'s> UpdateBuilder<'s> {
    fn start(mut scope: Scope<'s>, meta: &Arc<TableMeta>) -> Self {
        scope.stack_mut().push(None);
        let table = table(meta);
        scope.attempt(|stack| stack.register_alias(&table));
        Self {
            scope,
            table,
            joins: Vec::new(),
            assignments: Vec::new(),
            where_: None,
            returning: Vec::new(),
            visible: Visible::default(),
        }
    }

    subquery_helpers!();
    target_helpers!(multi_table_update, "multi-table UPDATE");

    fn target(&mut self, name: &str) -> Option<Arc<FieldMeta>> {
        let meta = self.table.meta().map(Arc::clone)?;
        self.scope.attempt(|_| field_of(&meta, name))
    }

    /// `SET column = value`
    pub fn set(mut self, column: &str, value: impl Into<Expr>) -> Self {
        if let Some(target) = self.target(column) {
            self.assignments.push(Assignment::Column {
                target,
                value: value.into(),
            });
        }
        self
    }

    pub fn set_if(self, when: bool, column: &str, value: impl Into<Expr>) -> Self {
        if when { self.set(column, value) } else { self }
    }

    /// `SET (a, b) = (x, y)`
    pub fn set_row<I, E>(mut self, columns: &[&str], values: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        let supported = self.scope.stack().capabilities().row_constructor_set;
        self.scope.require(supported, || BuildError::Unsupported {
            feature: "row constructor in SET",
        });
        let values: Vec<Expr> = values.into_iter().map(Into::into).collect();
        let (expected, found) = (columns.len(), values.len());
        self.scope
            .require(expected == found, || BuildError::RowWidth { expected, found });
        let targets: Option<Vec<_>> = columns.iter().map(|c| self.target(c)).collect();
        if let Some(targets) = targets {
            self.assignments.push(Assignment::Row { targets, values });
        }
        self
    }

    pub fn as_update(mut self) -> Result<Statement, BuildError> {
        let table = self.table.clone();
        let mut joins = std::mem::take(&mut self.joins);
        let mut assignments = std::mem::take(&mut self.assignments);
        let mut where_ = self.where_.take();
        let returning = std::mem::take(&mut self.returning);
        let visible = self.visible;
        self.scope.finish(|stack| {
            if assignments.is_empty() {
                let name = table.scope_name().unwrap_or_default().to_string();
                return Err(BuildError::NoAssignments(name));
            }
            let resolver = Resolver::new(stack);
            for join in joins.iter_mut() {
                if let JoinCondition::On(p) = &mut join.condition {
                    resolver.predicate(p)?;
                }
            }
            for a in assignments.iter_mut() {
                match a {
                    Assignment::Column { target, value } => {
                        resolver.expr(value)?;
                        infer_target(target, value);
                    }
                    Assignment::Row { targets, values } => {
                        for (target, value) in targets.iter().zip(values.iter_mut()) {
                            resolver.expr(value)?;
                            infer_target(target, value);
                        }
                    }
                }
            }
            if let Some(w) = &mut where_ {
                resolver.predicate(w)?;
            }
            stack.pop();
            Ok(Statement::Update(Update {
                table,
                joins,
                assignments,
                where_,
                returning,
                visible,
            }))
        })
    }

    pub fn compile(self, dialect: &Dialect) -> QailResult<Compiled> {
        let stmt = self.as_update()?;
        crate::render::compile(&stmt, dialect)
    }
}

/// `DELETE FROM t [WHERE ...]`
pub struct DeleteBuilder<'s> {
    scope: Scope<'s>,
    table: TableRef,
    joins: Vec<Join>,
    where_: Option<Predicate>,
    returning: Vec<Arc<FieldMeta>>,
    visible: Visible,
}

impl<'s> DeleteBuilder<'s> {
    fn start(mut scope: Scope<'s>, meta: &Arc<TableMeta>) -> Self {
        scope.stack_mut().push(None);
        let table = table(meta);
        scope.attempt(|stack| stack.register_alias(&table));
        Self {
            scope,
            table,
            joins: Vec::new(),
            where_: None,
            returning: Vec::new(),
            visible: Visible::default(),
        }
    }

    subquery_helpers!();
    target_helpers!(multi_table_delete, "multi-table DELETE");

    pub fn as_delete(mut self) -> Result<Statement, BuildError> {
        let table = self.table.clone();
        let mut joins = std::mem::take(&mut self.joins);
        let mut where_ = self.where_.take();
        let returning = std::mem::take(&mut self.returning);
        let visible = self.visible;
        self.scope.finish(|stack| {
            let resolver = Resolver::new(stack);
            for join in joins.iter_mut() {
                if let JoinCondition::On(p) = &mut join.condition {
                    resolver.predicate(p)?;
                }
            }
            if let Some(w) = &mut where_ {
                resolver.predicate(w)?;
            }
            stack.pop();
            Ok(Statement::Delete(Delete {
                table,
                joins,
                where_,
                returning,
                visible,
            }))
        })
    }

    pub fn compile(self, dialect: &Dialect) -> QailResult<Compiled> {
        let stmt = self.as_delete()?;
        crate::render::compile(&stmt, dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{col, lit};
    use crate::ast::SqlType;

    fn items() -> Arc<TableMeta> {
        TableMeta::builder("items")
            .generated_key("id", SqlType::BigInt)
            .field("name", SqlType::Varchar(32))
            .field("qty", SqlType::Integer)
            .build()
            .unwrap()
    }

    #[test]
    fn test_insert_defaults_to_non_generated_columns() {
        let Statement::Insert(insert) = insert_into(&items())
            .values([lit("bolt"), lit(3)])
            .as_insert()
            .unwrap()
        else {
            panic!("expected INSERT");
        };
        let names: Vec<&str> = insert.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["name", "qty"]);
    }

    #[test]
    fn test_insert_row_width_checked() {
        let err = insert_into(&items())
            .columns(&["name", "qty"])
            .values([lit("bolt")])
            .as_insert()
            .unwrap_err();
        assert_eq!(err, BuildError::RowWidth { expected: 2, found: 1 });
    }

    #[test]
    fn test_columns_after_values_rechecked() {
        let err = insert_into(&items())
            .values([lit("a"), lit(1)])
            .columns(&["name"])
            .as_insert()
            .unwrap_err();
        assert_eq!(err, BuildError::RowWidth { expected: 1, found: 2 });
    }

    #[test]
    fn test_insert_select_width_checked() {
        let meta = items();
        let mut stack = ContextStack::new();
        let err = stack
            .insert_into(&meta)
            .columns(&["name", "qty"])
            .select(|s| {
                s.select([col("name")])
                    .from(table(&meta))
                    .as_query()
            })
            .as_insert()
            .unwrap_err();
        assert_eq!(err, BuildError::RowWidth { expected: 2, found: 1 });
        assert!(stack.is_balanced());
    }

    #[test]
    fn test_update_without_assignments() {
        let err = update(&items())
            .where_(col("id").eq(lit(1)))
            .as_update()
            .unwrap_err();
        assert_eq!(err, BuildError::NoAssignments("items".to_string()));
    }

    #[test]
    fn test_update_unknown_column_unwinds() {
        let mut stack = ContextStack::new();
        let err = stack
            .update(&items())
            .set("missing", 1)
            .set("qty", 2)
            .as_update()
            .unwrap_err();
        assert!(matches!(err, BuildError::UnknownColumn { .. }));
        assert!(stack.is_balanced());
    }

    #[test]
    fn test_assignment_value_takes_target_codec() {
        let Statement::Update(u) = update(&items()).set("qty", 5).as_update().unwrap() else {
            panic!("expected UPDATE");
        };
        let Assignment::Column {
            value: Expr::Param(t),
            ..
        } = &u.assignments[0]
        else {
            panic!("expected parameter");
        };
        assert_eq!(t.mapping.as_ref().map(|m| m.sql_type()), Some(SqlType::Integer));
    }
}

//! Splitting of statements on inherited tables.
//!
//! A child table stores its own columns and shares its primary key with the
//! parent, which stores the inherited columns and the discriminator. A
//! logical INSERT, UPDATE or DELETE on the child becomes a [`PairStmt`]: two
//! physical statements plus the linkage the executor needs between them.
//!
//! Dialects that can write two tables in one statement get a single joined
//! UPDATE or DELETE instead.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::ast::table::physical;
use crate::ast::visit::{expr_columns, predicate_columns};
use crate::ast::{
    Assignment, ColumnRef, Delete, Expr, FieldMeta, Insert, InsertSource, Join, JoinCondition,
    JoinKind, JoinTree, ParentLink, Predicate, Query, QueryBody, Select, TableItem, TableMeta,
    TableRef, Typed, Update, Value, Visible,
};
use crate::dialect::{Dialect, SplitOrder};
use crate::error::{ConsistencyFault, QailResult, SplitError};
use crate::exec::ExecOutcome;
use crate::render::dml::{bound_column, flag_equals, insert_flags};
use crate::render::{render_delete, render_update, Compiled, Stmt, Writer};

/// How the second statement of a pair depends on the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Linkage {
    /// Independent; both statements carry every value they need.
    None,
    /// The key generated by the first statement is bound into the second at
    /// these parameter positions, one per inserted row.
    GeneratedKey { param_indexes: Vec<usize> },
    /// Both statements must touch the same number of rows.
    RowCountEcho,
}

/// Two physical statements executed in order inside one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairStmt {
    pub first: Stmt,
    pub second: Stmt,
    pub linkage: Linkage,
}

impl PairStmt {
    /// The second statement with generated keys bound in.
    pub fn bind_generated_keys(&self, keys: &[Value]) -> QailResult<Stmt> {
        let Linkage::GeneratedKey { param_indexes } = &self.linkage else {
            return Ok(self.second.clone());
        };
        if keys.len() != param_indexes.len() {
            return Err(ConsistencyFault::GeneratedKeyMismatch {
                expected: param_indexes.len(),
                found: keys.len(),
            }
            .into());
        }
        let mut second = self.second.clone();
        for (key, &index) in keys.iter().zip(param_indexes) {
            if let Some(param) = second.params.get_mut(index) {
                param.value = key.clone();
            }
        }
        Ok(second)
    }

    /// Check the outcomes of both halves against each other.
    pub fn validate(&self, first: &ExecOutcome, second: &ExecOutcome) -> Result<(), ConsistencyFault> {
        if let Linkage::GeneratedKey { param_indexes } = &self.linkage
            && first.generated_keys.len() != param_indexes.len()
        {
            return Err(ConsistencyFault::GeneratedKeyMismatch {
                expected: param_indexes.len(),
                found: first.generated_keys.len(),
            });
        }
        if first.affected_rows != second.affected_rows {
            return Err(ConsistencyFault::RowCountMismatch {
                first: first.affected_rows,
                second: second.affected_rows,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    BuildParent,
    BuildChild,
    BindLinkage,
    Validate,
    EmitPair,
}

/// Walks one statement through the split phases.
struct Splitter<'a> {
    dialect: &'a Dialect,
    child: Arc<TableMeta>,
    link: ParentLink,
    phase: Phase,
}

impl<'a> Splitter<'a> {
    fn new(meta: &Arc<TableMeta>, dialect: &'a Dialect) -> Result<Self, SplitError> {
        let link = meta
            .parent()
            .cloned()
            .ok_or_else(|| SplitError::NoParent(meta.name().to_string()))?;
        Ok(Self {
            dialect,
            child: Arc::clone(meta),
            link,
            phase: Phase::BuildParent,
        })
    }

    fn advance(&mut self, next: Phase) {
        debug!(
            table = self.child.name(),
            from = ?self.phase,
            to = ?next,
            "split phase"
        );
        self.phase = next;
    }

    fn parent(&self) -> &Arc<TableMeta> {
        &self.link.table
    }

    fn key_name(&self) -> &str {
        &self.child.primary_key().name
    }

    fn discriminator(&self) -> Result<Arc<FieldMeta>, SplitError> {
        self.child
            .discriminator_link()
            .map(|(field, _)| field)
            .ok_or_else(|| SplitError::NoParent(self.child.name().to_string()))
    }

    fn discriminator_value(&self, field: &Arc<FieldMeta>) -> Expr {
        typed_literal(field, &self.link.discriminator)
    }

    /// Columns written or bound as parameters by the two statements may only
    /// overlap on the key.
    fn check_disjoint(&self, first: &Stmt, second: &Stmt) -> Result<(), SplitError> {
        let keys = [self.key_name(), self.parent().primary_key().name.as_str()];
        let bound = |s: &Stmt| -> Vec<String> {
            s.columns
                .iter()
                .cloned()
                .chain(s.params.iter().filter_map(|p| p.column.clone()))
                .filter(|c| !keys.contains(&c.as_str()))
                .collect()
        };
        let second_bound = bound(second);
        match bound(first).into_iter().find(|c| second_bound.contains(c)) {
            Some(column) => Err(SplitError::SharedColumn(column)),
            None => Ok(()),
        }
    }
}

fn typed_literal(field: &Arc<FieldMeta>, value: &Value) -> Expr {
    let mut typed = Typed::new(value.clone());
    typed.infer_from(field);
    Expr::Literal(typed)
}

/// Split an INSERT on a child table into parent and child inserts.
pub fn split_insert(ins: &Insert, dialect: &Dialect) -> QailResult<PairStmt> {
    let mut sp = Splitter::new(&ins.table, dialect)?;
    if ins.batch {
        return Err(SplitError::Unsupported("batch INSERT into an inherited table").into());
    }
    if !ins.returning.is_empty() {
        return Err(SplitError::Unsupported("RETURNING on an inherited table").into());
    }
    let InsertSource::Values(rows) = &ins.source else {
        return Err(SplitError::Unsupported("INSERT ... SELECT into an inherited table").into());
    };
    if let Some(row) = rows.iter().find(|r| r.len() != ins.columns.len()) {
        return Err(crate::error::BuildError::RowWidth {
            expected: ins.columns.len(),
            found: row.len(),
        }
        .into());
    }

    let parent = Arc::clone(sp.parent());
    let disc = sp.discriminator()?;
    let key_name = sp.key_name().to_string();
    let key_index = ins.columns.iter().position(|c| c.name == key_name);
    let disc_index = ins.columns.iter().position(|c| c.is(&disc));
    let generated = key_index.is_none() && sp.child.key_generated();
    if key_index.is_none() && !generated {
        return Err(SplitError::Unsupported("INSERT into an inherited table without its key").into());
    }
    let returning = generated && dialect.capabilities.returning;
    if generated && !returning && rows.len() > 1 {
        return Err(SplitError::Unsupported(
            "multi-row INSERT with generated keys without RETURNING",
        )
        .into());
    }

    if let Some(i) = disc_index {
        for row in rows {
            check_discriminator(&sp, &row[i])?;
        }
    }

    let parent_idx: Vec<usize> = (0..ins.columns.len())
        .filter(|&i| Some(i) != key_index && ins.columns[i].table == parent.name())
        .collect();
    let child_idx: Vec<usize> = (0..ins.columns.len())
        .filter(|&i| Some(i) != key_index && ins.columns[i].table == sp.child.name())
        .collect();

    // Parent: [key] + inherited columns + [discriminator]
    let mut parent_columns = Vec::new();
    if key_index.is_some() {
        parent_columns.push(Arc::clone(parent.primary_key()));
    }
    parent_columns.extend(parent_idx.iter().map(|&i| Arc::clone(&ins.columns[i])));
    if disc_index.is_none() {
        parent_columns.push(Arc::clone(&disc));
    }
    let parent_rows: Vec<Vec<Expr>> = rows
        .iter()
        .map(|row| {
            let mut out: Vec<Expr> = key_index.iter().map(|&k| row[k].clone()).collect();
            out.extend(parent_idx.iter().map(|&i| row[i].clone()));
            if disc_index.is_none() {
                out.push(sp.discriminator_value(&disc));
            }
            out
        })
        .collect();
    let parent_insert = Insert {
        table: Arc::clone(&parent),
        columns: parent_columns,
        source: InsertSource::Values(parent_rows),
        returning: if returning {
            vec![Arc::clone(parent.primary_key())]
        } else {
            Vec::new()
        },
        batch: false,
    };
    let first = render_insert(&parent_insert, sp.dialect)?.0;

    sp.advance(Phase::BuildChild);
    let child_key = Arc::clone(sp.child.primary_key());
    let mut child_columns = vec![Arc::clone(&child_key)];
    child_columns.extend(child_idx.iter().map(|&i| Arc::clone(&ins.columns[i])));
    let child_rows: Vec<Vec<Expr>> = rows
        .iter()
        .map(|row| {
            let key = match key_index {
                Some(k) => row[k].clone(),
                None => {
                    let mut slot = Typed::new(Value::Null);
                    slot.infer_from(&child_key);
                    Expr::Param(slot)
                }
            };
            let mut out = vec![key];
            out.extend(child_idx.iter().map(|&i| row[i].clone()));
            out
        })
        .collect();
    let child_insert = Insert {
        table: Arc::clone(&sp.child),
        columns: child_columns,
        source: InsertSource::Values(child_rows),
        returning: Vec::new(),
        batch: false,
    };
    let (second, offsets) = render_insert(&child_insert, sp.dialect)?;

    sp.advance(Phase::BindLinkage);
    let linkage = if generated {
        Linkage::GeneratedKey {
            param_indexes: offsets,
        }
    } else {
        Linkage::None
    };

    sp.advance(Phase::Validate);
    sp.check_disjoint(&first, &second)?;

    sp.advance(Phase::EmitPair);
    Ok(PairStmt {
        first,
        second,
        linkage,
    })
}

fn check_discriminator(sp: &Splitter<'_>, value: &Expr) -> Result<(), SplitError> {
    let expected = &sp.link.discriminator;
    let found = match value {
        Expr::Literal(t) | Expr::Param(t) if t.value == *expected => return Ok(()),
        Expr::Literal(t) | Expr::Param(t) => t.value.to_string(),
        _ => "an expression".to_string(),
    };
    Err(SplitError::DiscriminatorConflict {
        table: sp.child.name().to_string(),
        expected: expected.to_string(),
        found,
    })
}

fn render_insert(ins: &Insert, dialect: &Dialect) -> Result<(Stmt, Vec<usize>), crate::error::RenderError> {
    let mut w = Writer::new(dialect);
    let offsets = w.insert(ins)?;
    let columns = ins.columns.iter().map(|c| c.name.clone()).collect();
    Ok((w.finish(insert_flags(ins), columns), offsets))
}

/// Qualifiers of the child and its parent inside the statement scope.
struct Scopes {
    child: String,
    parent: String,
}

impl Scopes {
    fn of(table: &TableRef, child: &TableMeta) -> Self {
        let child_scope = table.scope_name().unwrap_or(child.name()).to_string();
        Self {
            parent: format!("{}_p", child_scope),
            child: child_scope,
        }
    }

    fn for_field(&self, field: &FieldMeta, child: &TableMeta) -> &str {
        if field.table == child.name() {
            &self.child
        } else {
            &self.parent
        }
    }
}

/// Discriminator and soft-delete conditions restricting rows to this child.
fn row_filters(
    sp: &Splitter<'_>,
    scopes: &Scopes,
    visible: Visible,
) -> Result<Vec<Predicate>, SplitError> {
    let disc = sp.discriminator()?;
    let mut filters =
        vec![bound_column(Some(&scopes.parent), &disc).eq(sp.discriminator_value(&disc))];
    if visible == Visible::Only
        && let Some(field) = sp.child.visible_column()
    {
        let q = scopes.for_field(&field, &sp.child);
        filters.push(flag_equals(Some(q), &field, true));
    }
    Ok(filters)
}

fn conjoin_all(base: Option<Predicate>, more: Vec<Predicate>) -> Option<Predicate> {
    more.into_iter()
        .fold(base, |acc, p| Some(Predicate::conjoin(acc, p)))
}

/// `INNER JOIN parent AS {scope}_p ON {scope}_p.pk = {scope}.pk` as a join node.
fn parent_join(sp: &Splitter<'_>, scopes: &Scopes) -> Join {
    let parent = sp.parent();
    let on = bound_column(Some(&scopes.parent), parent.primary_key())
        .eq(bound_column(Some(&scopes.child), sp.child.primary_key()));
    Join {
        kind: JoinKind::Inner,
        item: TableItem::Table(physical(parent, &scopes.parent)),
        condition: JoinCondition::On(on),
    }
}

/// `SELECT {scope}.pk FROM child {scope} [parent join] WHERE filter`
fn key_filter(sp: &Splitter<'_>, table: &TableRef, scopes: &Scopes, filter: Option<Predicate>) -> Query {
    let expanded = TableRef {
        only: false,
        ..table.clone()
    };
    let select = Select {
        items: vec![bound_column(Some(&scopes.child), sp.child.primary_key()).into()],
        from: Some(JoinTree::group(expanded)),
        where_: filter,
        ..Select::default()
    };
    Query::from_body(QueryBody::Select(Box::new(select)))
}

fn reads_other_table(value: &Expr, side: &str) -> Option<String> {
    let mut found = None;
    expr_columns(value, &mut |c: &ColumnRef| {
        if let Some(b) = &c.binding
            && !b.outer
            && let Some(f) = &b.field
            && f.table != side
            && found.is_none()
        {
            found = Some(f.name.clone());
        }
    });
    found
}

fn check_assignments(sp: &Splitter<'_>, assignments: &[Assignment]) -> Result<(), SplitError> {
    let disc = sp.discriminator()?;
    for a in assignments {
        let targets = a.targets();
        for target in &targets {
            if target.name == sp.key_name() {
                return Err(SplitError::Unsupported("assigning the key of an inherited table"));
            }
            if target.is(&disc) {
                return Err(SplitError::DiscriminatorAssignment(disc.name.clone()));
            }
        }
        let side = targets.first().map(|t| t.table.clone()).unwrap_or_default();
        if targets.iter().any(|t| t.table != side) {
            return Err(SplitError::Unsupported("a row assignment spanning parent and child columns"));
        }
        let values: Vec<&Expr> = match a {
            Assignment::Column { value, .. } => vec![value],
            Assignment::Row { values, .. } => values.iter().collect(),
        };
        if values.iter().any(|v| reads_other_table(v, &side).is_some()) {
            return Err(SplitError::Unsupported(
                "an assignment reading a column of the other physical table",
            ));
        }
    }
    Ok(())
}

fn version_locked(meta: &TableMeta, where_: &Option<Predicate>) -> bool {
    let (Some(version), Some(p)) = (meta.version_column(), where_) else {
        return false;
    };
    let mut found = false;
    predicate_columns(p, &mut |c: &ColumnRef| {
        if c.field().is_some_and(|f| f.is(&version)) {
            found = true;
        }
    });
    found
}

/// Split an UPDATE on a child table.
///
/// Returns a single statement when the dialect can update both tables at
/// once, or when every assignment lands on one side.
pub fn split_update(u: &Update, dialect: &Dialect) -> QailResult<Compiled> {
    let meta = u
        .meta()
        .ok_or_else(|| SplitError::NoParent("derived table".to_string()))?;
    let mut sp = Splitter::new(meta, dialect)?;
    if !u.joins.is_empty() {
        return Err(SplitError::Unsupported("joins in UPDATE of an inherited table").into());
    }
    if !u.returning.is_empty() {
        return Err(SplitError::Unsupported("RETURNING on an inherited table").into());
    }
    check_assignments(&sp, &u.assignments)?;

    let scopes = Scopes::of(&u.table, &sp.child);
    let filters = row_filters(&sp, &scopes, u.visible)?;
    let locked = version_locked(&sp.child, &u.where_);

    if dialect.capabilities.multi_table_update {
        let joined = Update {
            table: physical(&sp.child, &scopes.child),
            joins: vec![parent_join(&sp, &scopes)],
            assignments: u.assignments.clone(),
            where_: conjoin_all(u.where_.clone(), filters),
            returning: Vec::new(),
            visible: Visible::Both,
        };
        let mut stmt = render_update(&joined, dialect)?;
        stmt.flags.has_optimistic_lock = locked;
        return Ok(Compiled::Single(stmt));
    }

    let child_name = sp.child.name().to_string();
    let (child_assign, parent_assign): (Vec<Assignment>, Vec<Assignment>) = u
        .assignments
        .iter()
        .cloned()
        .partition(|a| a.targets().first().is_some_and(|t| t.table == child_name));

    let mut filter_columns: Vec<Arc<FieldMeta>> = Vec::new();
    let filter = conjoin_all(u.where_.clone(), filters);
    if let Some(p) = &filter {
        predicate_columns(p, &mut |c: &ColumnRef| {
            if let Some(f) = c.field() {
                filter_columns.push(Arc::clone(f));
            }
        });
    }
    let keys = key_filter(&sp, &u.table, &scopes, filter);

    let parent = Arc::clone(sp.parent());
    let side = |assignments: Vec<Assignment>, target: &Arc<TableMeta>, scope: &str| Update {
        where_: Some(bound_column(Some(scope), target.primary_key()).in_query(keys.clone())),
        table: physical(target, scope),
        joins: Vec::new(),
        assignments,
        returning: Vec::new(),
        visible: Visible::Both,
    };
    let child_update = side(child_assign, &sp.child, &scopes.child);
    let parent_update = side(parent_assign, &parent, &scopes.parent);

    let (first, second) = match dialect.split_order {
        SplitOrder::ChildFirst => (child_update, parent_update),
        SplitOrder::ParentFirst => (parent_update, child_update),
    };
    if first.assignments.is_empty() || second.assignments.is_empty() {
        let only = if first.assignments.is_empty() { second } else { first };
        let mut stmt = render_update(&only, dialect)?;
        stmt.flags.has_optimistic_lock = locked;
        return Ok(Compiled::Single(stmt));
    }

    let assigned: Vec<&Arc<FieldMeta>> = first.assignments.iter().flat_map(|a| a.targets()).collect();
    if let Some(column) = filter_columns
        .iter()
        .find(|f| assigned.iter().any(|a| a.is(f)))
    {
        return Err(SplitError::UnstableFilter {
            first: first.table.meta().map(|m| m.name().to_string()).unwrap_or_default(),
            second: second.table.meta().map(|m| m.name().to_string()).unwrap_or_default(),
            column: column.name.clone(),
        }
        .into());
    }

    let mut first = render_update(&first, dialect)?;
    sp.advance(Phase::BuildChild);
    let mut second = render_update(&second, dialect)?;
    first.flags.has_optimistic_lock = locked;
    second.flags.has_optimistic_lock = locked;

    sp.advance(Phase::BindLinkage);
    sp.advance(Phase::Validate);
    sp.check_disjoint(&first, &second)?;
    sp.advance(Phase::EmitPair);
    Ok(Compiled::Pair(PairStmt {
        first,
        second,
        linkage: Linkage::RowCountEcho,
    }))
}

/// `... WHERE [disc AND] NOT EXISTS (SELECT 1 FROM other WHERE other.pk = target.pk)`
fn orphan_sweep(
    target: &Arc<TableMeta>,
    target_scope: &str,
    other: &Arc<TableMeta>,
    other_scope: &str,
    discriminator: Option<Predicate>,
) -> Delete {
    let sibling = Select {
        items: vec![Expr::Literal(Typed::new(Value::Int(1))).into()],
        from: Some(JoinTree::group(physical(other, other_scope))),
        where_: Some(
            bound_column(Some(other_scope), other.primary_key())
                .eq(bound_column(Some(target_scope), target.primary_key())),
        ),
        ..Select::default()
    };
    let missing = Predicate::Exists {
        query: Box::new(Query::from_body(QueryBody::Select(Box::new(sibling)))),
        negated: true,
    };
    Delete {
        table: physical(target, target_scope),
        joins: Vec::new(),
        where_: Some(Predicate::conjoin(discriminator, missing)),
        returning: Vec::new(),
        visible: Visible::Both,
    }
}

/// Split a DELETE on a child table.
///
/// The second statement removes rows the first one orphaned, so both must
/// report the same row count.
pub fn split_delete(d: &Delete, dialect: &Dialect) -> QailResult<Compiled> {
    let meta = d
        .meta()
        .ok_or_else(|| SplitError::NoParent("derived table".to_string()))?;
    let mut sp = Splitter::new(meta, dialect)?;
    if !d.joins.is_empty() {
        return Err(SplitError::Unsupported("joins in DELETE of an inherited table").into());
    }
    if !d.returning.is_empty() {
        return Err(SplitError::Unsupported("RETURNING on an inherited table").into());
    }
    let scopes = Scopes::of(&d.table, &sp.child);
    let filters = row_filters(&sp, &scopes, d.visible)?;
    let locked = version_locked(&sp.child, &d.where_);

    if dialect.capabilities.multi_table_delete {
        let joined = Delete {
            table: physical(&sp.child, &scopes.child),
            joins: vec![parent_join(&sp, &scopes)],
            where_: conjoin_all(d.where_.clone(), filters),
            returning: Vec::new(),
            visible: Visible::Both,
        };
        let mut w = Writer::new(dialect);
        let mut flags = w.delete_from(&joined, &[&scopes.child, &scopes.parent])?;
        flags.has_optimistic_lock = locked;
        return Ok(Compiled::Single(w.finish(flags, Vec::new())));
    }

    let keys = key_filter(&sp, &d.table, &scopes, conjoin_all(d.where_.clone(), filters));
    let parent = Arc::clone(sp.parent());
    let disc = sp.discriminator()?;
    let (first, second) = match dialect.split_order {
        SplitOrder::ChildFirst => {
            let first = Delete {
                where_: Some(bound_column(Some(&scopes.child), sp.child.primary_key()).in_query(keys)),
                table: physical(&sp.child, &scopes.child),
                joins: Vec::new(),
                returning: Vec::new(),
                visible: Visible::Both,
            };
            let disc_filter =
                bound_column(Some(&scopes.parent), &disc).eq(sp.discriminator_value(&disc));
            let sweep = orphan_sweep(&parent, &scopes.parent, &sp.child, &scopes.child, Some(disc_filter));
            (first, sweep)
        }
        SplitOrder::ParentFirst => {
            let first = Delete {
                where_: Some(bound_column(Some(&scopes.parent), parent.primary_key()).in_query(keys)),
                table: physical(&parent, &scopes.parent),
                joins: Vec::new(),
                returning: Vec::new(),
                visible: Visible::Both,
            };
            let sweep = orphan_sweep(&sp.child, &scopes.child, &parent, &scopes.parent, None);
            (first, sweep)
        }
    };

    let mut first = render_delete(&first, dialect)?;
    sp.advance(Phase::BuildChild);
    let mut second = render_delete(&second, dialect)?;
    first.flags.has_optimistic_lock = locked;
    second.flags.has_optimistic_lock = locked;
    sp.advance(Phase::BindLinkage);
    sp.advance(Phase::Validate);
    sp.advance(Phase::EmitPair);
    Ok(Compiled::Pair(PairStmt {
        first,
        second,
        linkage: Linkage::RowCountEcho,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{col, lit};
    use crate::ast::SqlType;
    use crate::builder::{delete_from, insert_into, update};
    use crate::dialect::MySqlVersion;
    use crate::error::QailError;
    use crate::render::compile;
    use pretty_assertions::assert_eq;

    fn animal() -> Arc<TableMeta> {
        TableMeta::builder("animal")
            .generated_key("id", SqlType::BigInt)
            .field("name", SqlType::Varchar(64))
            .field("alive", SqlType::Boolean)
            .discriminator("kind", SqlType::Varchar(16), ["dog", "cat"])
            .build()
            .unwrap()
    }

    fn dog() -> Arc<TableMeta> {
        TableMeta::builder("dog")
            .primary_key("id", SqlType::BigInt)
            .field("breed", SqlType::Varchar(64))
            .extends(&animal(), "dog")
            .visible("alive")
            .build()
            .unwrap()
    }

    fn pair(c: Compiled) -> PairStmt {
        c.into_pair().expect("expected a statement pair")
    }

    #[test]
    fn test_insert_generated_key_with_returning() {
        let stmt = insert_into(&dog())
            .columns(&["breed", "name"])
            .values(["lab", "rex"])
            .as_insert()
            .unwrap();
        let p = pair(compile(&stmt, &Dialect::postgres()).unwrap());
        assert_eq!(
            p.first.sql,
            "INSERT INTO animal (name, kind) VALUES ($1, 'dog') RETURNING id"
        );
        assert_eq!(p.second.sql, "INSERT INTO dog (id, breed) VALUES ($1, $2)");
        assert_eq!(
            p.linkage,
            Linkage::GeneratedKey {
                param_indexes: vec![0]
            }
        );
        let bound = p.bind_generated_keys(&[Value::Int(42)]).unwrap();
        assert_eq!(bound.params[0].value, Value::Int(42));
        assert_eq!(bound.params[1].value, Value::Text("lab".into()));
    }

    #[test]
    fn test_generated_key_count_checked() {
        let stmt = insert_into(&dog())
            .columns(&["breed", "name"])
            .values(["lab", "rex"])
            .as_insert()
            .unwrap();
        let p = pair(compile(&stmt, &Dialect::postgres()).unwrap());
        let err = p.bind_generated_keys(&[]).unwrap_err();
        assert_eq!(
            err,
            QailError::Consistency(ConsistencyFault::GeneratedKeyMismatch {
                expected: 1,
                found: 0
            })
        );
    }

    #[test]
    fn test_discriminator_conflict() {
        let stmt = insert_into(&dog())
            .columns(&["breed", "name", "kind"])
            .values(["lab", "rex", "cat"])
            .as_insert()
            .unwrap();
        let err = compile(&stmt, &Dialect::postgres()).unwrap_err();
        assert!(matches!(
            err,
            QailError::Split(SplitError::DiscriminatorConflict { .. })
        ));
    }

    #[test]
    fn test_update_split_child_first() {
        let stmt = update(&dog())
            .set("breed", lit("pug"))
            .set("name", lit("rex"))
            .where_(col("id").eq(lit(7)))
            .as_update()
            .unwrap();
        let p = pair(compile(&stmt, &Dialect::postgres()).unwrap());
        let keys = "SELECT dog.id FROM dog INNER JOIN animal AS dog_p ON dog_p.id = dog.id \
                    WHERE dog.id = 7 AND dog_p.kind = 'dog' AND dog_p.alive = TRUE";
        assert_eq!(
            p.first.sql,
            format!("UPDATE dog SET breed = 'pug' WHERE dog.id IN ({})", keys)
        );
        assert_eq!(
            p.second.sql,
            format!("UPDATE animal AS dog_p SET name = 'rex' WHERE dog_p.id IN ({})", keys)
        );
        assert_eq!(p.linkage, Linkage::RowCountEcho);
    }

    #[test]
    fn test_update_joined_on_mysql() {
        let stmt = update(&dog())
            .alias("d")
            .set("breed", lit("pug"))
            .set("name", lit("rex"))
            .where_(col("id").eq(lit(7)))
            .visible(Visible::Both)
            .as_update()
            .unwrap();
        let compiled = compile(&stmt, &Dialect::mysql(MySqlVersion::V80)).unwrap();
        assert_eq!(
            compiled.single().unwrap().sql,
            "UPDATE dog AS d INNER JOIN animal AS d_p ON d_p.id = d.id \
             SET d.breed = 'pug', d_p.name = 'rex' WHERE d.id = 7 AND d_p.kind = 'dog'"
        );
    }

    #[test]
    fn test_filter_on_assigned_column_is_unstable() {
        let stmt = update(&dog())
            .set("breed", lit("pug"))
            .set("name", lit("rex"))
            .where_(col("breed").eq(lit("lab")))
            .as_update()
            .unwrap();
        let err = compile(&stmt, &Dialect::postgres()).unwrap_err();
        assert_eq!(
            err,
            QailError::Split(SplitError::UnstableFilter {
                first: "dog".to_string(),
                second: "animal".to_string(),
                column: "breed".to_string(),
            })
        );
    }

    #[test]
    fn test_bound_filter_shared_by_both_updates() {
        let stmt = update(&dog())
            .set("breed", lit("pug"))
            .set("name", lit("rex"))
            .where_(col("name").eq("old"))
            .as_update()
            .unwrap();
        let err = compile(&stmt, &Dialect::postgres()).unwrap_err();
        assert_eq!(
            err,
            QailError::Split(SplitError::SharedColumn("name".to_string()))
        );

        let stmt = update(&dog())
            .set("breed", lit("pug"))
            .set("name", lit("rex"))
            .where_(col("name").eq(lit("old")))
            .as_update()
            .unwrap();
        let p = pair(compile(&stmt, &Dialect::postgres()).unwrap());
        assert!(p.first.params.is_empty());
        assert!(p.second.params.is_empty());
    }

    #[test]
    fn test_one_sided_update_is_single() {
        let stmt = update(&dog())
            .set("name", lit("rex"))
            .where_(col("breed").eq(lit("lab")))
            .as_update()
            .unwrap();
        let compiled = compile(&stmt, &Dialect::sqlite()).unwrap();
        assert!(compiled.single().is_some());
    }

    #[test]
    fn test_discriminator_assignment_rejected() {
        let stmt = update(&dog()).set("kind", lit("cat")).as_update().unwrap();
        let err = compile(&stmt, &Dialect::postgres()).unwrap_err();
        assert_eq!(
            err,
            QailError::Split(SplitError::DiscriminatorAssignment("kind".to_string()))
        );
    }

    #[test]
    fn test_delete_sweeps_orphaned_parent() {
        let stmt = delete_from(&dog())
            .where_(col("breed").eq(lit("pug")))
            .visible(Visible::Both)
            .as_delete()
            .unwrap();
        let p = pair(compile(&stmt, &Dialect::postgres()).unwrap());
        assert_eq!(
            p.first.sql,
            "DELETE FROM dog WHERE dog.id IN (SELECT dog.id FROM dog INNER JOIN animal AS dog_p \
             ON dog_p.id = dog.id WHERE dog.breed = 'pug' AND dog_p.kind = 'dog')"
        );
        assert_eq!(
            p.second.sql,
            "DELETE FROM animal AS dog_p WHERE dog_p.kind = 'dog' AND NOT EXISTS \
             (SELECT 1 FROM dog WHERE dog.id = dog_p.id)"
        );
    }

    #[test]
    fn test_row_count_echo_mismatch() {
        let stmt = delete_from(&dog()).where_(col("id").eq(lit(1))).as_delete().unwrap();
        let p = pair(compile(&stmt, &Dialect::postgres()).unwrap());
        let two = ExecOutcome {
            affected_rows: 2,
            generated_keys: Vec::new(),
        };
        let one = ExecOutcome {
            affected_rows: 1,
            generated_keys: Vec::new(),
        };
        assert_eq!(
            p.validate(&two, &one).unwrap_err(),
            ConsistencyFault::RowCountMismatch { first: 2, second: 1 }
        );
    }
}

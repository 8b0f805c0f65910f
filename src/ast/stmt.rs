//! Statement AST roots.
//!
//! Statements are produced by the builders in [`crate::builder`] and are
//! immutable afterwards; every column reference inside is resolved.

use std::sync::Arc;

use crate::ast::{
    Expr, FieldMeta, Join, JoinTree, NamedWindow, OrderItem, Predicate, SelectItem, TableMeta,
    TableRef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Update,
    Share,
}

#[derive(Debug, Clone, Default)]
pub struct Select {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Option<JoinTree>,
    pub where_: Option<Predicate>,
    pub group_by: Vec<Expr>,
    pub having: Option<Predicate>,
    pub windows: Vec<NamedWindow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    UnionAll,
}

impl std::fmt::Display for SetOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetOp::Union => write!(f, "UNION"),
            SetOp::UnionAll => write!(f, "UNION ALL"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum QueryBody {
    Select(Box<Select>),
    /// Left-associative chain: `left` may itself be a set operation.
    SetOp {
        left: Box<Query>,
        op: SetOp,
        right: Box<Query>,
    },
}

#[derive(Debug, Clone)]
pub struct Cte {
    pub name: String,
    pub columns: Vec<String>,
    pub query: Query,
}

#[derive(Debug, Clone)]
pub struct With {
    pub recursive: bool,
    pub ctes: Vec<Cte>,
}

/// A complete query expression.
#[derive(Debug, Clone)]
pub struct Query {
    pub with: Option<With>,
    pub body: QueryBody,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub lock: Option<LockMode>,
}

impl Query {
    pub(crate) fn from_body(body: QueryBody) -> Self {
        Self {
            with: None,
            body,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            lock: None,
        }
    }

    /// Column names this query exposes, taken from the leftmost SELECT.
    pub fn output_columns(&self) -> Vec<String> {
        match &self.body {
            QueryBody::Select(s) => s
                .items
                .iter()
                .filter_map(|i| i.output_name().map(str::to_string))
                .collect(),
            QueryBody::SetOp { left, .. } => left.output_columns(),
        }
    }

    /// Number of projected values, unless a `*` makes it unknown here.
    pub(crate) fn projection_width(&self) -> Option<usize> {
        match &self.body {
            QueryBody::Select(s) => {
                if s.items.iter().any(|i| matches!(i.expr, Expr::Star(_))) {
                    return None;
                }
                Some(s.items.len())
            }
            QueryBody::SetOp { left, .. } => left.projection_width(),
        }
    }

    /// Has clauses beyond a bare SELECT body.
    pub(crate) fn has_tail(&self) -> bool {
        self.with.is_some()
            || !self.order_by.is_empty()
            || self.limit.is_some()
            || self.offset.is_some()
            || self.lock.is_some()
    }
}

#[derive(Debug, Clone)]
pub enum InsertSource {
    /// Rows in column-declared order.
    Values(Vec<Vec<Expr>>),
    Query(Box<Query>),
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub table: Arc<TableMeta>,
    pub columns: Vec<Arc<FieldMeta>>,
    pub source: InsertSource,
    pub returning: Vec<Arc<FieldMeta>>,
    /// Compile to one statement text with a parameter group per row.
    pub batch: bool,
}

#[derive(Debug, Clone)]
pub enum Assignment {
    Column {
        target: Arc<FieldMeta>,
        value: Expr,
    },
    /// `(a, b) = (x, y)`
    Row {
        targets: Vec<Arc<FieldMeta>>,
        values: Vec<Expr>,
    },
}

impl Assignment {
    pub fn targets(&self) -> Vec<&Arc<FieldMeta>> {
        match self {
            Assignment::Column { target, .. } => vec![target],
            Assignment::Row { targets, .. } => targets.iter().collect(),
        }
    }
}

/// Soft-delete filtering applied to UPDATE/DELETE of tables with a visible column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visible {
    /// Touch visible rows only.
    #[default]
    Only,
    /// Touch visible and hidden rows.
    Both,
}

#[derive(Debug, Clone)]
pub struct Update {
    pub table: TableRef,
    pub joins: Vec<Join>,
    pub assignments: Vec<Assignment>,
    pub where_: Option<Predicate>,
    pub returning: Vec<Arc<FieldMeta>>,
    pub visible: Visible,
}

impl Update {
    pub fn meta(&self) -> Option<&Arc<TableMeta>> {
        self.table.meta()
    }
}

#[derive(Debug, Clone)]
pub struct Delete {
    pub table: TableRef,
    pub joins: Vec<Join>,
    pub where_: Option<Predicate>,
    pub returning: Vec<Arc<FieldMeta>>,
    pub visible: Visible,
}

impl Delete {
    pub fn meta(&self) -> Option<&Arc<TableMeta>> {
        self.table.meta()
    }
}

/// Finalized statement handed to [`crate::compile`].
#[derive(Debug, Clone)]
pub enum Statement {
    Query(Query),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Query(_) => "SELECT",
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
        }
    }
}

impl From<Query> for Statement {
    fn from(q: Query) -> Self {
        Statement::Query(q)
    }
}

impl From<Insert> for Statement {
    fn from(i: Insert) -> Self {
        Statement::Insert(i)
    }
}

impl From<Update> for Statement {
    fn from(u: Update) -> Self {
        Statement::Update(u)
    }
}

impl From<Delete> for Statement {
    fn from(d: Delete) -> Self {
        Statement::Delete(d)
    }
}

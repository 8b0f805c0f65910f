//! Table references and join trees.

use std::sync::Arc;

use crate::ast::{ColumnRef, Expr, Predicate, Query, TableMeta};

#[derive(Debug, Clone)]
pub enum TableSource {
    Table(Arc<TableMeta>),
    /// Reference to a CTE; columns are filled in when the CTE is looked up.
    Cte { name: String, columns: Vec<String> },
    /// Derived table `(SELECT ...) AS alias`.
    Derived(Box<Query>),
}

/// A table in FROM/JOIN position.
#[derive(Debug, Clone)]
pub struct TableRef {
    pub source: TableSource,
    pub alias: Option<String>,
    /// `ONLY t`: exclude rows of inheriting tables.
    pub only: bool,
    /// Render the bare physical table of a child, without its parent join.
    pub(crate) physical: bool,
}

impl TableRef {
    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn only(mut self) -> Self {
        self.only = true;
        self
    }

    /// Name the table is visible under in its scope.
    pub fn scope_name(&self) -> Option<&str> {
        if let Some(a) = &self.alias {
            return Some(a);
        }
        match &self.source {
            TableSource::Table(meta) => Some(meta.name()),
            TableSource::Cte { name, .. } => Some(name),
            TableSource::Derived(_) => None,
        }
    }

    /// Column of this table, qualified with its scope name.
    pub fn col(&self, name: &str) -> Expr {
        Expr::Column(ColumnRef {
            qualifier: self.scope_name().map(str::to_string),
            name: name.to_string(),
            binding: None,
        })
    }

    pub fn meta(&self) -> Option<&Arc<TableMeta>> {
        match &self.source {
            TableSource::Table(meta) => Some(meta),
            _ => None,
        }
    }
}

/// Reference a mapped table.
pub fn table(meta: &Arc<TableMeta>) -> TableRef {
    TableRef {
        source: TableSource::Table(Arc::clone(meta)),
        alias: None,
        only: false,
        physical: false,
    }
}

/// Physical table under `alias`, never joined to its parent.
pub(crate) fn physical(meta: &Arc<TableMeta>, alias: &str) -> TableRef {
    TableRef {
        source: TableSource::Table(Arc::clone(meta)),
        alias: (alias != meta.name()).then(|| alias.to_string()),
        only: false,
        physical: true,
    }
}

/// Reference a CTE declared in an enclosing WITH.
pub fn cte(name: &str) -> TableRef {
    TableRef {
        source: TableSource::Cte {
            name: name.to_string(),
            columns: Vec::new(),
        },
        alias: None,
        only: false,
        physical: false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl std::fmt::Display for JoinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "INNER JOIN"),
            JoinKind::Left => write!(f, "LEFT JOIN"),
            JoinKind::Right => write!(f, "RIGHT JOIN"),
            JoinKind::Full => write!(f, "FULL JOIN"),
            JoinKind::Cross => write!(f, "CROSS JOIN"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum JoinCondition {
    On(Predicate),
    Using(Vec<String>),
    None,
}

#[derive(Debug, Clone)]
pub enum TableItem {
    Table(TableRef),
    /// Parenthesized join group.
    Group(Box<JoinTree>),
}

impl TableItem {
    pub fn tables(&self) -> Vec<&TableRef> {
        match self {
            TableItem::Table(t) => vec![t],
            TableItem::Group(tree) => tree.tables(),
        }
    }

    pub(crate) fn tables_mut(&mut self) -> Vec<&mut TableRef> {
        match self {
            TableItem::Table(t) => vec![t],
            TableItem::Group(tree) => tree.tables_mut(),
        }
    }
}

impl From<TableRef> for TableItem {
    fn from(t: TableRef) -> Self {
        TableItem::Table(t)
    }
}

impl From<JoinTree> for TableItem {
    fn from(tree: JoinTree) -> Self {
        TableItem::Group(Box::new(tree))
    }
}

#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub item: TableItem,
    pub condition: JoinCondition,
}

/// `first [JOIN item ON ...]*`
#[derive(Debug, Clone)]
pub struct JoinTree {
    pub first: TableItem,
    pub joins: Vec<Join>,
}

impl JoinTree {
    /// Start a parenthesized join group.
    pub fn group(first: impl Into<TableItem>) -> Self {
        Self {
            first: first.into(),
            joins: Vec::new(),
        }
    }

    pub fn join(mut self, kind: JoinKind, item: impl Into<TableItem>, on: Predicate) -> Self {
        self.joins.push(Join {
            kind,
            item: item.into(),
            condition: JoinCondition::On(on),
        });
        self
    }

    pub fn join_using(mut self, kind: JoinKind, item: impl Into<TableItem>, columns: &[&str]) -> Self {
        self.joins.push(Join {
            kind,
            item: item.into(),
            condition: JoinCondition::Using(columns.iter().map(|c| c.to_string()).collect()),
        });
        self
    }

    pub fn cross_join(mut self, item: impl Into<TableItem>) -> Self {
        self.joins.push(Join {
            kind: JoinKind::Cross,
            item: item.into(),
            condition: JoinCondition::None,
        });
        self
    }

    /// Every table in the tree, left to right.
    pub fn tables(&self) -> Vec<&TableRef> {
        let mut out = self.first.tables();
        for j in &self.joins {
            out.extend(j.item.tables());
        }
        out
    }

    pub(crate) fn tables_mut(&mut self) -> Vec<&mut TableRef> {
        let mut out = self.first.tables_mut();
        for j in self.joins.iter_mut() {
            out.extend(j.item.tables_mut());
        }
        out
    }
}

//! Dialect-aware rendering of finalized statements.
//!
//! Rendering is a pure function of the statement and the [`Dialect`]: the
//! same inputs always produce byte-identical SQL and an identical parameter
//! list. Statements on inherited tables are handed to [`crate::split`].

pub(crate) mod dml;
mod expr;
mod ident;
mod literal;
mod select;

use serde::Serialize;
use tracing::debug;

use crate::ast::{InsertSource, SqlType, Statement, Typed, Value};
use crate::dialect::Dialect;
use crate::error::{QailResult, RenderError};
use crate::split::{self, PairStmt};

pub use ident::{check_function_name, quote_ident};
pub use literal::{coerce, write_literal};

/// A parameter value in the form it is handed to the driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindValue {
    pub value: Value,
    pub sql_type: SqlType,
    /// Column the value is bound to, when known.
    pub column: Option<String>,
}

/// Facts about a rendered statement the executor needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StmtFlags {
    /// WHERE tests the version column; zero affected rows means a stale write.
    pub has_optimistic_lock: bool,
    /// Columns the statement returns.
    pub returning: Vec<String>,
    /// INSERT with more than one VALUES row.
    pub multi_row: bool,
}

/// One SQL text with its ordered parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stmt {
    pub sql: String,
    pub params: Vec<BindValue>,
    pub flags: StmtFlags,
    /// Columns written by an INSERT or UPDATE.
    pub columns: Vec<String>,
}

impl Stmt {
    pub fn param_values(&self) -> Vec<&Value> {
        self.params.iter().map(|p| &p.value).collect()
    }
}

/// One SQL text executed once per parameter group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchStmt {
    pub sql: String,
    pub groups: Vec<Vec<BindValue>>,
    pub flags: StmtFlags,
}

/// Output of [`compile`].
#[derive(Debug, Clone, PartialEq)]
pub enum Compiled {
    Single(Stmt),
    Batch(BatchStmt),
    /// Two physical statements for an inherited table.
    Pair(PairStmt),
}

impl Compiled {
    pub fn single(&self) -> Option<&Stmt> {
        match self {
            Compiled::Single(s) => Some(s),
            _ => None,
        }
    }

    pub fn batch(&self) -> Option<&BatchStmt> {
        match self {
            Compiled::Batch(b) => Some(b),
            _ => None,
        }
    }

    pub fn pair(&self) -> Option<&PairStmt> {
        match self {
            Compiled::Pair(p) => Some(p),
            _ => None,
        }
    }

    /// Parameters bound across every statement and group.
    pub fn param_count(&self) -> usize {
        match self {
            Compiled::Single(s) => s.params.len(),
            Compiled::Batch(b) => b.groups.iter().map(Vec::len).sum(),
            Compiled::Pair(p) => p.first.params.len() + p.second.params.len(),
        }
    }

    pub fn into_single(self) -> Option<Stmt> {
        match self {
            Compiled::Single(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_pair(self) -> Option<PairStmt> {
        match self {
            Compiled::Pair(p) => Some(p),
            _ => None,
        }
    }
}

/// Render a finalized statement for `dialect`.
pub fn compile(stmt: &Statement, dialect: &Dialect) -> QailResult<Compiled> {
    let compiled = match stmt {
        Statement::Query(q) => {
            let mut w = Writer::new(dialect);
            w.query(q)?;
            Compiled::Single(w.finish(StmtFlags::default(), Vec::new()))
        }
        Statement::Insert(ins) if ins.table.is_inherited() => {
            Compiled::Pair(split::split_insert(ins, dialect)?)
        }
        Statement::Insert(ins) if ins.batch => Compiled::Batch(batch_insert(ins, dialect)?),
        Statement::Insert(ins) => {
            let mut w = Writer::new(dialect);
            w.insert(ins)?;
            let flags = dml::insert_flags(ins);
            let columns = ins.columns.iter().map(|c| c.name.clone()).collect();
            Compiled::Single(w.finish(flags, columns))
        }
        Statement::Update(u) if u.meta().is_some_and(|m| m.is_inherited()) => {
            split::split_update(u, dialect)?
        }
        Statement::Update(u) => Compiled::Single(render_update(u, dialect)?),
        Statement::Delete(d) if d.meta().is_some_and(|m| m.is_inherited()) => {
            split::split_delete(d, dialect)?
        }
        Statement::Delete(d) => Compiled::Single(render_delete(d, dialect)?),
    };
    debug!(
        kind = stmt.kind(),
        dialect = dialect.name,
        params = compiled.param_count(),
        "compiled statement"
    );
    Ok(compiled)
}

pub(crate) fn render_update(u: &crate::ast::Update, dialect: &Dialect) -> Result<Stmt, RenderError> {
    let mut w = Writer::new(dialect);
    let flags = w.update(u)?;
    let columns = u
        .assignments
        .iter()
        .flat_map(|a| a.targets())
        .map(|f| f.name.clone())
        .collect();
    Ok(w.finish(flags, columns))
}

pub(crate) fn render_delete(d: &crate::ast::Delete, dialect: &Dialect) -> Result<Stmt, RenderError> {
    let mut w = Writer::new(dialect);
    let flags = w.delete(d)?;
    Ok(w.finish(flags, Vec::new()))
}

/// Every row renders separately; they must agree on the SQL text.
fn batch_insert(ins: &crate::ast::Insert, dialect: &Dialect) -> Result<BatchStmt, RenderError> {
    let InsertSource::Values(rows) = &ins.source else {
        return Err(RenderError::UnsupportedValue(
            "batch INSERT needs VALUES rows".to_string(),
        ));
    };
    let mut sql: Option<String> = None;
    let mut groups = Vec::with_capacity(rows.len());
    for row in rows {
        let single = crate::ast::Insert {
            source: InsertSource::Values(vec![row.clone()]),
            batch: false,
            ..ins.clone()
        };
        let mut w = Writer::new(dialect);
        w.insert(&single)?;
        match &sql {
            Some(first) if *first != w.sql => {
                return Err(RenderError::UnsupportedValue(
                    "batch rows render different SQL; use parameters instead of literals"
                        .to_string(),
                ));
            }
            Some(_) => {}
            None => sql = Some(w.sql.clone()),
        }
        groups.push(w.params);
    }
    let mut flags = dml::insert_flags(ins);
    flags.multi_row = false;
    Ok(BatchStmt {
        sql: sql.unwrap_or_default(),
        groups,
        flags,
    })
}

/// Accumulates SQL text and bound parameters for one statement.
pub(crate) struct Writer<'d> {
    pub(crate) dialect: &'d Dialect,
    pub(crate) sql: String,
    pub(crate) params: Vec<BindValue>,
}

impl<'d> Writer<'d> {
    pub(crate) fn new(dialect: &'d Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    pub(crate) fn ident(&mut self, name: &str) -> Result<(), RenderError> {
        let quoted = quote_ident(self.dialect, name)?;
        self.sql.push_str(&quoted);
        Ok(())
    }

    pub(crate) fn unsupported(&self, feature: &'static str) -> RenderError {
        RenderError::Unsupported {
            feature,
            dialect: self.dialect.name,
        }
    }

    /// Write a value through its codec, inlined or behind a placeholder.
    pub(crate) fn typed(&mut self, t: &Typed, inline: bool) -> Result<(), RenderError> {
        let (value, ty) = match &t.mapping {
            Some(mapping) => (mapping.before_bind(t.value.clone())?, mapping.sql_type()),
            None => (t.value.clone(), t.value.natural_type()),
        };
        let value = coerce(value, ty, self.dialect)?;
        if inline && !literal::must_bind(&value, ty, self.dialect) {
            return write_literal(&mut self.sql, &value, ty, self.dialect);
        }
        self.bind(value, ty, t.column.clone());
        Ok(())
    }

    pub(crate) fn bind(&mut self, value: Value, sql_type: SqlType, column: Option<String>) {
        let placeholder = self.dialect.placeholder(self.params.len() + 1);
        self.sql.push_str(&placeholder);
        self.params.push(BindValue {
            value,
            sql_type,
            column,
        });
    }

    pub(crate) fn finish(self, flags: StmtFlags, columns: Vec<String>) -> Stmt {
        Stmt {
            sql: self.sql,
            params: self.params,
            flags,
            columns,
        }
    }
}

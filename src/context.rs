//! Criteria context stack: scope and alias bookkeeping during construction.
//!
//! The stack is an explicit value. A statement builder either owns one or
//! borrows the caller's, pushes a frame on entry and pops it (plus any frame
//! pushed by nested builders) when it is finalized, dropped, or fails.

use std::sync::Arc;

use tracing::trace;

use crate::ast::{Binding, FieldMeta, TableMeta, TableRef, TableSource};
use crate::dialect::{Capabilities, Dialect};
use crate::error::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

#[derive(Debug, Clone)]
pub(crate) enum Columns {
    Meta(Arc<TableMeta>),
    Names(Vec<String>),
}

/// A table visible in a scope.
#[derive(Debug, Clone)]
pub struct ScopedTable {
    pub(crate) name: String,
    pub(crate) columns: Columns,
    pub(crate) explicit_alias: bool,
}

impl ScopedTable {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Physical parent of an inherited table in this scope.
    fn parent_qualifier(&self) -> String {
        format!("{}_p", self.name)
    }

    fn is_inherited(&self) -> bool {
        matches!(&self.columns, Columns::Meta(m) if m.is_inherited())
    }
}

#[derive(Debug, Clone)]
pub struct CteEntry {
    pub name: String,
    pub columns: Vec<String>,
    pub recursive: bool,
}

/// One scope: a statement, subquery or WITH clause.
#[derive(Debug)]
pub struct Frame {
    id: ScopeId,
    /// Enclosing scope for correlated subqueries; lookup only.
    outer: Option<ScopeId>,
    tables: Vec<ScopedTable>,
    ctes: Vec<CteEntry>,
    windows: Vec<String>,
}

impl Frame {
    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn is_correlated(&self) -> bool {
        self.outer.is_some()
    }

    pub fn outer(&self) -> Option<ScopeId> {
        self.outer
    }

    pub fn tables(&self) -> &[ScopedTable] {
        &self.tables
    }

    fn table(&self, name: &str) -> Option<&ScopedTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// True when `name` is a table alias here, or the parent alias an
    /// inherited table renders with. `skip` names an entry to ignore.
    fn is_taken(&self, name: &str, skip: Option<&str>) -> bool {
        self.tables
            .iter()
            .filter(|t| Some(t.name.as_str()) != skip)
            .any(|t| t.name == name || (t.is_inherited() && t.parent_qualifier() == name))
    }
}

/// Push/pop counters; balanced once every builder has returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackStats {
    pub pushes: usize,
    pub pops: usize,
    pub depth: usize,
}

#[derive(Debug)]
pub struct ContextStack {
    frames: Vec<Frame>,
    capabilities: Capabilities,
    next_id: u32,
    pushes: usize,
    pops: usize,
}

impl Default for ContextStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStack {
    /// Stack with every clause enabled; the renderer still rejects clauses
    /// the target dialect lacks.
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::all())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            frames: Vec::new(),
            capabilities,
            next_id: 0,
            pushes: 0,
            pops: 0,
        }
    }

    /// Stack that rejects clauses `dialect` cannot express at build time.
    pub fn for_dialect(dialect: &Dialect) -> Self {
        Self::with_capabilities(dialect.capabilities())
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn push(&mut self, outer: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.next_id);
        self.next_id += 1;
        self.pushes += 1;
        self.frames.push(Frame {
            id,
            outer,
            tables: Vec::new(),
            ctes: Vec::new(),
            windows: Vec::new(),
        });
        trace!(scope = id.0, depth = self.frames.len(), "context push");
        id
    }

    pub fn pop(&mut self) -> Option<Frame> {
        let frame = self.frames.pop()?;
        self.pops += 1;
        trace!(scope = frame.id.0, depth = self.frames.len(), "context pop");
        Some(frame)
    }

    /// Pop frames until `depth` remain.
    pub fn unwind_to(&mut self, depth: usize) {
        while self.frames.len() > depth {
            self.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn stats(&self) -> StackStats {
        StackStats {
            pushes: self.pushes,
            pops: self.pops,
            depth: self.frames.len(),
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.pushes == self.pops && self.frames.is_empty()
    }

    pub fn current(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn current_id(&self) -> Option<ScopeId> {
        self.frames.last().map(|f| f.id)
    }

    fn current_mut(&mut self) -> Result<&mut Frame, BuildError> {
        self.frames
            .last_mut()
            .ok_or_else(|| BuildError::UnresolvedAlias("<no active scope>".to_string()))
    }

    fn frame(&self, id: ScopeId) -> Option<&Frame> {
        self.frames.iter().rev().find(|f| f.id == id)
    }

    /// Register a FROM/JOIN table in the current scope.
    pub fn register_alias(&mut self, table: &TableRef) -> Result<(), BuildError> {
        let name = table
            .scope_name()
            .ok_or_else(|| BuildError::UnresolvedAlias("<derived table without alias>".to_string()))?
            .to_string();
        let columns = match &table.source {
            TableSource::Table(meta) => Columns::Meta(Arc::clone(meta)),
            TableSource::Cte { columns, .. } => Columns::Names(columns.clone()),
            TableSource::Derived(q) => Columns::Names(q.output_columns()),
        };
        let entry = ScopedTable {
            name,
            columns,
            explicit_alias: table.alias.is_some(),
        };
        let frame = self.current_mut()?;
        if frame.is_taken(&entry.name, None) {
            return Err(BuildError::DuplicateAlias(entry.name));
        }
        if entry.is_inherited() && frame.is_taken(&entry.parent_qualifier(), None) {
            return Err(BuildError::DuplicateAlias(entry.parent_qualifier()));
        }
        frame.tables.push(entry);
        Ok(())
    }

    /// Rename a table already registered in the current scope.
    pub fn rename_alias(&mut self, old: &str, new: &str) -> Result<(), BuildError> {
        let frame = self.current_mut()?;
        if frame.is_taken(new, Some(old)) {
            return Err(BuildError::DuplicateAlias(new.to_string()));
        }
        let inherited = frame.table(old).is_some_and(|t| t.is_inherited());
        let parent = format!("{}_p", new);
        if inherited && frame.is_taken(&parent, Some(old)) {
            return Err(BuildError::DuplicateAlias(parent));
        }
        let entry = frame
            .tables
            .iter_mut()
            .find(|t| t.name == old)
            .ok_or_else(|| BuildError::UnresolvedAlias(old.to_string()))?;
        entry.name = new.to_string();
        entry.explicit_alias = true;
        Ok(())
    }

    /// Find a table alias in the current scope, then, for correlated scopes,
    /// in the enclosing ones. The flag is true for an enclosing-scope match.
    pub fn resolve(&self, alias: &str) -> Option<(&ScopedTable, bool)> {
        let mut frame = self.frames.last()?;
        let mut outer = false;
        loop {
            if let Some(t) = frame.table(alias) {
                return Some((t, outer));
            }
            frame = self.frame(frame.outer?)?;
            outer = true;
        }
    }

    pub fn register_cte(&mut self, name: &str, columns: Vec<String>, recursive: bool) -> Result<(), BuildError> {
        if !self.capabilities.cte {
            return Err(BuildError::Unsupported { feature: "WITH" });
        }
        if recursive && !self.capabilities.recursive_cte {
            return Err(BuildError::Unsupported {
                feature: "WITH RECURSIVE",
            });
        }
        let frame = self.current_mut()?;
        if frame.ctes.iter().any(|c| c.name == name) {
            return Err(BuildError::DuplicateCte(name.to_string()));
        }
        frame.ctes.push(CteEntry {
            name: name.to_string(),
            columns,
            recursive,
        });
        Ok(())
    }

    /// Innermost CTE named `name`.
    pub fn lookup_cte(&self, name: &str) -> Option<&CteEntry> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.ctes.iter().find(|c| c.name == name))
    }

    pub fn register_window(&mut self, name: &str) -> Result<(), BuildError> {
        if !self.capabilities.window {
            return Err(BuildError::Unsupported { feature: "WINDOW" });
        }
        let frame = self.current_mut()?;
        if frame.windows.iter().any(|w| w == name) {
            return Err(BuildError::DuplicateWindow(name.to_string()));
        }
        frame.windows.push(name.to_string());
        Ok(())
    }

    pub fn has_window(&self, name: &str) -> bool {
        self.current()
            .is_some_and(|f| f.windows.iter().any(|w| w == name))
    }

    /// Resolve a column reference from the current scope.
    ///
    /// Returns `Ok(None)` when nothing visible matches; the caller decides
    /// whether that is an error or a reference deferred to an enclosing
    /// statement. `nested` marks references written inside a subquery, which
    /// are always qualified.
    pub fn resolve_column(
        &self,
        qualifier: Option<&str>,
        name: &str,
        nested: bool,
    ) -> Result<Option<Binding>, BuildError> {
        let Some(mut frame) = self.frames.last() else {
            return Ok(None);
        };
        let mut outer = nested;
        loop {
            if let Some(binding) = resolve_in_frame(frame, qualifier, name, outer)? {
                return Ok(Some(binding));
            }
            match frame.outer.and_then(|id| self.frame(id)) {
                Some(next) => {
                    frame = next;
                    outer = true;
                }
                None => return Ok(None),
            }
        }
    }
}

fn lookup(table: &ScopedTable, name: &str) -> Option<Option<Arc<FieldMeta>>> {
    match &table.columns {
        Columns::Meta(meta) => meta.resolve_field(name).map(Some),
        Columns::Names(names) => names.iter().any(|n| n == name).then_some(None),
    }
}

fn bind(
    frame: &Frame,
    table: &ScopedTable,
    field: Option<Arc<FieldMeta>>,
    explicit: bool,
    outer: bool,
) -> Binding {
    let qualify = explicit
        || outer
        || frame.tables.len() > 1
        || table.explicit_alias
        || table.is_inherited();
    let qualifier = qualify.then(|| match (&table.columns, &field) {
        (Columns::Meta(meta), Some(f)) if meta.is_inherited() && f.table != meta.name() => {
            table.parent_qualifier()
        }
        _ => table.name.clone(),
    });
    Binding {
        qualifier,
        field,
        outer,
    }
}

fn resolve_in_frame(
    frame: &Frame,
    qualifier: Option<&str>,
    name: &str,
    outer: bool,
) -> Result<Option<Binding>, BuildError> {
    if let Some(q) = qualifier {
        let Some(table) = frame.table(q) else {
            return Ok(None);
        };
        return match lookup(table, name) {
            Some(field) => Ok(Some(bind(frame, table, field, true, outer))),
            None => Err(BuildError::UnknownColumn {
                table: q.to_string(),
                column: name.to_string(),
            }),
        };
    }
    let mut found = frame
        .tables
        .iter()
        .filter_map(|t| lookup(t, name).map(|f| (t, f)));
    let Some((table, field)) = found.next() else {
        return Ok(None);
    };
    let rest: Vec<String> = found.map(|(t, _)| t.name.clone()).collect();
    if !rest.is_empty() {
        let mut candidates = vec![table.name.clone()];
        candidates.extend(rest);
        return Err(BuildError::AmbiguousColumn {
            column: name.to_string(),
            candidates,
        });
    }
    Ok(Some(bind(frame, table, field, false, outer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{table, SqlType};

    fn users() -> Arc<TableMeta> {
        TableMeta::builder("users")
            .primary_key("id", SqlType::BigInt)
            .field("name", SqlType::Text)
            .build()
            .unwrap()
    }

    #[test]
    fn test_duplicate_alias_same_scope() {
        let mut stack = ContextStack::new();
        stack.push(None);
        stack.register_alias(&table(&users()).alias("u")).unwrap();
        let err = stack.register_alias(&table(&users()).alias("u")).unwrap_err();
        assert_eq!(err, BuildError::DuplicateAlias("u".to_string()));
    }

    fn dog() -> Arc<TableMeta> {
        let animal = TableMeta::builder("animal")
            .generated_key("id", SqlType::BigInt)
            .discriminator("kind", SqlType::Varchar(8), ["dog"])
            .build()
            .unwrap();
        TableMeta::builder("dog")
            .primary_key("id", SqlType::BigInt)
            .extends(&animal, "dog")
            .build()
            .unwrap()
    }

    #[test]
    fn test_parent_alias_is_reserved() {
        let mut stack = ContextStack::new();
        stack.push(None);
        stack.register_alias(&table(&dog()).alias("d")).unwrap();
        let err = stack.register_alias(&table(&users()).alias("d_p")).unwrap_err();
        assert_eq!(err, BuildError::DuplicateAlias("d_p".to_string()));

        stack.unwind_to(0);
        stack.push(None);
        stack.register_alias(&table(&users()).alias("d_p")).unwrap();
        let err = stack.register_alias(&table(&dog()).alias("d")).unwrap_err();
        assert_eq!(err, BuildError::DuplicateAlias("d_p".to_string()));
        stack.unwind_to(0);
        assert!(stack.is_balanced());
    }

    #[test]
    fn test_same_alias_in_nested_scope() {
        let mut stack = ContextStack::new();
        let outer = stack.push(None);
        stack.register_alias(&table(&users()).alias("u")).unwrap();
        stack.push(Some(outer));
        assert!(stack.register_alias(&table(&users()).alias("u")).is_ok());
        stack.unwind_to(0);
        assert!(stack.is_balanced());
    }

    #[test]
    fn test_resolve_walks_only_correlated_scopes() {
        let mut stack = ContextStack::new();
        let outer = stack.push(None);
        stack.register_alias(&table(&users()).alias("u")).unwrap();

        stack.push(None);
        assert!(stack.resolve("u").is_none());
        stack.pop();

        stack.push(Some(outer));
        let (t, is_outer) = stack.resolve("u").unwrap();
        assert_eq!(t.name(), "u");
        assert!(is_outer);
    }

    #[test]
    fn test_cte_disallowed_by_profile() {
        let mut stack = ContextStack::for_dialect(&Dialect::sql92());
        stack.push(None);
        let err = stack.register_cte("t", vec![], false).unwrap_err();
        assert_eq!(err, BuildError::Unsupported { feature: "WITH" });
    }

    #[test]
    fn test_ambiguous_column() {
        let mut stack = ContextStack::new();
        stack.push(None);
        stack.register_alias(&table(&users()).alias("a")).unwrap();
        stack.register_alias(&table(&users()).alias("b")).unwrap();
        let err = stack.resolve_column(None, "name", false).unwrap_err();
        assert!(matches!(err, BuildError::AmbiguousColumn { .. }));
        let b = stack.resolve_column(Some("b"), "name", false).unwrap().unwrap();
        assert_eq!(b.qualifier.as_deref(), Some("b"));
    }
}

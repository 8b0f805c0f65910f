//! WITH clause builder.

use crate::ast::{Cte, Query, QueryBody, SelectItem, With};
use crate::builder::{Projection, Scope, SelectBuilder, SubqueryStart};
use crate::context::{ContextStack, ScopeId};
use crate::error::BuildError;

/// Start a WITH clause on a private context stack.
pub fn with() -> WithBuilder<'static> {
    WithBuilder::start(Scope::owned(ContextStack::new()), None)
}

impl ContextStack {
    /// Start a WITH clause on this stack.
    pub fn with(&mut self) -> WithBuilder<'_> {
        WithBuilder::start(Scope::borrowed(self), None)
    }
}

/// Collects CTEs, then hands over to the main SELECT.
///
/// CTEs are registered in a frame of their own, so every later CTE and the
/// main query can reference them by name.
pub struct WithBuilder<'s> {
    scope: Scope<'s>,
    link: Option<ScopeId>,
    ctes: Vec<Cte>,
    recursive: bool,
}

impl<'s> WithBuilder<'s> {
    pub(crate) fn start(mut scope: Scope<'s>, link: Option<ScopeId>) -> Self {
        scope.stack_mut().push(link);
        Self {
            scope,
            link,
            ctes: Vec::new(),
            recursive: false,
        }
    }

    /// `name [(columns)] AS (query)`. Without declared columns the CTE
    /// exposes the query's output names.
    pub fn cte<F>(mut self, name: &str, columns: &[&str], f: F) -> Self
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        let cte_supported = self.scope.stack().capabilities().cte;
        self.scope
            .require(cte_supported, || BuildError::Unsupported { feature: "WITH" });
        let Some(query) = self.scope.subquery(f) else {
            return self;
        };
        let declared: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let visible = if declared.is_empty() {
            query.output_columns()
        } else {
            declared.clone()
        };
        if self
            .scope
            .attempt(|stack| stack.register_cte(name, visible, false))
            .is_some()
        {
            self.ctes.push(Cte {
                name: name.to_string(),
                columns: declared,
                query,
            });
        }
        self
    }

    /// `RECURSIVE name (columns) AS (anchor UNION [ALL] step)`.
    ///
    /// The name is registered before the body is built so the recursive
    /// branch can select from it.
    pub fn recursive_cte<F>(mut self, name: &str, columns: &[&str], f: F) -> Self
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        self.scope.require(!columns.is_empty(), || {
            BuildError::InvalidRecursiveCte(name.to_string())
        });
        let declared: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        if self
            .scope
            .attempt(|stack| stack.register_cte(name, declared.clone(), true))
            .is_none()
        {
            return self;
        }
        let Some(query) = self.scope.subquery(f) else {
            return self;
        };
        let is_set_op = matches!(query.body, QueryBody::SetOp { .. });
        self.scope
            .require(is_set_op, || BuildError::InvalidRecursiveCte(name.to_string()));
        self.recursive = true;
        self.ctes.push(Cte {
            name: name.to_string(),
            columns: declared,
            query,
        });
        self
    }

    fn take_with(&mut self) -> Option<With> {
        (!self.ctes.is_empty()).then(|| With {
            recursive: self.recursive,
            ctes: std::mem::take(&mut self.ctes),
        })
    }

    /// The main query.
    pub fn select<I, S>(mut self, items: I) -> SelectBuilder<'s, Projection>
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        let with = self.take_with();
        SelectBuilder::start(self.scope, self.link, with, false, items)
    }

    pub fn select_distinct<I, S>(mut self, items: I) -> SelectBuilder<'s, Projection>
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        let with = self.take_with();
        SelectBuilder::start(self.scope, self.link, with, true, items)
    }
}

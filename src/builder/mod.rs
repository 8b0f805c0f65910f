//! Grammar-position statement builders.
//!
//! Each builder owns or borrows a [`ContextStack`], pushes its frame on entry
//! and holds a [`Scope`] guard that pops every frame it (or a nested builder)
//! pushed, whether the builder is finalized, dropped, or fails.
//!
//! Semantic errors are recorded when they happen: the frames are unwound back
//! to the statement entry point immediately, later calls become no-ops, and
//! finalization returns the first error.

mod case;
mod cte;
mod dml;
mod position;
mod resolve;
mod select;
mod set_op;

use std::ops::{Deref, DerefMut};

use tracing::debug;

use crate::ast::Query;
use crate::context::{ContextStack, ScopeId};
use crate::error::BuildError;

pub use case::{case, case_on, CaseBuilder, Closed, DynamicCase, HasArm, NeedThen, NeedWhen};
pub use cte::{with, WithBuilder};
pub use dml::{delete_from, insert_into, update, DeleteBuilder, InsertBuilder, UpdateBuilder};
pub use position::*;
pub use select::{select, select_distinct, DynamicJoins, DynamicWhere, JoinOn, SelectBuilder};
pub use set_op::UnionBuilder;

pub(crate) use resolve::Resolver;

pub(crate) enum StackHandle<'s> {
    Owned(ContextStack),
    Borrowed(&'s mut ContextStack),
}

impl Deref for StackHandle<'_> {
    type Target = ContextStack;

    fn deref(&self) -> &ContextStack {
        match self {
            StackHandle::Owned(s) => s,
            StackHandle::Borrowed(s) => s,
        }
    }
}

impl DerefMut for StackHandle<'_> {
    fn deref_mut(&mut self) -> &mut ContextStack {
        match self {
            StackHandle::Owned(s) => s,
            StackHandle::Borrowed(s) => s,
        }
    }
}

/// Frames pushed since a statement's entry point, released on drop.
pub(crate) struct Scope<'s> {
    stack: StackHandle<'s>,
    entry_depth: usize,
    error: Option<BuildError>,
}

impl<'s> Scope<'s> {
    pub(crate) fn owned(stack: ContextStack) -> Self {
        let entry_depth = stack.depth();
        Self {
            stack: StackHandle::Owned(stack),
            entry_depth,
            error: None,
        }
    }

    pub(crate) fn borrowed(stack: &'s mut ContextStack) -> Self {
        let entry_depth = stack.depth();
        Self {
            stack: StackHandle::Borrowed(stack),
            entry_depth,
            error: None,
        }
    }

    pub(crate) fn stack(&self) -> &ContextStack {
        &self.stack
    }

    pub(crate) fn stack_mut(&mut self) -> &mut ContextStack {
        &mut self.stack
    }

    pub(crate) fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Record the first error and release every frame of this statement.
    pub(crate) fn fail(&mut self, err: BuildError) {
        if self.error.is_some() {
            return;
        }
        debug!(error = %err, depth = self.entry_depth, "build error, unwinding context");
        self.stack.unwind_to(self.entry_depth);
        self.error = Some(err);
    }

    /// Run `f` unless an error is already recorded.
    pub(crate) fn attempt<T>(
        &mut self,
        f: impl FnOnce(&mut ContextStack) -> Result<T, BuildError>,
    ) -> Option<T> {
        if self.error.is_some() {
            return None;
        }
        match f(&mut *self.stack) {
            Ok(v) => Some(v),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    /// Check a build-time condition.
    pub(crate) fn require(&mut self, ok: bool, err: impl FnOnce() -> BuildError) {
        if !ok {
            self.fail(err());
        }
    }

    /// Final step of a builder: the recorded error, or the result of `f`.
    pub(crate) fn finish<T>(
        &mut self,
        f: impl FnOnce(&mut ContextStack) -> Result<T, BuildError>,
    ) -> Result<T, BuildError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let result = f(&mut *self.stack);
        if let Err(e) = &result {
            debug!(error = %e, "build error at finalization");
        }
        result
    }

    /// Build a nested query on this statement's stack.
    pub(crate) fn subquery<F>(&mut self, f: F) -> Option<Query>
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        let outer = self.stack.current_id();
        self.nested(outer, false, f)
    }

    /// Build a set-operation branch sharing `link` with its left sibling.
    pub(crate) fn branch<F>(&mut self, link: Option<ScopeId>, f: F) -> Option<Query>
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        self.nested(link, link.is_some(), f)
    }

    fn nested<F>(&mut self, outer: Option<ScopeId>, correlated: bool, f: F) -> Option<Query>
    where
        F: FnOnce(SubqueryStart<'_>) -> Result<Query, BuildError>,
    {
        if self.error.is_some() {
            return None;
        }
        let start = SubqueryStart {
            stack: &mut *self.stack,
            outer,
            correlated,
        };
        match f(start) {
            Ok(q) => Some(q),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.stack.unwind_to(self.entry_depth);
    }
}

/// Entry point handed to subquery closures.
///
/// A subquery only sees its own tables unless it is marked
/// [`correlated`](SubqueryStart::correlated), in which case unresolved columns
/// are looked up in the enclosing statement.
pub struct SubqueryStart<'a> {
    pub(crate) stack: &'a mut ContextStack,
    pub(crate) outer: Option<ScopeId>,
    pub(crate) correlated: bool,
}

impl<'a> SubqueryStart<'a> {
    pub fn correlated(mut self) -> Self {
        self.correlated = true;
        self
    }

    pub(crate) fn link(&self) -> Option<ScopeId> {
        if self.correlated { self.outer } else { None }
    }

    pub fn select<I, S>(self, items: I) -> SelectBuilder<'a, Projection>
    where
        I: IntoIterator<Item = S>,
        S: Into<crate::ast::SelectItem>,
    {
        let link = self.link();
        SelectBuilder::start(Scope::borrowed(self.stack), link, None, false, items)
    }

    pub fn select_distinct<I, S>(self, items: I) -> SelectBuilder<'a, Projection>
    where
        I: IntoIterator<Item = S>,
        S: Into<crate::ast::SelectItem>,
    {
        let link = self.link();
        SelectBuilder::start(Scope::borrowed(self.stack), link, None, true, items)
    }

    pub fn with(self) -> WithBuilder<'a> {
        let link = self.link();
        WithBuilder::start(Scope::borrowed(self.stack), link)
    }
}

/// Subquery helpers shared by every statement builder.
macro_rules! subquery_helpers {
    () => {
        /// Scalar subquery `(SELECT ...)`.
        pub fn scalar<F>(&mut self, f: F) -> crate::ast::Expr
        where
            F: FnOnce(crate::builder::SubqueryStart<'_>) -> Result<crate::ast::Query, crate::error::BuildError>,
        {
            match self.scope.subquery(f) {
                Some(q) => crate::ast::Expr::Subquery(Box::new(q)),
                None => crate::ast::builders::null(),
            }
        }

        /// `EXISTS (SELECT ...)`
        pub fn exists<F>(&mut self, f: F) -> crate::ast::Predicate
        where
            F: FnOnce(crate::builder::SubqueryStart<'_>) -> Result<crate::ast::Query, crate::error::BuildError>,
        {
            match self.scope.subquery(f) {
                Some(q) => crate::ast::builders::exists(q),
                None => crate::ast::Predicate::And(Vec::new()),
            }
        }

        /// `NOT EXISTS (SELECT ...)`
        pub fn not_exists<F>(&mut self, f: F) -> crate::ast::Predicate
        where
            F: FnOnce(crate::builder::SubqueryStart<'_>) -> Result<crate::ast::Query, crate::error::BuildError>,
        {
            match self.scope.subquery(f) {
                Some(q) => crate::ast::builders::not_exists(q),
                None => crate::ast::Predicate::And(Vec::new()),
            }
        }

        /// `lhs IN (SELECT ...)`
        pub fn in_query<F>(&mut self, lhs: impl Into<crate::ast::Expr>, f: F) -> crate::ast::Predicate
        where
            F: FnOnce(crate::builder::SubqueryStart<'_>) -> Result<crate::ast::Query, crate::error::BuildError>,
        {
            match self.scope.subquery(f) {
                Some(q) => lhs.into().in_query(q),
                None => crate::ast::Predicate::And(Vec::new()),
            }
        }
    };
}

pub(crate) use subquery_helpers;

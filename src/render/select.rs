//! Query rendering: WITH, set operations, SELECT and FROM trees.

use crate::ast::{
    Join, JoinCondition, JoinKind, JoinTree, LockMode, Query, QueryBody, Select, TableItem,
    TableMeta, TableRef, TableSource, With,
};
use crate::error::RenderError;
use crate::render::Writer;

impl Writer<'_> {
    pub(crate) fn query(&mut self, q: &Query) -> Result<(), RenderError> {
        if let Some(with) = &q.with {
            self.with_clause(with)?;
        }
        match &q.body {
            QueryBody::Select(s) => self.select(s)?,
            QueryBody::SetOp { left, op, right } => {
                self.set_operand(left, false)?;
                self.push(&format!(" {} ", op));
                self.set_operand(right, true)?;
            }
        }
        if !q.order_by.is_empty() {
            self.push(" ORDER BY ");
            self.order_items(&q.order_by)?;
        }
        let limits = self.dialect.limit_offset(q.limit, q.offset);
        self.push(&limits);
        match q.lock {
            None => {}
            Some(LockMode::Update) if self.dialect.update_lock => self.push(" FOR UPDATE"),
            Some(LockMode::Update) => return Err(self.unsupported("FOR UPDATE")),
            Some(LockMode::Share) => match self.dialect.share_lock {
                Some(clause) => {
                    self.push(" ");
                    self.push(clause);
                }
                None => return Err(self.unsupported("shared row locks")),
            },
        }
        Ok(())
    }

    fn with_clause(&mut self, with: &With) -> Result<(), RenderError> {
        let caps = self.dialect.capabilities;
        if !caps.cte {
            return Err(self.unsupported("WITH"));
        }
        if with.recursive && !caps.recursive_cte {
            return Err(self.unsupported("WITH RECURSIVE"));
        }
        self.push(if with.recursive { "WITH RECURSIVE " } else { "WITH " });
        self.list(&with.ctes, |w, cte| {
            w.ident(&cte.name)?;
            if !cte.columns.is_empty() {
                w.push(" (");
                w.list(&cte.columns, |w, c| w.ident(c))?;
                w.push(")");
            }
            w.push(" AS (");
            w.query(&cte.query)?;
            w.push(")");
            Ok(())
        })?;
        self.push(" ");
        Ok(())
    }

    /// A set operand is parenthesized when it carries its own tail or is a
    /// right-hand set operation; chains otherwise stay flat.
    fn set_operand(&mut self, q: &Query, right: bool) -> Result<(), RenderError> {
        let nested_op = right && matches!(q.body, QueryBody::SetOp { .. });
        if q.has_tail() || nested_op {
            if !self.dialect.capabilities.parenthesized_set_ops {
                return Err(self.unsupported("parenthesized set operands"));
            }
            self.push("(");
            self.query(q)?;
            self.push(")");
            Ok(())
        } else {
            self.query(q)
        }
    }

    fn select(&mut self, s: &Select) -> Result<(), RenderError> {
        self.push(if s.distinct { "SELECT DISTINCT " } else { "SELECT " });
        if s.items.is_empty() {
            self.push("*");
        }
        self.list(&s.items, |w, item| {
            w.expr(&item.expr)?;
            if let Some(alias) = &item.alias {
                w.push(" AS ");
                w.ident(alias)?;
            }
            Ok(())
        })?;
        if let Some(from) = &s.from {
            self.push(" FROM ");
            self.join_tree(from)?;
        }
        if let Some(p) = &s.where_ {
            self.push(" WHERE ");
            self.predicate(p)?;
        }
        if !s.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.list(&s.group_by, |w, e| w.expr(e))?;
        }
        if let Some(p) = &s.having {
            self.push(" HAVING ");
            self.predicate(p)?;
        }
        if !s.windows.is_empty() {
            if !self.dialect.capabilities.window {
                return Err(self.unsupported("WINDOW"));
            }
            self.push(" WINDOW ");
            self.list(&s.windows, |w, named| {
                w.ident(&named.name)?;
                w.push(" AS (");
                w.window_spec(&named.spec)?;
                w.push(")");
                Ok(())
            })?;
        }
        Ok(())
    }

    pub(crate) fn join_tree(&mut self, tree: &JoinTree) -> Result<(), RenderError> {
        self.table_item(&tree.first, false)?;
        self.joins(&tree.joins)
    }

    pub(crate) fn joins(&mut self, joins: &[Join]) -> Result<(), RenderError> {
        for join in joins {
            if join.kind == JoinKind::Full && !self.dialect.capabilities.full_join {
                return Err(self.unsupported("FULL JOIN"));
            }
            self.push(&format!(" {} ", join.kind));
            self.table_item(&join.item, true)?;
            match &join.condition {
                JoinCondition::On(p) => {
                    self.push(" ON ");
                    self.predicate(p)?;
                }
                JoinCondition::Using(columns) => {
                    self.push(" USING (");
                    self.list(columns, |w, c| w.ident(c))?;
                    self.push(")");
                }
                JoinCondition::None => {}
            }
        }
        Ok(())
    }

    fn table_item(&mut self, item: &TableItem, join_target: bool) -> Result<(), RenderError> {
        match item {
            TableItem::Table(t) => self.table_ref(t, join_target),
            TableItem::Group(tree) => {
                self.push("(");
                self.join_tree(tree)?;
                self.push(")");
                Ok(())
            }
        }
    }

    pub(crate) fn alias(&mut self, alias: &str) -> Result<(), RenderError> {
        self.push(if self.dialect.table_alias_as { " AS " } else { " " });
        self.ident(alias)
    }

    /// A table in FROM/JOIN position. An inherited table expands to its
    /// physical child joined to the parent under `{scope}_p`.
    pub(crate) fn table_ref(&mut self, t: &TableRef, join_target: bool) -> Result<(), RenderError> {
        match &t.source {
            TableSource::Table(meta) => {
                let expand = meta.is_inherited() && !t.physical;
                if expand && join_target {
                    self.push("(");
                }
                if t.only {
                    if !self.dialect.capabilities.only_modifier {
                        return Err(self.unsupported("ONLY"));
                    }
                    self.push("ONLY ");
                }
                self.ident(meta.name())?;
                if let Some(alias) = t.alias.as_deref().filter(|a| *a != meta.name()) {
                    self.alias(alias)?;
                }
                if expand {
                    let scope = t.scope_name().unwrap_or(meta.name());
                    self.parent_join(meta, scope)?;
                    if join_target {
                        self.push(")");
                    }
                }
            }
            TableSource::Cte { name, .. } => {
                self.ident(name)?;
                if let Some(alias) = t.alias.as_deref().filter(|a| a != name) {
                    self.alias(alias)?;
                }
            }
            TableSource::Derived(q) => {
                self.push("(");
                self.query(q)?;
                self.push(")");
                if let Some(alias) = &t.alias {
                    self.alias(alias)?;
                }
            }
        }
        Ok(())
    }

    /// ` INNER JOIN parent AS {scope}_p ON {scope}_p.pk = {scope}.pk`
    pub(crate) fn parent_join(&mut self, child: &TableMeta, scope: &str) -> Result<(), RenderError> {
        let Some(link) = child.parent() else {
            return Ok(());
        };
        let parent_scope = format!("{}_p", scope);
        self.push(" INNER JOIN ");
        self.ident(link.table.name())?;
        self.alias(&parent_scope)?;
        self.push(" ON ");
        self.ident(&parent_scope)?;
        self.push(".");
        self.ident(&link.table.primary_key().name)?;
        self.push(" = ");
        self.ident(scope)?;
        self.push(".");
        self.ident(&child.primary_key().name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{col, lit};
    use crate::ast::{table, SqlType};
    use crate::builder::select;
    use crate::dialect::Dialect;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn animal() -> Arc<TableMeta> {
        TableMeta::builder("animal")
            .generated_key("id", SqlType::BigInt)
            .field("name", SqlType::Varchar(64))
            .discriminator("kind", SqlType::Varchar(16), ["dog"])
            .build()
            .unwrap()
    }

    fn dog() -> Arc<TableMeta> {
        TableMeta::builder("dog")
            .primary_key("id", SqlType::BigInt)
            .field("breed", SqlType::Varchar(64))
            .extends(&animal(), "dog")
            .build()
            .unwrap()
    }

    fn render(q: &Query, d: &Dialect) -> String {
        let mut w = Writer::new(d);
        w.query(q).unwrap();
        w.sql
    }

    #[test]
    fn test_inherited_table_expands_to_parent_join() {
        let q = select([col("breed"), col("name")])
            .from(table(&dog()).alias("d"))
            .as_query()
            .unwrap();
        assert_eq!(
            render(&q, &Dialect::standard()),
            "SELECT d.breed, d_p.name FROM dog AS d INNER JOIN animal AS d_p ON d_p.id = d.id"
        );
    }

    #[test]
    fn test_limit_styles() {
        let meta = animal();
        let q = select([col("name")])
            .from(table(&meta))
            .limit(10)
            .offset(20)
            .as_query()
            .unwrap();
        assert_eq!(
            render(&q, &Dialect::postgres()),
            "SELECT name FROM animal LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            render(&q, &Dialect::standard()),
            "SELECT name FROM animal OFFSET 20 ROWS FETCH FIRST 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_share_lock_unsupported_on_sqlite() {
        let meta = animal();
        let q = select([col("name")])
            .from(table(&meta))
            .where_(col("id").eq(lit(1)))
            .for_share()
            .as_query()
            .unwrap();
        let d = Dialect::sqlite();
        let mut w = Writer::new(&d);
        assert_eq!(
            w.query(&q).unwrap_err(),
            RenderError::Unsupported {
                feature: "shared row locks",
                dialect: "SQLite"
            }
        );
    }
}

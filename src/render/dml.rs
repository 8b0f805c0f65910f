//! INSERT, UPDATE and DELETE rendering for single physical tables.

use std::sync::Arc;

use crate::ast::{
    Assignment, ColumnRef, Delete, Expr, FieldMeta, Insert, InsertSource, Join, Predicate,
    TableRef, Typed, Update, Value, Visible, Binding,
};
use crate::error::RenderError;
use crate::render::{StmtFlags, Writer};

pub(crate) fn insert_flags(ins: &Insert) -> StmtFlags {
    StmtFlags {
        has_optimistic_lock: false,
        returning: ins.returning.iter().map(|f| f.name.clone()).collect(),
        multi_row: matches!(&ins.source, InsertSource::Values(rows) if rows.len() > 1),
    }
}

/// A resolved column reference to `field`.
pub(crate) fn bound_column(qualifier: Option<&str>, field: &Arc<FieldMeta>) -> Expr {
    Expr::Column(ColumnRef {
        qualifier: qualifier.map(str::to_string),
        name: field.name.clone(),
        binding: Some(Binding {
            qualifier: qualifier.map(str::to_string),
            field: Some(Arc::clone(field)),
            outer: false,
        }),
    })
}

/// `column = TRUE` for a boolean column, typed through the column's codec.
pub(crate) fn flag_equals(qualifier: Option<&str>, field: &Arc<FieldMeta>, value: bool) -> Predicate {
    let mut typed = Typed::new(Value::Bool(value));
    typed.infer_from(field);
    bound_column(qualifier, field).eq(Expr::Literal(typed))
}

/// Scope name of the table among `table` and `joins` that stores `field`.
fn owner_scope<'a>(table: &'a TableRef, joins: &'a [Join], field: &FieldMeta) -> Option<&'a str> {
    std::iter::once(table)
        .chain(joins.iter().flat_map(|j| j.item.tables()))
        .find(|t| t.meta().is_some_and(|m| m.name() == field.table))
        .and_then(|t| t.scope_name())
}

/// Qualifier for the soft-delete and target columns of a DML statement.
fn target_qualifier<'a>(table: &'a TableRef, joins: &'a [Join], field: &FieldMeta) -> Option<&'a str> {
    if joins.is_empty() && table.alias.is_none() {
        return None;
    }
    owner_scope(table, joins, field).or_else(|| table.scope_name())
}

fn mentions(p: &Predicate, field: &FieldMeta) -> bool {
    let mut found = false;
    crate::ast::visit::predicate_columns(p, &mut |c| {
        if c.field().is_some_and(|f| f.is(field)) {
            found = true;
        }
    });
    found
}

impl Writer<'_> {
    fn dml_table(&mut self, t: &TableRef) -> Result<(), RenderError> {
        let Some(meta) = t.meta() else {
            return Err(RenderError::UnsupportedValue(
                "DML target must be a mapped table".to_string(),
            ));
        };
        self.ident(meta.name())?;
        if let Some(alias) = t.alias.as_deref().filter(|a| *a != meta.name()) {
            self.alias(alias)?;
        }
        Ok(())
    }

    fn returning(&mut self, fields: &[Arc<FieldMeta>]) -> Result<(), RenderError> {
        if fields.is_empty() {
            return Ok(());
        }
        if !self.dialect.capabilities.returning {
            return Err(self.unsupported("RETURNING"));
        }
        self.push(" RETURNING ");
        self.list(fields, |w, f| w.ident(&f.name))
    }

    /// Returns the index of the first parameter of every VALUES row.
    pub(crate) fn insert(&mut self, ins: &Insert) -> Result<Vec<usize>, RenderError> {
        self.push("INSERT INTO ");
        self.ident(ins.table.name())?;
        self.push(" (");
        self.list(&ins.columns, |w, c| w.ident(&c.name))?;
        self.push(")");
        let mut offsets = Vec::new();
        match &ins.source {
            InsertSource::Values(rows) => {
                self.push(" VALUES ");
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    offsets.push(self.params.len());
                    self.push("(");
                    self.list(row, |w, e| w.value_expr(e))?;
                    self.push(")");
                }
            }
            InsertSource::Query(q) => {
                self.push(" ");
                self.query(q)?;
            }
        }
        self.returning(&ins.returning)?;
        Ok(offsets)
    }

    fn set_target(&mut self, qualifier: Option<&str>, field: &FieldMeta) -> Result<(), RenderError> {
        if let Some(q) = qualifier {
            self.ident(q)?;
            self.push(".");
        }
        self.ident(&field.name)
    }

    /// Filter with the soft-delete condition appended when it applies.
    fn effective_where(
        &self,
        table: &TableRef,
        joins: &[Join],
        where_: &Option<Predicate>,
        visible: Visible,
    ) -> Option<Predicate> {
        let visible_field = match visible {
            Visible::Only => table.meta().and_then(|m| m.visible_column()),
            Visible::Both => None,
        };
        match visible_field {
            Some(field) => {
                let q = target_qualifier(table, joins, &field);
                Some(Predicate::conjoin(where_.clone(), flag_equals(q, &field, true)))
            }
            None => where_.clone(),
        }
    }

    pub(crate) fn update(&mut self, u: &Update) -> Result<StmtFlags, RenderError> {
        let caps = self.dialect.capabilities;
        if !u.joins.is_empty() && !caps.multi_table_update {
            return Err(self.unsupported("multi-table UPDATE"));
        }
        self.push("UPDATE ");
        self.dml_table(&u.table)?;
        self.joins(&u.joins)?;
        self.push(" SET ");
        let qualify = !u.joins.is_empty();
        for (i, a) in u.assignments.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            match a {
                Assignment::Column { target, value } => {
                    let q = if qualify { owner_scope(&u.table, &u.joins, target) } else { None };
                    self.set_target(q, target)?;
                    self.push(" = ");
                    self.value_expr(value)?;
                }
                Assignment::Row { targets, values } => {
                    if !caps.row_constructor_set {
                        return Err(self.unsupported("row-constructor SET"));
                    }
                    self.push("(");
                    for (j, target) in targets.iter().enumerate() {
                        if j > 0 {
                            self.push(", ");
                        }
                        let q = if qualify { owner_scope(&u.table, &u.joins, target) } else { None };
                        self.set_target(q, target)?;
                    }
                    self.push(") = (");
                    self.list(values, |w, e| w.value_expr(e))?;
                    self.push(")");
                }
            }
        }
        let where_ = self.effective_where(&u.table, &u.joins, &u.where_, u.visible);
        if let Some(p) = &where_ {
            self.push(" WHERE ");
            self.predicate(p)?;
        }
        self.returning(&u.returning)?;
        let version = u.meta().and_then(|m| m.version_column());
        Ok(StmtFlags {
            has_optimistic_lock: match (&version, &u.where_) {
                (Some(v), Some(p)) => mentions(p, v),
                _ => false,
            },
            returning: u.returning.iter().map(|f| f.name.clone()).collect(),
            multi_row: false,
        })
    }

    pub(crate) fn delete(&mut self, d: &Delete) -> Result<StmtFlags, RenderError> {
        let targets: Vec<&str> = d.table.scope_name().into_iter().collect();
        self.delete_from(d, &targets)
    }

    /// `DELETE FROM t ...`, or `DELETE a[, b] FROM t AS a JOIN ...` when the
    /// statement joins other tables.
    pub(crate) fn delete_from(&mut self, d: &Delete, targets: &[&str]) -> Result<StmtFlags, RenderError> {
        if d.joins.is_empty() {
            self.push("DELETE FROM ");
            self.dml_table(&d.table)?;
        } else {
            if !self.dialect.capabilities.multi_table_delete {
                return Err(self.unsupported("multi-table DELETE"));
            }
            self.push("DELETE ");
            self.list(targets, |w, t| w.ident(t))?;
            self.push(" FROM ");
            self.dml_table(&d.table)?;
            self.joins(&d.joins)?;
        }
        let where_ = self.effective_where(&d.table, &d.joins, &d.where_, d.visible);
        if let Some(p) = &where_ {
            self.push(" WHERE ");
            self.predicate(p)?;
        }
        self.returning(&d.returning)?;
        let version = d.meta().and_then(|m| m.version_column());
        Ok(StmtFlags {
            has_optimistic_lock: match (&version, &d.where_) {
                (Some(v), Some(p)) => mentions(p, v),
                _ => false,
            },
            returning: d.returning.iter().map(|f| f.name.clone()).collect(),
            multi_row: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{col, default_value, lit};
    use crate::ast::{SqlType, TableMeta};
    use crate::builder::{delete_from, insert_into, update};
    use crate::dialect::{Dialect, MySqlVersion};
    use crate::render::compile;
    use pretty_assertions::assert_eq;

    fn items() -> Arc<TableMeta> {
        TableMeta::builder("items")
            .generated_key("id", SqlType::BigInt)
            .field("name", SqlType::Varchar(32))
            .field("qty", SqlType::Integer)
            .field("live", SqlType::Boolean)
            .field("rev", SqlType::Integer)
            .visible("live")
            .version("rev")
            .build()
            .unwrap()
    }

    #[test]
    fn test_insert_multi_row_params() {
        let stmt = insert_into(&items())
            .columns(&["name", "qty"])
            .values(["a".into(), Expr::from(1)])
            .values(["b".into(), Expr::from(2)])
            .as_insert()
            .unwrap();
        let compiled = compile(&stmt, &Dialect::postgres()).unwrap();
        let s = compiled.single().unwrap();
        assert_eq!(s.sql, "INSERT INTO items (name, qty) VALUES ($1, $2), ($3, $4)");
        assert_eq!(s.params.len(), 4);
        assert!(s.flags.multi_row);
        assert_eq!(s.params[1].sql_type, SqlType::Integer);
    }

    #[test]
    fn test_insert_default_keyword() {
        let stmt = insert_into(&items())
            .columns(&["name", "qty"])
            .values([lit("a"), default_value()])
            .as_insert()
            .unwrap();
        let s = compile(&stmt, &Dialect::standard()).unwrap();
        assert_eq!(
            s.single().unwrap().sql,
            "INSERT INTO items (name, qty) VALUES ('a', DEFAULT)"
        );
    }

    #[test]
    fn test_update_adds_visible_filter_and_lock_flag() {
        let stmt = update(&items())
            .set("qty", 5)
            .set("rev", lit(4))
            .where_(col("id").eq(7).and(col("rev").eq(lit(3))))
            .as_update()
            .unwrap();
        let s = compile(&stmt, &Dialect::standard()).unwrap().into_single().unwrap();
        assert_eq!(
            s.sql,
            "UPDATE items SET qty = ?, rev = 4 WHERE id = ? AND rev = 3 AND live = TRUE"
        );
        assert!(s.flags.has_optimistic_lock);
        assert_eq!(s.columns, vec!["qty", "rev"]);
    }

    #[test]
    fn test_delete_visible_both_skips_filter() {
        let stmt = delete_from(&items())
            .where_(col("qty").eq(lit(0)))
            .visible(Visible::Both)
            .as_delete()
            .unwrap();
        let s = compile(&stmt, &Dialect::sqlite()).unwrap();
        assert_eq!(s.single().unwrap().sql, "DELETE FROM items WHERE qty = 0");
    }

    #[test]
    fn test_returning_rejected_by_renderer() {
        let stmt = delete_from(&items())
            .where_(col("qty").eq(lit(0)))
            .returning(&["id"])
            .as_delete()
            .unwrap();
        let err = compile(&stmt, &Dialect::mysql(MySqlVersion::V80)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::QailError::Render(RenderError::Unsupported { feature: "RETURNING", .. })
        ));
    }
}

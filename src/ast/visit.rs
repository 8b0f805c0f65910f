//! Read-only walks over column references.
//!
//! Nested queries are walked too, so correlated references are reported.

use crate::ast::{
    CaseWhen, ColumnRef, Expr, JoinCondition, JoinTree, Over, Predicate, Query, QueryBody,
    TableItem, TableSource,
};

pub fn expr_columns(e: &Expr, f: &mut dyn FnMut(&ColumnRef)) {
    match e {
        Expr::Column(c) => f(c),
        Expr::Default(Some(c)) => f(c),
        Expr::Star(_) | Expr::Literal(_) | Expr::Param(_) | Expr::Default(None) => {}
        Expr::Func(call) => call.args.iter().for_each(|a| expr_columns(a, f)),
        Expr::Binary { left, right, .. } => {
            expr_columns(left, f);
            expr_columns(right, f);
        }
        Expr::Neg(inner) => expr_columns(inner, f),
        Expr::Case(c) => {
            if let Some(op) = &c.operand {
                expr_columns(op, f);
            }
            for (when, then) in &c.arms {
                match when {
                    CaseWhen::Predicate(p) => predicate_columns(p, f),
                    CaseWhen::Value(v) => expr_columns(v, f),
                }
                expr_columns(then, f);
            }
            if let Some(e) = &c.otherwise {
                expr_columns(e, f);
            }
        }
        Expr::Window(call) => {
            call.func.args.iter().for_each(|a| expr_columns(a, f));
            if let Over::Spec(spec) = &call.over {
                spec.partition_by.iter().for_each(|e| expr_columns(e, f));
                spec.order_by.iter().for_each(|o| expr_columns(&o.expr, f));
            }
        }
        Expr::Subquery(q) => query_columns(q, f),
        Expr::Row(items) => items.iter().for_each(|e| expr_columns(e, f)),
        Expr::Predicate(p) => predicate_columns(p, f),
    }
}

pub fn predicate_columns(p: &Predicate, f: &mut dyn FnMut(&ColumnRef)) {
    match p {
        Predicate::Compare { left, right, .. } => {
            expr_columns(left, f);
            expr_columns(right, f);
        }
        Predicate::IsNull { expr, .. } => expr_columns(expr, f),
        Predicate::InList { expr, list, .. } => {
            expr_columns(expr, f);
            list.iter().for_each(|e| expr_columns(e, f));
        }
        Predicate::InQuery { expr, query, .. } => {
            expr_columns(expr, f);
            query_columns(query, f);
        }
        Predicate::Between {
            expr, low, high, ..
        } => {
            expr_columns(expr, f);
            expr_columns(low, f);
            expr_columns(high, f);
        }
        Predicate::Like { expr, pattern, .. } => {
            expr_columns(expr, f);
            expr_columns(pattern, f);
        }
        Predicate::Exists { query, .. } => query_columns(query, f),
        Predicate::And(parts) | Predicate::Or(parts) => {
            parts.iter().for_each(|p| predicate_columns(p, f))
        }
        Predicate::Not(inner) => predicate_columns(inner, f),
    }
}

fn tree_columns(tree: &JoinTree, f: &mut dyn FnMut(&ColumnRef)) {
    item_columns(&tree.first, f);
    for join in &tree.joins {
        item_columns(&join.item, f);
        if let JoinCondition::On(p) = &join.condition {
            predicate_columns(p, f);
        }
    }
}

fn item_columns(item: &TableItem, f: &mut dyn FnMut(&ColumnRef)) {
    match item {
        TableItem::Table(t) => {
            if let TableSource::Derived(q) = &t.source {
                query_columns(q, f);
            }
        }
        TableItem::Group(tree) => tree_columns(tree, f),
    }
}

pub fn query_columns(q: &Query, f: &mut dyn FnMut(&ColumnRef)) {
    if let Some(with) = &q.with {
        with.ctes.iter().for_each(|c| query_columns(&c.query, f));
    }
    match &q.body {
        QueryBody::Select(s) => {
            s.items.iter().for_each(|i| expr_columns(&i.expr, f));
            if let Some(from) = &s.from {
                tree_columns(from, f);
            }
            if let Some(p) = &s.where_ {
                predicate_columns(p, f);
            }
            s.group_by.iter().for_each(|e| expr_columns(e, f));
            if let Some(p) = &s.having {
                predicate_columns(p, f);
            }
        }
        QueryBody::SetOp { left, right, .. } => {
            query_columns(left, f);
            query_columns(right, f);
        }
    }
    q.order_by.iter().for_each(|o| expr_columns(&o.expr, f));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{col, lit};

    #[test]
    fn test_collects_nested_columns() {
        let p = col("a").eq(lit(1)).and(col("b").plus(col("c")).gt(lit(0)).not());
        let mut names = Vec::new();
        predicate_columns(&p, &mut |c| names.push(c.name.clone()));
        assert_eq!(names, ["a", "b", "c"]);
    }
}

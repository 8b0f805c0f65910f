//! SELECT compilation across dialects.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use qail_criteria::prelude::*;
use rust_decimal::Decimal;

fn users() -> Arc<TableMeta> {
    TableMeta::builder("users")
        .generated_key("id", SqlType::BigInt)
        .field("email", SqlType::Varchar(255))
        .field("active", SqlType::Boolean)
        .field("balance", SqlType::Decimal { precision: 10, scale: 2 })
        .build()
        .unwrap()
}

fn orders() -> Arc<TableMeta> {
    TableMeta::builder("orders")
        .generated_key("id", SqlType::BigInt)
        .field("user_id", SqlType::BigInt)
        .field("total", SqlType::Decimal { precision: 12, scale: 2 })
        .build()
        .unwrap()
}

#[test]
fn test_literal_filter_has_no_params() {
    let table_x = TableMeta::builder("tableX")
        .primary_key("columnA", SqlType::Integer)
        .build()
        .unwrap();
    let compiled = select([col("columnA")])
        .from(table(&table_x))
        .where_(col("columnA").eq(lit(1)))
        .compile(&Dialect::standard())
        .unwrap();
    let stmt = compiled.single().unwrap();
    assert_eq!(stmt.sql, "SELECT columnA FROM tableX WHERE columnA = 1");
    assert!(stmt.params.is_empty());
}

#[test]
fn test_compile_is_deterministic() {
    let meta = users();
    let query = select([col("id"), col("email")])
        .from(table(&meta))
        .where_(col("email").like("%@example.com").and(col("active").eq(true)))
        .order_by([col("id").desc()])
        .limit(20)
        .as_query()
        .unwrap();
    let stmt: Statement = query.into();
    let a = compile(&stmt, &Dialect::postgres()).unwrap().into_single().unwrap();
    let b = compile(&stmt, &Dialect::postgres()).unwrap().into_single().unwrap();
    assert_eq!(a.sql, b.sql);
    assert_eq!(a.params, b.params);
    assert_eq!(a.params.len(), 2);
}

#[test]
fn test_bound_param_takes_column_type() {
    let meta = users();
    let stmt = select([col("id")])
        .from(table(&meta))
        .where_(col("active").eq(true))
        .compile(&Dialect::postgres())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(stmt.sql, "SELECT id FROM users WHERE active = $1");
    assert_eq!(stmt.params[0].sql_type, SqlType::Boolean);
    assert_eq!(stmt.params[0].value, Value::Bool(true));
}

#[test]
fn test_decimal_zero_keeps_scale() {
    let meta = users();
    let stmt = select([col("id")])
        .from(table(&meta))
        .where_(col("balance").eq(lit(Decimal::new(0, 2))))
        .compile(&Dialect::standard())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(stmt.sql, "SELECT id FROM users WHERE balance = 0.00");
}

#[test]
fn test_boolean_token_per_dialect() {
    let meta = users();
    let build = |dialect: &Dialect| {
        select([col("id")])
            .from(table(&meta))
            .where_(col("active").eq(lit(true)))
            .compile(dialect)
            .unwrap()
            .into_single()
            .unwrap()
            .sql
    };
    assert_eq!(build(&Dialect::postgres()), "SELECT id FROM users WHERE active = TRUE");
    assert_eq!(build(&Dialect::sqlite()), "SELECT id FROM users WHERE active = 1");
}

#[test]
fn test_correlated_exists() {
    let (u, o) = (users(), orders());
    let mut stack = ContextStack::new();
    let mut outer = stack.select([col("u.id")]).from(table(&u).alias("u"));
    let has_orders = outer.exists(|s| {
        s.correlated()
            .select([lit(1)])
            .from(table(&o).alias("o"))
            .where_(col("o.user_id").eq(col("u.id")))
            .as_query()
    });
    let query = outer.where_(has_orders).as_query().unwrap();
    assert!(stack.is_balanced());

    let stmt = compile(&query.into(), &Dialect::postgres())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT u.id FROM users AS u WHERE EXISTS \
         (SELECT 1 FROM orders AS o WHERE o.user_id = u.id)"
    );
}

#[test]
fn test_uncorrelated_subquery_cannot_see_outer_alias() {
    let (u, o) = (users(), orders());
    let mut stack = ContextStack::new();
    let mut outer = stack.select([col("u.id")]).from(table(&u).alias("u"));
    let p = outer.exists(|s| {
        s.select([lit(1)])
            .from(table(&o).alias("o"))
            .where_(col("o.user_id").eq(col("u.id")))
            .as_query()
    });
    let err = outer.where_(p).as_query().unwrap_err();
    assert_eq!(err, BuildError::UnresolvedAlias("u".to_string()));
    assert!(stack.is_balanced());
}

#[test]
fn test_stack_balanced_after_failures() {
    let meta = users();
    let mut stack = ContextStack::new();

    let err = stack
        .select([col("missing")])
        .from(table(&meta))
        .as_query()
        .unwrap_err();
    assert!(matches!(err, BuildError::UnknownColumn { .. } | BuildError::UnresolvedColumn(_)));
    assert!(stack.is_balanced());

    let ok = stack.select([col("id")]).from(table(&meta)).as_query();
    assert!(ok.is_ok());
    assert!(stack.is_balanced());
    let stats = stack.stats();
    assert_eq!(stats.pushes, stats.pops);
}

#[test]
fn test_limit_offset_styles() {
    let meta = users();
    let build = |dialect: &Dialect| {
        select([col("id")])
            .from(table(&meta))
            .order_by([col("id")])
            .limit(10)
            .offset(20)
            .compile(dialect)
            .unwrap()
            .into_single()
            .unwrap()
            .sql
    };
    assert_eq!(
        build(&Dialect::postgres()),
        "SELECT id FROM users ORDER BY id LIMIT 10 OFFSET 20"
    );
    assert_eq!(
        build(&Dialect::standard()),
        "SELECT id FROM users ORDER BY id OFFSET 20 ROWS FETCH FIRST 10 ROWS ONLY"
    );
}

#[test]
fn test_cte_rejected_when_dialect_lacks_it() {
    let meta = users();
    let err = with()
        .cte("ids", &[], |s| s.select([col("id")]).from(table(&meta)).as_query())
        .select([col("id")])
        .from(cte("ids"))
        .compile(&Dialect::mysql(MySqlVersion::V57))
        .unwrap_err();
    assert!(matches!(
        err,
        QailError::Render(RenderError::Unsupported { feature: "WITH", .. })
    ));
}

#[test]
fn test_finalized_query_is_shareable() {
    let meta = users();
    let query = select([col("id")]).from(table(&meta)).as_query().unwrap();
    let stmt: Arc<Statement> = Arc::new(query.into());
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let stmt = Arc::clone(&stmt);
            std::thread::spawn(move || {
                compile(&stmt, &Dialect::sqlite())
                    .unwrap()
                    .into_single()
                    .unwrap()
                    .sql
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), "SELECT id FROM users");
    }
}

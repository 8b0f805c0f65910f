//! INSERT, UPDATE and DELETE on single tables, plus dialect configuration.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use qail_criteria::dialect::{DialectConfig, Engine, SplitOrder};
use qail_criteria::prelude::*;

fn products() -> Arc<TableMeta> {
    TableMeta::builder("products")
        .generated_key("id", SqlType::BigInt)
        .field("sku", SqlType::Varchar(16))
        .field("qty", SqlType::Integer)
        .field("price", SqlType::Decimal { precision: 8, scale: 2 })
        .build()
        .unwrap()
}

fn row(i: i64) -> [Expr; 3] {
    [Expr::from(format!("sku-{}", i)), Expr::from(i), Expr::from(i * 10)]
}

#[test]
fn test_param_count_is_rows_times_columns() {
    let meta = products();
    for rows in 1..=4i64 {
        let mut builder = insert_into(&meta).columns(&["sku", "qty", "price"]);
        for i in 0..rows {
            builder = builder.values(row(i));
        }
        let stmt = builder
            .compile(&Dialect::postgres())
            .unwrap()
            .into_single()
            .unwrap();
        assert_eq!(stmt.params.len(), (rows * 3) as usize);
        let order: Vec<&str> = stmt
            .params
            .iter()
            .map(|p| p.column.as_deref().unwrap_or(""))
            .collect();
        let expected: Vec<&str> = (0..rows).flat_map(|_| ["sku", "qty", "price"]).collect();
        assert_eq!(order, expected);
        assert_eq!(stmt.params[1].value, Value::Int(0));
    }
}

#[test]
fn test_batch_groups_share_sql() {
    let meta = products();
    let compiled = insert_into(&meta)
        .columns(&["sku", "qty", "price"])
        .values(row(1))
        .values(row(2))
        .values(row(3))
        .batch()
        .compile(&Dialect::mysql(MySqlVersion::V80))
        .unwrap();
    let batch = compiled.batch().unwrap();
    assert_eq!(batch.sql, "INSERT INTO products (sku, qty, price) VALUES (?, ?, ?)");
    assert_eq!(batch.groups.len(), 3);
    assert!(batch.groups.iter().all(|g| g.len() == 3));
    assert_eq!(batch.groups[2][0].value, Value::Text("sku-3".to_string()));
}

#[test]
fn test_row_width_checked_at_build() {
    let meta = products();
    let err = insert_into(&meta)
        .columns(&["sku", "qty"])
        .values([Expr::from("a")])
        .as_insert()
        .unwrap_err();
    assert_eq!(err, BuildError::RowWidth { expected: 2, found: 1 });
}

#[test]
fn test_value_too_long_for_column() {
    let meta = products();
    let err = insert_into(&meta)
        .columns(&["sku"])
        .values([lit("this sku is far too long")])
        .compile(&Dialect::postgres())
        .unwrap_err();
    assert!(matches!(err, QailError::Render(_)));
}

#[test]
fn test_update_with_returning_on_postgres() {
    let meta = products();
    let stmt = update(&meta)
        .set("qty", col("qty").plus(lit(1)))
        .where_(col("sku").eq("abc"))
        .returning(&["id", "qty"])
        .compile(&Dialect::postgres())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE products SET qty = qty + 1 WHERE sku = $1 RETURNING id, qty"
    );
    assert_eq!(stmt.flags.returning, vec!["id", "qty"]);
    assert!(!stmt.flags.has_optimistic_lock);
}

#[test]
fn test_delete_plain() {
    let meta = products();
    let stmt = delete_from(&meta)
        .where_(col("qty").eq(lit(0)))
        .compile(&Dialect::sqlite())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(stmt.sql, "DELETE FROM products WHERE qty = 0");
    assert!(stmt.params.is_empty());
}

#[test]
fn test_dialect_config_round_trip() {
    let config = DialectConfig {
        engine: Engine::Postgres,
        split_order: Some(SplitOrder::ParentFirst),
        ..Default::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    let back: DialectConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);

    let dialect = Dialect::from_config(&back).unwrap();
    assert_eq!(dialect.split_order, SplitOrder::ParentFirst);
    assert_eq!(dialect.to_string(), "PostgreSQL");
}

#[test]
fn test_dialect_config_bad_version() {
    let config: DialectConfig =
        serde_json::from_str(r#"{"engine": "mysql", "version": "3.23"}"#).unwrap();
    assert!(matches!(Dialect::from_config(&config), Err(QailError::Config(_))));
}

//! Inherited-table DML compiled into statement pairs.

use std::collections::BTreeSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use qail_criteria::dialect::SplitOrder;
use qail_criteria::prelude::*;
use qail_criteria::ExecOutcome;

fn animal() -> Arc<TableMeta> {
    TableMeta::builder("animal")
        .generated_key("id", SqlType::BigInt)
        .field("name", SqlType::Varchar(64))
        .discriminator("kind", SqlType::Varchar(16), ["dog", "cat"])
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

fn bound_columns(stmt: &Stmt) -> BTreeSet<String> {
    stmt.columns
        .iter()
        .cloned()
        .chain(stmt.params.iter().filter_map(|p| p.column.clone()))
        .collect()
}

fn assert_partitioned(pair: &PairStmt) {
    let first = bound_columns(&pair.first);
    let second = bound_columns(&pair.second);
    let shared: Vec<&String> = first.intersection(&second).collect();
    assert!(
        shared.iter().all(|c| c.as_str() == "id"),
        "columns shared outside the key: {:?}",
        shared
    );
}

#[test]
fn test_insert_pair_without_returning() {
    let compiled = insert_into(&dog())
        .columns(&["name", "breed"])
        .values(["rex", "lab"])
        .compile(&Dialect::mysql(MySqlVersion::V80))
        .unwrap();
    let pair = compiled.pair().unwrap();
    assert_eq!(pair.first.sql, "INSERT INTO animal (name, kind) VALUES (?, 'dog')");
    assert_eq!(pair.second.sql, "INSERT INTO dog (id, breed) VALUES (?, ?)");
    assert_eq!(pair.linkage, Linkage::GeneratedKey { param_indexes: vec![0] });
    assert_partitioned(pair);
}

#[test]
fn test_multi_row_generated_keys_need_returning() {
    let err = insert_into(&dog())
        .columns(&["name", "breed"])
        .values(["rex", "lab"])
        .values(["fido", "pug"])
        .compile(&Dialect::mysql(MySqlVersion::V80))
        .unwrap_err();
    assert!(matches!(err, QailError::Split(SplitError::Unsupported(_))));
}

#[test]
fn test_explicit_key_goes_to_both_tables() {
    let compiled = insert_into(&dog())
        .columns(&["id", "name", "breed"])
        .values([Expr::from(5), Expr::from("rex"), Expr::from("lab")])
        .compile(&Dialect::postgres())
        .unwrap();
    let pair = compiled.pair().unwrap();
    assert_eq!(
        pair.first.sql,
        "INSERT INTO animal (id, name, kind) VALUES ($1, $2, 'dog')"
    );
    assert_eq!(pair.second.sql, "INSERT INTO dog (id, breed) VALUES ($1, $2)");
    assert_eq!(pair.linkage, Linkage::None);
    assert_eq!(pair.second.params[0].value, Value::Int(5));
    assert_partitioned(pair);
    assert_eq!(compiled.param_count(), 4);
}

#[test]
fn test_update_columns_partitioned() {
    let compiled = update(&dog())
        .set("breed", "pug")
        .set("name", "rex")
        .where_(col("id").eq(7))
        .compile(&Dialect::postgres())
        .unwrap();
    let pair = compiled.pair().unwrap();
    assert_eq!(pair.first.columns, vec!["breed"]);
    assert_eq!(pair.second.columns, vec!["name"]);
    assert_eq!(pair.linkage, Linkage::RowCountEcho);
    assert_partitioned(pair);
}

#[test]
fn test_parent_column_filter_must_be_inlined() {
    let err = update(&dog())
        .set("breed", "pug")
        .set("name", "rex")
        .where_(col("name").eq("old"))
        .compile(&Dialect::postgres())
        .unwrap_err();
    assert_eq!(err, QailError::Split(SplitError::SharedColumn("name".to_string())));

    let compiled = update(&dog())
        .set("breed", "pug")
        .set("name", "rex")
        .where_(col("name").eq(lit("old")))
        .compile(&Dialect::postgres())
        .unwrap();
    assert_partitioned(compiled.pair().unwrap());
}

#[test]
fn test_insert_columns_narrowed_after_values() {
    let err = insert_into(&dog())
        .columns(&["id", "name", "breed"])
        .values([Expr::from(5), Expr::from("rex"), Expr::from("lab")])
        .columns(&["name", "breed"])
        .compile(&Dialect::postgres())
        .unwrap_err();
    assert_eq!(
        err,
        QailError::Build(BuildError::RowWidth { expected: 2, found: 3 })
    );
}

#[test]
fn test_parent_first_order() {
    let mut dialect = Dialect::postgres();
    dialect.split_order = SplitOrder::ParentFirst;
    let compiled = update(&dog())
        .set("breed", "pug")
        .set("name", "rex")
        .where_(col("id").eq(7))
        .compile(&dialect)
        .unwrap();
    let pair = compiled.pair().unwrap();
    assert!(pair.first.sql.starts_with("UPDATE animal AS dog_p SET name = $1 WHERE"));
    assert!(pair.second.sql.starts_with("UPDATE dog SET breed = $1 WHERE"));
}

#[test]
fn test_split_is_deterministic() {
    let stmt = delete_from(&dog())
        .where_(col("breed").eq("pug"))
        .as_delete()
        .unwrap();
    let a = compile(&stmt, &Dialect::postgres()).unwrap();
    let b = compile(&stmt, &Dialect::postgres()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_paired_update_count_mismatch() {
    let compiled = update(&dog())
        .set("breed", "pug")
        .set("name", "rex")
        .where_(col("id").eq(7))
        .compile(&Dialect::postgres())
        .unwrap();
    let pair = compiled.pair().unwrap();
    let outcome = |n| ExecOutcome {
        affected_rows: n,
        generated_keys: Vec::new(),
    };
    assert_eq!(
        pair.validate(&outcome(2), &outcome(1)).unwrap_err(),
        ConsistencyFault::RowCountMismatch { first: 2, second: 1 }
    );
    assert!(pair.validate(&outcome(1), &outcome(1)).is_ok());
}

#[test]
fn test_select_expands_parent_columns() {
    let stmt = select([col("name"), col("breed")])
        .from(table(&dog()))
        .where_(col("name").eq(lit("rex")))
        .compile(&Dialect::sqlite())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT dog_p.name, dog.breed FROM dog INNER JOIN animal AS dog_p \
         ON dog_p.id = dog.id WHERE dog_p.name = 'rex'"
    );
}

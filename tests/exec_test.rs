//! Pair execution against an in-memory executor.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use qail_criteria::prelude::*;
use qail_criteria::{execute_compiled, execute_pair, ExecOutcome, QailResult, StmtExecutor};

/// Records every statement and answers from a script.
#[derive(Default)]
struct FakeTx {
    script: Vec<ExecOutcome>,
    log: Vec<Stmt>,
    rollback_only: bool,
}

impl FakeTx {
    fn new(script: Vec<ExecOutcome>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }
}

impl StmtExecutor for FakeTx {
    async fn execute(&mut self, stmt: &Stmt) -> QailResult<ExecOutcome> {
        self.log.push(stmt.clone());
        if self.script.is_empty() {
            return Err(QailError::execution("connection closed"));
        }
        Ok(self.script.remove(0))
    }

    fn mark_rollback_only(&mut self) {
        self.rollback_only = true;
    }
}

fn outcome(rows: u64, keys: Vec<Value>) -> ExecOutcome {
    ExecOutcome {
        affected_rows: rows,
        generated_keys: keys,
    }
}

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

#[tokio::test]
async fn test_generated_key_threads_into_child() {
    let compiled = insert_into(&dog())
        .columns(&["name", "breed"])
        .values(["rex", "lab"])
        .compile(&Dialect::postgres())
        .unwrap();
    let pair = compiled.pair().unwrap();
    let mut tx = FakeTx::new(vec![outcome(1, vec![Value::Int(99)]), outcome(1, Vec::new())]);

    execute_pair(&mut tx, pair).await.unwrap();

    assert_eq!(tx.log.len(), 2);
    assert_eq!(tx.log[1].params[0].value, Value::Int(99));
    assert_eq!(tx.log[1].params[1].value, Value::Text("lab".to_string()));
    assert!(!tx.rollback_only);
}

#[tokio::test]
async fn test_missing_generated_key_aborts_before_child() {
    let compiled = insert_into(&dog())
        .columns(&["name", "breed"])
        .values(["rex", "lab"])
        .compile(&Dialect::postgres())
        .unwrap();
    let pair = compiled.pair().unwrap();
    let mut tx = FakeTx::new(vec![outcome(1, Vec::new())]);

    let err = execute_pair(&mut tx, pair).await.unwrap_err();

    assert_eq!(
        err,
        QailError::Consistency(ConsistencyFault::GeneratedKeyMismatch { expected: 1, found: 0 })
    );
    assert_eq!(tx.log.len(), 1);
    assert!(tx.rollback_only);
}

#[tokio::test]
async fn test_update_pair_mismatch_marks_rollback() {
    let compiled = update(&dog())
        .set("breed", "pug")
        .set("name", "rex")
        .where_(col("breed").eq("lab").or(col("id").eq(1)))
        .visible(Visible::Both)
        .compile(&Dialect::postgres());
    // The filter reads a column the first statement assigns.
    assert!(compiled.is_err());

    let compiled = update(&dog())
        .set("breed", "pug")
        .set("name", "rex")
        .where_(col("id").eq(1))
        .compile(&Dialect::postgres())
        .unwrap();
    let mut tx = FakeTx::new(vec![outcome(2, Vec::new()), outcome(1, Vec::new())]);

    let err = execute_compiled(&mut tx, &compiled).await.unwrap_err();

    assert_eq!(
        err,
        QailError::Consistency(ConsistencyFault::RowCountMismatch { first: 2, second: 1 })
    );
    assert!(err.is_consistency_fault());
    assert!(tx.rollback_only);
}

#[tokio::test]
async fn test_batch_runs_each_group() {
    let items = TableMeta::builder("items")
        .generated_key("id", SqlType::BigInt)
        .field("name", SqlType::Text)
        .build()
        .unwrap();
    let compiled = insert_into(&items)
        .columns(&["name"])
        .values(["a"])
        .values(["b"])
        .batch()
        .compile(&Dialect::sqlite())
        .unwrap();
    assert_eq!(compiled.param_count(), 2);
    let mut tx = FakeTx::new(vec![outcome(1, Vec::new()), outcome(1, Vec::new())]);

    let outcomes = execute_compiled(&mut tx, &compiled).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(tx.log[0].sql, tx.log[1].sql);
    assert_eq!(tx.log[1].params[0].value, Value::Text("b".to_string()));
}

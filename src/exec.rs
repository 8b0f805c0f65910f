//! Execution-side protocol for compiled statements.
//!
//! The crate never talks to a database. Callers implement [`StmtExecutor`]
//! over their driver and transaction; [`execute_pair`] runs the two halves of
//! a [`PairStmt`] in order and validates their linkage.

use std::future::Future;

use tracing::{debug, warn};

use crate::ast::Value;
use crate::error::{QailError, QailResult};
use crate::render::{Compiled, Stmt};
use crate::split::PairStmt;

/// What the driver reports after running one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutcome {
    pub affected_rows: u64,
    /// Keys assigned by the server, from RETURNING or the driver's last
    /// insert id.
    pub generated_keys: Vec<Value>,
}

/// A driver bound to one open transaction.
pub trait StmtExecutor {
    fn execute(&mut self, stmt: &Stmt) -> impl Future<Output = QailResult<ExecOutcome>>;

    /// Poison the owning transaction; it must not commit.
    fn mark_rollback_only(&mut self);
}

/// Run both halves of `pair` inside the caller's transaction.
///
/// The second statement is dispatched only after the first completes. A
/// failure of the second statement or a consistency fault marks the
/// transaction rollback-only before the error is returned.
pub async fn execute_pair<E: StmtExecutor>(
    executor: &mut E,
    pair: &PairStmt,
) -> QailResult<(ExecOutcome, ExecOutcome)> {
    let first = executor.execute(&pair.first).await?;
    debug!(
        affected = first.affected_rows,
        keys = first.generated_keys.len(),
        "first statement of pair done"
    );

    let second_stmt = match pair.bind_generated_keys(&first.generated_keys) {
        Ok(stmt) => stmt,
        Err(e) => return Err(abort(executor, e)),
    };
    let second = match executor.execute(&second_stmt).await {
        Ok(outcome) => outcome,
        Err(e) => return Err(abort(executor, e)),
    };
    if let Err(fault) = pair.validate(&first, &second) {
        return Err(abort(executor, fault.into()));
    }
    Ok((first, second))
}

fn abort<E: StmtExecutor>(executor: &mut E, err: QailError) -> QailError {
    warn!(error = %err, "paired statement failed, transaction marked rollback-only");
    executor.mark_rollback_only();
    err
}

/// Run any compiled output; batches execute once per parameter group.
pub async fn execute_compiled<E: StmtExecutor>(
    executor: &mut E,
    compiled: &Compiled,
) -> QailResult<Vec<ExecOutcome>> {
    match compiled {
        Compiled::Single(stmt) => Ok(vec![executor.execute(stmt).await?]),
        Compiled::Batch(batch) => {
            let mut outcomes = Vec::with_capacity(batch.groups.len());
            for group in &batch.groups {
                let stmt = Stmt {
                    sql: batch.sql.clone(),
                    params: group.clone(),
                    flags: batch.flags.clone(),
                    columns: Vec::new(),
                };
                outcomes.push(executor.execute(&stmt).await?);
            }
            Ok(outcomes)
        }
        Compiled::Pair(pair) => {
            let (first, second) = execute_pair(executor, pair).await?;
            Ok(vec![first, second])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsistencyFault;
    use crate::render::StmtFlags;
    use crate::split::Linkage;

    struct Scripted {
        outcomes: Vec<ExecOutcome>,
        seen: Vec<String>,
        rollback_only: bool,
    }

    impl StmtExecutor for Scripted {
        async fn execute(&mut self, stmt: &Stmt) -> QailResult<ExecOutcome> {
            self.seen.push(stmt.sql.clone());
            if self.outcomes.is_empty() {
                return Err(QailError::execution("no scripted outcome"));
            }
            Ok(self.outcomes.remove(0))
        }

        fn mark_rollback_only(&mut self) {
            self.rollback_only = true;
        }
    }

    fn stmt(sql: &str) -> Stmt {
        Stmt {
            sql: sql.to_string(),
            params: Vec::new(),
            flags: StmtFlags::default(),
            columns: Vec::new(),
        }
    }

    fn rows(n: u64) -> ExecOutcome {
        ExecOutcome {
            affected_rows: n,
            generated_keys: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_second_failure_marks_rollback() {
        let pair = PairStmt {
            first: stmt("A"),
            second: stmt("B"),
            linkage: Linkage::RowCountEcho,
        };
        let mut exec = Scripted {
            outcomes: vec![rows(1)],
            seen: Vec::new(),
            rollback_only: false,
        };
        let err = execute_pair(&mut exec, &pair).await.unwrap_err();
        assert!(matches!(err, QailError::Execution(_)));
        assert!(exec.rollback_only);
        assert_eq!(exec.seen, ["A", "B"]);
    }

    #[tokio::test]
    async fn test_matching_counts_pass() {
        let pair = PairStmt {
            first: stmt("A"),
            second: stmt("B"),
            linkage: Linkage::RowCountEcho,
        };
        let mut exec = Scripted {
            outcomes: vec![rows(3), rows(3)],
            seen: Vec::new(),
            rollback_only: false,
        };
        let (a, b) = execute_pair(&mut exec, &pair).await.unwrap();
        assert_eq!(a.affected_rows, b.affected_rows);
        assert!(!exec.rollback_only);
    }

    #[tokio::test]
    async fn test_mismatch_is_fault() {
        let pair = PairStmt {
            first: stmt("A"),
            second: stmt("B"),
            linkage: Linkage::RowCountEcho,
        };
        let mut exec = Scripted {
            outcomes: vec![rows(2), rows(1)],
            seen: Vec::new(),
            rollback_only: false,
        };
        let err = execute_pair(&mut exec, &pair).await.unwrap_err();
        assert_eq!(
            err,
            QailError::Consistency(ConsistencyFault::RowCountMismatch { first: 2, second: 1 })
        );
        assert!(exec.rollback_only);
    }
}

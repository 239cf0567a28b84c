//! Scoped connection use: acquire, run, release on every exit path.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;

use trellis_core::{Statement, StatementPattern};

use crate::error::{ClientError, Result};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::transport::PreparedQuery;

impl ConnectionPool {
    /// Run `op` against one pooled connection.
    ///
    /// `op` owns the connection for the duration of its future, and the
    /// future is dropped (releasing the connection) before this returns,
    /// whether it succeeded, failed, or panicked. A panic is caught here,
    /// logged, and reported as [`ClientError::Panicked`]; the connection it
    /// was using is discarded rather than reused. Pool errors from
    /// acquiring the connection are returned as-is.
    ///
    /// `op` must not move the connection into its output.
    pub async fn with_connection<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(PooledConnection) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let conn = self.acquire().await?;
        let handle = conn.id();

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| op(conn))) {
            Ok(fut) => {
                let mut scoped = Box::pin(AssertUnwindSafe(fut).catch_unwind());
                let outcome = scoped.as_mut().await;
                if outcome.is_err() {
                    self.poison(handle);
                }
                // Releases the connection held by the operation.
                drop(scoped);
                outcome
            }
            Err(payload) => Err(payload),
        };

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(connection = %handle, error = %e, "Scoped operation failed");
                Err(e)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(connection = %handle, panic = %message, "Scoped operation panicked");
                Err(ClientError::Panicked { message })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The single write performed inside a transaction.
pub(crate) enum TxnWrite<'a> {
    Update(&'a PreparedQuery),
    Add(&'a [Statement]),
    Remove(&'a StatementPattern),
}

impl TxnWrite<'_> {
    fn action(&self) -> &'static str {
        match self {
            Self::Update(_) => "update",
            Self::Add(_) => "insert",
            Self::Remove(_) => "remove",
        }
    }
}

/// Run `write` as begin → write → commit.
///
/// Any failure after `begin` is rolled back before returning. If the
/// rollback fails too, the connection is poisoned so it is never reused
/// with a transaction left open. The same holds if this future is dropped
/// before the transaction ends.
pub(crate) async fn write_transaction(
    conn: &mut PooledConnection,
    write: TxnWrite<'_>,
) -> Result<()> {
    let action = write.action();
    // Marked before `begin` so a cancelled begin also discards the connection.
    conn.set_in_transaction(true);
    if let Err(e) = conn.begin().await {
        conn.set_in_transaction(false);
        return Err(ClientError::operation("begin transaction")(e));
    }

    let applied = match write {
        TxnWrite::Update(q) => conn.update(q).await,
        TxnWrite::Add(statements) => conn.add(statements).await,
        TxnWrite::Remove(pattern) => conn.remove(pattern).await,
    };
    let committed = match applied {
        Ok(()) => conn.commit().await,
        Err(e) => Err(e),
    };

    let Err(source) = committed else {
        conn.set_in_transaction(false);
        return Ok(());
    };

    tracing::warn!(connection = %conn.id(), action, error = %source, "Rolling back transaction");
    match conn.rollback().await {
        Ok(()) => conn.set_in_transaction(false),
        Err(e) => {
            tracing::error!(connection = %conn.id(), error = %e, "Rollback failed");
            conn.poison();
        }
    }
    Err(ClientError::OperationFailure { action, source })
}

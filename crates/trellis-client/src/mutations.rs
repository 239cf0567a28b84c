//! Write operations: statement insert and pattern removal.
//!
//! Each call is one transaction. Input is resolved into statements before
//! a connection is acquired, so malformed input never opens a transaction.

use trellis_core::{InputError, RemovePattern, Triples};

use crate::client::TripleStoreClient;
use crate::error::{ClientError, Result};
use crate::session::{write_transaction, TxnWrite};

impl TripleStoreClient {
    /// Add one triple or a batch of triples in a single transaction.
    ///
    /// Subjects and predicates are read as IRIs. Objects are classified by
    /// native type: URIs become resources, strings plain literals, integers
    /// and timestamps typed literals, and RDF values pass through. Returns
    /// the number of statements added.
    pub async fn insert(&self, rows: impl Into<Triples>) -> Result<usize> {
        let triples = rows.into();
        if triples.is_empty() {
            return Err(ClientError::InvalidInput(InputError::EmptyBatch));
        }
        let statements = triples.to_statements()?;
        let count = statements.len();

        self.pool()
            .with_connection(|mut conn| async move {
                tracing::debug!(connection = %conn.id(), count, "Adding statements");
                write_transaction(&mut conn, TxnWrite::Add(&statements)).await?;
                Ok(count)
            })
            .await
    }

    /// Insert from loosely typed JSON: `[s, p, o]` or `[[s, p, o], ...]`.
    pub async fn insert_json(&self, value: &serde_json::Value) -> Result<usize> {
        self.insert(Triples::from_json(value)?).await
    }

    /// Remove every statement matching `pattern` in a single transaction.
    ///
    /// Unset fields are unconstrained; an empty pattern removes everything.
    pub async fn remove(&self, pattern: RemovePattern) -> Result<()> {
        let resolved = pattern.resolve()?;
        if resolved.is_unconstrained() {
            tracing::warn!("Removing all statements: pattern has no constraints");
        }

        self.pool()
            .with_connection(|mut conn| async move {
                tracing::debug!(connection = %conn.id(), pattern = %resolved, "Removing statements");
                write_transaction(&mut conn, TxnWrite::Remove(&resolved)).await
            })
            .await
    }
}

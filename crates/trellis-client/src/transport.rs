//! Transport seam between the pool and a triple-store server.
//!
//! The wire protocol is owned by the implementor. The pool only needs to
//! open sessions, run reads and writes on them, and close them.

use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;

use trellis_core::{PoolConfig, RdfValue, ReasoningMode, Statement, StatementPattern};

/// Errors reported by a transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Server unreachable: {0}")]
    Unreachable(String),

    #[error("Authentication rejected: {0}")]
    Authentication(String),

    #[error("Server rejected request: {0}")]
    Server(String),

    #[error("Connection lost: {0}")]
    Disconnected(String),
}

/// Query text with every parameter already converted to the value model.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    pub text: String,
    /// Named bindings, in the order they were supplied.
    pub named: IndexMap<String, RdfValue>,
    /// Positional bindings for `?1`, `?2`, ...
    pub positional: Vec<RdfValue>,
    pub reasoning: ReasoningMode,
}

/// Opens sessions against a server.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open and authenticate one session using `config`'s endpoint,
    /// credentials, and reasoning mode.
    async fn connect(&self, config: &PoolConfig) -> Result<Box<dyn Connection>, TransportError>;
}

/// One live server session. Never shared between concurrent operations.
#[async_trait]
pub trait Connection: Send {
    /// Open a read cursor. The cursor borrows the connection until dropped.
    async fn select<'a>(
        &'a mut self,
        query: &PreparedQuery,
    ) -> Result<Box<dyn Cursor + 'a>, TransportError>;

    /// Execute a write query inside the current transaction.
    async fn update(&mut self, query: &PreparedQuery) -> Result<(), TransportError>;

    async fn begin(&mut self) -> Result<(), TransportError>;

    async fn add(&mut self, statements: &[Statement]) -> Result<(), TransportError>;

    /// Remove every statement matching `pattern` (`None` fields match any).
    async fn remove(&mut self, pattern: &StatementPattern) -> Result<(), TransportError>;

    async fn commit(&mut self) -> Result<(), TransportError>;

    async fn rollback(&mut self) -> Result<(), TransportError>;

    /// Whether the session can be handed to another caller.
    fn is_healthy(&self) -> bool {
        true
    }

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// A forward-only result cursor.
#[async_trait]
pub trait Cursor: Send {
    /// Projected variable names, in declaration order.
    fn variables(&self) -> &[String];

    /// Next row, one value per variable. `None` when exhausted.
    async fn next_row(&mut self) -> Result<Option<Vec<RdfValue>>, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

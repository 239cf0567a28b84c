//! Trellis Client — pooled access to a remote RDF triple store.
//!
//! All reads and writes flow through a bounded [`ConnectionPool`]. Every
//! operation borrows exactly one connection for its duration and returns it
//! on every exit path, including errors and panics. Transports plug in
//! through the [`Connector`] / [`Connection`] traits; [`MemoryConnector`]
//! is an in-process implementation for tests and embedded use.

pub mod client;
pub mod error;
pub mod memory;
pub mod mutations;
pub mod pool;
pub mod query;
pub mod session;
pub mod transport;

pub use client::TripleStoreClient;
pub use error::{BoxError, ClientError, Result};
pub use memory::{FaultPoint, MemoryConnector, Request};
pub use pool::{ConnectionId, ConnectionPool, PoolStatus, PooledConnection};
pub use query::{sparql, Row, Sparql};
pub use transport::{Connection, Connector, Cursor, PreparedQuery, TransportError};

pub use trellis_core::{
    Credentials, Iri, Literal, NativeValue, PoolConfig, RdfValue, ReasoningMode, RemovePattern,
    Statement, StatementPattern, TripleInput, Triples,
};

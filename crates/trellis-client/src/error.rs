//! Error types for the trellis-client crate.

use std::time::Duration;

use thiserror::Error;
use trellis_core::{ConfigError, InputError, ValueError};

use crate::pool::ConnectionId;
use crate::transport::TransportError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection pool exhausted: none available after {waited:?} (max_size {max_size})")]
    PoolExhausted { max_size: usize, waited: Duration },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Failed to connect to {endpoint}: {source}")]
    ConnectionFailure {
        endpoint: String,
        #[source]
        source: TransportError,
    },

    #[error("Invalid connection handle {handle}: {reason}")]
    InvalidHandle {
        handle: ConnectionId,
        reason: &'static str,
    },

    #[error("Unsupported type {type_name} for parameter {name}")]
    UnsupportedParameterType {
        name: String,
        type_name: &'static str,
    },

    #[error("{action} failed: {source}")]
    OperationFailure {
        action: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("Conversion failure: {0}")]
    ConversionFailure(#[from] ValueError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("Row handler failed: {0}")]
    RowHandler(#[source] BoxError),

    #[error("Scoped operation panicked: {message}")]
    Panicked { message: String },
}

impl ClientError {
    /// Wrap a transport error raised while performing `action`.
    pub(crate) fn operation(action: &'static str) -> impl FnOnce(TransportError) -> Self {
        move |source| Self::OperationFailure { action, source }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

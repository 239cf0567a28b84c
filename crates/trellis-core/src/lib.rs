//! trellis-core: Shared types for the Trellis triple-store client.
//!
//! This crate holds everything that does not need a live server:
//! - The RDF value model (`RdfValue`, `Iri`, `Literal`) and conversion
//!   from/to native application values (`NativeValue`)
//! - Statements, insert batches, and removal patterns
//! - Pool configuration and its file/environment loader
//! - Common error types

pub mod config;
pub mod error;
pub mod statement;
pub mod value;
pub mod vocab;

pub use config::{Credentials, PoolConfig, ReasoningMode};
pub use error::{ConfigError, InputError, ValueError};
pub use statement::{RemovePattern, Statement, StatementPattern, TripleInput, Triples};
pub use value::{Iri, Literal, NativeValue, RdfValue};

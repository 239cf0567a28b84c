use thiserror::Error;

/// Errors raised while mapping values to or from the RDF value model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("Unsupported native type: {type_name}")]
    Unsupported { type_name: &'static str },

    #[error("Invalid IRI <{iri}>: {reason}")]
    InvalidIri { iri: String, reason: String },

    #[error("Malformed literal {lexical:?} for datatype <{datatype}>")]
    MalformedLiteral { lexical: String, datatype: String },

    #[error("Expected a resource, found {found}")]
    NotAResource { found: &'static str },

    #[error("Unbound value is not allowed as {position}")]
    Unbound { position: &'static str },

    #[error("Row does not match target type: {0}")]
    Shape(String),
}

/// Errors raised by malformed caller input at the client boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Statement batch is empty")]
    EmptyBatch,

    #[error("Triple at index {index} has {len} elements, expected 3")]
    TripleArity { index: usize, len: usize },

    #[error("Triple at index {index} is not an array")]
    NotATriple { index: usize },

    #[error("Triple at index {index}: {position} must be a string")]
    NotAString {
        index: usize,
        position: &'static str,
    },

    #[error("Removal takes exactly 4 fields (subject, predicate, object, graph), got {0}")]
    RemoveArity(usize),
}

/// Errors from loading or validating pool configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid pool size: min_size {min_size} exceeds max_size {max_size}")]
    PoolSize { min_size: usize, max_size: usize },

    #[error("Invalid pool size: max_size {max_size} exceeds the limit of {limit}")]
    PoolTooLarge { max_size: usize, limit: usize },

    #[error("Endpoint must not be empty")]
    EmptyEndpoint,

    #[error("Config load error: {0}")]
    Load(#[from] config::ConfigError),
}

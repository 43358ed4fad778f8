//! Error types for shadervar operations

use crate::target::ShaderStage;
use thiserror::Error;

/// Error type for shadervar operations
#[derive(Error, Debug)]
pub enum Error {
    /// Variant index outside the option space of a stage
    #[error("Invalid variant index {index} for {stage} stage (only {count} variants available)")]
    InvalidIndex {
        /// Stage the index was requested for
        stage: ShaderStage,
        /// The requested index
        index: u32,
        /// Number of variants available for the stage
        count: u32,
    },

    /// A read ran past the end of the bound buffer
    #[error("Stream truncated at offset {offset}")]
    StreamTruncated {
        /// Cursor position when the short read happened
        offset: usize,
    },

    /// A reflected value does not fit its 16-bit storage
    #[error("{what} exceeds the maximum supported value ({value} > {limit})")]
    Overflow {
        /// Description of the offending field
        what: String,
        /// The value that was read
        value: u64,
        /// The largest value that can be stored
        limit: u64,
    },

    /// Shader compilation failed
    #[error("Compilation failed: {}", messages.join("; "))]
    Compilation {
        /// Diagnostic messages from the compiler, one per line
        messages: Vec<String>,
    },

    /// Reflection data could not be extracted
    #[error("Reflection failed: {0}")]
    Reflection(String),

    /// A variant name does not encode a stage tag and index
    #[error("Invalid variant name: {0:?}")]
    InvalidVariantName(String),

    /// Malformed bytecode container or package
    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    /// Invalid parameter provided
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Include file not found
    #[error("Include file not found: {0}")]
    IncludeNotFound(String),

    /// UTF-8 encoding error
    #[error("UTF-8 encoding error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds an [`Error::Overflow`] for a value checked against a 16-bit limit.
    pub(crate) fn overflow(what: impl Into<String>, value: impl Into<u64>, limit: impl Into<u64>) -> Self {
        Error::Overflow {
            what: what.into(),
            value: value.into(),
            limit: limit.into(),
        }
    }
}

/// Result type for shadervar operations
pub type Result<T> = std::result::Result<T, Error>;

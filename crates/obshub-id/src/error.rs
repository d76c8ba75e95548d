//! Error types for identifier encoding and decoding.

use thiserror::Error;

/// Errors that can occur when building, encoding, or decoding identifiers.
#[derive(Debug, Error)]
pub enum IdError {
    /// A text or external id could not be decoded.
    #[error("error decoding id '{input}': {reason}")]
    Decode {
        /// The offending input, verbatim.
        input: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// The id cannot be represented as a single 63-bit integer.
    #[error("id cannot be represented as a long")]
    NotRepresentable,

    /// Long-backed local ids must be strictly positive.
    #[error("invalid local id {0}: long ids must be > 0")]
    InvalidLocalId(i64),

    /// Only the NONE sentinel may have an empty local part.
    #[error("local id cannot be empty (scope {0})")]
    EmptyLocalId(i32),

    /// A key for an id encoder is malformed.
    #[error("invalid {kind} id key: {reason}")]
    InvalidKey {
        /// The resource kind the key belongs to.
        kind: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The id key file could not be read or written.
    #[error("id key file error: {0}")]
    KeyFileIo(#[from] std::io::Error),

    /// The id key file is not valid TOML.
    #[error("failed to parse id key file: {0}")]
    KeyFileParse(#[from] toml::de::Error),

    /// The id key file could not be serialised.
    #[error("failed to serialise id key file: {0}")]
    KeyFileSerialize(#[from] toml::ser::Error),
}

impl IdError {
    pub(crate) fn decode(input: &str, reason: &'static str) -> Self {
        Self::Decode {
            input: input.to_string(),
            reason,
        }
    }
}

//! Errors produced while decoding wire-format data.

use std::io;

/// An error produced while serializing or deserializing a wire-format value.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("io error reading/writing wire data: {0}")]
    Io(#[from] io::Error),

    /// A malformed or out-of-range field. Callers should discard the
    /// offending entry and continue processing the rest of the message
    /// (spec: parse/decode failures are never fatal).
    #[error("parse error: {0}")]
    Parse(&'static str),
}

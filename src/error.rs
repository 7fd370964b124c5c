//! Error type shared by both quantization engines.

use thiserror::Error;

/// The error type returned by the quantization engines.
///
/// Engines never retry and never emit partial results; a call either
/// produces a complete palette and index buffer or one of these.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A caller-supplied value is outside its allowed range.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// An internal consistency check failed; no palette was produced.
    #[error("internal error: {0}")]
    InternalError(String),
    /// The input image could not be decoded into an ARGB pixel buffer.
    #[cfg(feature = "image")]
    #[error("unsupported image format")]
    UnsupportedFormat,
}

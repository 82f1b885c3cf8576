use thiserror::Error;

/// Error raised by a carrier implementation while reading or writing entries.
pub type CarrierError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned when injecting or extracting a span context.
///
/// A carrier without any propagation headers is not an error: extraction
/// reports it as `Ok((None, _))`.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PropagationError {
    /// The carrier does not support the text map format, e.g. a byte stream.
    #[error("invalid carrier: only text map carriers are supported")]
    InvalidCarrier,

    /// A propagation header was present but could not be parsed.
    #[error("span context corrupted: {0}")]
    SpanContextCorrupted(&'static str),

    /// The carrier failed to read or write an entry.
    #[error("carrier operation failed: {0}")]
    Carrier(#[source] CarrierError),
}

impl PropagationError {
    /// Wrap an error raised by a carrier implementation.
    pub fn carrier<E>(err: E) -> Self
    where
        E: Into<CarrierError>,
    {
        PropagationError::Carrier(err.into())
    }

    /// Returns `true` if the error reports a malformed propagation header.
    pub fn is_corrupted(&self) -> bool {
        matches!(self, PropagationError::SpanContextCorrupted(_))
    }
}

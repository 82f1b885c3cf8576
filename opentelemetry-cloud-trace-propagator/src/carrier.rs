//! Carriers moving propagation headers across a process boundary.
//!
//! The propagator reads and writes string key/value pairs through
//! [`TextMapWriter`] and [`TextMapReader`]. Callers hand a carrier to the
//! propagator wrapped in [`InjectCarrier`] or [`ExtractCarrier`], which also
//! have a byte-stream variant; the propagator rejects byte streams with
//! [`PropagationError::InvalidCarrier`] without touching them.
use crate::error::PropagationError;
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;
use std::io;

/// Visitor invoked once per carrier entry.
pub type Visit<'v> = dyn FnMut(&str, &str) -> Result<(), PropagationError> + 'v;

/// Write side of a text map carrier, e.g. outgoing request headers.
pub trait TextMapWriter {
    /// Write `value` under `key`. Keys are written with their exact case.
    fn set(&mut self, key: &str, value: &str) -> Result<(), PropagationError>;
}

/// Read side of a text map carrier, e.g. incoming request headers.
pub trait TextMapReader {
    /// Call `visit` for every entry, in no particular order.
    ///
    /// Iteration stops at the first error, which is returned unchanged.
    fn for_each_key(&self, visit: &mut Visit<'_>) -> Result<(), PropagationError>;
}

impl<S: BuildHasher> TextMapWriter for HashMap<String, String, S> {
    /// Insert the entry, keeping the key's case.
    fn set(&mut self, key: &str, value: &str) -> Result<(), PropagationError> {
        self.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

impl<S: BuildHasher> TextMapReader for HashMap<String, String, S> {
    fn for_each_key(&self, visit: &mut Visit<'_>) -> Result<(), PropagationError> {
        for (key, value) in self {
            visit(key.as_str(), value.as_str())?;
        }
        Ok(())
    }
}

/// Ordered list of entries; unlike a map it may hold the same key twice.
impl TextMapWriter for Vec<(String, String)> {
    fn set(&mut self, key: &str, value: &str) -> Result<(), PropagationError> {
        self.push((key.to_owned(), value.to_owned()));
        Ok(())
    }
}

impl TextMapReader for Vec<(String, String)> {
    fn for_each_key(&self, visit: &mut Visit<'_>) -> Result<(), PropagationError> {
        for (key, value) in self {
            visit(key.as_str(), value.as_str())?;
        }
        Ok(())
    }
}

#[cfg(feature = "http")]
impl TextMapWriter for http::HeaderMap {
    /// Insert the header, replacing any previous value.
    ///
    /// Header names are normalized to lowercase by `http`. Names or values
    /// that are not valid in an HTTP header are reported as
    /// [`PropagationError::Carrier`].
    fn set(&mut self, key: &str, value: &str) -> Result<(), PropagationError> {
        let name =
            http::header::HeaderName::from_bytes(key.as_bytes()).map_err(PropagationError::carrier)?;
        let value = http::header::HeaderValue::from_str(value).map_err(PropagationError::carrier)?;
        self.insert(name, value);
        Ok(())
    }
}

#[cfg(feature = "http")]
impl TextMapReader for http::HeaderMap {
    /// Visit every header value. Values that are not visible ASCII are skipped.
    fn for_each_key(&self, visit: &mut Visit<'_>) -> Result<(), PropagationError> {
        for (name, value) in self {
            if let Ok(value) = value.to_str() {
                visit(name.as_str(), value)?;
            }
        }
        Ok(())
    }
}

/// Destination for [`inject`](crate::Propagator::inject).
pub enum InjectCarrier<'a> {
    /// A string key/value carrier.
    TextMap(&'a mut dyn TextMapWriter),
    /// A raw byte stream. Not supported by this format.
    Binary(&'a mut dyn io::Write),
}

impl<'a, W: TextMapWriter> From<&'a mut W> for InjectCarrier<'a> {
    fn from(writer: &'a mut W) -> Self {
        InjectCarrier::TextMap(writer)
    }
}

impl fmt::Debug for InjectCarrier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectCarrier::TextMap(_) => f.write_str("InjectCarrier::TextMap"),
            InjectCarrier::Binary(_) => f.write_str("InjectCarrier::Binary"),
        }
    }
}

/// Source for [`extract`](crate::Propagator::extract).
pub enum ExtractCarrier<'a> {
    /// A string key/value carrier.
    TextMap(&'a dyn TextMapReader),
    /// A raw byte stream. Not supported by this format.
    Binary(&'a mut dyn io::Read),
}

impl<'a, R: TextMapReader> From<&'a R> for ExtractCarrier<'a> {
    fn from(reader: &'a R) -> Self {
        ExtractCarrier::TextMap(reader)
    }
}

impl fmt::Debug for ExtractCarrier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractCarrier::TextMap(_) => f.write_str("ExtractCarrier::TextMap"),
            ExtractCarrier::Binary(_) => f.write_str("ExtractCarrier::Binary"),
        }
    }
}

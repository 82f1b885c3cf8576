//! # Cloud Trace Context Propagator
//!
//! Span contexts travel in a single composite header:
//!
//! `x-cloud-trace-context: {trace_id}/{span_id};o={sampled}`
//!
//! - `trace_id`: hex trace id, left-padded with zeros to 32 characters on
//!   inject. Shorter ids are accepted on extract.
//! - `span_id`: the span id as an unsigned decimal integer.
//! - `sampled`: `1` or `0` on inject. Extraction accepts the literals of Go's
//!   `strconv.ParseBool`, as other Zipkin/OpenTracing tracers do.
//!
//! Baggage items travel as one header each, `ot-baggage-{key}: {value}`.
use crate::carrier::{ExtractCarrier, InjectCarrier};
use crate::error::PropagationError;
use crate::span_context::{SpanContext, TraceFlags, TraceId};
use std::collections::HashMap;

pub(crate) const CLOUD_TRACE_CONTEXT_HEADER: &str = "x-cloud-trace-context";
// Convention of the OpenTracing basic tracers.
pub(crate) const BAGGAGE_PREFIX: &str = "ot-baggage-";

// Only the trace id and span id are counted. Peers count the same way, so the
// sampled flag stays out of the tally.
const REQUIRED_FIELD_COUNT: usize = 2;

/// Baggage items propagated next to a span context.
pub type Baggage = HashMap<String, String>;

/// Injects and extracts [`SpanContext`]s using the `x-cloud-trace-context`
/// header and `ot-baggage-` prefixed baggage headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Propagator {
    header_name: &'static str,
    baggage_prefix: &'static str,
}

impl Default for Propagator {
    fn default() -> Self {
        Propagator::new()
    }
}

impl Propagator {
    /// Create a propagator using the default header and baggage prefix.
    pub const fn new() -> Self {
        Propagator {
            header_name: CLOUD_TRACE_CONTEXT_HEADER,
            baggage_prefix: BAGGAGE_PREFIX,
        }
    }

    /// Create a propagator with a custom header name.
    pub fn with_custom_header(custom_header_name: &'static str) -> Self {
        Self::with_custom_header_and_baggage(custom_header_name, BAGGAGE_PREFIX)
    }

    /// Create a propagator with a custom header name and baggage prefix.
    ///
    /// NOTE: an empty (or whitespace only) header name or prefix falls back to
    /// the default, `x-cloud-trace-context` and `ot-baggage-` respectively.
    /// The format of the header value does not change.
    pub fn with_custom_header_and_baggage(
        custom_header_name: &'static str,
        custom_baggage_prefix: &'static str,
    ) -> Self {
        let header_name = match custom_header_name.trim() {
            "" => CLOUD_TRACE_CONTEXT_HEADER,
            name => name,
        };
        let baggage_prefix = match custom_baggage_prefix.trim() {
            "" => BAGGAGE_PREFIX,
            prefix => prefix,
        };

        Propagator {
            header_name,
            baggage_prefix,
        }
    }

    /// Name of the composite header, as written on inject.
    pub fn header_name(&self) -> &'static str {
        self.header_name
    }

    /// Prefix prepended to every baggage key.
    pub fn baggage_prefix(&self) -> &'static str {
        self.baggage_prefix
    }

    /// Write `span_context` and `baggage` into `carrier`.
    ///
    /// The composite header is written first; if that fails no baggage is
    /// written. Baggage is written in iteration order and the first failing
    /// write aborts the rest. Entries already written are left in place.
    pub fn inject<'a>(
        &self,
        carrier: impl Into<InjectCarrier<'a>>,
        span_context: &SpanContext,
        baggage: &Baggage,
    ) -> Result<(), PropagationError> {
        let writer = match carrier.into() {
            InjectCarrier::TextMap(writer) => writer,
            InjectCarrier::Binary(_) => {
                cloud_trace_debug!(
                    name: "CloudTracePropagator.Inject.InvalidCarrier",
                    message = "binary carriers are not supported",
                );
                return Err(PropagationError::InvalidCarrier);
            }
        };

        let header_value = format!(
            "{}/{};o={}",
            span_context.trace_id().to_padded_hex(),
            span_context.span_id(),
            if span_context.is_sampled() { "1" } else { "0" },
        );
        writer
            .set(self.header_name, &header_value)
            .inspect_err(|err| self.log_write_failure(self.header_name, err))?;

        let mut baggage_key = String::from(self.baggage_prefix);
        for (key, value) in baggage {
            baggage_key.truncate(self.baggage_prefix.len());
            baggage_key.push_str(key);
            writer
                .set(&baggage_key, value)
                .inspect_err(|err| self.log_write_failure(&baggage_key, err))?;
        }
        Ok(())
    }

    /// Read a span context and baggage from `carrier`.
    ///
    /// Returns `Ok((None, baggage))` when the carrier holds no composite
    /// header. A composite header that does not parse aborts the scan with
    /// [`PropagationError::SpanContextCorrupted`]. Extracted contexts never
    /// carry a parent id.
    pub fn extract<'a>(
        &self,
        carrier: impl Into<ExtractCarrier<'a>>,
    ) -> Result<(Option<SpanContext>, Baggage), PropagationError> {
        let reader = match carrier.into() {
            ExtractCarrier::TextMap(reader) => reader,
            ExtractCarrier::Binary(_) => {
                cloud_trace_debug!(
                    name: "CloudTracePropagator.Extract.InvalidCarrier",
                    message = "binary carriers are not supported",
                );
                return Err(PropagationError::InvalidCarrier);
            }
        };

        let mut extraction = Extraction::default();
        let scanned =
            reader.for_each_key(&mut |key, value| self.visit_entry(&mut extraction, key, value));
        scanned
            .and_then(|()| extraction.finish())
            .inspect_err(|err| {
                let error = err.to_string();
                cloud_trace_warn!(
                    name: "CloudTracePropagator.Extract.Failed",
                    header_name = self.header_name,
                    error = error.as_str(),
                );
            })
    }

    fn visit_entry(
        &self,
        extraction: &mut Extraction,
        key: &str,
        value: &str,
    ) -> Result<(), PropagationError> {
        if equal_ignore_case(key, self.header_name) {
            let fields = CompositeHeader::parse(value)?;

            extraction.trace_id = TraceId::from_hex(fields.trace_id)
                .ok_or(PropagationError::SpanContextCorrupted("invalid trace id"))?;
            extraction.required_field_count += 1;

            extraction.span_id = parse_span_id(fields.span_id)
                .ok_or(PropagationError::SpanContextCorrupted("invalid span id"))?;
            extraction.required_field_count += 1;

            let sampled = parse_bool(fields.sampled)
                .ok_or(PropagationError::SpanContextCorrupted("invalid sampled flag"))?;
            if sampled {
                extraction.flags |= TraceFlags::SAMPLED;
            }
        } else if let Some(baggage_key) = strip_prefix_ignore_case(key, self.baggage_prefix) {
            extraction
                .baggage
                .insert(baggage_key.to_owned(), value.to_owned());
        }
        Ok(())
    }

    fn log_write_failure(&self, key: &str, err: &PropagationError) {
        let error = err.to_string();
        cloud_trace_debug!(
            name: "CloudTracePropagator.Inject.WriteFailed",
            key = key,
            error = error.as_str(),
        );
    }
}

/// State accumulated while scanning a carrier.
#[derive(Debug, Default)]
struct Extraction {
    required_field_count: usize,
    trace_id: TraceId,
    span_id: u64,
    flags: TraceFlags,
    baggage: Baggage,
}

impl Extraction {
    fn finish(self) -> Result<(Option<SpanContext>, Baggage), PropagationError> {
        match self.required_field_count {
            0 => Ok((None, self.baggage)),
            REQUIRED_FIELD_COUNT => Ok((
                Some(SpanContext::new(
                    self.trace_id,
                    self.span_id,
                    None,
                    self.flags,
                )),
                self.baggage,
            )),
            _ => Err(PropagationError::SpanContextCorrupted(
                "unexpected number of trace context fields",
            )),
        }
    }
}

/// The three leaf fields of `{trace_id}/{span_id};o={sampled}`.
#[derive(Debug, PartialEq, Eq)]
struct CompositeHeader<'a> {
    trace_id: &'a str,
    span_id: &'a str,
    sampled: &'a str,
}

impl<'a> CompositeHeader<'a> {
    /// Split a header value. Every delimiter must split into exactly two
    /// parts. The option name before `=` is not checked.
    fn parse(value: &'a str) -> Result<Self, PropagationError> {
        let (trace_id, rest) = split_pair(value, '/').ok_or(
            PropagationError::SpanContextCorrupted("expected one '/' in trace context"),
        )?;
        let (span_id, options) = split_pair(rest, ';').ok_or(
            PropagationError::SpanContextCorrupted("expected one ';' in trace context"),
        )?;
        let (_, sampled) = split_pair(options, '=').ok_or(
            PropagationError::SpanContextCorrupted("expected one '=' in trace context"),
        )?;

        Ok(CompositeHeader {
            trace_id,
            span_id,
            sampled,
        })
    }
}

/// Split `value` on `delimiter`, requiring exactly two parts.
fn split_pair(value: &str, delimiter: char) -> Option<(&str, &str)> {
    let mut parts = value.split(delimiter);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(second), None) => Some((first, second)),
        _ => None,
    }
}

/// Parse an unsigned decimal span id. Signs and whitespace are rejected.
fn parse_span_id(span_id: &str) -> Option<u64> {
    if span_id.is_empty() || !span_id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    span_id.parse().ok()
}

/// Follows Go's `strconv.ParseBool` so sampled flags written by other
/// Zipkin tracers are understood.
fn parse_bool(literal: &str) -> Option<bool> {
    match literal {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// ASCII case-insensitive comparison of header names.
pub(crate) fn equal_ignore_case(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .all(|(a, b)| a.to_ascii_lowercase() == b.to_ascii_lowercase())
}

/// Returns the rest of `key` if it starts with `prefix`, ignoring ASCII case.
/// Keys with nothing after the prefix do not match.
fn strip_prefix_ignore_case<'k>(key: &'k str, prefix: &str) -> Option<&'k str> {
    if key.len() <= prefix.len() {
        return None;
    }
    let head = key.get(..prefix.len())?;
    equal_ignore_case(head, prefix).then(|| &key[prefix.len()..])
}

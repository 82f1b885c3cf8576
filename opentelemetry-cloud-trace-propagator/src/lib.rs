//! Propagates span contexts and baggage using the `x-cloud-trace-context`
//! header, as understood by Google Cloud Trace and the Zipkin OpenTracing
//! tracers.
//!
//! A span context is written as a single header
//!
//! `x-cloud-trace-context: 0af7651916cd43dd8448eb211c80319c/67667974448284343;o=1`
//!
//! holding the 32 character hex trace id, the decimal span id and the sampled
//! flag. Every baggage item becomes its own `ot-baggage-{key}` header. Header
//! names are matched case-insensitively when extracting.
//!
//! Only text map carriers are supported: byte stream carriers are rejected
//! with [`PropagationError::InvalidCarrier`].
//!
//! ## Examples
//! ```
//! use opentelemetry_cloud_trace_propagator::{
//!     extract, inject, Baggage, SpanContext, TraceFlags, TraceId,
//! };
//! use std::collections::HashMap;
//!
//! # fn main() -> Result<(), opentelemetry_cloud_trace_propagator::PropagationError> {
//! let span_context = SpanContext::new(TraceId::new(0, 0x16), 42, None, TraceFlags::SAMPLED);
//! let mut baggage = Baggage::new();
//! baggage.insert("user".to_string(), "alice".to_string());
//!
//! // before sending a request to a downstream service
//! let mut headers: HashMap<String, String> = HashMap::new();
//! inject(&mut headers, &span_context, &baggage)?;
//! assert_eq!(
//!     headers["x-cloud-trace-context"],
//!     "00000000000000000000000000000016/42;o=1"
//! );
//!
//! // on the receiving side
//! let (extracted, extracted_baggage) = extract(&headers)?;
//! assert_eq!(extracted.map(|cx| cx.span_id()), Some(42));
//! assert_eq!(extracted_baggage, baggage);
//! # Ok(())
//! # }
//! ```
//!
//! With the `opentelemetry` feature, [`CloudTraceContextPropagator`] plugs the
//! same format into `opentelemetry::propagation::TextMapPropagator`.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(
    docsrs,
    feature(doc_cfg, doc_auto_cfg),
    deny(rustdoc::broken_intra_doc_links)
)]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

#[macro_use]
mod internal_logging;

#[cfg(feature = "opentelemetry")]
mod bridge;
pub mod carrier;
mod error;
mod propagator;
mod span_context;

#[cfg(feature = "opentelemetry")]
pub use bridge::CloudTraceContextPropagator;
pub use carrier::{ExtractCarrier, InjectCarrier, TextMapReader, TextMapWriter};
pub use error::{CarrierError, PropagationError};
pub use propagator::{Baggage, Propagator};
pub use span_context::{SpanContext, TraceFlags, TraceId};

/// Write `span_context` and `baggage` into `carrier` using the default
/// [`Propagator`].
pub fn inject<'a>(
    carrier: impl Into<InjectCarrier<'a>>,
    span_context: &SpanContext,
    baggage: &Baggage,
) -> Result<(), PropagationError> {
    Propagator::new().inject(carrier, span_context, baggage)
}

/// Read a span context and baggage from `carrier` using the default
/// [`Propagator`].
pub fn extract<'a>(
    carrier: impl Into<ExtractCarrier<'a>>,
) -> Result<(Option<SpanContext>, Baggage), PropagationError> {
    Propagator::new().extract(carrier)
}

//! [`TextMapPropagator`] implementation on top of [`Propagator`].
use crate::carrier::{ExtractCarrier, InjectCarrier, TextMapReader, TextMapWriter, Visit};
use crate::error::PropagationError;
use crate::propagator::{Baggage, Propagator};
use crate::span_context::{
    SpanContext as CloudSpanContext, TraceFlags as CloudTraceFlags, TraceId as CloudTraceId,
};
use opentelemetry::{
    baggage::BaggageExt,
    propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator},
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
    Context, KeyValue,
};

/// Propagates span contexts and baggage in the `x-cloud-trace-context` format
/// through the OpenTelemetry propagation API.
///
/// ## Examples
/// ```
/// # use opentelemetry::{propagation::TextMapPropagator, trace::TraceContextExt, Context};
/// # use opentelemetry_cloud_trace_propagator::CloudTraceContextPropagator;
/// let propagator = CloudTraceContextPropagator::new();
///
/// let mut headers = std::collections::HashMap::new();
/// headers.insert(
///     "x-cloud-trace-context".to_string(),
///     "105445aa7843bc8bf206b12000100000/1;o=1".to_string(),
/// );
/// let cx = propagator.extract(&headers);
/// assert!(cx.span().span_context().is_sampled());
/// ```
#[derive(Clone, Debug)]
pub struct CloudTraceContextPropagator {
    propagator: Propagator,
    fields: [String; 1],
}

impl Default for CloudTraceContextPropagator {
    fn default() -> Self {
        CloudTraceContextPropagator::new()
    }
}

impl CloudTraceContextPropagator {
    /// Create a propagator using the default header names.
    pub fn new() -> Self {
        Self::with_propagator(Propagator::new())
    }

    /// Create a propagator backed by a configured [`Propagator`].
    pub fn with_propagator(propagator: Propagator) -> Self {
        CloudTraceContextPropagator {
            propagator,
            fields: [propagator.header_name().to_owned()],
        }
    }
}

impl CloudTraceContextPropagator {
    /// Write the span context and baggage of `cx` into `carrier`.
    ///
    /// Nothing is written when `cx` holds no valid span context. Unlike
    /// [`TextMapPropagator::inject_context`], failures are returned.
    pub fn inject_into_carrier<'a>(
        &self,
        cx: &Context,
        carrier: impl Into<InjectCarrier<'a>>,
    ) -> Result<(), PropagationError> {
        let span = cx.span();
        let span_context = span.span_context();
        if !span_context.is_valid() {
            return Ok(());
        }

        let baggage: Baggage = cx
            .baggage()
            .iter()
            .map(|(key, (value, _))| (key.as_str().to_string(), value.as_str().to_string()))
            .collect();
        self.propagator
            .inject(carrier, &from_otel(span_context), &baggage)
    }

    /// Read a span context and baggage from `carrier` into a copy of `cx`.
    ///
    /// The crate's own carriers hand every entry over under its stored name,
    /// so mixed-case keys in a `HashMap` are matched here even though
    /// `Extractor for HashMap` only looks up lowercase keys. On error `cx` is
    /// returned unchanged.
    pub fn extract_from_carrier<'a>(
        &self,
        cx: &Context,
        carrier: impl Into<ExtractCarrier<'a>>,
    ) -> Context {
        let Ok((span_context, baggage)) = self.propagator.extract(carrier) else {
            return cx.clone();
        };

        let cx = if baggage.is_empty() {
            cx.clone()
        } else {
            cx.with_baggage(
                baggage
                    .into_iter()
                    .map(|(key, value)| KeyValue::new(key, value)),
            )
        };
        match span_context {
            Some(span_context) => cx.with_remote_span_context(to_otel(&span_context)),
            None => cx,
        }
    }
}

impl TextMapPropagator for CloudTraceContextPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        if let Err(err) = self.inject_into_carrier(cx, &mut InjectorWriter(injector)) {
            let error = err.to_string();
            cloud_trace_debug!(
                name: "CloudTracePropagator.InjectContext.Failed",
                error = error.as_str(),
            );
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        self.extract_from_carrier(cx, &ExtractorReader(extractor))
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(self.fields.as_ref())
    }
}

fn from_otel(span_context: &SpanContext) -> CloudSpanContext {
    let flags = if span_context.is_sampled() {
        CloudTraceFlags::SAMPLED
    } else {
        CloudTraceFlags::default()
    };
    CloudSpanContext::new(
        CloudTraceId::from_u128(u128::from_be_bytes(span_context.trace_id().to_bytes())),
        u64::from_be_bytes(span_context.span_id().to_bytes()),
        None,
        flags,
    )
}

fn to_otel(span_context: &CloudSpanContext) -> SpanContext {
    let flags = if span_context.is_sampled() {
        TraceFlags::SAMPLED
    } else {
        TraceFlags::default()
    };
    SpanContext::new(
        TraceId::from(span_context.trace_id().to_u128()),
        SpanId::from(span_context.span_id()),
        flags,
        true,
        TraceState::default(),
    )
}

struct InjectorWriter<'a>(&'a mut dyn Injector);

impl TextMapWriter for InjectorWriter<'_> {
    fn set(&mut self, key: &str, value: &str) -> Result<(), PropagationError> {
        self.0.set(key, value.to_owned());
        Ok(())
    }
}

struct ExtractorReader<'a>(&'a dyn Extractor);

impl TextMapReader for ExtractorReader<'_> {
    fn for_each_key(&self, visit: &mut Visit<'_>) -> Result<(), PropagationError> {
        let mut visited: Vec<(&str, &str)> = Vec::new();
        for key in self.0.keys() {
            let Some(value) = self.0.get(key) else {
                continue;
            };
            // Extractors that fold the key on lookup resolve every spelling
            // of a name to the same stored entry.
            if visited.iter().any(|(seen_key, seen_value)| {
                seen_key.eq_ignore_ascii_case(key) && std::ptr::eq(*seen_value, value)
            }) {
                continue;
            }
            visited.push((key, value));
            visit(key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;

    const TRACE_ID: u128 = 0x0af7_6519_16cd_43dd_8448_eb21_1c80_319c;
    const SPAN_ID: u64 = 0x00f0_67aa_0ba9_02b7;

    fn remote_context(flags: TraceFlags) -> SpanContext {
        SpanContext::new(
            TraceId::from(TRACE_ID),
            SpanId::from(SPAN_ID),
            flags,
            true,
            TraceState::default(),
        )
    }

    #[test]
    fn test_inject_context() {
        let propagator = CloudTraceContextPropagator::new();
        let cx = Context::new()
            .with_remote_span_context(remote_context(TraceFlags::SAMPLED))
            .with_baggage(vec![KeyValue::new("user", "alice")]);

        let mut injector: HashMap<String, String> = HashMap::new();
        propagator.inject_context(&cx, &mut injector);

        assert_eq!(
            injector.get("x-cloud-trace-context"),
            Some(&format!("0af7651916cd43dd8448eb211c80319c/{SPAN_ID};o=1"))
        );
        assert_eq!(
            injector.get("ot-baggage-user").map(String::as_str),
            Some("alice")
        );
    }

    #[test]
    fn test_inject_invalid_context() {
        let propagator = CloudTraceContextPropagator::new();
        let mut injector: HashMap<String, String> = HashMap::new();
        propagator.inject_context(&Context::new(), &mut injector);
        assert!(injector.is_empty());
    }

    #[test]
    fn test_extract_with_context() {
        let propagator = CloudTraceContextPropagator::new();
        let mut extractor: HashMap<String, String> = HashMap::new();
        extractor.insert(
            "x-cloud-trace-context".to_owned(),
            format!("0af7651916cd43dd8448eb211c80319c/{SPAN_ID};o=0"),
        );
        extractor.insert("ot-baggage-user".to_owned(), "alice".to_owned());

        let cx = propagator.extract(&extractor);
        assert_eq!(
            cx.span().span_context(),
            &remote_context(TraceFlags::default())
        );
        assert_eq!(
            cx.baggage()
                .get("user")
                .map(|value| value.as_str().to_string()),
            Some("alice".to_string())
        );
    }

    #[test]
    fn test_extract_corrupted_returns_input_context() {
        let propagator = CloudTraceContextPropagator::new();
        let mut extractor: HashMap<String, String> = HashMap::new();
        extractor.insert("x-cloud-trace-context".to_owned(), "corrupted".to_owned());
        extractor.insert("ot-baggage-user".to_owned(), "alice".to_owned());

        let cx = propagator.extract(&extractor);
        assert!(!cx.span().span_context().is_valid());
        assert!(cx.baggage().is_empty());
    }

    #[test]
    fn test_round_trip() {
        let propagator = CloudTraceContextPropagator::default();
        let cx = Context::new().with_remote_span_context(remote_context(TraceFlags::SAMPLED));

        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject_context(&cx, &mut carrier);
        let extracted = propagator.extract(&carrier);

        assert_eq!(
            extracted.span().span_context(),
            &remote_context(TraceFlags::SAMPLED)
        );
    }

    #[test]
    fn test_fields() {
        let propagator = CloudTraceContextPropagator::with_propagator(
            Propagator::with_custom_header("custom-header"),
        );
        let fields = propagator.fields().collect::<Vec<_>>();
        assert_eq!(fields, vec!["custom-header"]);
    }

    #[test]
    fn test_extract_from_carrier_mixed_case_keys() {
        let propagator = CloudTraceContextPropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();
        carrier.insert(
            "X-Cloud-Trace-Context".to_owned(),
            format!("0af7651916cd43dd8448eb211c80319c/{SPAN_ID};o=1"),
        );
        carrier.insert("OT-Baggage-User".to_owned(), "alice".to_owned());

        let cx = propagator.extract_from_carrier(&Context::new(), &carrier);
        assert_eq!(
            cx.span().span_context(),
            &remote_context(TraceFlags::SAMPLED)
        );
        assert_eq!(
            cx.baggage()
                .get("User")
                .map(|value| value.as_str().to_string()),
            Some("alice".to_string())
        );
    }

    struct ExactCaseExtractor(Vec<(String, String)>);

    impl Extractor for ExactCaseExtractor {
        fn get(&self, key: &str) -> Option<&str> {
            self.0
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str())
        }

        fn keys(&self) -> Vec<&str> {
            self.0.iter().map(|(name, _)| name.as_str()).collect()
        }
    }

    #[test]
    fn test_extract_mixed_case_keys_through_extractor() {
        let propagator = CloudTraceContextPropagator::new();
        let extractor = ExactCaseExtractor(vec![
            (
                "X-Cloud-Trace-Context".to_owned(),
                format!("0af7651916cd43dd8448eb211c80319c/{SPAN_ID};o=1"),
            ),
            ("OT-Baggage-User".to_owned(), "alice".to_owned()),
        ]);

        let cx = propagator.extract(&extractor);
        assert_eq!(
            cx.span().span_context(),
            &remote_context(TraceFlags::SAMPLED)
        );
        assert_eq!(
            cx.baggage()
                .get("User")
                .map(|value| value.as_str().to_string()),
            Some("alice".to_string())
        );
    }

    #[test]
    fn test_extract_folded_lookup_counts_entry_once() {
        let propagator = CloudTraceContextPropagator::new();
        let mut extractor: HashMap<String, String> = HashMap::new();
        extractor.insert(
            "x-cloud-trace-context".to_owned(),
            format!("0af7651916cd43dd8448eb211c80319c/{SPAN_ID};o=1"),
        );
        // `Extractor for HashMap` resolves this key to the lowercase entry.
        extractor.insert(
            "X-Cloud-Trace-Context".to_owned(),
            "00000000000000000000000000000001/1;o=0".to_owned(),
        );

        let cx = propagator.extract(&extractor);
        assert_eq!(
            cx.span().span_context(),
            &remote_context(TraceFlags::SAMPLED)
        );
    }

    #[test]
    fn test_extract_distinct_duplicate_headers_corrupted() {
        let propagator = CloudTraceContextPropagator::new();
        let header = format!("0af7651916cd43dd8448eb211c80319c/{SPAN_ID};o=1");
        let extractor = ExactCaseExtractor(vec![
            ("x-cloud-trace-context".to_owned(), header.clone()),
            ("X-Cloud-Trace-Context".to_owned(), header),
        ]);

        let cx = propagator.extract(&extractor);
        assert!(!cx.span().span_context().is_valid());
    }

    struct FailingWriter;

    impl TextMapWriter for FailingWriter {
        fn set(&mut self, _key: &str, _value: &str) -> Result<(), PropagationError> {
            Err(PropagationError::carrier(io::Error::other("carrier closed")))
        }
    }

    #[test]
    fn test_inject_into_carrier_returns_write_failure() {
        let propagator = CloudTraceContextPropagator::new();
        let cx = Context::new().with_remote_span_context(remote_context(TraceFlags::SAMPLED));

        let err = propagator
            .inject_into_carrier(&cx, &mut FailingWriter)
            .unwrap_err();
        assert!(matches!(err, PropagationError::Carrier(_)));
    }

    #[test]
    fn test_inject_into_carrier_rejects_byte_stream() {
        let propagator = CloudTraceContextPropagator::new();
        let cx = Context::new().with_remote_span_context(remote_context(TraceFlags::SAMPLED));
        let mut stream: Vec<u8> = Vec::new();

        let result = propagator.inject_into_carrier(&cx, InjectCarrier::Binary(&mut stream));
        assert!(matches!(result, Err(PropagationError::InvalidCarrier)));
        assert!(stream.is_empty());
    }

    #[test]
    fn test_inject_into_carrier_skips_invalid_context() {
        let propagator = CloudTraceContextPropagator::new();
        let result = propagator.inject_into_carrier(&Context::new(), &mut FailingWriter);
        assert!(result.is_ok());
    }
}

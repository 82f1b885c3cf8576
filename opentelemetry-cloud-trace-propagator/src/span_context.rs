//! Span identity carried across process boundaries.
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Width of a fully padded trace id in hex characters.
pub(crate) const TRACE_ID_HEX_LEN: usize = 32;

/// A 128-bit trace identifier stored as two 64-bit halves.
///
/// Traces started by 64-bit tracers leave `high` at zero; such ids render as
/// 16 hex characters and are padded to 32 when written to a carrier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId {
    high: u64,
    low: u64,
}

impl TraceId {
    /// Create a trace id from its high and low halves.
    pub const fn new(high: u64, low: u64) -> Self {
        TraceId { high, low }
    }

    /// Create a trace id from a single 128-bit value.
    pub const fn from_u128(value: u128) -> Self {
        TraceId {
            high: (value >> 64) as u64,
            low: value as u64,
        }
    }

    /// The trace id as a single 128-bit value.
    pub const fn to_u128(self) -> u128 {
        ((self.high as u128) << 64) | self.low as u128
    }

    /// Upper 64 bits; zero for 64-bit trace ids.
    pub const fn high(&self) -> u64 {
        self.high
    }

    /// Lower 64 bits.
    pub const fn low(&self) -> u64 {
        self.low
    }

    /// Lowercase hex form: 16 characters for 64-bit ids, 32 otherwise.
    pub fn to_hex(&self) -> String {
        if self.high == 0 {
            format!("{:016x}", self.low)
        } else {
            format!("{:016x}{:016x}", self.high, self.low)
        }
    }

    /// Hex form left-padded with `'0'` to 32 characters.
    pub fn to_padded_hex(&self) -> String {
        format!("{:0>width$}", self.to_hex(), width = TRACE_ID_HEX_LEN)
    }

    /// Decode a trace id from 1 to 32 hex digits, either case.
    ///
    /// Returns `None` for empty, overlong, or non-hex input.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.is_empty()
            || hex.len() > TRACE_ID_HEX_LEN
            || !hex.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return None;
        }
        u128::from_str_radix(hex, 16).ok().map(TraceId::from_u128)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Flags describing how a trace is recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// The trace is sampled.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// The trace was forced on for debugging. Not carried by the
    /// `x-cloud-trace-context` header.
    pub const DEBUG: TraceFlags = TraceFlags(0x02);

    /// Construct flags from raw bits.
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    /// Returns `true` if the sampled bit is set.
    pub fn is_sampled(&self) -> bool {
        (*self & TraceFlags::SAMPLED) == TraceFlags::SAMPLED
    }

    /// Returns `true` if the debug bit is set.
    pub fn is_debug(&self) -> bool {
        (*self & TraceFlags::DEBUG) == TraceFlags::DEBUG
    }

    /// Raw bits.
    pub fn to_u8(self) -> u8 {
        self.0
    }
}

impl BitAnd for TraceFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for TraceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TraceFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0
    }
}

/// Immutable identity of a span: trace id, span id, optional parent and flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: u64,
    parent_id: Option<u64>,
    flags: TraceFlags,
}

impl SpanContext {
    /// Construct a new `SpanContext`.
    pub const fn new(
        trace_id: TraceId,
        span_id: u64,
        parent_id: Option<u64>,
        flags: TraceFlags,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            parent_id,
            flags,
        }
    }

    /// The trace this span belongs to.
    pub const fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The span's own id.
    pub const fn span_id(&self) -> u64 {
        self.span_id
    }

    /// The parent span id, if known.
    pub const fn parent_id(&self) -> Option<u64> {
        self.parent_id
    }

    /// Sampling and debug flags.
    pub const fn flags(&self) -> TraceFlags {
        self.flags
    }

    /// Returns `true` if the span is sampled.
    pub fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }
}

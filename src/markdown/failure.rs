//! Centralizes fail-open vs. fail-closed decisions. Every
//! component that can fail reports one of three error kinds; this module is
//! the single place that turns `(kind, on_error)` into a terminal
//! disposition so the policy table lives in exactly one spot.

use crate::config::OnError;

/// Failure taxonomy. Only these three kinds count against the
/// `failures_{conversion,resource_limit,system}` counters — `Unsupported`
/// codecs and malformed conditional headers are handled as graceful
/// degradation elsewhere and never reach this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Conversion,
    ResourceLimit,
    System,
}

impl FailureKind {
    pub fn metric_label(&self) -> &'static str {
        match self {
            FailureKind::Conversion => "conversion",
            FailureKind::ResourceLimit => "resource_limit",
            FailureKind::System => "system",
        }
    }
}

/// What the Lifecycle should do in response to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Emit the original upstream response unchanged (fail-open).
    Passthrough,
    /// Emit a 502 Bad Gateway (fail-closed).
    RejectBadGateway,
}

/// Apply the policy table: `conversion`/`resource_limit`/`system` all map
/// the same way — `on_error=pass` means passthrough, `on_error=reject`
/// means 502. Decompression `Unsupported` never reaches this function; it
/// is always graceful regardless of `on_error` and is handled directly by
/// the Lifecycle.
pub fn decide(_kind: FailureKind, on_error: OnError) -> Disposition {
    match on_error {
        OnError::Pass => Disposition::Passthrough,
        OnError::Reject => Disposition::RejectBadGateway,
    }
}

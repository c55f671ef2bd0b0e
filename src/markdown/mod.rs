//! HTML-to-Markdown response filter. Each submodule is one component of
//! the Response Lifecycle pipeline; [`lifecycle`] wires them together in
//! the order a single request needs to pass through them.

pub mod accumulator;
pub mod auth;
pub mod conditional;
pub mod converter;
pub mod decompress;
pub mod eligibility;
pub mod failure;
pub mod lifecycle;
pub mod negotiate;

pub use accumulator::Accumulator;
pub use converter::{ConversionArtifact, ConversionError, ConversionOptions};
pub use eligibility::{Eligibility, IneligibleReason};
pub use failure::{Disposition, FailureKind};
pub use lifecycle::{run_lifecycle, LifecycleInput, LifecycleResult, Outcome};
pub use negotiate::NegotiationDecision;

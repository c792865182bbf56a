//! Observability helpers shared by token flows and workbook calls.
//!
//! # Feature Flags
//!
//! - `tracing` emits spans named `workbook_sync.flow` with `flow` and `stage` fields, plus
//!   events for cache hits, strategy fall-through, device-code prompts, and swallowed
//!   diagnostic failures.
//! - `metrics` increments the `workbook_sync_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`, and records the
//!   `workbook_sync_flow_duration_seconds` histogram for finished operations.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// std
use std::time::Instant;
// self
use crate::_prelude::*;

/// Operations observed by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Full token acquisition chain.
	Acquire,
	/// Seeding the cache from the credential blob.
	CachedCredential,
	/// Refresh token grant.
	Refresh,
	/// Client credentials grant.
	ClientCredentials,
	/// Device authorization grant.
	DeviceCode,
	/// Consent hand-off (authorization code + PKCE).
	Consent,
	/// Share URL resolution.
	ShareResolution,
	/// Worksheet range read.
	RangeRead,
	/// Worksheet range write.
	RangeWrite,
	/// End-to-end synchronization.
	Synchronize,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Acquire => "acquire",
			FlowKind::CachedCredential => "cached_credential",
			FlowKind::Refresh => "refresh",
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::DeviceCode => "device_code",
			FlowKind::Consent => "consent",
			FlowKind::ShareResolution => "share_resolution",
			FlowKind::RangeRead => "range_read",
			FlowKind::RangeWrite => "range_write",
			FlowKind::Synchronize => "synchronize",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside a flow span and records attempt plus success/failure outcomes.
pub async fn observe<T, Fut>(kind: FlowKind, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = FlowSpan::new(kind, stage);
	let started = Instant::now();

	record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = span.instrument(fut).await;
	let outcome = if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

	record_flow_outcome(kind, outcome);
	record_flow_duration(kind, outcome, started.elapsed());

	result
}

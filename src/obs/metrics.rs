// std
use std::time::Duration as StdDuration;
// self
use crate::obs::{FlowKind, FlowOutcome};

/// Increments `workbook_sync_flow_total` for `kind` + `outcome` (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"workbook_sync_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records how long a finished operation took in `workbook_sync_flow_duration_seconds`.
///
/// Only terminal outcomes are timed; attempts carry no duration.
pub fn record_flow_duration(kind: FlowKind, outcome: FlowOutcome, elapsed: StdDuration) {
	#[cfg(feature = "metrics")]
	{
		if outcome != FlowOutcome::Attempt {
			metrics::histogram!(
				"workbook_sync_flow_duration_seconds",
				"flow" => kind.as_str(),
				"outcome" => outcome.as_str()
			)
			.record(elapsed.as_secs_f64());
		}
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome, elapsed);
	}
}

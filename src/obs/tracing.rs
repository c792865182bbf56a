// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span wrapper used by every engine operation.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("workbook_sync.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

pub(crate) fn cache_hit(tenant: &str, source: &dyn Debug) {
	#[cfg(feature = "tracing")]
	tracing::debug!(tenant, ?source, "using cached access token");
	#[cfg(not(feature = "tracing"))]
	let _ = (tenant, source);
}

pub(crate) fn strategy_fell_through(strategy: &str, error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(strategy, %error, "acquisition strategy rejected; trying the next one");
	#[cfg(not(feature = "tracing"))]
	let _ = (strategy, error);
}

pub(crate) fn refresh_rejected(tenant: &str, error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(tenant, %error, "refresh token rejected; evicting cached entry");
	#[cfg(not(feature = "tracing"))]
	let _ = (tenant, error);
}

pub(crate) fn device_code_issued(verification_uri: &str, user_code: &str, message: Option<&str>) {
	#[cfg(feature = "tracing")]
	tracing::info!(verification_uri, user_code, message, "device code issued; waiting for sign-in");
	#[cfg(not(feature = "tracing"))]
	let _ = (verification_uri, user_code, message);
}

pub(crate) fn diagnostic_read_failed(range: &str, error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(range, %error, "diagnostic range read failed; continuing with write");
	#[cfg(not(feature = "tracing"))]
	let _ = (range, error);
}

pub(crate) fn retrying_after_unauthorized(attempt: u32) {
	#[cfg(feature = "tracing")]
	tracing::info!(attempt, "range write returned 401; forcing token refresh");
	#[cfg(not(feature = "tracing"))]
	let _ = attempt;
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Refresh, "instrument_wraps_future");

		assert_eq!(span.instrument(async { 42 }).await, 42);
	}

	#[test]
	fn events_are_safe_without_subscriber() {
		cache_hit("contoso", &"blob");
		diagnostic_read_failed("A1:B2", &Error::ReadFailure { status: 404, message: "x".into() });
	}
}

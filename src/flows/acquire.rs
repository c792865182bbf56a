//! The acquisition chain behind [`TokenManager::acquire`].
//!
//! Order of evaluation, short-circuiting on the first token:
//!
//! 1. a cached record that is usable under the safety margin (skipped when forced),
//! 2. each configured [`AcquisitionStrategy`] in turn.
//!
//! A strategy that does not apply (no blob, no refresh token) yields nothing and the next
//! one runs. A strategy rejected with [`Error::AuthPermanent`] also hands over to the next
//! one; any other error ends the chain, because retrying a different grant cannot fix a
//! network failure or a missing consent.

// self
use crate::{
	_prelude::*,
	auth::CachedToken,
	flows::{AcquireRequest, AcquisitionStrategy, DeviceCodeOutcome, TokenManager, common},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind},
};

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a usable access token for the request's tenant + scope.
	///
	/// Concurrent calls for the same key are serialized, so at most one grant is in
	/// flight per key and later callers observe its cached result.
	pub async fn acquire(&self, request: AcquireRequest<'_>) -> Result<CachedToken> {
		self.metrics.record_attempt();

		let result = obs::observe(FlowKind::Acquire, "acquire", self.acquire_guarded(&request)).await;

		if result.is_err() {
			self.metrics.record_failure();
		}

		result
	}

	async fn acquire_guarded(&self, request: &AcquireRequest<'_>) -> Result<CachedToken> {
		let guard = common::flow_guard(self, &request.key());
		let _singleflight = guard.lock().await;
		let now = OffsetDateTime::now_utc();
		let current = self.store.fetch(&request.tenant, &request.scope).await?;

		if let Some(record) = current
			.as_ref()
			.filter(|record| !request.force && record.is_usable_at(now, self.safety_margin))
		{
			self.metrics.record_cache_hit();
			obs::cache_hit(&request.tenant, &record.source);

			return Ok(record.clone());
		}

		let mut last_error = None;

		for strategy in self.strategies.iter().copied() {
			if let Some(grant) = strategy.required_grant() {
				self.ensure_grant_supported(grant)?;
			}

			match self.run_strategy(strategy, request, current.as_ref(), now).await {
				Ok(Some(record)) => return Ok(record),
				Ok(None) => {},
				Err(err @ Error::AuthPermanent { .. }) => {
					obs::strategy_fell_through(strategy.as_str(), &err);

					last_error = Some(err);
				},
				Err(err) => return Err(err),
			}
		}

		Err(last_error.unwrap_or_else(|| Error::InteractiveAuthRequired {
			reason: "no refresh token or non-interactive grant available".into(),
		}))
	}

	async fn run_strategy(
		&self,
		strategy: AcquisitionStrategy,
		request: &AcquireRequest<'_>,
		current: Option<&CachedToken>,
		now: OffsetDateTime,
	) -> Result<Option<CachedToken>> {
		match strategy {
			AcquisitionStrategy::CachedCredential => self.seed_from_credentials(request, now).await,
			AcquisitionStrategy::RefreshTokenGrant =>
				self.refresh_grant(request, current, now).await,
			AcquisitionStrategy::ClientCredentialsFlow =>
				self.client_credentials_grant(request).await.map(Some),
			AcquisitionStrategy::DeviceCodeFlow =>
				match self.device_code(&request.tenant, &request.scope).await? {
					DeviceCodeOutcome::Succeeded(record) => Ok(Some(record)),
					DeviceCodeOutcome::Expired => Err(Error::InteractiveAuthRequired {
						reason: "device code expired before sign-in completed".into(),
					}),
					DeviceCodeOutcome::Declined =>
						Err(Error::AuthPermanent { reason: "device code sign-in was declined".into() }),
				},
		}
	}

	async fn seed_from_credentials(
		&self,
		request: &AcquireRequest<'_>,
		now: OffsetDateTime,
	) -> Result<Option<CachedToken>> {
		if request.force {
			return Ok(None);
		}

		let Some(record) = request
			.credentials
			.and_then(|blob| blob.cached_token(&request.tenant, &request.scope, now))
			.filter(|record| record.is_usable_at(now, self.safety_margin))
		else {
			return Ok(None);
		};

		obs::observe(FlowKind::CachedCredential, "seed_from_credentials", async {
			self.store.save(record.clone()).await?;

			Ok(Some(record))
		})
		.await
	}
}

//! Refresh token grant with compare-and-swap rotation.
//!
//! The refresh secret comes from the cached record first and the credential blob second.
//! A successful grant replaces the cache entry as a whole; the previous refresh secret is
//! carried over when the provider does not rotate it. A permanent rejection evicts the
//! cached record so a dead refresh token is never redeemed twice.

// self
use crate::{
	_prelude::*,
	auth::{CachedToken, TokenSecret},
	flows::{AcquireRequest, TokenManager},
	http::ProviderHttpClient,
	oauth::{BasicFacade, OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind},
	store::CompareAndSwapOutcome,
};

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(super) async fn refresh_grant(
		&self,
		request: &AcquireRequest<'_>,
		current: Option<&CachedToken>,
		now: OffsetDateTime,
	) -> Result<Option<CachedToken>> {
		let cached_refresh = current.and_then(|record| record.refresh_token.clone());
		let Some(refresh) = cached_refresh.clone().or_else(|| {
			request
				.credentials
				.and_then(|blob| blob.refresh_token_for(&request.scope, now))
				.map(|entry| entry.secret.clone())
		}) else {
			return Ok(None);
		};

		obs::observe(FlowKind::Refresh, "refresh_token_grant", async {
			let facade = <BasicFacade<C, M>>::from_descriptor(
				&self.descriptor,
				&self.client_id,
				self.client_secret.as_deref(),
				self.http_client.clone(),
				self.transport_mapper.clone(),
			)?;
			let record = match facade
				.refresh_token(
					self.strategy.as_ref(),
					request.tenant.clone(),
					&refresh,
					&request.scope,
				)
				.await
			{
				Ok(record) => record.with_fallback_refresh(Some(refresh.clone())),
				Err(err) => {
					if matches!(err, Error::AuthPermanent { .. }) {
						obs::refresh_rejected(&request.tenant, &err);

						self.store.evict(&request.tenant, &request.scope).await?;
					}

					return Err(err);
				},
			};

			self.metrics.record_network_grant();

			let expected = cached_refresh.as_ref().map(TokenSecret::expose);
			let outcome = self
				.store
				.compare_and_swap_refresh(&request.tenant, &request.scope, expected, record.clone())
				.await?;

			match outcome {
				CompareAndSwapOutcome::Updated => Ok(Some(record)),
				CompareAndSwapOutcome::Missing => {
					self.store.save(record.clone()).await?;

					Ok(Some(record))
				},
				CompareAndSwapOutcome::RefreshMismatch => {
					// Another process rotated the entry first; keep its record when usable.
					match self.store.fetch(&request.tenant, &request.scope).await? {
						Some(existing) if existing.is_usable_at(now, self.safety_margin) =>
							Ok(Some(existing)),
						_ => {
							self.store.save(record.clone()).await?;

							Ok(Some(record))
						},
					}
				},
			}
		})
		.await
	}
}

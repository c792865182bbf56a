//! Client credentials grant for app-only tokens.
//!
//! The grant is sent with the manager's `app_scope` (Microsoft requires the
//! `<resource>/.default` form here) while the resulting record is cached under the
//! requested scope, so later cache lookups for the same request hit.

// self
use crate::{
	_prelude::*,
	auth::CachedToken,
	flows::{AcquireRequest, TokenManager, common},
	http::ProviderHttpClient,
	oauth::{BasicFacade, OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind},
	provider::{GrantType, ProviderStrategy},
};

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(super) async fn client_credentials_grant(
		&self,
		request: &AcquireRequest<'_>,
	) -> Result<CachedToken> {
		obs::observe(FlowKind::ClientCredentials, "client_credentials", async {
			let grant = GrantType::ClientCredentials;
			let request_scope = self.app_scope.as_ref().unwrap_or(&request.scope);
			let mut form = BTreeMap::new();

			form.insert("grant_type".to_owned(), grant.as_str().to_owned());

			if let Some(scope) =
				common::format_scope(request_scope, self.descriptor.quirks.scope_delimiter)
			{
				form.insert("scope".to_owned(), scope);
			}

			<dyn ProviderStrategy>::augment_token_request(self.strategy.as_ref(), grant, &mut form);

			let extra_params = form
				.into_iter()
				.filter(|(key, _)| key != "grant_type" && key != "scope")
				.collect::<Vec<_>>();
			let facade = <BasicFacade<C, M>>::from_descriptor(
				&self.descriptor,
				&self.client_id,
				self.client_secret.as_deref(),
				self.http_client.clone(),
				self.transport_mapper.clone(),
			)?;
			let record = facade
				.exchange_client_credentials(
					self.strategy.as_ref(),
					request.tenant.clone(),
					&request.scope,
					request_scope,
					&extra_params,
				)
				.await?;

			self.metrics.record_network_grant();
			self.store.save(record.clone()).await?;

			Ok(record)
		})
		.await
	}
}

//! Consent hand-off: authorization code + PKCE with a forced consent prompt.
//!
//! When acquisition ends in [`Error::InteractiveAuthRequired`], a caller with a browser
//! in reach starts a [`ConsentSession`], redirects the person to its `authorize_url`, and
//! completes the session with the `state` and `code` from the redirect. Completion seeds
//! the cache with the issued access and refresh tokens, after which the non-interactive
//! strategies work again.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeSet, TenantId},
	flows::{TokenManager, common},
	http::ProviderHttpClient,
	oauth::{BasicFacade, OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind},
	provider::{GrantType, ProviderDescriptor},
};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;
const OFFLINE_ACCESS: &str = "offline_access";

/// Pending consent request returned by [`TokenManager::start_consent`].
#[derive(Clone)]
pub struct ConsentSession {
	/// Tenant the resulting token is cached under.
	pub tenant: TenantId,
	/// Scope the resulting token is cached under.
	pub scope: ScopeSet,
	/// Opaque value that must round-trip through the redirect.
	pub state: String,
	/// Redirect URI registered for the client.
	pub redirect_uri: Url,
	/// URL to send the person to.
	pub authorize_url: Url,
	pkce_verifier: String,
}
impl ConsentSession {
	/// Validates the `state` returned with the redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state {
			Ok(())
		} else {
			Err(Error::AuthPermanent { reason: "consent state mismatch".into() })
		}
	}
}
impl Debug for ConsentSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConsentSession")
			.field("tenant", &self.tenant)
			.field("scope", &self.scope)
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.field("authorize_url", &self.authorize_url)
			.finish()
	}
}

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds the authorize URL for a consent hand-off.
	pub fn start_consent(
		&self,
		tenant: TenantId,
		scope: ScopeSet,
		redirect_uri: Url,
	) -> Result<ConsentSession> {
		self.ensure_grant_supported(GrantType::AuthorizationCode)?;

		let state = random_string(STATE_LEN);
		let pkce_verifier = random_string(PKCE_VERIFIER_LEN);
		let authorize_url = build_authorize_url(
			&self.descriptor,
			&self.client_id,
			&redirect_uri,
			&scope,
			&state,
			&pkce_challenge(&pkce_verifier),
		)?;

		Ok(ConsentSession { tenant, scope, state, redirect_uri, authorize_url, pkce_verifier })
	}

	/// Exchanges the redirect's `code` and caches the resulting token.
	pub async fn complete_consent(
		&self,
		session: ConsentSession,
		returned_state: &str,
		code: &str,
	) -> Result<CachedToken> {
		obs::observe(FlowKind::Consent, "complete_consent", async {
			session.validate_state(returned_state)?;

			let facade = <BasicFacade<C, M>>::from_descriptor(
				&self.descriptor,
				&self.client_id,
				self.client_secret.as_deref(),
				self.http_client.clone(),
				self.transport_mapper.clone(),
			)?;
			let record = facade
				.exchange_authorization_code(
					self.strategy.as_ref(),
					session.tenant.clone(),
					code,
					&session.pkce_verifier,
					&session.scope,
					&session.redirect_uri,
				)
				.await?;

			self.metrics.record_network_grant();
			self.store.save(record.clone()).await?;

			Ok(record)
		})
		.await
	}
}

fn build_authorize_url(
	descriptor: &ProviderDescriptor,
	client_id: &str,
	redirect_uri: &Url,
	scope: &ScopeSet,
	state: &str,
	challenge: &str,
) -> Result<Url> {
	let consent_scope = if descriptor.quirks.consent_offline_access {
		ScopeSet::new(scope.iter().chain([OFFLINE_ACCESS])).map_err(crate::error::ConfigError::from)?
	} else {
		scope.clone()
	};
	let mut url = descriptor.endpoints.authorization.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("response_type", "code");
	pairs.append_pair("client_id", client_id);
	pairs.append_pair("redirect_uri", redirect_uri.as_str());

	if let Some(value) = common::format_scope(&consent_scope, descriptor.quirks.scope_delimiter) {
		pairs.append_pair("scope", &value);
	}

	pairs.append_pair("state", state);
	pairs.append_pair("code_challenge", challenge);
	pairs.append_pair("code_challenge_method", "S256");

	if descriptor.quirks.force_consent_prompt {
		pairs.append_pair("prompt", "consent");
	}

	drop(pairs);

	Ok(url)
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn pkce_challenge(verifier: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

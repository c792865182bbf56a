//! Token acquisition: the [`TokenManager`] and the grant flows it drives.
//!
//! [`TokenManager::acquire`] is the single entry point. It serves a usable cached token
//! when it can and otherwise walks the configured [`AcquisitionStrategy`] list in order
//! until one yields a token. Every successful acquisition replaces the tenant's cache
//! entry as a whole.

pub mod common;
pub mod consent;
pub mod device_code;

mod acquire;
mod client_credentials;
mod metrics;
mod refresh;

pub use common::*;
pub use consent::*;
pub use device_code::*;
pub use metrics::TokenMetrics;

// self
use crate::{
	_prelude::*,
	auth::{DEFAULT_SAFETY_MARGIN, ScopeSet},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	provider::{GrantType, ProviderDescriptor, ProviderStrategy},
	store::{StoreKey, TokenStore},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Token manager specialized for the crate's default reqwest transport stack.
pub type ReqwestTokenManager = TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// One way of obtaining an access token, tried in configured order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionStrategy {
	/// Seed the cache with a still-usable access token from the credential blob.
	CachedCredential,
	/// Redeem a refresh token from the cache or the credential blob.
	RefreshTokenGrant,
	/// Run the device authorization grant (needs a person to finish sign-in).
	DeviceCodeFlow,
	/// Request an app-only token with the client credentials grant.
	ClientCredentialsFlow,
}
impl AcquisitionStrategy {
	/// Strategy list used when a deployment configures none.
	pub const DEFAULT_ORDER: [Self; 2] = [Self::CachedCredential, Self::RefreshTokenGrant];

	/// Returns a stable label for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::CachedCredential => "cached_credential",
			Self::RefreshTokenGrant => "refresh_token_grant",
			Self::DeviceCodeFlow => "device_code_flow",
			Self::ClientCredentialsFlow => "client_credentials_flow",
		}
	}

	/// Grant the strategy needs the descriptor to enable, if any.
	pub const fn required_grant(self) -> Option<GrantType> {
		match self {
			Self::CachedCredential => None,
			Self::RefreshTokenGrant => Some(GrantType::RefreshToken),
			Self::DeviceCodeFlow => Some(GrantType::DeviceCode),
			Self::ClientCredentialsFlow => Some(GrantType::ClientCredentials),
		}
	}
}
impl Display for AcquisitionStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Produces valid access tokens for tenants against a single provider descriptor.
///
/// The manager owns the transport, the token cache, the descriptor and strategy, and the
/// client credentials, so individual flows only carry grant-specific logic. Clones share
/// the cache, metrics, and single-flight guards.
pub struct TokenManager<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors.
	pub transport_mapper: Arc<M>,
	/// Token cache.
	pub store: Arc<dyn TokenStore>,
	/// Provider descriptor that defines endpoints and quirks.
	pub descriptor: ProviderDescriptor,
	/// Strategy responsible for provider-specific request tweaks and error mapping.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// OAuth 2.0 client identifier used in every grant.
	pub client_id: String,
	/// Optional client secret for confidential authentication methods.
	pub client_secret: Option<String>,
	/// Ordered acquisition strategies consulted after a cache miss.
	pub strategies: Vec<AcquisitionStrategy>,
	/// Margin subtracted from expiries before a token counts as usable.
	pub safety_margin: Duration,
	/// Scope sent with the client credentials grant (typically `<resource>/.default`).
	///
	/// Falls back to the requested scope when unset.
	pub app_scope: Option<ScopeSet>,
	/// Receives device-code instructions for the person completing sign-in.
	pub device_prompt: Arc<dyn DeviceCodePrompt>,
	/// In-process acquisition counters.
	pub metrics: Arc<TokenMetrics>,
	flow_guards: Arc<Mutex<HashMap<StoreKey, Arc<AsyncMutex<()>>>>>,
}
impl<C, M> TokenManager<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a manager that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<dyn TokenStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			descriptor,
			strategy,
			client_id: client_id.into(),
			client_secret: None,
			strategies: AcquisitionStrategy::DEFAULT_ORDER.to_vec(),
			safety_margin: DEFAULT_SAFETY_MARGIN,
			app_scope: None,
			device_prompt: Arc::new(LogDeviceCodePrompt),
			metrics: Default::default(),
			flow_guards: Default::default(),
		}
	}

	/// Sets or replaces the client secret used for confidential client auth modes.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Replaces the ordered acquisition strategy list.
	pub fn with_strategies(mut self, strategies: impl IntoIterator<Item = AcquisitionStrategy>) -> Self {
		self.strategies = strategies.into_iter().collect();

		self
	}

	/// Overrides the expiry safety margin (negative values clamp to zero).
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Sets the scope sent with the client credentials grant.
	pub fn with_app_scope(mut self, scope: ScopeSet) -> Self {
		self.app_scope = Some(scope);

		self
	}

	/// Replaces the device-code prompt.
	pub fn with_device_prompt(mut self, prompt: Arc<dyn DeviceCodePrompt>) -> Self {
		self.device_prompt = prompt;

		self
	}

	pub(crate) fn ensure_grant_supported(&self, grant: GrantType) -> Result<()> {
		if self.descriptor.supports(grant) {
			Ok(())
		} else {
			Err(crate::error::ConfigError::UnsupportedGrant {
				descriptor: self.descriptor.id.to_string(),
				grant: grant.label(),
			}
			.into())
		}
	}
}
#[cfg(feature = "reqwest")]
impl TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a manager with its own reqwest-backed transport.
	///
	/// Use [`TokenManager::with_client_secret`] to attach a confidential client secret
	/// when the descriptor prefers `client_secret_basic` or `client_secret_post`.
	pub fn new(
		store: Arc<dyn TokenStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
	) -> Self {
		Self::with_http_client(
			store,
			descriptor,
			strategy,
			client_id,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> Clone for TokenManager<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			store: self.store.clone(),
			descriptor: self.descriptor.clone(),
			strategy: self.strategy.clone(),
			client_id: self.client_id.clone(),
			client_secret: self.client_secret.clone(),
			strategies: self.strategies.clone(),
			safety_margin: self.safety_margin,
			app_scope: self.app_scope.clone(),
			device_prompt: self.device_prompt.clone(),
			metrics: self.metrics.clone(),
			flow_guards: self.flow_guards.clone(),
		}
	}
}
impl<C, M> Debug for TokenManager<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("strategies", &self.strategies)
			.field("safety_margin", &self.safety_margin)
			.finish()
	}
}

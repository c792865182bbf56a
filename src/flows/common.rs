//! Shared helpers for flow implementations (request shape, scope formatting, guards).

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TenantId},
	credential::CredentialBlob,
	flows::TokenManager,
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	store::StoreKey,
};

/// Parameters for one [`TokenManager::acquire`] call.
#[derive(Clone, Debug)]
pub struct AcquireRequest<'a> {
	/// Tenant the token is cached under.
	pub tenant: TenantId,
	/// Scopes the token must cover.
	pub scope: ScopeSet,
	/// Decoded credential blob supplied with the call, if any.
	pub credentials: Option<&'a CredentialBlob>,
	/// Skips the cache hit check and the blob's access token when true.
	pub force: bool,
}
impl<'a> AcquireRequest<'a> {
	/// Creates a request for the provided tenant + scope pair.
	pub fn new(tenant: TenantId, scope: ScopeSet) -> Self {
		Self { tenant, scope, credentials: None, force: false }
	}

	/// Attaches a decoded credential blob.
	pub fn with_credentials(mut self, credentials: &'a CredentialBlob) -> Self {
		self.credentials = Some(credentials);

		self
	}

	/// Forces the manager to bypass cached access tokens.
	pub fn force_refresh(mut self) -> Self {
		self.force = true;

		self
	}

	/// Cache key for the request.
	pub fn key(&self) -> StoreKey {
		StoreKey::new(&self.tenant, &self.scope)
	}
}

/// Joins normalized scopes with the provider's delimiter when building requests.
pub(crate) fn format_scope(scope: &ScopeSet, delimiter: char) -> Option<String> {
	if scope.is_empty() {
		return None;
	}

	let mut buf = String::new();

	for (idx, value) in scope.iter().enumerate() {
		if idx > 0 {
			buf.push(delimiter);
		}

		buf.push_str(value);
	}

	Some(buf)
}

/// Returns (and creates on demand) the single-flight guard for a store key.
pub(crate) fn flow_guard<C, M>(manager: &TokenManager<C, M>, key: &StoreKey) -> Arc<AsyncMutex<()>>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let mut guards = manager.flow_guards.lock();

	guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
}

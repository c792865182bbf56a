//! Token cache contracts and the built-in in-memory and file-backed caches.
//!
//! The cache is the only shared mutable state in the engine. Entries are keyed per
//! tenant and scope fingerprint and are always replaced whole, so a reader sees either
//! the previous record or the next one and never a half-applied refresh.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeSet, TenantId, TokenSecret},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Injectable token cache keyed by tenant and scope.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the record for its tenant + scope.
	fn save(&self, record: CachedToken) -> StoreFuture<'_, ()>;

	/// Fetches the record for the tenant + scope, if present.
	fn fetch<'a>(
		&'a self,
		tenant: &'a TenantId,
		scope: &'a ScopeSet,
	) -> StoreFuture<'a, Option<CachedToken>>;

	/// Replaces the record only if its refresh secret still equals `expected_refresh`.
	fn compare_and_swap_refresh<'a>(
		&'a self,
		tenant: &'a TenantId,
		scope: &'a ScopeSet,
		expected_refresh: Option<&'a str>,
		replacement: CachedToken,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Removes and returns the record for the tenant + scope.
	fn evict<'a>(
		&'a self,
		tenant: &'a TenantId,
		scope: &'a ScopeSet,
	) -> StoreFuture<'a, Option<CachedToken>>;
}

/// Result of a refresh-token compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The refresh secret matched and the record was replaced.
	Updated,
	/// A record exists but carries a different refresh secret.
	RefreshMismatch,
	/// No record exists for the key.
	Missing,
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Snapshot could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Unique key identifying a cached record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
	/// Tenant component.
	pub tenant: TenantId,
	/// Scope fingerprint used for partitioning.
	pub scope_fingerprint: String,
}
impl StoreKey {
	/// Builds a key from a tenant and scope set.
	pub fn new(tenant: &TenantId, scope: &ScopeSet) -> Self {
		Self { tenant: tenant.clone(), scope_fingerprint: scope.fingerprint() }
	}

	/// Builds the key a record is stored under.
	pub fn for_record(record: &CachedToken) -> Self {
		Self::new(&record.tenant, &record.scope)
	}
}

pub(crate) fn refresh_matches(current: Option<&TokenSecret>, expected: Option<&str>) -> bool {
	match (current.map(TokenSecret::expose), expected) {
		(None, None) => true,
		(Some(cur), Some(exp)) => cur == exp,
		_ => false,
	}
}

pub(crate) fn cas_outcome(
	existing: Option<&CachedToken>,
	expected_refresh: Option<&str>,
) -> CompareAndSwapOutcome {
	match existing {
		Some(record) if refresh_matches(record.refresh_token.as_ref(), expected_refresh) =>
			CompareAndSwapOutcome::Updated,
		Some(_) => CompareAndSwapOutcome::RefreshMismatch,
		None => CompareAndSwapOutcome::Missing,
	}
}

//! Thread-safe in-memory [`TokenStore`] used as the default per-process cache.

// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeSet, TenantId},
	store::{self, CompareAndSwapOutcome, StoreFuture, StoreKey, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<StoreKey, CachedToken>>>;

/// Process-local cache; clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of cached records.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl TokenStore for MemoryStore {
	fn save(&self, record: CachedToken) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(StoreKey::for_record(&record), record);

			Ok(())
		})
	}

	fn fetch<'a>(
		&'a self,
		tenant: &'a TenantId,
		scope: &'a ScopeSet,
	) -> StoreFuture<'a, Option<CachedToken>> {
		let key = StoreKey::new(tenant, scope);
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(&key).cloned()) })
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		tenant: &'a TenantId,
		scope: &'a ScopeSet,
		expected_refresh: Option<&'a str>,
		replacement: CachedToken,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		let key = StoreKey::new(tenant, scope);
		let map = self.0.clone();

		Box::pin(async move {
			let mut guard = map.write();
			let outcome = store::cas_outcome(guard.get(&key), expected_refresh);

			if outcome == CompareAndSwapOutcome::Updated {
				guard.insert(key, replacement);
			}

			Ok(outcome)
		})
	}

	fn evict<'a>(
		&'a self,
		tenant: &'a TenantId,
		scope: &'a ScopeSet,
	) -> StoreFuture<'a, Option<CachedToken>> {
		let key = StoreKey::new(tenant, scope);
		let map = self.0.clone();

		Box::pin(async move { Ok(map.write().remove(&key)) })
	}
}

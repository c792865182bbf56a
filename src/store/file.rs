//! File-backed [`TokenStore`] that survives process restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeSet, TenantId},
	store::{self, CompareAndSwapOutcome, StoreError, StoreFuture, StoreKey, TokenStore},
};

/// Persists cached records to a JSON file, replacing it atomically after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<StoreKey, CachedToken>>>,
}
impl FileStore {
	/// Opens (or creates) a store at `path`, eagerly loading an existing snapshot.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let snapshot = load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Writes `next` to disk and only then makes it the in-memory view.
	fn commit_locked(
		&self,
		current: &mut HashMap<StoreKey, CachedToken>,
		next: HashMap<StoreKey, CachedToken>,
	) -> Result<(), StoreError> {
		self.persist_locked(&next)?;

		*current = next;

		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<StoreKey, CachedToken>) -> Result<(), StoreError> {
		ensure_parent_exists(&self.path)?;

		let snapshot = contents.values().collect::<Vec<_>>();
		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let tmp_path = self.path.with_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| backend("create", &tmp_path, e))?;

			file.write_all(&serialized).map_err(|e| backend("write", &tmp_path, e))?;
			file.sync_all().map_err(|e| backend("sync", &tmp_path, e))?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| backend("replace", &self.path, e))
	}
}
impl TokenStore for FileStore {
	fn save(&self, record: CachedToken) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let mut next = guard.clone();

			next.insert(StoreKey::for_record(&record), record);

			self.commit_locked(&mut guard, next)
		})
	}

	fn fetch<'a>(
		&'a self,
		tenant: &'a TenantId,
		scope: &'a ScopeSet,
	) -> StoreFuture<'a, Option<CachedToken>> {
		Box::pin(async move { Ok(self.inner.read().get(&StoreKey::new(tenant, scope)).cloned()) })
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		tenant: &'a TenantId,
		scope: &'a ScopeSet,
		expected_refresh: Option<&'a str>,
		replacement: CachedToken,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move {
			let key = StoreKey::new(tenant, scope);
			let mut guard = self.inner.write();
			let outcome = store::cas_outcome(guard.get(&key), expected_refresh);

			if outcome == CompareAndSwapOutcome::Updated {
				let mut next = guard.clone();

				next.insert(key, replacement);
				self.commit_locked(&mut guard, next)?;
			}

			Ok(outcome)
		})
	}

	fn evict<'a>(
		&'a self,
		tenant: &'a TenantId,
		scope: &'a ScopeSet,
	) -> StoreFuture<'a, Option<CachedToken>> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let mut next = guard.clone();
			let removed = next.remove(&StoreKey::new(tenant, scope));

			if removed.is_some() {
				self.commit_locked(&mut guard, next)?;
			}

			Ok(removed)
		})
	}
}

fn load_snapshot(path: &Path) -> Result<HashMap<StoreKey, CachedToken>, StoreError> {
	if !path.exists() {
		return Ok(HashMap::new());
	}

	let bytes = fs::read(path).map_err(|e| backend("read", path, e))?;

	if bytes.is_empty() {
		return Ok(HashMap::new());
	}

	let records: Vec<CachedToken> =
		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})?;

	Ok(records.into_iter().map(|record| (StoreKey::for_record(&record), record)).collect())
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| backend("create directory", parent, e))?;
	}

	Ok(())
}

fn backend(action: &str, path: &Path, e: std::io::Error) -> StoreError {
	StoreError::Backend { message: format!("Failed to {action} {}: {e}", path.display()) }
}

// std
use std::{env, fs, path::PathBuf};
// crates.io
use time::{Duration, OffsetDateTime, macros};
// self
use workbook_sync::{
	auth::{CachedToken, ScopeSet, TenantId, TokenSource, TokenStatus},
	store::{CompareAndSwapOutcome, FileStore, MemoryStore, TokenStore},
};

fn make_tenant() -> TenantId {
	TenantId::new("tenant-123").expect("Failed to build tenant identifier for store tests.")
}

fn make_scope() -> ScopeSet {
	ScopeSet::new(["Files.ReadWrite", "User.Read"])
		.expect("Failed to build default scope set for tests.")
}

fn build_record(tenant: &TenantId, scope: &ScopeSet, access: &str, refresh: Option<&str>) -> CachedToken {
	let issued = macros::datetime!(2025-11-10 12:00 UTC);
	let mut builder = CachedToken::builder(tenant.clone(), scope.clone(), TokenSource::RefreshGrant)
		.access_token(access)
		.issued_at(issued)
		.expires_at(issued + Duration::hours(1));

	if let Some(value) = refresh {
		builder = builder.refresh_token(value);
	}

	builder.build().expect("Token record fixture should build successfully.")
}

fn scratch_path(name: &str) -> PathBuf {
	let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();

	env::temp_dir().join(format!("workbook-sync-{name}-{}-{nanos}", std::process::id())).join("tokens.json")
}

#[tokio::test]
async fn save_and_fetch_round_trip() {
	let store = MemoryStore::default();
	let tenant = make_tenant();
	let scope = make_scope();
	let record = build_record(&tenant, &scope, "access-1", Some("refresh-1"));

	store.save(record.clone()).await.expect("Saving record fixture into memory store should succeed.");

	let reordered = ScopeSet::new(["User.Read", "Files.ReadWrite"]).expect("Scope set should build.");
	let fetched = store
		.fetch(&tenant, &reordered)
		.await
		.expect("Fetching token record from memory store should succeed.")
		.expect("Scope order must not change the cache key.");

	assert_eq!(fetched.access_token.expose(), record.access_token.expose());
	assert_eq!(
		fetched.refresh_token.as_ref().map(|secret| secret.expose()),
		record.refresh_token.as_ref().map(|secret| secret.expose())
	);
	assert_eq!(
		fetched.status_at(macros::datetime!(2025-11-10 12:56 UTC), Duration::minutes(5)),
		TokenStatus::WithinSafetyMargin
	);
}

#[tokio::test]
async fn cas_success_and_mismatch() {
	let store = MemoryStore::default();
	let tenant = make_tenant();
	let scope = make_scope();
	let initial = build_record(&tenant, &scope, "access-initial", Some("refresh-old"));

	store.save(initial.clone()).await.expect("Saving initial record into memory store should succeed.");

	let replacement = build_record(&tenant, &scope, "access-new", Some("refresh-new"));
	let outcome = store
		.compare_and_swap_refresh(&tenant, &scope, Some("refresh-old"), replacement.clone())
		.await
		.expect("CAS operation should succeed when refresh tokens match.");

	assert_eq!(outcome, CompareAndSwapOutcome::Updated);

	let fetched = store
		.fetch(&tenant, &scope)
		.await
		.expect("Fetching updated record should succeed.")
		.expect("Updated record should remain present.");

	assert_eq!(fetched.access_token.expose(), "access-new");
	assert_eq!(fetched.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-new"));

	let mismatch = store
		.compare_and_swap_refresh(&tenant, &scope, Some("refresh-old"), replacement)
		.await
		.expect("CAS should report a refresh mismatch when tokens differ.");

	assert_eq!(mismatch, CompareAndSwapOutcome::RefreshMismatch);

	let missing_scope = ScopeSet::new(["Sites.Read.All"]).expect("Missing scope set should build.");
	let missing = store
		.compare_and_swap_refresh(&tenant, &missing_scope, Some("whatever"), initial)
		.await
		.expect("CAS should report a missing record for unknown scopes.");

	assert_eq!(missing, CompareAndSwapOutcome::Missing);
}

#[tokio::test]
async fn concurrent_cas_allows_single_winner() {
	let store = MemoryStore::default();
	let tenant = make_tenant();
	let scope = make_scope();

	store
		.save(build_record(&tenant, &scope, "access-base", Some("refresh-base")))
		.await
		.expect("Saving base record into memory store should succeed.");

	let spawn_cas = |label: &'static str| {
		let store = store.clone();
		let tenant = tenant.clone();
		let scope = scope.clone();

		tokio::spawn(async move {
			let refresh = format!("refresh-{label}");
			let replacement =
				build_record(&tenant, &scope, &format!("access-{label}"), Some(refresh.as_str()));

			store
				.compare_and_swap_refresh(&tenant, &scope, Some("refresh-base"), replacement)
				.await
				.expect("CAS task should complete successfully.")
		})
	};
	let (outcome_a, outcome_b) = tokio::join!(spawn_cas("a"), spawn_cas("b"));
	let successes = [
		outcome_a.expect("CAS task A should not panic."),
		outcome_b.expect("CAS task B should not panic."),
	]
	.iter()
	.filter(|outcome| matches!(outcome, CompareAndSwapOutcome::Updated))
	.count();

	assert_eq!(successes, 1, "only one CAS should succeed");

	let final_record = store
		.fetch(&tenant, &scope)
		.await
		.expect("Fetching final record should succeed.")
		.expect("Final record should remain present.");

	assert!(matches!(
		final_record.refresh_token.as_ref().map(|secret| secret.expose()),
		Some("refresh-a") | Some("refresh-b")
	));
}

#[tokio::test]
async fn cas_supports_records_without_refresh_tokens() {
	let store = MemoryStore::default();
	let tenant = make_tenant();
	let scope = make_scope();

	store
		.save(build_record(&tenant, &scope, "access", None))
		.await
		.expect("Saving record without a refresh token should succeed.");

	let outcome = store
		.compare_and_swap_refresh(&tenant, &scope, None, build_record(&tenant, &scope, "access-updated", None))
		.await
		.expect("CAS should succeed when both sides have no refresh token.");

	assert_eq!(outcome, CompareAndSwapOutcome::Updated);
}

#[tokio::test]
async fn evict_removes_records() {
	let store = MemoryStore::default();
	let tenant = make_tenant();
	let scope = make_scope();

	store
		.save(build_record(&tenant, &scope, "access", Some("refresh")))
		.await
		.expect("Saving evictable record should succeed.");

	let evicted = store
		.evict(&tenant, &scope)
		.await
		.expect("Eviction should succeed.")
		.expect("Eviction should return the affected record.");

	assert_eq!(evicted.access_token.expose(), "access");
	assert!(store.is_empty());
	assert!(store.evict(&tenant, &scope).await.expect("Eviction should succeed.").is_none());
}

#[tokio::test]
async fn file_store_survives_reopen() {
	let path = scratch_path("reopen");
	let tenant = make_tenant();
	let scope = make_scope();

	{
		let store = FileStore::open(&path).expect("File store should open.");

		store
			.save(build_record(&tenant, &scope, "access-disk", Some("refresh-disk")))
			.await
			.expect("Saving into the file store should succeed.");

		let outcome = store
			.compare_and_swap_refresh(
				&tenant,
				&scope,
				Some("refresh-disk"),
				build_record(&tenant, &scope, "access-rotated", Some("refresh-rotated")),
			)
			.await
			.expect("CAS should succeed on the file store.");

		assert_eq!(outcome, CompareAndSwapOutcome::Updated);
	}

	let reopened = FileStore::open(&path).expect("File store should reopen.");
	let record = reopened
		.fetch(&tenant, &scope)
		.await
		.expect("Fetching from the reopened store should succeed.")
		.expect("Rotated record should persist.");

	assert_eq!(record.access_token.expose(), "access-rotated");
	assert_eq!(record.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-rotated"));
	assert!(!path.with_extension("tmp").exists(), "Temporary snapshot should be renamed away.");

	if let Some(dir) = path.parent() {
		let _ = fs::remove_dir_all(dir);
	}
}

mod common;

// crates.io
use url::Url;
// self
use common::*;
use workbook_sync::{
	auth::{ProviderId, ScopeSet, TokenSource},
	credential::CredentialBlob,
	error::{ConfigError, Error},
	flows::{AcquireRequest, AcquisitionStrategy},
	provider::{GrantType, ProviderDescriptor},
	store::TokenStore,
};

fn app_scope() -> ScopeSet {
	ScopeSet::new(["https://graph.microsoft.com/.default"]).expect("App scope should be valid.")
}

#[tokio::test]
async fn client_credentials_send_app_scope_and_cache_under_request_scope() {
	let transport = FakeTransport::new();

	transport.respond("POST", "/token", 200, token_body("app-token", None, 1800));

	let (manager, store) = manager(&transport);
	let manager = manager
		.with_strategies([AcquisitionStrategy::ClientCredentialsFlow])
		.with_app_scope(app_scope());
	let first = manager
		.acquire(AcquireRequest::new(tenant(), write_scope()))
		.await
		.expect("Client credentials grant should succeed.");
	let second = manager
		.acquire(AcquireRequest::new(tenant(), write_scope()))
		.await
		.expect("Second request should be served from the cache.");

	assert_eq!(first.access_token.expose(), "app-token");
	assert_eq!(second.access_token.expose(), "app-token");
	assert_eq!(first.source, TokenSource::ClientCredentials);
	assert_eq!(transport.count("POST", "/token"), 1);

	let request = &transport.requests()[0];

	assert_eq!(request.form_value("grant_type").as_deref(), Some("client_credentials"));
	assert_eq!(
		request.form_value("scope").as_deref(),
		Some("https://graph.microsoft.com/.default")
	);
	assert_eq!(request.form_value("client_id").as_deref(), Some(CLIENT_ID));
	assert_eq!(request.form_value("client_secret").as_deref(), Some(CLIENT_SECRET));

	let cached = store
		.fetch(&tenant(), &write_scope())
		.await
		.expect("Token store fetch should succeed.")
		.expect("Record should be cached under the requested scope.");

	assert_eq!(cached.scope, write_scope());
	assert!(cached.refresh_token.is_none());
}

#[tokio::test]
async fn client_credentials_fall_back_to_request_scope() {
	let transport = FakeTransport::new();

	transport.respond("POST", "/token", 200, token_body("app-token", None, 1800));

	let (manager, _store) = manager(&transport);
	let manager = manager.with_strategies([AcquisitionStrategy::ClientCredentialsFlow]);

	manager
		.acquire(AcquireRequest::new(tenant(), write_scope()))
		.await
		.expect("Client credentials grant should succeed.");

	assert_eq!(
		transport.requests()[0].form_value("scope").as_deref(),
		Some("Files.ReadWrite")
	);
}

#[tokio::test]
async fn client_credentials_singleflight_hits_provider_once() {
	let transport = FakeTransport::new();

	transport.respond("POST", "/token", 200, token_body("app-token", None, 1800));

	let (manager, _store) = manager(&transport);
	let manager = manager
		.with_strategies([AcquisitionStrategy::ClientCredentialsFlow])
		.with_app_scope(app_scope());
	let (first, second) = tokio::join!(
		manager.acquire(AcquireRequest::new(tenant(), write_scope())),
		manager.acquire(AcquireRequest::new(tenant(), write_scope())),
	);

	assert_eq!(first.expect("First call should succeed.").access_token.expose(), "app-token");
	assert_eq!(second.expect("Second call should succeed.").access_token.expose(), "app-token");
	assert_eq!(transport.count("POST", "/token"), 1);
	assert_eq!(manager.metrics.network_grants(), 1);
	assert_eq!(manager.metrics.cache_hits(), 1);
}

#[tokio::test]
async fn invalid_client_is_permanent() {
	let transport = FakeTransport::new();

	transport.respond(
		"POST",
		"/token",
		401,
		r#"{ "error": "invalid_client", "error_description": "AADSTS7000215: Invalid client secret provided." }"#,
	);

	let (manager, store) = manager(&transport);
	let manager = manager.with_strategies([AcquisitionStrategy::ClientCredentialsFlow]);
	let err = manager
		.acquire(AcquireRequest::new(tenant(), write_scope()))
		.await
		.expect_err("Invalid client secrets should fail.");

	assert!(matches!(err, Error::AuthPermanent { ref reason } if reason.contains("invalid_client")));
	assert!(store.is_empty());
	assert_eq!(manager.metrics.failures(), 1);
}

#[tokio::test]
async fn disabled_grant_fails_before_any_request() {
	let transport = FakeTransport::new();
	let descriptor = ProviderDescriptor::builder(
		ProviderId::new("refresh-only").expect("Provider id should be valid."),
	)
	.authorization_endpoint(Url::parse("https://login.test/authorize").expect("URL should parse."))
	.token_endpoint(Url::parse("https://login.test/token").expect("URL should parse."))
	.support_grant(GrantType::RefreshToken)
	.build()
	.expect("Descriptor should build.");
	let (manager, _store) = manager_with(&transport, descriptor);
	let manager = manager.with_strategies([AcquisitionStrategy::ClientCredentialsFlow]);
	let err = manager
		.acquire(AcquireRequest::new(tenant(), write_scope()))
		.await
		.expect_err("Disabled grants should be rejected.");

	assert!(matches!(err, Error::Config(ConfigError::UnsupportedGrant { .. })));
	assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn rejected_refresh_falls_through_to_client_credentials() {
	let transport = FakeTransport::new();

	transport.respond(
		"POST",
		"/token",
		400,
		r#"{ "error": "invalid_grant", "error_description": "AADSTS70008: The refresh token has expired." }"#,
	);
	transport.respond("POST", "/token", 200, token_body("app-token", None, 1800));

	let (manager, store) = manager(&transport);
	let manager = manager
		.with_strategies([
			AcquisitionStrategy::CachedCredential,
			AcquisitionStrategy::RefreshTokenGrant,
			AcquisitionStrategy::ClientCredentialsFlow,
		])
		.with_app_scope(app_scope());
	let raw = blob("access-expired", -60, Some("refresh-revoked"));
	let credentials = CredentialBlob::decode(&raw, &write_scope()).expect("Blob should decode.");
	let token = manager
		.acquire(AcquireRequest::new(tenant(), write_scope()).with_credentials(&credentials))
		.await
		.expect("Client credentials should take over from the rejected refresh.");

	assert_eq!(token.access_token.expose(), "app-token");
	assert_eq!(token.source, TokenSource::ClientCredentials);

	let grants = transport
		.requests()
		.iter()
		.map(|request| request.form_value("grant_type"))
		.collect::<Vec<_>>();

	assert_eq!(
		grants,
		[Some("refresh_token".to_owned()), Some("client_credentials".to_owned())]
	);
	assert_eq!(
		transport.requests()[0].form_value("refresh_token").as_deref(),
		Some("refresh-revoked")
	);

	let cached = store
		.fetch(&tenant(), &write_scope())
		.await
		.expect("Token store fetch should succeed.")
		.expect("The client credentials token should be cached.");

	assert_eq!(cached.access_token.expose(), "app-token");
}

#[tokio::test]
async fn consent_required_refresh_does_not_fall_through() {
	let transport = FakeTransport::new();

	transport.respond(
		"POST",
		"/token",
		400,
		r#"{ "error": "invalid_grant", "error_description": "AADSTS65001: The user or administrator has not consented to use the application." }"#,
	);
	transport.respond("POST", "/token", 200, token_body("app-token", None, 1800));

	let (manager, _store) = manager(&transport);
	let manager = manager.with_strategies([
		AcquisitionStrategy::RefreshTokenGrant,
		AcquisitionStrategy::ClientCredentialsFlow,
	]);
	let raw = blob("access-expired", -60, Some("refresh-unconsented"));
	let credentials = CredentialBlob::decode(&raw, &write_scope()).expect("Blob should decode.");
	let err = manager
		.acquire(AcquireRequest::new(tenant(), write_scope()).with_credentials(&credentials))
		.await
		.expect_err("Missing consent should stop the chain.");

	assert!(matches!(err, Error::InteractiveAuthRequired { ref reason } if reason.contains("AADSTS65001")));
	assert_eq!(transport.count("POST", "/token"), 1);
	assert_eq!(transport.requests()[0].form_value("grant_type").as_deref(), Some("refresh_token"));
}

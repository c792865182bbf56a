mod common;

// std
use std::collections::HashMap;
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use url::Url;
// self
use common::*;
use workbook_sync::{auth::TokenSource, error::Error, store::TokenStore};

fn redirect_uri() -> Url {
	Url::parse("https://forms.example.com/auth-callback").expect("Redirect URI should parse.")
}

#[tokio::test]
async fn consent_round_trip_caches_the_token() {
	let transport = FakeTransport::new();

	transport.respond("POST", "/token", 200, token_body("consent-access", Some("consent-refresh"), 3600));

	let (manager, store) = manager(&transport);
	let session = manager
		.start_consent(tenant(), write_scope(), redirect_uri())
		.expect("Consent session should start.");
	let pairs = session.authorize_url.query_pairs().into_owned().collect::<HashMap<_, _>>();

	assert!(session.authorize_url.as_str().starts_with("https://login.test/organizations/oauth2/v2.0/authorize?"));
	assert_eq!(session.state.len(), 32);
	assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
	assert_eq!(pairs.get("client_id").map(String::as_str), Some(CLIENT_ID));
	assert_eq!(pairs.get("state"), Some(&session.state));
	assert_eq!(pairs.get("prompt").map(String::as_str), Some("consent"));
	assert_eq!(pairs.get("scope").map(String::as_str), Some("Files.ReadWrite offline_access"));
	assert!(!format!("{session:?}").contains("pkce"));

	let challenge = pairs.get("code_challenge").cloned().expect("Challenge should be present.");
	let state = session.state.clone();
	let token = manager
		.complete_consent(session, &state, "auth-code-123")
		.await
		.expect("Code exchange should succeed.");

	assert_eq!(token.access_token.expose(), "consent-access");
	assert_eq!(token.source, TokenSource::Consent);

	let exchange = &transport.requests()[0];
	let verifier = exchange.form_value("code_verifier").expect("Verifier should be sent.");

	assert_eq!(exchange.form_value("grant_type").as_deref(), Some("authorization_code"));
	assert_eq!(exchange.form_value("code").as_deref(), Some("auth-code-123"));
	assert_eq!(exchange.form_value("redirect_uri").as_deref(), Some(redirect_uri().as_str()));
	assert_eq!(URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())), challenge);

	let cached = store
		.fetch(&tenant(), &write_scope())
		.await
		.expect("Token store fetch should succeed.")
		.expect("Consent token should be cached.");

	assert_eq!(cached.refresh_token.as_ref().map(|secret| secret.expose()), Some("consent-refresh"));
}

#[tokio::test]
async fn state_mismatch_stops_before_the_exchange() {
	let transport = FakeTransport::new();
	let (manager, store) = manager(&transport);
	let session = manager
		.start_consent(tenant(), write_scope(), redirect_uri())
		.expect("Consent session should start.");

	assert!(session.validate_state(&session.state).is_ok());

	let err = manager
		.complete_consent(session, "forged-state", "auth-code-123")
		.await
		.expect_err("A forged state must be rejected.");

	assert!(matches!(err, Error::AuthPermanent { ref reason } if reason.contains("state")));
	assert!(transport.requests().is_empty());
	assert!(store.is_empty());
}

#[tokio::test]
async fn rejected_code_is_permanent() {
	let transport = FakeTransport::new();

	transport.respond(
		"POST",
		"/token",
		400,
		r#"{ "error": "invalid_grant", "error_description": "AADSTS70000: The provided authorization code is invalid." }"#,
	);

	let (manager, store) = manager(&transport);
	let session = manager
		.start_consent(tenant(), write_scope(), redirect_uri())
		.expect("Consent session should start.");
	let state = session.state.clone();
	let err = manager
		.complete_consent(session, &state, "stale-code")
		.await
		.expect_err("Rejected codes should fail.");

	assert!(matches!(err, Error::AuthPermanent { .. }));
	assert!(store.is_empty());
}

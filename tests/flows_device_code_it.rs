mod common;

// std
use std::sync::Arc;
// crates.io
use parking_lot::Mutex;
// self
use common::*;
use workbook_sync::{
	auth::TokenSource,
	error::{ConfigError, Error},
	flows::{
		AcquireRequest, AcquisitionStrategy, DeviceAuthorization, DeviceCodeOutcome,
		DeviceCodePrompt,
	},
	store::TokenStore,
};

#[derive(Default)]
struct RecordingPrompt(Mutex<Vec<String>>);
impl DeviceCodePrompt for RecordingPrompt {
	fn present(&self, authorization: &DeviceAuthorization) {
		self.0.lock().push(authorization.user_code.clone());
	}
}

fn authorization_body(expires_in: u64, interval: u64) -> String {
	format!(
		r#"{{ "device_code": "device-secret", "user_code": "WDJB-MJHT", "verification_uri": "https://microsoft.com/devicelogin", "expires_in": {expires_in}, "interval": {interval} }}"#
	)
}

fn oauth_error(code: &str) -> String {
	format!(r#"{{ "error": "{code}" }}"#)
}

#[tokio::test(start_paused = true)]
async fn polling_stops_at_the_deadline() {
	let transport = FakeTransport::new();

	transport.respond("POST", "/devicecode", 200, authorization_body(30, 5));
	transport.respond("POST", "/token", 400, oauth_error("authorization_pending"));

	let (manager, store) = manager(&transport);
	let prompt = Arc::new(RecordingPrompt::default());
	let manager = manager.with_device_prompt(prompt.clone());
	let outcome = manager
		.device_code(&tenant(), &write_scope())
		.await
		.expect("Pending polls should not fail the flow.");

	assert!(matches!(outcome, DeviceCodeOutcome::Expired));
	assert_eq!(transport.count("POST", "/token"), 5);
	assert_eq!(prompt.0.lock().as_slice(), ["WDJB-MJHT"]);
	assert!(store.is_empty());

	let authorization = &transport.requests()[0];

	assert_eq!(authorization.form_value("client_id").as_deref(), Some(CLIENT_ID));
	assert_eq!(authorization.form_value("scope").as_deref(), Some("Files.ReadWrite"));

	let poll = &transport.requests()[1];

	assert_eq!(
		poll.form_value("grant_type").as_deref(),
		Some("urn:ietf:params:oauth:grant-type:device_code")
	);
	assert_eq!(poll.form_value("device_code").as_deref(), Some("device-secret"));
}

#[tokio::test(start_paused = true)]
async fn slow_down_widens_the_interval() {
	let transport = FakeTransport::new();

	transport.respond("POST", "/devicecode", 200, authorization_body(30, 5));
	transport.respond("POST", "/token", 400, oauth_error("slow_down"));
	transport.respond("POST", "/token", 400, oauth_error("authorization_pending"));

	let (manager, _store) = manager(&transport);
	let outcome = manager
		.device_code(&tenant(), &write_scope())
		.await
		.expect("Slow-down answers should not fail the flow.");

	// Polls land at 5s, 15s, and 25s; the next one would pass the 30s deadline.
	assert!(matches!(outcome, DeviceCodeOutcome::Expired));
	assert_eq!(transport.count("POST", "/token"), 3);
}

#[tokio::test(start_paused = true)]
async fn declined_sign_in_is_reported() {
	let transport = FakeTransport::new();

	transport.respond("POST", "/devicecode", 200, authorization_body(900, 5));
	transport.respond("POST", "/token", 400, oauth_error("authorization_declined"));

	let (manager, _store) = manager(&transport);
	let outcome = manager
		.device_code(&tenant(), &write_scope())
		.await
		.expect("Declines are a terminal outcome, not an error.");

	assert!(matches!(outcome, DeviceCodeOutcome::Declined));
	assert_eq!(transport.count("POST", "/token"), 1);
}

#[tokio::test(start_paused = true)]
async fn completed_sign_in_is_cached() {
	let transport = FakeTransport::new();

	transport.respond("POST", "/devicecode", 200, authorization_body(900, 5));
	transport.respond("POST", "/token", 400, oauth_error("authorization_pending"));
	transport.respond("POST", "/token", 200, token_body("device-access", Some("device-refresh"), 3600));

	let (manager, store) = manager(&transport);
	let manager = manager.with_strategies([AcquisitionStrategy::DeviceCodeFlow]);
	let token = manager
		.acquire(AcquireRequest::new(tenant(), write_scope()))
		.await
		.expect("Device sign-in should yield a token.");

	assert_eq!(token.access_token.expose(), "device-access");
	assert_eq!(token.source, TokenSource::DeviceCode);
	assert_eq!(transport.count("POST", "/token"), 2);

	let cached = store
		.fetch(&tenant(), &write_scope())
		.await
		.expect("Token store fetch should succeed.")
		.expect("Device token should be cached.");

	assert_eq!(cached.refresh_token.as_ref().map(|secret| secret.expose()), Some("device-refresh"));
}

#[tokio::test(start_paused = true)]
async fn expired_device_code_needs_interaction() {
	let transport = FakeTransport::new();

	transport.respond("POST", "/devicecode", 200, authorization_body(30, 5));
	transport.respond("POST", "/token", 400, oauth_error("authorization_pending"));

	let (manager, _store) = manager(&transport);
	let manager = manager.with_strategies([AcquisitionStrategy::DeviceCodeFlow]);
	let err = manager
		.acquire(AcquireRequest::new(tenant(), write_scope()))
		.await
		.expect_err("An expired device code should fail acquisition.");

	assert!(matches!(err, Error::InteractiveAuthRequired { .. }));
}

#[tokio::test(start_paused = true)]
async fn unexpected_poll_errors_are_classified() {
	let transport = FakeTransport::new();

	transport.respond("POST", "/devicecode", 200, authorization_body(900, 5));
	transport.respond("POST", "/token", 400, oauth_error("invalid_client"));

	let (manager, _store) = manager(&transport);
	let err = manager
		.device_code(&tenant(), &write_scope())
		.await
		.expect_err("Unknown poll errors should end the flow.");

	assert!(matches!(err, Error::AuthPermanent { .. }));
}

#[tokio::test(start_paused = true)]
async fn oversized_device_code_lifetime_is_rejected() {
	let transport = FakeTransport::new();

	transport.respond("POST", "/devicecode", 200, authorization_body(i64::MAX as u64, 5));
	transport.respond("POST", "/token", 400, oauth_error("authorization_pending"));

	let (manager, store) = manager(&transport);
	let err = manager
		.device_code(&tenant(), &write_scope())
		.await
		.expect_err("Device codes outliving the supported range should fail.");

	assert!(matches!(err, Error::Config(ConfigError::ExpiresInOutOfRange)));
	assert_eq!(transport.count("POST", "/token"), 0);
	assert!(store.is_empty());
}

mod common;

// std
use std::sync::Arc;
// crates.io
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use common::*;
use workbook_sync::{
	auth::{CachedToken, TokenSource},
	error::{Error, TransientError},
	graph::{
		GraphClient, RangeAddress, ResourceHandle, SyncData, WriteRequest, encode_share_url,
		validate_share_url,
	},
	http::RequestTarget,
};

fn graph(transport: &Arc<FakeTransport>) -> GraphClient<FakeTransport, FakeMapper> {
	GraphClient::new(
		transport.clone(),
		Arc::new(FakeMapper),
		Url::parse(GRAPH_BASE).expect("Graph base should parse."),
	)
}

fn token() -> CachedToken {
	let now = OffsetDateTime::now_utc();

	CachedToken::builder(tenant(), write_scope(), TokenSource::CredentialBlob)
		.access_token("graph-access")
		.issued_at(now)
		.expires_at(now + Duration::hours(1))
		.build()
		.expect("Token fixture should build.")
}

fn handle() -> ResourceHandle {
	ResourceHandle::new("b!drive", "01ITEM")
}

#[tokio::test]
async fn resolve_encodes_the_share_link() {
	let transport = FakeTransport::new();

	transport.respond("GET", "/driveItem", 200, drive_item_body("b!drive", "01ITEM"));

	let share = validate_share_url(SHARE_URL).expect("Share URL should be valid.");
	let resolved = graph(&transport)
		.resolve(&share, &token())
		.await
		.expect("Share link should resolve.");

	assert_eq!(resolved, handle());

	let request = &transport.requests()[0];

	assert_eq!(
		request.path(),
		format!("/v1.0/shares/{}/driveItem", encode_share_url(share.as_str()))
	);
	assert_eq!(request.header("authorization"), Some("Bearer graph-access"));
}

#[tokio::test]
async fn resolve_rejects_incomplete_items_and_missing_links() {
	let transport = FakeTransport::new();

	transport.respond("GET", "/driveItem", 200, r#"{ "id": "01ITEM" }"#);
	transport.respond("GET", "/driveItem", 404, graph_error("itemNotFound", "The resource could not be found."));

	let share = validate_share_url(SHARE_URL).expect("Share URL should be valid.");
	let client = graph(&transport);

	assert!(matches!(
		client.resolve(&share, &token()).await,
		Err(Error::InvalidResourceUrl { ref reason }) if reason.contains("driveId")
	));
	assert!(matches!(
		client.resolve(&share, &token()).await,
		Err(Error::InvalidResourceUrl { ref reason }) if reason.contains("404")
	));
}

#[tokio::test]
async fn write_range_patches_the_exact_address() {
	let transport = FakeTransport::new();

	transport.respond("PATCH", "/range", 200, r#"{ "address": "Sheet1!A1:B2" }"#);

	let data = SyncData::new().with("q1", "yes").with("q2", vec!["a".to_owned(), "b".to_owned()]);
	let request = WriteRequest::new("Sheet1", &data).expect("Non-empty data should build a request.");

	graph(&transport)
		.write_range(&handle(), &request, &token())
		.await
		.expect("Range write should succeed.");

	let patch = &transport.requests()[0];

	assert_eq!(patch.method, "PATCH");
	assert_eq!(
		patch.path(),
		"/v1.0/drives/b!drive/items/01ITEM/workbook/worksheets/Sheet1/range(address='A1:B2')"
	);
	assert_eq!(patch.header("content-type"), Some("application/json"));
	assert_eq!(patch.json(), serde_json::json!({ "values": [["q1", "yes"], ["q2", "a, b"]] }));
}

#[tokio::test]
async fn write_failures_are_classified() {
	let transport = FakeTransport::new();

	transport.respond("PATCH", "/range", 401, graph_error("InvalidAuthenticationToken", "Access token has expired."));
	transport.respond("PATCH", "/range", 429, graph_error("TooManyRequests", "Slow down."));
	transport.respond("PATCH", "/range", 400, graph_error("InvalidArgument", "The argument is invalid."));

	let data = SyncData::new().with("q1", "yes");
	let request = WriteRequest::new("Sheet1", &data).expect("Non-empty data should build a request.");
	let client = graph(&transport);

	assert!(matches!(
		client.write_range(&handle(), &request, &token()).await,
		Err(Error::Unauthorized { target: RequestTarget::RangeWrite, .. })
	));
	assert!(matches!(
		client.write_range(&handle(), &request, &token()).await,
		Err(Error::Transient(TransientError::Api { status: 429, .. }))
	));
	assert!(matches!(
		client.write_range(&handle(), &request, &token()).await,
		Err(Error::WriteFailure { status: 400, ref message }) if message == "The argument is invalid."
	));
}

#[tokio::test]
async fn reads_decode_mixed_cell_values() {
	let transport = FakeTransport::new();

	transport.respond("GET", "/usedRange", 200, r#"{ "values": [["q1", "yes"], ["count", 3], ["flag", true], ["blank", ""]] }"#);
	transport.respond("GET", "/range", 200, r#"{ "values": [["q1", "yes"]] }"#);

	let client = graph(&transport);
	let used = client
		.used_range(&handle(), "Responses 2024", &token())
		.await
		.expect("Used range should read.");

	assert_eq!(
		used,
		[["q1", "yes"], ["count", "3"], ["flag", "true"], ["blank", ""]]
			.map(|row| row.map(str::to_owned).to_vec())
			.to_vec()
	);
	assert_eq!(
		transport.requests()[0].path(),
		"/v1.0/drives/b!drive/items/01ITEM/workbook/worksheets/Responses%202024/usedRange"
	);

	let address = RangeAddress::for_rows(1).expect("One row is a valid range.");
	let range = client
		.read_range(&handle(), "Sheet1", address, &token())
		.await
		.expect("Exact range should read.");

	assert_eq!(range, vec![vec!["q1".to_owned(), "yes".to_owned()]]);
	assert!(transport.requests()[1].path().ends_with("/range(address='A1:B1')"));
}

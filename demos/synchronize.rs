//! Writes a small form submission into a mocked workbook: the credential blob's access
//! token has expired, so the engine redeems its refresh token, resolves the sharing link,
//! and patches `Sheet1!A1:B3`.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use time::OffsetDateTime;
// self
use workbook_sync::{
	config::SyncConfig,
	graph::{SyncData, encode_share_url},
	store::{MemoryStore, TokenStore},
};

const SHARE_URL: &str = "https://contoso-my.sharepoint.com/:x:/g/personal/ada/EaBcDeF?e=4f2Gh1";

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"refresh_token\":\"demo-refresh\",\"token_type\":\"bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let share_path = format!("/v1.0/shares/{}/driveItem", encode_share_url(SHARE_URL));
	let share_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(share_path.as_str());
			then.status(200).header("content-type", "application/json").body(
				"{\"id\":\"01DEMO\",\"parentReference\":{\"driveId\":\"b!demo\"}}",
			);
		})
		.await;
	let write_mock = server
		.mock_async(|when, then| {
			when.method(PATCH).path(
				"/v1.0/drives/b!demo/items/01DEMO/workbook/worksheets/Sheet1/range(address='A1:B3')",
			);
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;
	let config = SyncConfig::from_json_str(
		&serde_json::json!({
			"tenant": "contoso",
			"client_id": "demo-client",
			"client_secret": "demo-secret",
			"provider": {
				"descriptor": {
					"id": "demo-identity",
					"endpoints": {
						"authorization": server.url("/authorize"),
						"token": server.url("/token")
					},
					"supported_grants": { "refresh_token": true },
					"preferred_client_auth_method": "client_secret_post"
				}
			},
			"scope": "Files.ReadWrite",
			"graph_base_url": server.url("/v1.0"),
			"diagnostic_read": false
		})
		.to_string(),
	)?;
	let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::default());
	let orchestrator = config.orchestrator(store)?;
	let expired = OffsetDateTime::now_utc().unix_timestamp() - 60;
	let blob = format!(
		"{{\"access_tokens\":{{\"Files.ReadWrite User.Read\":{{\"secret\":\"stale\",\"expires_on\":{expired}}}}},\"refresh_tokens\":{{\"Files.ReadWrite offline_access\":{{\"secret\":\"blob-refresh\"}}}}}}"
	);
	let data = SyncData::new()
		.with("Name", "Ada Lovelace")
		.with("Topics", vec!["engines".to_owned(), "notes".to_owned()])
		.with("Submitted", OffsetDateTime::now_utc());
	let outcome = orchestrator.synchronize(&blob, Some(SHARE_URL), &data).await?;

	println!("Wrote {} rows into {:?}.", outcome.rows_written, outcome.range.map(|range| range.to_string()));

	token_mock.assert_async().await;
	share_mock.assert_async().await;
	write_mock.assert_async().await;

	Ok(())
}

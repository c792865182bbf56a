//! Sharing-link encoding and the drive/item handle it resolves to.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::_prelude::*;

const SHARE_TOKEN_PREFIX: &str = "u!";

/// Immutable address of a workbook resolved from a sharing link.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
	/// Drive that owns the item.
	pub drive_id: String,
	/// Item identifier within the drive.
	pub item_id: String,
	/// API path of the item, relative to the Graph base URL.
	pub resource_path: String,
}
impl ResourceHandle {
	/// Creates a handle for `drive_id` + `item_id`.
	pub fn new(drive_id: impl Into<String>, item_id: impl Into<String>) -> Self {
		let drive_id = drive_id.into();
		let item_id = item_id.into();
		let resource_path = format!("/drives/{drive_id}/items/{item_id}");

		Self { drive_id, item_id, resource_path }
	}
}

/// Encodes a sharing URL into the `u!`-prefixed token the shares endpoint expects.
///
/// The URL's UTF-8 bytes are base64 encoded with the URL-safe alphabet and no padding,
/// so the token never contains `=`, `/`, or `+`.
pub fn encode_share_url(share_url: &str) -> String {
	format!("{SHARE_TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(share_url.as_bytes()))
}

/// Checks that `raw` is an absolute `http(s)` URL with a host.
///
/// Runs before any token is acquired, so a malformed link never causes network traffic.
pub fn validate_share_url(raw: &str) -> Result<Url> {
	let trimmed = raw.trim();

	if trimmed.is_empty() {
		return Err(invalid("sharing URL is empty"));
	}

	let url = Url::parse(trimmed).map_err(|e| invalid(format!("`{trimmed}` is not a URL: {e}")))?;

	if !matches!(url.scheme(), "https" | "http") {
		return Err(invalid(format!("`{trimmed}` must use http or https")));
	}
	if url.host_str().is_none_or(str::is_empty) {
		return Err(invalid(format!("`{trimmed}` has no host")));
	}

	Ok(url)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireDriveItem {
	#[serde(default)]
	pub(crate) id: Option<String>,
	#[serde(default)]
	pub(crate) parent_reference: Option<WireParentReference>,
}
impl WireDriveItem {
	pub(crate) fn into_handle(self) -> Result<ResourceHandle> {
		let item_id = self
			.id
			.filter(|id| !id.is_empty())
			.ok_or_else(|| invalid("drive item has no `id`"))?;
		let drive_id = self
			.parent_reference
			.and_then(|parent| parent.drive_id)
			.filter(|id| !id.is_empty())
			.ok_or_else(|| invalid("drive item has no `parentReference.driveId`"))?;

		Ok(ResourceHandle::new(drive_id, item_id))
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireParentReference {
	#[serde(default)]
	pub(crate) drive_id: Option<String>,
}

pub(crate) fn invalid(reason: impl Into<String>) -> Error {
	Error::InvalidResourceUrl { reason: reason.into() }
}

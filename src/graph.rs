//! Workbook API client: share-link resolution and worksheet range I/O.
//!
//! Every call carries a bearer token supplied by the caller; the client never acquires
//! tokens itself. Responses are classified per request target:
//!
//! | status            | share resolution     | range read       | range write       |
//! |-------------------|----------------------|------------------|-------------------|
//! | `401`             | `Unauthorized`       | `Unauthorized`   | `Unauthorized`    |
//! | `429`, `5xx`      | `Transient`          | `Transient`      | `Transient`       |
//! | other non-2xx     | `InvalidResourceUrl` | `ReadFailure`    | `WriteFailure`    |

pub mod range;
pub mod share;

pub use range::*;
pub use share::*;

// crates.io
use oauth2::{
	HttpRequest, HttpResponse,
	http::{
		Method, Request, StatusCode,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER},
	},
};
// self
use crate::{
	_prelude::*,
	auth::CachedToken,
	error::{ConfigError, TransientError},
	http::{self, ProviderHttpClient, RequestTarget, ResponseMetadata},
	oauth::{self, TransportErrorMapper},
	obs::{self, FlowKind},
};

/// Default Graph API root.
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

const BODY_PREVIEW_LEN: usize = 256;

/// Graph workbook client sharing the token manager's transport.
pub struct GraphClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client used for every Graph request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors.
	pub transport_mapper: Arc<M>,
	/// API root, e.g. `https://graph.microsoft.com/v1.0`.
	pub base_url: Url,
}
impl<C, M> GraphClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client rooted at `base_url`.
	pub fn new(http_client: Arc<C>, transport_mapper: Arc<M>, base_url: Url) -> Self {
		Self { http_client, transport_mapper, base_url }
	}

	/// Resolves a validated sharing URL into the workbook's drive/item handle.
	pub async fn resolve(&self, share_url: &Url, token: &CachedToken) -> Result<ResourceHandle> {
		obs::observe(FlowKind::ShareResolution, "resolve", async {
			let target = RequestTarget::ShareResolution;
			let encoded = encode_share_url(share_url.as_str());
			let url = self.endpoint(&["shares", &encoded, "driveItem"])?;
			let (response, meta) = self.send(target, Method::GET, url, token, None).await?;

			if !response.status().is_success() {
				return Err(api_error(target, &response, meta.as_ref()));
			}

			let mut de = serde_json::Deserializer::from_slice(response.body());
			let item: WireDriveItem = serde_path_to_error::deserialize(&mut de)
				.map_err(|e| invalid(format!("drive item is malformed at `{}`: {}", e.path(), e.inner())))?;

			item.into_handle()
		})
		.await
	}

	/// Reads an exact range of `sheet_name`.
	pub async fn read_range(
		&self,
		handle: &ResourceHandle,
		sheet_name: &str,
		address: RangeAddress,
		token: &CachedToken,
	) -> Result<CellMatrix> {
		obs::observe(FlowKind::RangeRead, "read_range", async {
			let url = self.range_url(handle, sheet_name, &format!("range(address='{address}')"))?;

			self.read(url, token).await
		})
		.await
	}

	/// Reads the used range of `sheet_name`.
	pub async fn used_range(
		&self,
		handle: &ResourceHandle,
		sheet_name: &str,
		token: &CachedToken,
	) -> Result<CellMatrix> {
		obs::observe(FlowKind::RangeRead, "used_range", async {
			let url = self.range_url(handle, sheet_name, "usedRange")?;

			self.read(url, token).await
		})
		.await
	}

	/// Writes `request.rows` into `request.address` with one `PATCH`.
	pub async fn write_range(
		&self,
		handle: &ResourceHandle,
		request: &WriteRequest,
		token: &CachedToken,
	) -> Result<()> {
		obs::observe(FlowKind::RangeWrite, "write_range", async {
			let target = RequestTarget::RangeWrite;
			let url = self.range_url(
				handle,
				&request.sheet_name,
				&format!("range(address='{}')", request.address),
			)?;
			let body = serde_json::to_vec(&WireRangeUpdate { values: &request.rows })
				.map_err(|e| Error::WriteFailure { status: 0, message: e.to_string() })?;
			let (response, meta) = self.send(target, Method::PATCH, url, token, Some(body)).await?;

			if response.status().is_success() {
				Ok(())
			} else {
				Err(api_error(target, &response, meta.as_ref()))
			}
		})
		.await
	}

	async fn read(&self, url: Url, token: &CachedToken) -> Result<CellMatrix> {
		let target = RequestTarget::RangeRead;
		let (response, meta) = self.send(target, Method::GET, url, token, None).await?;
		let status = response.status().as_u16();

		if !response.status().is_success() {
			return Err(api_error(target, &response, meta.as_ref()));
		}

		let mut de = serde_json::Deserializer::from_slice(response.body());
		let range: WireRange = serde_path_to_error::deserialize(&mut de).map_err(|e| {
			Error::ReadFailure {
				status,
				message: format!("range is malformed at `{}`: {}", e.path(), e.inner()),
			}
		})?;

		Ok(range.into_matrix())
	}

	fn range_url(&self, handle: &ResourceHandle, sheet_name: &str, leaf: &str) -> Result<Url> {
		self.endpoint(&[
			"drives",
			&handle.drive_id,
			"items",
			&handle.item_id,
			"workbook",
			"worksheets",
			sheet_name,
			leaf,
		])
	}

	fn endpoint(&self, segments: &[&str]) -> Result<Url> {
		let mut url = self.base_url.clone();

		url.path_segments_mut()
			.map_err(|_| ConfigError::InvalidConfig {
				path: "graph_base_url".into(),
				message: format!("`{}` cannot carry a path", self.base_url),
			})?
			.pop_if_empty()
			.extend(segments);

		Ok(url)
	}

	async fn send(
		&self,
		target: RequestTarget,
		method: Method,
		url: Url,
		token: &CachedToken,
		body: Option<Vec<u8>>,
	) -> Result<(HttpResponse, Option<ResponseMetadata>)> {
		let mut builder = Request::builder()
			.method(method)
			.uri(url.as_str())
			.header(ACCEPT, "application/json")
			.header(AUTHORIZATION, token.access_token.bearer());

		if body.is_some() {
			builder = builder.header(CONTENT_TYPE, "application/json");
		}

		let request: HttpRequest = builder.body(body.unwrap_or_default()).map_err(ConfigError::from)?;
		let (outcome, meta) = http::dispatch(self.http_client.as_ref(), request).await;
		let response = outcome
			.map_err(|e| self.transport_mapper.map_transport_error(target, meta.as_ref(), e))?;

		Ok((response, meta))
	}
}
impl<C, M> Clone for GraphClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			base_url: self.base_url.clone(),
		}
	}
}
impl<C, M> Debug for GraphClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GraphClient").field("base_url", &self.base_url.as_str()).finish()
	}
}

#[derive(Deserialize)]
struct WireErrorEnvelope {
	error: WireError,
}

#[derive(Deserialize)]
struct WireError {
	#[serde(default)]
	code: Option<String>,
	#[serde(default)]
	message: Option<String>,
}

fn api_error(target: RequestTarget, response: &HttpResponse, meta: Option<&ResponseMetadata>) -> Error {
	let status = response.status();
	let message = error_message(response);

	match status {
		StatusCode::UNAUTHORIZED => Error::Unauthorized { target, message },
		StatusCode::TOO_MANY_REQUESTS => transient(target, response, meta, message),
		status if status.is_server_error() => transient(target, response, meta, message),
		status => match target {
			RequestTarget::ShareResolution =>
				invalid(format!("share lookup failed with status {}: {message}", status.as_u16())),
			RequestTarget::RangeWrite => Error::WriteFailure { status: status.as_u16(), message },
			_ => Error::ReadFailure { status: status.as_u16(), message },
		},
	}
}

fn transient(
	target: RequestTarget,
	response: &HttpResponse,
	meta: Option<&ResponseMetadata>,
	message: String,
) -> Error {
	let retry_after = oauth::meta_retry_after(meta).or_else(|| {
		response
			.headers()
			.get(RETRY_AFTER)
			.and_then(|value| value.to_str().ok())
			.and_then(http::parse_retry_after)
	});

	TransientError::Api { target, status: response.status().as_u16(), message, retry_after }.into()
}

fn error_message(response: &HttpResponse) -> String {
	match serde_json::from_slice::<WireErrorEnvelope>(response.body()) {
		Ok(WireErrorEnvelope { error: WireError { message: Some(message), .. } })
			if !message.is_empty() =>
			message,
		Ok(WireErrorEnvelope { error: WireError { code: Some(code), .. } }) => code,
		_ => {
			let body = String::from_utf8_lossy(response.body());
			let preview = body.trim().chars().take(BODY_PREVIEW_LEN).collect::<String>();

			if preview.is_empty() {
				response.status().canonical_reason().unwrap_or("no error body").to_owned()
			} else {
				preview
			}
		},
	}
}

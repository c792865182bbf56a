//! Transport primitives shared by token, device-code, and workbook requests.
//!
//! [`ProviderHttpClient`] is the engine's only dependency on an HTTP stack. It hands out
//! `oauth2`-compatible [`AsyncHttpClient`] handles that publish [`ResponseMetadata`]
//! through a [`ResponseMetadataSlot`], so error mapping can classify failures with the
//! status code and `Retry-After` hint of the response that caused them. The same seam
//! carries the `oauth2` facade's grant requests and the hand-built Graph requests, which
//! keeps every outbound call observable (and fakeable) in one place.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
#[cfg(feature = "reqwest")] use reqwest::header::HeaderMap;
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, provider::GrantType};

/// Outbound request categories used for error mapping and log fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestTarget {
	/// Token endpoint call for the given grant.
	Token(GrantType),
	/// Device authorization endpoint call.
	DeviceAuthorization,
	/// Share-link metadata lookup.
	ShareResolution,
	/// Worksheet range read.
	RangeRead,
	/// Worksheet range patch.
	RangeWrite,
}
impl RequestTarget {
	/// Returns a stable label for messages and span fields.
	pub fn label(self) -> String {
		match self {
			Self::Token(grant) => format!("token:{}", grant.label()),
			Self::DeviceAuthorization => "device_authorization".into(),
			Self::ShareResolution => "share_resolution".into(),
			Self::RangeRead => "range_read".into(),
			Self::RangeWrite => "range_write".into(),
		}
	}
}
impl Display for RequestTarget {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.label())
	}
}

/// Abstraction over HTTP transports used for every provider call.
///
/// Implementations must be `Send + Sync + 'static` so they can be shared across token
/// managers and orchestrators, and the handles they return must own whatever state the
/// request futures need so those futures stay `Send`.
pub trait ProviderHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// Implementations call [`ResponseMetadataSlot::take`] before dispatching and
	/// [`ResponseMetadataSlot::store`] as soon as a status line is known.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Metadata captured from the most recent HTTP response.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Dispatches one request through a fresh instrumented handle.
///
/// Returns the transport outcome alongside whatever metadata the handle captured.
pub(crate) async fn dispatch<C>(
	client: &C,
	request: HttpRequest,
) -> (Result<HttpResponse, HttpClientError<C::TransportError>>, Option<ResponseMetadata>)
where
	C: ?Sized + ProviderHttpClient,
{
	let slot = ResponseMetadataSlot::default();
	let handle = client.with_metadata(slot.clone());
	let outcome = handle.call(request).await;

	(outcome, slot.take())
}

/// Parses a `Retry-After` header value (delta-seconds or an HTTP date).
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Token endpoints answer directly instead of redirecting; configure any custom client
/// passed to [`ReqwestHttpClient::with_client`] to disable redirect following.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ProviderHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		InstrumentedHandle(Arc::new(InstrumentedHttpClient { client: self.0.clone(), slot }))
	}
}

#[cfg(feature = "reqwest")]
struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

/// Handle returned by [`ReqwestHttpClient`] that records response metadata.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let retry_after = header_retry_after(&headers);

			client.slot.store(ResponseMetadata { status: Some(status.as_u16()), retry_after });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

#[cfg(feature = "reqwest")]
fn header_retry_after(headers: &HeaderMap) -> Option<Duration> {
	headers
		.get(reqwest::header::RETRY_AFTER)
		.and_then(|value| value.to_str().ok())
		.and_then(parse_retry_after)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn retry_after_accepts_delta_seconds() {
		assert_eq!(parse_retry_after(" 120 "), Some(Duration::seconds(120)));
		assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
		assert_eq!(parse_retry_after("soon"), None);
	}

	#[test]
	fn metadata_slot_take_clears_state() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata { status: Some(429), retry_after: None });

		assert_eq!(slot.take().and_then(|meta| meta.status), Some(429));
		assert!(slot.take().is_none());
	}

	#[test]
	fn request_targets_have_stable_labels() {
		assert_eq!(RequestTarget::Token(GrantType::DeviceCode).label(), "token:device_code");
		assert_eq!(RequestTarget::ShareResolution.to_string(), "share_resolution");
	}
}

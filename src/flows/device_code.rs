//! Device authorization grant (RFC 8628).
//!
//! `Requesting -> Polling -> {Succeeded, Expired, Declined}`. The flow asks the device
//! authorization endpoint for a user code, hands the instructions to a
//! [`DeviceCodePrompt`], then polls the token endpoint at the server-chosen interval.
//! Polling has a hard deadline of `expires_in`: a poll that would land at or after the
//! deadline is never sent, and the flow reports [`DeviceCodeOutcome::Expired`] exactly
//! when the budget runs out.

// std
use std::time::Duration as StdDuration;
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use oauth2::{
	HttpRequest, HttpResponse,
	http::{
		Method, Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use tokio::time::{self as tokio_time, Instant};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeSet, TenantId, TokenSecret, TokenSource},
	error::{ConfigError, TransientError},
	flows::{TokenManager, common},
	http::{self, ProviderHttpClient, RequestTarget, ResponseMetadata},
	oauth::{self, TransportErrorMapper},
	obs::{self, FlowKind},
	provider::{ClientAuthMethod, GrantType, ProviderErrorContext, ProviderStrategy},
};

const DEFAULT_INTERVAL_SECS: u64 = 5;
const SLOW_DOWN_STEP: StdDuration = StdDuration::from_secs(5);

/// Instructions returned by the device authorization endpoint.
#[derive(Clone)]
pub struct DeviceAuthorization {
	/// Code the person types at the verification page.
	pub user_code: String,
	/// Page where the person completes sign-in.
	pub verification_uri: String,
	/// Verification page with the user code pre-filled, when offered.
	pub verification_uri_complete: Option<String>,
	/// Human-readable instructions supplied by the provider.
	pub message: Option<String>,
	/// Lifetime of the device code.
	pub expires_in: Duration,
	/// Minimum delay between polls.
	pub interval: Duration,
	device_code: TokenSecret,
}
impl Debug for DeviceAuthorization {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DeviceAuthorization")
			.field("user_code", &self.user_code)
			.field("verification_uri", &self.verification_uri)
			.field("expires_in", &self.expires_in)
			.field("interval", &self.interval)
			.field("device_code", &self.device_code)
			.finish()
	}
}

/// Receives device-code instructions for the person completing sign-in.
pub trait DeviceCodePrompt
where
	Self: Send + Sync,
{
	/// Called once per device authorization, before the first poll.
	fn present(&self, authorization: &DeviceAuthorization);
}

/// Prompt that emits the instructions as a log event.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogDeviceCodePrompt;
impl DeviceCodePrompt for LogDeviceCodePrompt {
	fn present(&self, authorization: &DeviceAuthorization) {
		obs::device_code_issued(
			&authorization.verification_uri,
			&authorization.user_code,
			authorization.message.as_deref(),
		);
	}
}

/// Terminal state of a device-code flow.
#[derive(Clone, Debug)]
pub enum DeviceCodeOutcome {
	/// Sign-in completed; the token is already cached.
	Succeeded(CachedToken),
	/// The code expired before sign-in completed.
	Expired,
	/// The person declined the request.
	Declined,
}

enum PollOutcome {
	Pending,
	SlowDown,
	Done(DeviceCodeOutcome),
}

#[derive(Deserialize)]
struct WireDeviceAuthorization {
	device_code: String,
	user_code: String,
	#[serde(alias = "verification_url")]
	verification_uri: String,
	#[serde(default)]
	verification_uri_complete: Option<String>,
	#[serde(default)]
	message: Option<String>,
	expires_in: u64,
	#[serde(default)]
	interval: Option<u64>,
}

#[derive(Deserialize)]
struct WireToken {
	access_token: String,
	expires_in: u64,
	#[serde(default)]
	refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct WireError {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
}

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Runs the device authorization grant for `tenant` + `scope`.
	///
	/// On success the token replaces the tenant's cache entry before it is returned.
	pub async fn device_code(
		&self,
		tenant: &TenantId,
		scope: &ScopeSet,
	) -> Result<DeviceCodeOutcome> {
		obs::observe(FlowKind::DeviceCode, "device_code", async {
			self.ensure_grant_supported(GrantType::DeviceCode)?;

			let authorization = self.request_device_authorization(scope).await?;

			self.device_prompt.present(&authorization);

			let outcome = self.poll_device_token(tenant, scope, &authorization).await?;

			if let DeviceCodeOutcome::Succeeded(record) = &outcome {
				self.metrics.record_network_grant();
				self.store.save(record.clone()).await?;
			}

			Ok(outcome)
		})
		.await
	}

	async fn request_device_authorization(&self, scope: &ScopeSet) -> Result<DeviceAuthorization> {
		let endpoint = self.descriptor.endpoints.device_authorization.as_ref().ok_or_else(|| {
			ConfigError::MissingDeviceEndpoint { descriptor: self.descriptor.id.to_string() }
		})?;
		let mut form = BTreeMap::new();

		if let Some(value) = common::format_scope(scope, self.descriptor.quirks.scope_delimiter) {
			form.insert("scope".to_owned(), value);
		}

		let target = RequestTarget::DeviceAuthorization;
		let (response, meta) = self.send_form(target, endpoint, form).await?;

		if !response.status().is_success() {
			return Err(self.token_error(&response, meta.as_ref()));
		}

		let wire: WireDeviceAuthorization = parse_json(&response, meta.as_ref())?;
		let interval = wire.interval.unwrap_or(DEFAULT_INTERVAL_SECS).max(1);

		Ok(DeviceAuthorization {
			user_code: wire.user_code,
			verification_uri: wire.verification_uri,
			verification_uri_complete: wire.verification_uri_complete,
			message: wire.message,
			expires_in: oauth::lifetime_from_secs(wire.expires_in)?,
			interval: oauth::lifetime_from_secs(interval)?,
			device_code: TokenSecret::new(wire.device_code),
		})
	}

	async fn poll_device_token(
		&self,
		tenant: &TenantId,
		scope: &ScopeSet,
		authorization: &DeviceAuthorization,
	) -> Result<DeviceCodeOutcome> {
		let deadline = Instant::now()
			.checked_add(authorization.expires_in.unsigned_abs())
			.ok_or(ConfigError::ExpiresInOutOfRange)?;
		let mut interval = authorization.interval.unsigned_abs();

		loop {
			let next_poll = Instant::now().checked_add(interval).unwrap_or(deadline);

			if next_poll >= deadline {
				tokio_time::sleep_until(deadline).await;

				return Ok(DeviceCodeOutcome::Expired);
			}

			tokio_time::sleep_until(next_poll).await;

			match self.poll_once(tenant, scope, authorization).await? {
				PollOutcome::Pending => {},
				PollOutcome::SlowDown => interval += SLOW_DOWN_STEP,
				PollOutcome::Done(outcome) => return Ok(outcome),
			}
		}
	}

	async fn poll_once(
		&self,
		tenant: &TenantId,
		scope: &ScopeSet,
		authorization: &DeviceAuthorization,
	) -> Result<PollOutcome> {
		let grant = GrantType::DeviceCode;
		let mut form = BTreeMap::new();

		<dyn ProviderStrategy>::augment_token_request(self.strategy.as_ref(), grant, &mut form);
		form.insert("grant_type".to_owned(), grant.as_str().to_owned());
		form.insert("device_code".to_owned(), authorization.device_code.expose().to_owned());

		let (response, meta) =
			self.send_form(RequestTarget::Token(grant), &self.descriptor.endpoints.token, form).await?;

		if response.status().is_success() {
			let wire: WireToken = parse_json(&response, meta.as_ref())?;
			let record = CachedToken::builder(tenant.clone(), scope.clone(), TokenSource::DeviceCode)
				.access_token(wire.access_token)
				.refresh_secret(wire.refresh_token.map(TokenSecret::new))
				.issued_at(OffsetDateTime::now_utc())
				.expires_in(oauth::lifetime_from_secs(wire.expires_in)?)
				.build()
				.map_err(ConfigError::from)?;

			return Ok(PollOutcome::Done(DeviceCodeOutcome::Succeeded(record)));
		}

		let code = serde_json::from_slice::<WireError>(response.body())
			.map(|wire| wire.error.to_ascii_lowercase())
			.unwrap_or_default();

		match code.as_str() {
			"authorization_pending" => Ok(PollOutcome::Pending),
			"slow_down" => Ok(PollOutcome::SlowDown),
			"access_denied" | "authorization_declined" =>
				Ok(PollOutcome::Done(DeviceCodeOutcome::Declined)),
			"expired_token" => Ok(PollOutcome::Done(DeviceCodeOutcome::Expired)),
			_ => Err(self.token_error(&response, meta.as_ref())),
		}
	}

	async fn send_form(
		&self,
		target: RequestTarget,
		endpoint: &Url,
		mut form: BTreeMap<String, String>,
	) -> Result<(HttpResponse, Option<ResponseMetadata>)> {
		form.insert("client_id".to_owned(), self.client_id.clone());

		let mut builder = Request::builder()
			.method(Method::POST)
			.uri(endpoint.as_str())
			.header(ACCEPT, "application/json")
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded");

		match (self.descriptor.preferred_client_auth_method, self.client_secret.as_deref()) {
			(ClientAuthMethod::ClientSecretPost, Some(secret)) => {
				form.insert("client_secret".to_owned(), secret.to_owned());
			},
			(ClientAuthMethod::ClientSecretBasic, Some(secret)) => {
				builder = builder.header(AUTHORIZATION, basic_auth(&self.client_id, secret));
			},
			_ => {},
		}

		let body = form_urlencoded::Serializer::new(String::new()).extend_pairs(&form).finish();
		let request: HttpRequest = builder.body(body.into_bytes()).map_err(ConfigError::from)?;
		let (outcome, meta) = http::dispatch(self.http_client.as_ref(), request).await;
		let response = outcome
			.map_err(|e| self.transport_mapper.map_transport_error(target, meta.as_ref(), e))?;

		Ok((response, meta))
	}

	fn token_error(&self, response: &HttpResponse, meta: Option<&ResponseMetadata>) -> Error {
		let mut ctx =
			ProviderErrorContext::new(GrantType::DeviceCode).with_http_status(response.status().as_u16());

		match serde_json::from_slice::<WireError>(response.body()) {
			Ok(wire) => {
				ctx = ctx.with_oauth_error(wire.error);

				if let Some(description) = wire.error_description {
					ctx = ctx.with_error_description(description);
				}
			},
			Err(_) => ctx = ctx.with_body_preview(String::from_utf8_lossy(response.body())),
		}

		oauth::classify_provider_error(self.strategy.as_ref(), &ctx, meta)
	}
}

fn parse_json<T>(response: &HttpResponse, meta: Option<&ResponseMetadata>) -> Result<T>
where
	T: for<'de> Deserialize<'de>,
{
	let mut de = serde_json::Deserializer::from_slice(response.body());

	serde_path_to_error::deserialize(&mut de).map_err(|source| {
		TransientError::TokenResponseParse {
			source,
			status: oauth::meta_status(meta).or(Some(response.status().as_u16())),
		}
		.into()
	})
}

fn basic_auth(client_id: &str, secret: &str) -> String {
	let encode = |value: &str| form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>();

	format!("Basic {}", STANDARD.encode(format!("{}:{}", encode(client_id), encode(secret))))
}

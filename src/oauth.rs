//! Token-endpoint facade over the `oauth2` crate plus provider error mapping.
//!
//! Flows never talk to `oauth2::BasicClient` directly. `BasicFacade` configures the
//! client from a [`ProviderDescriptor`], routes every grant through a
//! [`ProviderHttpClient`] handle so response metadata is captured, and converts both
//! token responses and failures into engine types. The mapping helpers are shared with
//! the hand-built device-code requests so every token endpoint failure is classified the
//! same way.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeSet, TenantId, TokenSecret, TokenSource},
	error::{ConfigError, TransientError},
	http::{ProviderHttpClient, RequestTarget, ResponseMetadata, ResponseMetadataSlot},
	provider::{
		ClientAuthMethod, GrantType, ProviderDescriptor, ProviderErrorContext, ProviderErrorKind,
		ProviderStrategy,
	},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Maps HTTP transport failures into engine [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into an engine error.
	fn map_transport_error(
		&self,
		target: RequestTarget,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		target: RequestTarget,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(target, *inner),
			other => map_generic_transport_error(target, meta, other),
		}
	}
}

/// Maps the transport-agnostic [`HttpClientError`] variants.
///
/// Custom mappers can delegate here for everything but their transport's own variant.
pub fn map_generic_transport_error<E>(
	target: RequestTarget,
	meta: Option<&ResponseMetadata>,
	err: HttpClientError<E>,
) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(source) => TransientError::Io { target, source }.into(),
		HttpClientError::Other(message) => TransientError::Api {
			target,
			status: meta_status(meta).unwrap_or_default(),
			message,
			retry_after: meta_retry_after(meta),
		}
		.into(),
		HttpClientError::Reqwest(inner) => TransientError::network(target, *inner).into(),
		_ => TransientError::Api {
			target,
			status: meta_status(meta).unwrap_or_default(),
			message: "unknown HTTP client failure".into(),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

/// Token endpoint operations the flows depend on.
pub(crate) trait OAuth2Facade {
	fn exchange_client_credentials<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		tenant: TenantId,
		scope: &'a ScopeSet,
		request_scope: &'a ScopeSet,
		extra_params: &'a [(String, String)],
	) -> FacadeFuture<'a, CachedToken>;

	fn refresh_token<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		tenant: TenantId,
		refresh_token: &'a TokenSecret,
		scope: &'a ScopeSet,
	) -> FacadeFuture<'a, CachedToken>;

	fn exchange_authorization_code<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		tenant: TenantId,
		code: &'a str,
		pkce_verifier: &'a str,
		scope: &'a ScopeSet,
		redirect_uri: &'a Url,
	) -> FacadeFuture<'a, CachedToken>;
}

pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: Option<&str>,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		match descriptor.preferred_client_auth_method {
			ClientAuthMethod::NoneWithPkce => {},
			method =>
				if let Some(secret) = client_secret {
					oauth_client =
						oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));

					if method == ClientAuthMethod::ClientSecretPost {
						oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
					}
				},
		}

		Ok(Self { oauth_client, http_client, error_mapper })
	}

	fn map_request_error(
		&self,
		strategy: &dyn ProviderStrategy,
		grant: GrantType,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> Error {
		let meta = meta.as_ref();
		let target = RequestTarget::Token(grant);

		match err {
			RequestTokenError::ServerResponse(response) =>
				map_server_response_error(strategy, grant, &response, meta),
			RequestTokenError::Request(error) =>
				self.error_mapper.map_transport_error(target, meta, error),
			RequestTokenError::Parse(source, _body) =>
				TransientError::TokenResponseParse { source, status: meta_status(meta) }.into(),
			RequestTokenError::Other(message) => TransientError::TokenEndpoint {
				message,
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
		}
	}
}
impl<C, M> OAuth2Facade for BasicFacade<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_client_credentials<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		tenant: TenantId,
		scope: &'a ScopeSet,
		request_scope: &'a ScopeSet,
		extra_params: &'a [(String, String)],
	) -> FacadeFuture<'a, CachedToken> {
		Box::pin(async move {
			let slot = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(slot.clone());
			let mut request = self.oauth_client.exchange_client_credentials();

			for value in request_scope.iter() {
				request = request.add_scope(Scope::new(value.to_owned()));
			}
			for (key, value) in extra_params {
				request = request.add_extra_param(key, value);
			}

			let response = request.request_async(&handle).await.map_err(|err| {
				self.map_request_error(strategy, GrantType::ClientCredentials, slot.take(), err)
			})?;

			map_token_response(tenant, scope, TokenSource::ClientCredentials, response)
		})
	}

	fn refresh_token<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		tenant: TenantId,
		refresh_token: &'a TokenSecret,
		scope: &'a ScopeSet,
	) -> FacadeFuture<'a, CachedToken> {
		Box::pin(async move {
			let slot = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(slot.clone());
			let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
			let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

			for value in scope.iter() {
				request = request.add_scope(Scope::new(value.to_owned()));
			}

			let response = request.request_async(&handle).await.map_err(|err| {
				self.map_request_error(strategy, GrantType::RefreshToken, slot.take(), err)
			})?;

			map_token_response(tenant, scope, TokenSource::RefreshGrant, response)
		})
	}

	fn exchange_authorization_code<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		tenant: TenantId,
		code: &'a str,
		pkce_verifier: &'a str,
		scope: &'a ScopeSet,
		redirect_uri: &'a Url,
	) -> FacadeFuture<'a, CachedToken> {
		Box::pin(async move {
			let slot = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(slot.clone());
			let redirect_url = RedirectUrl::new(redirect_uri.to_string())
				.map_err(|source| ConfigError::InvalidRedirect { source })?;
			let mut request = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_owned()))
				.set_redirect_uri(Cow::Owned(redirect_url));

			if !scope.is_empty() {
				request = request.add_extra_param("scope", scope.normalized());
			}

			let response = request.request_async(&handle).await.map_err(|err| {
				self.map_request_error(strategy, GrantType::AuthorizationCode, slot.take(), err)
			})?;

			map_token_response(tenant, scope, TokenSource::Consent, response)
		})
	}
}

/// Longest lifetime accepted from a provider response.
pub(crate) const MAX_LIFETIME: Duration = Duration::days(366);

/// Converts a provider-reported lifetime in seconds into a positive [`Duration`].
///
/// Lifetimes above [`MAX_LIFETIME`] are rejected.
pub(crate) fn lifetime_from_secs(secs: u64) -> Result<Duration> {
	if secs == 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	i64::try_from(secs)
		.ok()
		.map(Duration::seconds)
		.filter(|lifetime| *lifetime <= MAX_LIFETIME)
		.ok_or_else(|| ConfigError::ExpiresInOutOfRange.into())
}

/// Classifies a provider error context and converts it into an engine error.
pub(crate) fn classify_provider_error(
	strategy: &dyn ProviderStrategy,
	ctx: &ProviderErrorContext,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let reason = ctx.reason();

	match strategy.classify_token_error(ctx) {
		ProviderErrorKind::InteractionRequired => Error::InteractiveAuthRequired { reason },
		ProviderErrorKind::InvalidGrant
		| ProviderErrorKind::InvalidClient
		| ProviderErrorKind::InsufficientScope => Error::AuthPermanent { reason },
		ProviderErrorKind::Transient => TransientError::TokenEndpoint {
			message: reason,
			status: meta_status(meta).or(ctx.http_status),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

pub(crate) fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

pub(crate) fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

fn map_token_response(
	tenant: TenantId,
	scope: &ScopeSet,
	source: TokenSource,
	response: BasicTokenResponse,
) -> Result<CachedToken> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let mut builder = CachedToken::builder(tenant, scope.clone(), source)
		.access_token(response.access_token().secret().to_owned())
		.issued_at(OffsetDateTime::now_utc())
		.expires_in(lifetime_from_secs(expires_in)?);

	if let Some(refresh) = response.refresh_token() {
		builder = builder.refresh_token(refresh.secret().to_owned());
	}

	builder.build().map_err(|e| ConfigError::from(e).into())
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	response: &BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let mut ctx =
		ProviderErrorContext::new(grant).with_oauth_error(response.error().as_ref().to_owned());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	classify_provider_error(strategy, &ctx, meta)
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(target: RequestTarget, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}

	TransientError::network(target, err).into()
}

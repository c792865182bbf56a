//! Engine-level error types shared across credentials, flows, stores, and Graph calls.

// self
use crate::{_prelude::*, http::RequestTarget};

/// Engine-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical engine error exposed by public APIs.
///
/// Only [`Error::Transient`] is safe to retry programmatically. Every other variant is
/// either fatal or, for [`Error::InteractiveAuthRequired`], must be surfaced to a human.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Malformed or incomplete local configuration or credential blob.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream or network failure; retry the whole operation with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),

	/// Provider rejected the grant or the token outright.
	#[error("Provider rejected the credentials: {reason}.")]
	AuthPermanent {
		/// Provider- or engine-supplied reason string.
		reason: String,
	},
	/// User consent or sign-in is required before tokens can be issued.
	#[error("Interactive sign-in is required: {reason}.")]
	InteractiveAuthRequired {
		/// Provider- or engine-supplied reason string.
		reason: String,
	},
	/// The sharing URL cannot be resolved into a workbook handle.
	#[error("Sharing URL cannot be resolved: {reason}.")]
	InvalidResourceUrl {
		/// Why the URL was rejected.
		reason: String,
	},
	/// Resource API answered `401`; the caller decides whether a forced refresh is allowed.
	#[error("The {target} call was rejected with 401: {message}.")]
	Unauthorized {
		/// Request that was rejected.
		target: RequestTarget,
		/// Provider error text.
		message: String,
	},
	/// Provider rejected the range write payload.
	#[error("Range write failed with status {status}: {message}.")]
	WriteFailure {
		/// HTTP status code returned by the provider.
		status: u16,
		/// Provider error text.
		message: String,
	},
	/// Provider rejected a diagnostic range read.
	#[error("Range read failed with status {status}: {message}.")]
	ReadFailure {
		/// HTTP status code returned by the provider.
		status: u16,
		/// Provider error text.
		message: String,
	},
}
impl Error {
	/// Returns `true` when the caller may retry the whole operation with backoff.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient(_))
	}
}

/// Configuration and validation failures raised before any network call.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Engine configuration document could not be decoded.
	#[error("Configuration is invalid at `{path}`: {message}.")]
	InvalidConfig {
		/// JSON path of the failing field.
		path: String,
		/// Decoder message.
		message: String,
	},
	/// Credential blob could not be decoded.
	#[error("Credential blob is malformed at `{path}`: {message}.")]
	MalformedCredentials {
		/// JSON path of the failing field.
		path: String,
		/// Decoder message.
		message: String,
	},
	/// No access-token entry in the credential blob covers the write scopes.
	#[error("Credential blob has no access token covering the scopes `{required}`.")]
	MissingWriteScope {
		/// Normalized scope string that was required.
		required: String,
	},
	/// Tenant or provider identifier is invalid.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),

	/// Descriptor does not enable the requested grant.
	#[error("Descriptor `{descriptor}` does not enable the {grant} grant.")]
	UnsupportedGrant {
		/// Provider identifier string.
		descriptor: String,
		/// Disabled grant label.
		grant: &'static str,
	},
	/// The device-code strategy is configured but the descriptor has no device endpoint.
	#[error("Descriptor `{descriptor}` has no device authorization endpoint.")]
	MissingDeviceEndpoint {
		/// Provider identifier string.
		descriptor: String,
	},
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::CachedTokenBuilderError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or engine-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Resource API answered with a throttling or server-side failure.
	#[error("The {target} call failed with status {status}: {message}.")]
	Api {
		/// Request that failed.
		target: RequestTarget,
		/// HTTP status code.
		status: u16,
		/// Provider error text.
		message: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred during the {target} call.")]
	Network {
		/// Request that failed.
		target: RequestTarget,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during the {target} call.")]
	Io {
		/// Request that failed.
		target: RequestTarget,
		/// IO failure.
		#[source]
		source: std::io::Error,
	},
}
impl TransientError {
	/// Wraps a transport-specific network error.
	pub fn network(
		target: RequestTarget,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { target, source: Box::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::provider::GrantType;

	#[test]
	fn only_transient_errors_are_retryable() {
		let transient: Error = TransientError::TokenEndpoint {
			message: "busy".into(),
			status: Some(503),
			retry_after: None,
		}
		.into();

		assert!(transient.is_retryable());
		assert!(!Error::AuthPermanent { reason: "invalid_grant".into() }.is_retryable());
		assert!(!Error::InteractiveAuthRequired { reason: "consent".into() }.is_retryable());
		assert!(
			!Error::from(ConfigError::MissingWriteScope { required: "Files.ReadWrite".into() })
				.is_retryable()
		);
	}

	#[test]
	fn messages_name_the_request_target() {
		let err = Error::Unauthorized {
			target: RequestTarget::RangeWrite,
			message: "InvalidAuthenticationToken".into(),
		};

		assert_eq!(
			err.to_string(),
			"The range_write call was rejected with 401: InvalidAuthenticationToken."
		);

		let err = TransientError::Api {
			target: RequestTarget::Token(GrantType::RefreshToken),
			status: 503,
			message: "unavailable".into(),
			retry_after: None,
		};

		assert!(err.to_string().contains("token:refresh_token"));
	}
}

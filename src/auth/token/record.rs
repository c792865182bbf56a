//! Cached access-token records, their usability window, and a builder.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TenantId, token::secret::TokenSecret},
};

/// Buffer subtracted from a token's reported expiry before it is considered unusable.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::minutes(5);

/// Usability of a cached token at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// `now < expires_at - safety_margin`; the token may be sent.
	Usable,
	/// The provider may still accept it, but it is inside the safety margin.
	WithinSafetyMargin,
	/// `now >= expires_at`.
	Expired,
}

/// Acquisition path that produced a cached token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
	/// Access token copied from a pre-provisioned credential blob.
	CredentialBlob,
	/// Refresh-token grant.
	RefreshGrant,
	/// Client-credentials grant.
	ClientCredentials,
	/// Device authorization grant.
	DeviceCode,
	/// Authorization code exchanged after an interactive consent hand-off.
	Consent,
}

/// Errors produced by [`CachedTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CachedTokenBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when `issued_at + expires_in` falls outside the representable range.
	#[error("Expiry is out of range.")]
	ExpiryOutOfRange,
}

/// Per-tenant cache entry.
///
/// Records are immutable once built: every refresh or re-acquisition produces a new
/// record that replaces the old one as a whole, so the access token and its expiry can
/// never drift apart.
#[derive(Clone, Serialize, Deserialize)]
pub struct CachedToken {
	/// Tenant key the record is cached under.
	pub tenant: TenantId,
	/// Scopes the access token was requested for.
	pub scope: ScopeSet,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if one is known.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the record was minted locally.
	pub issued_at: OffsetDateTime,
	/// Provider-reported expiry (issued_at + expires_in, or the blob's `expires_on`).
	pub expires_at: OffsetDateTime,
	/// Acquisition path that produced the record.
	pub source: TokenSource,
}
impl CachedToken {
	/// Returns a builder for constructing records.
	pub fn builder(tenant: TenantId, scope: ScopeSet, source: TokenSource) -> CachedTokenBuilder {
		CachedTokenBuilder::new(tenant, scope, source)
	}

	/// Computes the usability status at `instant` under the provided safety margin.
	pub fn status_at(&self, instant: OffsetDateTime, safety_margin: Duration) -> TokenStatus {
		if instant >= self.expires_at {
			TokenStatus::Expired
		} else if self.expires_at.checked_sub(safety_margin).is_none_or(|edge| instant >= edge) {
			TokenStatus::WithinSafetyMargin
		} else {
			TokenStatus::Usable
		}
	}

	/// Returns `true` while `instant < expires_at - safety_margin`.
	pub fn is_usable_at(&self, instant: OffsetDateTime, safety_margin: Duration) -> bool {
		matches!(self.status_at(instant, safety_margin), TokenStatus::Usable)
	}

	/// Returns a copy carrying `refresh_token` when the record has none of its own.
	pub fn with_fallback_refresh(mut self, refresh_token: Option<TokenSecret>) -> Self {
		if self.refresh_token.is_none() {
			self.refresh_token = refresh_token;
		}

		self
	}
}
impl Debug for CachedToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CachedToken")
			.field("tenant", &self.tenant)
			.field("scope", &self.scope)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("source", &self.source)
			.finish()
	}
}

/// Builder for [`CachedToken`].
#[derive(Clone, Debug)]
pub struct CachedTokenBuilder {
	tenant: TenantId,
	scope: ScopeSet,
	source: TokenSource,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CachedTokenBuilder {
	fn new(tenant: TenantId, scope: ScopeSet, source: TokenSource) -> Self {
		Self {
			tenant,
			scope,
			source,
			access_token: None,
			refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides an optional, already wrapped refresh token.
	pub fn refresh_secret(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token;

		self
	}

	/// Consumes the builder and produces a [`CachedToken`].
	pub fn build(self) -> Result<CachedToken, CachedTokenBuilderError> {
		let access_token = self.access_token.ok_or(CachedTokenBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) =>
				issued_at.checked_add(delta).ok_or(CachedTokenBuilderError::ExpiryOutOfRange)?,
			(None, None) => return Err(CachedTokenBuilderError::MissingExpiry),
		};

		Ok(CachedToken {
			tenant: self.tenant,
			scope: self.scope,
			access_token,
			refresh_token: self.refresh_token,
			issued_at,
			expires_at,
			source: self.source,
		})
	}
}

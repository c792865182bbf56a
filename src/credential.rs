//! Credential blob decoding.
//!
//! A blob is the JSON cache an identity library leaves behind after an interactive
//! sign-in: access-token entries keyed by the space-delimited scope string they were
//! granted for, and optional refresh-token entries keyed the same way.
//!
//! ```json
//! {
//!   "access_tokens": {
//!     "Files.ReadWrite User.Read": { "secret": "eyJ0...", "expires_on": 1735693200 }
//!   },
//!   "refresh_tokens": {
//!     "Files.ReadWrite User.Read offline_access": { "secret": "0.AXo..." }
//!   }
//! }
//! ```
//!
//! Decoding happens once per call and fails fast: a blob that cannot be parsed, or that
//! holds no access-token entry covering the write scopes, is rejected before any network
//! traffic.

// crates.io
use serde::{Deserializer, de::Error as DeError};
// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeSet, TenantId, TokenSecret, TokenSource},
	error::ConfigError,
};

/// Access-token candidate from a credential blob.
#[derive(Clone, Debug)]
pub struct TokenEntry {
	/// Scopes the token was granted for.
	pub scope: ScopeSet,
	/// Access token value.
	pub secret: TokenSecret,
	/// Provider-reported expiry.
	pub expires_at: OffsetDateTime,
}

/// Refresh-token candidate from a credential blob.
#[derive(Clone, Debug)]
pub struct RefreshTokenEntry {
	/// Scopes the refresh token may be redeemed for.
	pub scope: ScopeSet,
	/// Refresh token value.
	pub secret: TokenSecret,
	/// Optional expiry; entries without one never expire locally.
	pub expires_at: Option<OffsetDateTime>,
}
impl RefreshTokenEntry {
	/// Returns `true` while the entry can still be redeemed at `now`.
	pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|expires_at| now < expires_at)
	}
}

/// Validated credential blob.
#[derive(Clone, Debug, Default)]
pub struct CredentialBlob {
	access_tokens: Vec<TokenEntry>,
	refresh_tokens: Vec<RefreshTokenEntry>,
}
impl CredentialBlob {
	/// Decodes `raw` and checks that some access-token entry covers `required`.
	pub fn decode(raw: &str, required: &ScopeSet) -> Result<Self> {
		let blob = Self::parse(raw)?;

		if blob.access_tokens.iter().any(|entry| entry.scope.covers(required)) {
			Ok(blob)
		} else {
			Err(ConfigError::MissingWriteScope { required: required.normalized() }.into())
		}
	}

	/// Decodes `raw` without checking scope coverage.
	pub fn parse(raw: &str) -> Result<Self> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let wire: WireBlob = serde_path_to_error::deserialize(&mut de).map_err(|e| {
			ConfigError::MalformedCredentials {
				path: e.path().to_string(),
				message: e.inner().to_string(),
			}
		})?;

		de.end().map_err(|e| ConfigError::MalformedCredentials {
			path: String::new(),
			message: e.to_string(),
		})?;

		let access_tokens = wire
			.access_tokens
			.into_iter()
			.map(|(key, entry)| {
				let path = format!("access_tokens.{key}");
				let expires_on = entry.expires_on.ok_or_else(|| ConfigError::MalformedCredentials {
					path: format!("{path}.expires_on"),
					message: "missing field `expires_on`".into(),
				})?;

				Ok(TokenEntry {
					scope: parse_scope_key(&path, &key)?,
					secret: secret(&path, entry.secret)?,
					expires_at: expires_on.into_instant(&path)?,
				})
			})
			.collect::<Result<Vec<_>, ConfigError>>()?;
		let refresh_tokens = wire
			.refresh_tokens
			.into_iter()
			.map(|(key, entry)| {
				let path = format!("refresh_tokens.{key}");

				Ok(RefreshTokenEntry {
					scope: parse_scope_key(&path, &key)?,
					secret: secret(&path, entry.secret)?,
					expires_at: entry
						.expires_on
						.map(|expires_on| expires_on.into_instant(&path))
						.transpose()?,
				})
			})
			.collect::<Result<Vec<_>, ConfigError>>()?;

		Ok(Self { access_tokens, refresh_tokens })
	}

	/// Access-token entry covering `required` with the latest expiry.
	pub fn access_token_for(&self, required: &ScopeSet) -> Option<&TokenEntry> {
		self.access_tokens
			.iter()
			.filter(|entry| entry.scope.covers(required))
			.max_by_key(|entry| entry.expires_at)
	}

	/// Live refresh-token entry covering `required`, if any.
	pub fn refresh_token_for(
		&self,
		required: &ScopeSet,
		now: OffsetDateTime,
	) -> Option<&RefreshTokenEntry> {
		self.refresh_tokens
			.iter()
			.filter(|entry| entry.scope.covers(required) && entry.is_live_at(now))
			.max_by_key(|entry| (entry.expires_at.is_none(), entry.expires_at))
	}

	/// Builds a cache record from the best access-token entry for `required`.
	///
	/// The record is keyed by `required` (not the entry's broader scope) and carries a
	/// covering refresh token when the blob has one.
	pub fn cached_token(
		&self,
		tenant: &TenantId,
		required: &ScopeSet,
		now: OffsetDateTime,
	) -> Option<CachedToken> {
		let entry = self.access_token_for(required)?;
		let refresh = self.refresh_token_for(required, now).map(|entry| entry.secret.clone());

		CachedToken::builder(tenant.clone(), required.clone(), TokenSource::CredentialBlob)
			.access_token(entry.secret.expose())
			.refresh_secret(refresh)
			.issued_at(now)
			.expires_at(entry.expires_at)
			.build()
			.ok()
	}
}

#[derive(Deserialize)]
struct WireBlob {
	#[serde(default)]
	access_tokens: BTreeMap<String, WireEntry>,
	#[serde(default)]
	refresh_tokens: BTreeMap<String, WireEntry>,
}

#[derive(Deserialize)]
struct WireEntry {
	secret: String,
	#[serde(default, deserialize_with = "deserialize_expires_on")]
	expires_on: Option<EpochSeconds>,
}

/// Epoch seconds written either as a JSON number or as a numeric string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct EpochSeconds(i64);
impl EpochSeconds {
	fn into_instant(self, path: &str) -> Result<OffsetDateTime, ConfigError> {
		OffsetDateTime::from_unix_timestamp(self.0).map_err(|e| ConfigError::MalformedCredentials {
			path: format!("{path}.expires_on"),
			message: e.to_string(),
		})
	}
}

fn deserialize_expires_on<'de, D>(deserializer: D) -> Result<Option<EpochSeconds>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Number(i64),
		Text(String),
	}

	match Option::<Raw>::deserialize(deserializer)? {
		None => Ok(None),
		Some(Raw::Number(secs)) => Ok(Some(EpochSeconds(secs))),
		Some(Raw::Text(text)) => text
			.trim()
			.parse()
			.map(|secs| Some(EpochSeconds(secs)))
			.map_err(|_| DeError::custom(format!("`{text}` is not a number of epoch seconds"))),
	}
}

fn parse_scope_key(path: &str, key: &str) -> Result<ScopeSet, ConfigError> {
	let scope = ScopeSet::from_str(key).map_err(|e| ConfigError::MalformedCredentials {
		path: path.to_owned(),
		message: e.to_string(),
	})?;

	if scope.is_empty() {
		return Err(ConfigError::MalformedCredentials {
			path: path.to_owned(),
			message: "scope key is empty".into(),
		});
	}

	Ok(scope)
}

fn secret(path: &str, value: String) -> Result<TokenSecret, ConfigError> {
	if value.trim().is_empty() {
		return Err(ConfigError::MalformedCredentials {
			path: format!("{path}.secret"),
			message: "secret is empty".into(),
		});
	}

	Ok(TokenSecret::new(value))
}

// self
use crate::_prelude::*;

/// Provider-specific quirks that influence how flows behave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Adds `offline_access` to consent requests so the grant returns a refresh token.
	pub consent_offline_access: bool,
	/// Adds `prompt=consent` to consent hand-off URLs so the user re-grants access.
	pub force_consent_prompt: bool,
	/// Character used to join scopes when constructing `scope` parameters.
	pub scope_delimiter: char,
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self { consent_offline_access: true, force_consent_prompt: true, scope_delimiter: ' ' }
	}
}

//! Provider descriptor data structures and helpers shared by all flows.
//!
//! The module exposes validated metadata, supporting builder utilities, and
//! grant-specific helpers so providers can describe their capabilities in a
//! transport-agnostic way.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Grant helpers wired into provider descriptors.
pub mod grant;
/// Provider-specific quirk toggles.
pub mod quirks;

pub use builder::*;
pub use grant::*;
pub use quirks::*;

// self
use crate::{_prelude::*, auth::ProviderId};

const MICROSOFT_LOGIN_BASE: &str = "https://login.microsoftonline.com";

/// Preferred client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	/// Public clients that send only `client_id` (PKCE for the code grant).
	NoneWithPkce,
}

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint used by the consent hand-off.
	pub authorization: Url,
	/// Token endpoint used for every grant.
	pub token: Url,
	/// Device authorization endpoint, required for the device-code flow.
	#[serde(default)]
	pub device_authorization: Option<Url>,
}

/// Immutable provider descriptor consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Descriptor identifier.
	pub id: ProviderId,
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Supported grant flags.
	pub supported_grants: SupportedGrants,
	/// Preferred client authentication mechanism.
	#[serde(default)]
	pub preferred_client_auth_method: ClientAuthMethod,
	/// Provider-specific quirks.
	#[serde(default)]
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}

	/// Descriptor for the Microsoft identity platform (v2.0 endpoints) of one directory.
	///
	/// `directory` is a tenant GUID, a verified domain, or one of `common`,
	/// `organizations`, `consumers`. Refresh, client-credentials, device-code, and
	/// authorization-code grants are all enabled; deployments pick among them through
	/// their configured strategy list.
	pub fn microsoft(directory: &str) -> Result<Self, ProviderDescriptorError> {
		let endpoint = |suffix: &str| {
			Url::parse(&format!("{MICROSOFT_LOGIN_BASE}/{directory}/oauth2/v2.0/{suffix}")).map_err(
				|e| ProviderDescriptorError::InvalidEndpoint {
					endpoint: "microsoft",
					message: e.to_string(),
				},
			)
		};
		let id = ProviderId::new("microsoft-identity-platform").map_err(|e| {
			ProviderDescriptorError::InvalidEndpoint { endpoint: "microsoft", message: e.to_string() }
		})?;

		Self::builder(id)
			.authorization_endpoint(endpoint("authorize")?)
			.token_endpoint(endpoint("token")?)
			.device_authorization_endpoint(endpoint("devicecode")?)
			.support_grants([
				GrantType::AuthorizationCode,
				GrantType::RefreshToken,
				GrantType::ClientCredentials,
				GrantType::DeviceCode,
			])
			.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
			.build()
	}

	/// Checks whether the descriptor supports a given grant.
	pub fn supports(&self, grant: GrantType) -> bool {
		self.supported_grants.supports(grant)
	}
}

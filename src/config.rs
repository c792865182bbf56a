//! Deployment configuration: one JSON document describing the tenant, the client
//! registration, the provider, and the synchronization target.
//!
//! ```json
//! {
//!   "tenant": "contoso",
//!   "client_id": "00000000-0000-0000-0000-000000000000",
//!   "provider": { "microsoft": { "directory": "organizations" } },
//!   "scope": "Files.ReadWrite",
//!   "strategies": ["cached_credential", "refresh_token_grant"],
//!   "sheet_name": "Responses"
//! }
//! ```
//!
//! Decoding fails with [`ConfigError::InvalidConfig`] naming the offending path; the
//! decoded document is then validated as a whole before anything is built from it.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TenantId},
	error::ConfigError,
	flows::{AcquisitionStrategy, TokenManager},
	graph::DEFAULT_GRAPH_BASE_URL,
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	provider::{DefaultProviderStrategy, ProviderDescriptor},
	store::TokenStore,
	sync::{DEFAULT_SHEET_NAME, RetryPolicy, SyncOrchestrator},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

const DEFAULT_SAFETY_MARGIN_SECS: u64 = 300;
const MAX_SAFETY_MARGIN_SECS: u64 = 86_400;

/// Where the provider descriptor comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderConfig {
	/// Microsoft identity platform preset for one directory.
	Microsoft {
		/// Tenant GUID, verified domain, `common`, `organizations`, or `consumers`.
		directory: String,
	},
	/// Fully spelled-out descriptor.
	Descriptor(ProviderDescriptor),
}
impl ProviderConfig {
	/// Builds and validates the descriptor.
	pub fn descriptor(&self) -> Result<ProviderDescriptor> {
		let descriptor = match self {
			Self::Microsoft { directory } =>
				ProviderDescriptor::microsoft(directory).map_err(ConfigError::from)?,
			Self::Descriptor(descriptor) => {
				descriptor.validate().map_err(ConfigError::from)?;

				descriptor.clone()
			},
		};

		Ok(descriptor)
	}
}

/// Engine configuration document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
	/// Tenant key the token cache and handle memo are partitioned by.
	pub tenant: TenantId,
	/// OAuth client identifier.
	pub client_id: String,
	/// Client secret for confidential clients.
	#[serde(default)]
	pub client_secret: Option<String>,
	/// Identity provider.
	pub provider: ProviderConfig,
	/// Scopes the range write needs.
	pub scope: ScopeSet,
	/// Scope sent with the client credentials grant.
	#[serde(default)]
	pub app_scope: Option<ScopeSet>,
	/// Ordered acquisition strategies.
	#[serde(default = "default_strategies")]
	pub strategies: Vec<AcquisitionStrategy>,
	/// Seconds subtracted from token expiries before they count as usable; at most one day.
	#[serde(default = "default_safety_margin_secs")]
	pub safety_margin_secs: u64,
	/// Workbook API root; defaults to [`DEFAULT_GRAPH_BASE_URL`].
	#[serde(default)]
	pub graph_base_url: Option<Url>,
	/// Worksheet written by `synchronize`.
	#[serde(default = "default_sheet_name")]
	pub sheet_name: String,
	/// Reads the target range before writing.
	#[serde(default = "default_diagnostic_read")]
	pub diagnostic_read: bool,
	/// Authentication retry bound.
	#[serde(default)]
	pub retry: RetryPolicy,
}
impl SyncConfig {
	/// Decodes and validates a JSON configuration document.
	pub fn from_json_str(raw: &str) -> Result<Self> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(&mut de).map_err(|e| {
			ConfigError::InvalidConfig { path: e.path().to_string(), message: e.inner().to_string() }
		})?;

		de.end().map_err(|e| invalid("", e.to_string()))?;
		config.validate()?;

		Ok(config)
	}

	/// Checks cross-field invariants that serde cannot express.
	pub fn validate(&self) -> Result<()> {
		if self.client_id.trim().is_empty() {
			return Err(invalid("client_id", "must not be empty").into());
		}
		if self.scope.is_empty() {
			return Err(invalid("scope", "must name at least one scope").into());
		}
		if self.strategies.is_empty() {
			return Err(invalid("strategies", "must list at least one strategy").into());
		}
		if self.sheet_name.trim().is_empty() {
			return Err(invalid("sheet_name", "must not be empty").into());
		}
		if self.safety_margin_secs > MAX_SAFETY_MARGIN_SECS {
			return Err(invalid(
				"safety_margin_secs",
				format!("must not exceed {MAX_SAFETY_MARGIN_SECS} seconds"),
			)
			.into());
		}

		validate_graph_base_url(&self.graph_base_url()?)?;

		let descriptor = self.provider.descriptor()?;

		for (index, strategy) in self.strategies.iter().enumerate() {
			if let Some(grant) = strategy.required_grant().filter(|grant| !descriptor.supports(*grant))
			{
				return Err(invalid(
					format!("strategies[{index}]"),
					format!("`{strategy}` needs the {grant} grant, which the provider does not enable"),
				)
				.into());
			}
		}

		Ok(())
	}

	/// Configured workbook API root, or the default one.
	pub fn graph_base_url(&self) -> Result<Url> {
		match &self.graph_base_url {
			Some(url) => Ok(url.clone()),
			None => Url::parse(DEFAULT_GRAPH_BASE_URL)
				.map_err(|e| invalid("graph_base_url", e.to_string()).into()),
		}
	}

	/// Safety margin as a duration.
	pub fn safety_margin(&self) -> Duration {
		Duration::seconds(self.safety_margin_secs.min(MAX_SAFETY_MARGIN_SECS) as i64)
	}

	/// Builds a token manager over a caller-provided transport.
	pub fn token_manager_with<C, M>(
		&self,
		store: Arc<dyn TokenStore>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<TokenManager<C, M>>
	where
		C: ?Sized + ProviderHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		let mut manager = TokenManager::with_http_client(
			store,
			self.provider.descriptor()?,
			Arc::new(DefaultProviderStrategy),
			self.client_id.clone(),
			http_client,
			mapper,
		)
		.with_strategies(self.strategies.iter().copied())
		.with_safety_margin(self.safety_margin());

		if let Some(secret) = &self.client_secret {
			manager = manager.with_client_secret(secret.clone());
		}
		if let Some(scope) = &self.app_scope {
			manager = manager.with_app_scope(scope.clone());
		}

		Ok(manager)
	}

	/// Builds an orchestrator over a caller-provided transport.
	pub fn orchestrator_with<C, M>(
		&self,
		store: Arc<dyn TokenStore>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<SyncOrchestrator<C, M>>
	where
		C: ?Sized + ProviderHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		let manager = self.token_manager_with(store, http_client, mapper)?;

		Ok(SyncOrchestrator::new(
			manager,
			self.graph_base_url()?,
			self.tenant.clone(),
			self.scope.clone(),
		)
		.with_sheet_name(self.sheet_name.clone())
		.with_diagnostic_read(self.diagnostic_read)
		.with_retry_policy(self.retry))
	}

	/// Builds an orchestrator over the default reqwest transport.
	#[cfg(feature = "reqwest")]
	pub fn orchestrator(
		&self,
		store: Arc<dyn TokenStore>,
	) -> Result<SyncOrchestrator<ReqwestHttpClient, ReqwestTransportErrorMapper>> {
		self.orchestrator_with(store, ReqwestHttpClient::default(), ReqwestTransportErrorMapper)
	}
}

fn default_strategies() -> Vec<AcquisitionStrategy> {
	AcquisitionStrategy::DEFAULT_ORDER.to_vec()
}

fn default_safety_margin_secs() -> u64 {
	DEFAULT_SAFETY_MARGIN_SECS
}

fn default_sheet_name() -> String {
	DEFAULT_SHEET_NAME.into()
}

fn default_diagnostic_read() -> bool {
	true
}

fn validate_graph_base_url(url: &Url) -> Result<(), ConfigError> {
	if url.cannot_be_a_base() {
		return Err(invalid("graph_base_url", "must be a hierarchical URL"));
	}

	let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));

	match url.scheme() {
		"https" => Ok(()),
		"http" if loopback => Ok(()),
		_ => Err(invalid("graph_base_url", format!("`{url}` must use HTTPS"))),
	}
}

fn invalid(path: impl Into<String>, message: impl Into<String>) -> ConfigError {
	ConfigError::InvalidConfig { path: path.into(), message: message.into() }
}

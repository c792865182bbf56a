//! The synchronization entry points: [`SyncOrchestrator::synchronize`] and
//! [`SyncOrchestrator::inspect`].
//!
//! One `synchronize` call runs strictly in sequence:
//!
//! 1. decode the credential blob (fails before any network call),
//! 2. skip with `resource_updated = false` when no sharing URL or no data is supplied,
//! 3. validate the sharing URL (again before any network call),
//! 4. acquire a token,
//! 5. resolve the sharing URL, memoized per tenant + URL,
//! 6. optionally read the target range for diagnostics (failures are logged only),
//! 7. write the range; a `401` forces one token refresh and one more write, bounded by
//!    the [`RetryPolicy`].
//!
//! Concurrent calls that target the same range are last-write-wins.

// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeSet, TenantId},
	credential::CredentialBlob,
	flows::{AcquireRequest, TokenManager},
	graph::{self, CellMatrix, GraphClient, RangeAddress, ResourceHandle, SyncData, WriteRequest},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind},
};

/// Worksheet written when a deployment configures none.
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// Bounds the corrective actions taken after an authentication failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Forced token refreshes allowed per write after a `401`.
	pub max_auth_retries: u32,
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_auth_retries: 1 }
	}
}

/// Result of one [`SyncOrchestrator::synchronize`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOutcome {
	/// `true` when a range write succeeded.
	pub resource_updated: bool,
	/// Range that was written, if any.
	pub range: Option<RangeAddress>,
	/// Number of rows written.
	pub rows_written: usize,
}
impl SyncOutcome {
	fn skipped() -> Self {
		Self { resource_updated: false, range: None, rows_written: 0 }
	}

	fn written(address: RangeAddress) -> Self {
		Self { resource_updated: true, range: Some(address), rows_written: address.rows() }
	}
}

/// Drives token acquisition, share resolution, and the bounded range write.
pub struct SyncOrchestrator<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Token manager that owns the cache.
	pub tokens: TokenManager<C, M>,
	/// Workbook API client.
	pub graph: GraphClient<C, M>,
	/// Tenant the tokens are cached under.
	pub tenant: TenantId,
	/// Scopes the write needs.
	pub scope: ScopeSet,
	/// Worksheet written by [`synchronize`](Self::synchronize).
	pub sheet_name: String,
	/// Reads the target range before writing, for diagnostics.
	pub diagnostic_read: bool,
	/// Authentication retry bound.
	pub retry: RetryPolicy,
	handles: Arc<Mutex<HashMap<(TenantId, String), ResourceHandle>>>,
}
impl<C, M> SyncOrchestrator<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an orchestrator whose Graph client shares the token manager's transport.
	pub fn new(tokens: TokenManager<C, M>, graph_base_url: Url, tenant: TenantId, scope: ScopeSet) -> Self {
		let graph = GraphClient::new(
			tokens.http_client.clone(),
			tokens.transport_mapper.clone(),
			graph_base_url,
		);

		Self {
			tokens,
			graph,
			tenant,
			scope,
			sheet_name: DEFAULT_SHEET_NAME.into(),
			diagnostic_read: true,
			retry: RetryPolicy::default(),
			handles: Default::default(),
		}
	}

	/// Overrides the worksheet name.
	pub fn with_sheet_name(mut self, sheet_name: impl Into<String>) -> Self {
		self.sheet_name = sheet_name.into();

		self
	}

	/// Enables or disables the pre-write diagnostic read.
	pub fn with_diagnostic_read(mut self, enabled: bool) -> Self {
		self.diagnostic_read = enabled;

		self
	}

	/// Overrides the authentication retry bound.
	pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Writes `data` into the workbook behind `share_url`.
	pub async fn synchronize(
		&self,
		credential_blob: &str,
		share_url: Option<&str>,
		data: &SyncData,
	) -> Result<SyncOutcome> {
		obs::observe(FlowKind::Synchronize, "synchronize", async {
			let blob = CredentialBlob::decode(credential_blob, &self.scope)?;
			let Some(share_url) = share_url.filter(|url| !url.trim().is_empty()) else {
				return Ok(SyncOutcome::skipped());
			};
			let Some(request) = WriteRequest::new(self.sheet_name.as_str(), data) else {
				return Ok(SyncOutcome::skipped());
			};
			let share_url = graph::validate_share_url(share_url)?;
			let token = self.tokens.acquire(self.acquire_request(&blob)).await?;
			let handle = self.resolve(&share_url, &token).await?;

			if self.diagnostic_read {
				self.read_before_write(&handle, &request, &token).await;
			}

			self.write_with_retry(&blob, &handle, &request, token, self.retry).await?;

			Ok(SyncOutcome::written(request.address))
		})
		.await
	}

	/// Reads the used range of `sheet_name` (or the configured sheet).
	///
	/// Diagnostic only: failures are returned as-is and never trigger a refresh.
	pub async fn inspect(
		&self,
		credential_blob: &str,
		share_url: &str,
		sheet_name: Option<&str>,
	) -> Result<CellMatrix> {
		let blob = CredentialBlob::decode(credential_blob, &self.scope)?;
		let share_url = graph::validate_share_url(share_url)?;
		let token = self.tokens.acquire(self.acquire_request(&blob)).await?;
		let handle = self.resolve(&share_url, &token).await?;

		self.graph.used_range(&handle, sheet_name.unwrap_or(&self.sheet_name), &token).await
	}

	/// Memoized handle for `share_url`, if it was resolved before.
	pub fn cached_handle(&self, share_url: &Url) -> Option<ResourceHandle> {
		self.handles.lock().get(&(self.tenant.clone(), share_url.to_string())).cloned()
	}

	fn acquire_request<'a>(&self, blob: &'a CredentialBlob) -> AcquireRequest<'a> {
		AcquireRequest::new(self.tenant.clone(), self.scope.clone()).with_credentials(blob)
	}

	async fn resolve(&self, share_url: &Url, token: &CachedToken) -> Result<ResourceHandle> {
		if let Some(handle) = self.cached_handle(share_url) {
			return Ok(handle);
		}

		let handle = self.graph.resolve(share_url, token).await.map_err(|e| match e {
			Error::Unauthorized { message, .. } =>
				Error::AuthPermanent { reason: format!("share lookup rejected the token: {message}") },
			other => other,
		})?;

		self.handles
			.lock()
			.insert((self.tenant.clone(), share_url.to_string()), handle.clone());

		Ok(handle)
	}

	async fn read_before_write(
		&self,
		handle: &ResourceHandle,
		request: &WriteRequest,
		token: &CachedToken,
	) {
		let read = self.graph.read_range(handle, &request.sheet_name, request.address, token).await;

		if let Err(e) = read {
			obs::diagnostic_read_failed(&request.address.to_string(), &e);
		}
	}

	async fn write_with_retry(
		&self,
		blob: &CredentialBlob,
		handle: &ResourceHandle,
		request: &WriteRequest,
		mut token: CachedToken,
		policy: RetryPolicy,
	) -> Result<()> {
		let mut attempt = 0;

		loop {
			match self.graph.write_range(handle, request, &token).await {
				Err(Error::Unauthorized { .. }) if attempt < policy.max_auth_retries => {
					attempt += 1;

					obs::retrying_after_unauthorized(attempt);

					token = self.tokens.acquire(self.acquire_request(blob).force_refresh()).await?;
				},
				Err(Error::Unauthorized { message, .. }) =>
					return Err(Error::AuthPermanent {
						reason: format!(
							"range write still unauthorized after {attempt} forced refresh(es): {message}"
						),
					}),
				other => return other,
			}
		}
	}
}
impl<C, M> Clone for SyncOrchestrator<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			tokens: self.tokens.clone(),
			graph: self.graph.clone(),
			tenant: self.tenant.clone(),
			scope: self.scope.clone(),
			sheet_name: self.sheet_name.clone(),
			diagnostic_read: self.diagnostic_read,
			retry: self.retry,
			handles: self.handles.clone(),
		}
	}
}
impl<C, M> Debug for SyncOrchestrator<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SyncOrchestrator")
			.field("tenant", &self.tenant)
			.field("scope", &self.scope)
			.field("sheet_name", &self.sheet_name)
			.field("diagnostic_read", &self.diagnostic_read)
			.field("retry", &self.retry)
			.finish()
	}
}

//! Fixtures shared by the integration suites: an in-process recording transport and
//! builders for managers, orchestrators, and credential blobs.

#![allow(dead_code)]

// std
use std::{collections::VecDeque, io::Error as IoError, pin::Pin, sync::Arc};
// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{StatusCode, header::CONTENT_TYPE},
};
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
use url::{Url, form_urlencoded};
// self
use workbook_sync::{
	auth::{CachedToken, ProviderId, ScopeSet, TenantId, TokenSecret, TokenSource},
	error::Error,
	flows::TokenManager,
	http::{ProviderHttpClient, RequestTarget, ResponseMetadata, ResponseMetadataSlot},
	oauth::{self, TransportErrorMapper},
	provider::{
		ClientAuthMethod, DefaultProviderStrategy, GrantType, ProviderDescriptor,
		ProviderStrategy,
	},
	store::{MemoryStore, TokenStore},
	sync::SyncOrchestrator,
};

pub const CLIENT_ID: &str = "client-sync";
pub const CLIENT_SECRET: &str = "secret-sync";
pub const GRAPH_BASE: &str = "https://graph.test/v1.0";
pub const SHARE_URL: &str = "https://contoso-my.sharepoint.com/:x:/g/personal/ada/EaBcDeF?e=4f2Gh1";

/// One request observed by [`FakeTransport`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
	pub method: String,
	pub url: Url,
	pub headers: Vec<(String, String)>,
	pub body: Vec<u8>,
}
impl RecordedRequest {
	pub fn path(&self) -> &str {
		self.url.path()
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	pub fn form(&self) -> Vec<(String, String)> {
		form_urlencoded::parse(&self.body).into_owned().collect()
	}

	pub fn form_value(&self, key: &str) -> Option<String> {
		self.form().into_iter().find(|(name, _)| name == key).map(|(_, value)| value)
	}

	pub fn json(&self) -> serde_json::Value {
		serde_json::from_slice(&self.body).expect("Recorded body should be JSON.")
	}
}

struct Route {
	method: &'static str,
	path_contains: String,
	responses: VecDeque<(u16, String)>,
}

#[derive(Default)]
struct FakeState {
	routes: Mutex<Vec<Route>>,
	requests: Mutex<Vec<RecordedRequest>>,
}

/// In-process transport that answers from scripted routes and records every request.
///
/// Each route replays its responses in order and keeps repeating the last one.
/// Requests without a route get a `599` so a missing script fails loudly.
#[derive(Clone, Default)]
pub struct FakeTransport(Arc<FakeState>);
impl FakeTransport {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Appends a response for requests whose method matches and path contains `path_contains`.
	pub fn respond(&self, method: &'static str, path_contains: &str, status: u16, body: impl Into<String>) {
		let mut routes = self.0.routes.lock();

		match routes.iter_mut().find(|route| route.method == method && route.path_contains == path_contains) {
			Some(route) => route.responses.push_back((status, body.into())),
			None => routes.push(Route {
				method,
				path_contains: path_contains.to_owned(),
				responses: VecDeque::from([(status, body.into())]),
			}),
		}
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.0.requests.lock().clone()
	}

	pub fn count(&self, method: &str, path_contains: &str) -> usize {
		self.0
			.requests
			.lock()
			.iter()
			.filter(|request| request.method == method && request.path().contains(path_contains))
			.count()
	}

	fn answer(&self, request: &RecordedRequest) -> (u16, String) {
		let mut routes = self.0.routes.lock();
		let Some(route) = routes.iter_mut().find(|route| {
			route.method == request.method && request.path().contains(&route.path_contains)
		}) else {
			return (599, format!("no scripted route for {} {}", request.method, request.url));
		};

		if route.responses.len() > 1 {
			route.responses.pop_front().unwrap_or((599, String::new()))
		} else {
			route.responses.front().cloned().unwrap_or((599, String::new()))
		}
	}
}
impl ProviderHttpClient for FakeTransport {
	type Handle = FakeHandle;
	type TransportError = IoError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		FakeHandle { transport: self.clone(), slot }
	}
}

pub struct FakeHandle {
	transport: FakeTransport,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for FakeHandle {
	type Error = HttpClientError<IoError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let recorded = RecordedRequest {
				method: request.method().to_string(),
				url: Url::parse(&request.uri().to_string()).expect("Request URI should parse."),
				headers: request
					.headers()
					.iter()
					.map(|(name, value)| {
						(name.to_string(), value.to_str().unwrap_or_default().to_owned())
					})
					.collect(),
				body: request.body().clone(),
			};
			let (status, body) = self.transport.answer(&recorded);

			self.transport.0.requests.lock().push(recorded);
			self.slot.store(ResponseMetadata { status: Some(status), retry_after: None });

			let mut response = HttpResponse::new(body.into_bytes());

			*response.status_mut() = StatusCode::from_u16(status).expect("Status should be valid.");
			response
				.headers_mut()
				.insert(CONTENT_TYPE, "application/json".parse().expect("Header should parse."));

			Ok(response)
		})
	}
}

/// Mapper for [`FakeTransport`] that relies on the generic classification.
#[derive(Clone, Copy, Debug, Default)]
pub struct FakeMapper;
impl TransportErrorMapper<IoError> for FakeMapper {
	fn map_transport_error(
		&self,
		target: RequestTarget,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<IoError>,
	) -> Error {
		oauth::map_generic_transport_error(target, metadata, error)
	}
}

pub type FakeManager = TokenManager<FakeTransport, FakeMapper>;
pub type FakeOrchestrator = SyncOrchestrator<FakeTransport, FakeMapper>;

pub fn descriptor_at(base: &str) -> ProviderDescriptor {
	ProviderDescriptor::builder(ProviderId::new("mock-identity").expect("Provider id should be valid."))
		.authorization_endpoint(Url::parse(&format!("{base}/authorize")).expect("URL should parse."))
		.token_endpoint(Url::parse(&format!("{base}/token")).expect("URL should parse."))
		.device_authorization_endpoint(
			Url::parse(&format!("{base}/devicecode")).expect("URL should parse."),
		)
		.support_grants([
			GrantType::AuthorizationCode,
			GrantType::RefreshToken,
			GrantType::ClientCredentials,
			GrantType::DeviceCode,
		])
		.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
		.build()
		.expect("Descriptor should build.")
}

pub fn descriptor() -> ProviderDescriptor {
	descriptor_at("https://login.test/organizations/oauth2/v2.0")
}

pub fn tenant() -> TenantId {
	TenantId::new("contoso").expect("Tenant fixture should be valid.")
}

pub fn write_scope() -> ScopeSet {
	ScopeSet::new(["Files.ReadWrite"]).expect("Scope fixture should be valid.")
}

pub fn manager_with(
	transport: &Arc<FakeTransport>,
	descriptor: ProviderDescriptor,
) -> (FakeManager, Arc<MemoryStore>) {
	let backend = Arc::new(MemoryStore::default());
	let store: Arc<dyn TokenStore> = backend.clone();
	let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
	let manager = TokenManager::with_http_client(
		store,
		descriptor,
		strategy,
		CLIENT_ID,
		transport.clone(),
		Arc::new(FakeMapper),
	)
	.with_client_secret(CLIENT_SECRET);

	(manager, backend)
}

pub fn manager(transport: &Arc<FakeTransport>) -> (FakeManager, Arc<MemoryStore>) {
	manager_with(transport, descriptor())
}

pub fn orchestrator(transport: &Arc<FakeTransport>) -> (FakeOrchestrator, Arc<MemoryStore>) {
	let (manager, store) = manager(transport);
	let orchestrator = SyncOrchestrator::new(
		manager,
		Url::parse(GRAPH_BASE).expect("Graph base should parse."),
		tenant(),
		write_scope(),
	);

	(orchestrator, store)
}

/// Credential blob with one access token expiring `expires_in_secs` from now.
pub fn blob(access: &str, expires_in_secs: i64, refresh: Option<&str>) -> String {
	let expires_on = OffsetDateTime::now_utc().unix_timestamp() + expires_in_secs;
	let refresh = refresh
		.map(|secret| {
			format!(r#", "refresh_tokens": {{ "Files.ReadWrite offline_access": {{ "secret": "{secret}" }} }}"#)
		})
		.unwrap_or_default();

	format!(
		r#"{{ "access_tokens": {{ "Files.ReadWrite User.Read": {{ "secret": "{access}", "expires_on": "{expires_on}" }} }}{refresh} }}"#
	)
}

pub fn token_body(access: &str, refresh: Option<&str>, expires_in: u64) -> String {
	match refresh {
		Some(refresh) => format!(
			r#"{{ "access_token": "{access}", "refresh_token": "{refresh}", "token_type": "Bearer", "expires_in": {expires_in} }}"#
		),
		None => format!(
			r#"{{ "access_token": "{access}", "token_type": "Bearer", "expires_in": {expires_in} }}"#
		),
	}
}

pub fn drive_item_body(drive_id: &str, item_id: &str) -> String {
	format!(r#"{{ "id": "{item_id}", "name": "Responses.xlsx", "parentReference": {{ "driveId": "{drive_id}" }} }}"#)
}

pub fn graph_error(code: &str, message: &str) -> String {
	format!(r#"{{ "error": {{ "code": "{code}", "message": "{message}" }} }}"#)
}

#[cfg(feature = "reqwest")]
pub fn reqwest_manager(
	descriptor: ProviderDescriptor,
) -> (workbook_sync::flows::ReqwestTokenManager, Arc<MemoryStore>) {
	let backend = Arc::new(MemoryStore::default());
	let store: Arc<dyn TokenStore> = backend.clone();
	let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
	let manager = TokenManager::new(store, descriptor, strategy, CLIENT_ID).with_client_secret(CLIENT_SECRET);

	(manager, backend)
}

/// Seeds a cache record that expires `expires_in` from now.
pub async fn seed_record(
	store: &MemoryStore,
	access: &str,
	refresh: Option<&str>,
	expires_in: Duration,
) {
	let issued = OffsetDateTime::now_utc();
	let record = CachedToken::builder(tenant(), write_scope(), TokenSource::RefreshGrant)
		.access_token(access)
		.refresh_secret(refresh.map(TokenSecret::new))
		.issued_at(issued)
		.expires_at(issued + expires_in)
		.build()
		.expect("Token record fixture should build.");

	store.save(record).await.expect("Seeding the store should succeed.");
}

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use tribunal_api::auth::jwt::{generate_access_token, JwtConfig};
use tribunal_api::config::{ServerConfig, StoreBackend};
use tribunal_api::router::build_app_router;
use tribunal_api::state::AppState;
use tribunal_core::permissions::{PermissionResolver, Principal};
use tribunal_core::proposal::{Proposal, ProposalPatch};
use tribunal_core::types::EntityId;
use tribunal_db::store::{JsonFileStore, ProposalFilter, ProposalStore, StoreError};
use tribunal_events::EventBus;
use tribunal_pipeline::compile::{ContentInjection, ContentSubmission, InjectionReceipt};
use tribunal_pipeline::{
    ContentGateway, GatewayError, IntegrationPipeline, MemoryRunRecorder, RetryPolicy,
};

pub const AUTHORITY_EMAIL: &str = "nihilus@tribunal.dev";

/// Build a test `ServerConfig` over a JSON store at `store_path`.
pub fn test_config(store_path: std::path::PathBuf) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
        store: StoreBackend::Json { path: store_path },
        authority_emails: vec![AUTHORITY_EMAIL.to_string()],
        authority_user_ids: Vec::new(),
        min_create_level: 5,
        integration: None,
        notify_webhook_urls: Vec::new(),
    }
}

/// The running application plus the handles tests need to inspect it.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn ProposalStore>,
    pub event_bus: Arc<EventBus>,
    pub gateway: Option<Arc<FakeGateway>>,
    pub conflicts: Arc<ConflictingStore>,
    config: ServerConfig,
    _dir: TempDir,
}

impl TestApp {
    /// Mint a bearer token for `principal`.
    pub fn token(&self, principal: &Principal) -> String {
        generate_access_token(principal, &self.config.jwt).expect("token generation")
    }
}

/// Build the full application router over a fresh JSON store in a temp dir.
pub async fn build_test_app() -> TestApp {
    build(false).await
}

/// Same as [`build_test_app`], with an integration pipeline backed by a
/// [`FakeGateway`].
pub async fn build_test_app_with_pipeline() -> TestApp {
    build(true).await
}

async fn build(with_pipeline: bool) -> TestApp {
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(dir.path().join("proposals.json"));
    let StoreBackend::Json { path } = &config.store else {
        unreachable!("test config always uses the JSON store");
    };
    let json_store: Arc<dyn ProposalStore> =
        Arc::new(JsonFileStore::open(path.clone()).await.expect("open store"));
    let conflicts = Arc::new(ConflictingStore::new(json_store));
    let store: Arc<dyn ProposalStore> = Arc::clone(&conflicts) as Arc<dyn ProposalStore>;
    let event_bus = Arc::new(EventBus::default());

    let gateway = with_pipeline.then(|| Arc::new(FakeGateway::default()));
    let pipeline = gateway.as_ref().map(|g| {
        Arc::new(
            IntegrationPipeline::new(
                Arc::clone(g) as Arc<dyn ContentGateway>,
                Arc::new(MemoryRunRecorder::new()),
            )
            .with_retry_policy(RetryPolicy::immediate(1))
            .with_event_bus(Arc::clone(&event_bus)),
        )
    });

    let state = AppState {
        store: Arc::clone(&store),
        config: Arc::new(config.clone()),
        resolver: Arc::new(PermissionResolver::new(config.authority_config())),
        event_bus: Arc::clone(&event_bus),
        pipeline,
        pool: None,
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        event_bus,
        gateway,
        conflicts,
        config,
        _dir: dir,
    }
}

// ---------------------------------------------------------------------------
// Principals
// ---------------------------------------------------------------------------

pub fn authority() -> Principal {
    Principal {
        user_id: "u-nihilus".to_string(),
        email: AUTHORITY_EMAIL.to_string(),
        display_name: "Nihilus".to_string(),
        level: 6,
    }
}

/// A level-5 user who may author proposals but not review them.
pub fn author() -> Principal {
    Principal {
        user_id: "u-autor".to_string(),
        email: "autor@tribunal.dev".to_string(),
        display_name: "Autor".to_string(),
        level: 5,
    }
}

/// A level-2 user who may only read.
pub fn viewer() -> Principal {
    Principal {
        user_id: "u-lector".to_string(),
        email: "lector@tribunal.dev".to_string(),
        display_name: "Lector".to_string(),
        level: 2,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Send a request through the router, with an optional bearer token and JSON body.
pub async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.router.clone().oneshot(request).await.unwrap()
}

/// POST a raw, possibly malformed, JSON body.
pub async fn post_raw(app: &TestApp, uri: &str, token: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post_json(app: &TestApp, uri: &str, token: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn patch_json(app: &TestApp, uri: &str, token: &str, body: Value) -> Response<Body> {
    send(app, Method::PATCH, uri, Some(token), Some(body)).await
}

pub async fn put_json(app: &TestApp, uri: &str, token: &str, body: Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(token), Some(body)).await
}

pub async fn delete(app: &TestApp, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Some(token), None).await
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A proposal body with the heading and subheading blocks submission needs.
pub fn complete_draft(title: &str) -> Value {
    json!({
        "category": "theoretical",
        "target_level": 3,
        "content": [
            { "type": "heading", "content": title },
            { "type": "subheading", "content": "Subtítulo de prueba" },
            { "type": "text", "content": { "text": "Cuerpo del contenido" } }
        ]
    })
}

/// Create `body` as `principal` and return the created record.
pub async fn create(app: &TestApp, principal: &Principal, body: Value) -> Value {
    let token = app.token(principal);
    let response = post_json(app, "/api/v1/proposals", &token, body).await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

// ---------------------------------------------------------------------------
// Fake content API
// ---------------------------------------------------------------------------

/// Content API stand-in that assigns sequential ids and always injects.
#[derive(Default)]
pub struct FakeGateway {
    pub submit_calls: AtomicU32,
    pub inject_calls: AtomicU32,
}

#[async_trait]
impl ContentGateway for FakeGateway {
    async fn submit_content(&self, _submission: &ContentSubmission) -> Result<String, GatewayError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("content-{n}"))
    }

    async fn inject_content(
        &self,
        injection: &ContentInjection,
    ) -> Result<InjectionReceipt, GatewayError> {
        self.inject_calls.fetch_add(1, Ordering::SeqCst);
        Ok(InjectionReceipt {
            content_id: Some(injection.content_id.clone()),
            is_active: true,
            raw: json!({ "success": true }),
        })
    }
}

// ---------------------------------------------------------------------------
// Store wrapper
// ---------------------------------------------------------------------------

/// Delegates to a real store, but fails every `save` of one chosen proposal
/// with a version conflict, as if a concurrent write had landed first.
pub struct ConflictingStore {
    inner: Arc<dyn ProposalStore>,
    conflict_on: Mutex<Option<EntityId>>,
}

impl ConflictingStore {
    pub fn new(inner: Arc<dyn ProposalStore>) -> Self {
        Self {
            inner,
            conflict_on: Mutex::new(None),
        }
    }

    pub fn conflict_on(&self, id: Option<EntityId>) {
        *self.conflict_on.lock().unwrap() = id;
    }
}

#[async_trait]
impl ProposalStore for ConflictingStore {
    async fn create(&self, proposal: Proposal) -> Result<Proposal, StoreError> {
        self.inner.create(proposal).await
    }

    async fn get(&self, id: EntityId) -> Result<Option<Proposal>, StoreError> {
        self.inner.get(id).await
    }

    async fn update(
        &self,
        id: EntityId,
        patch: &ProposalPatch,
        expected_version: Option<i64>,
    ) -> Result<Proposal, StoreError> {
        self.inner.update(id, patch, expected_version).await
    }

    async fn save(
        &self,
        proposal: &Proposal,
        expected_version: Option<i64>,
    ) -> Result<Proposal, StoreError> {
        let conflicting = *self.conflict_on.lock().unwrap() == Some(proposal.id);
        if conflicting {
            return Err(StoreError::VersionConflict {
                id: proposal.id,
                expected: expected_version.unwrap_or(proposal.version),
                actual: proposal.version + 1,
            });
        }
        self.inner.save(proposal, expected_version).await
    }

    async fn delete(&self, id: EntityId) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, StoreError> {
        self.inner.list(filter).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

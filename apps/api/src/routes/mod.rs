pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::admin::{handlers as admin, stats};
use crate::orchestration::handlers as generation;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Generation API (business flows)
        .route("/api/v1/ai/generate", post(generation::handle_generate))
        // Admin API
        .route(
            "/api/v1/admin/ai/providers",
            get(admin::handle_list_providers).post(admin::handle_create_provider),
        )
        .route(
            "/api/v1/admin/ai/providers/:id",
            get(admin::handle_get_provider)
                .patch(admin::handle_update_provider)
                .delete(admin::handle_delete_provider),
        )
        .route(
            "/api/v1/admin/ai/providers/:id/test",
            post(admin::handle_test_provider),
        )
        .route("/api/v1/admin/ai/usage", get(stats::handle_usage_stats))
        .route("/api/v1/admin/ai/catalog", get(admin::handle_catalog))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, Response, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::models::provider::ProviderType;
    use crate::orchestration::orchestrator::Orchestrator;
    use crate::orchestration::resolver::tests::test_vault;
    use crate::orchestration::resolver::{ConfigResolver, StaticFallback};
    use crate::orchestration::usage::UsageRecorder;
    use crate::orchestration::vault::CredentialSecret;
    use crate::providers::fake::{FakeFactory, Script};
    use crate::providers::AdapterFactory;
    use crate::store::memory::MemoryStore;

    pub(crate) const FALLBACK_KEY: &str = "env-fallback-key-000000";

    /// Full router over an in-memory store and the shared test vault.
    pub(crate) fn test_app(
        store: &Arc<MemoryStore>,
        adapters: Arc<dyn AdapterFactory>,
        with_fallback: bool,
    ) -> Router {
        let vault = test_vault();
        let fallback = with_fallback.then(|| StaticFallback {
            provider_type: ProviderType::Gemini,
            api_key: CredentialSecret::new(FALLBACK_KEY),
            model_name: None,
        });
        let resolver = ConfigResolver::new(store.clone(), vault.clone(), fallback);
        let orchestrator = Orchestrator::new(
            store.clone(),
            resolver,
            adapters.clone(),
            UsageRecorder::new(store.clone()),
            Duration::from_secs(5),
        );

        build_router(AppState {
            orchestrator: Arc::new(orchestrator),
            configs: store.clone(),
            usage: store.clone(),
            vault,
            adapters,
        })
    }

    pub(crate) fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub(crate) fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    pub(crate) async fn read_json(response: Response<Body>) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let store = Arc::new(MemoryStore::new());
        let factory = FakeFactory::new(Script::Reply("", 0, 0));
        let app = test_app(&store, factory, false);
        let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["service"], "ai-orchestrator");
    }
}

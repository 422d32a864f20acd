//! REST API Server for the CFO assistant
//!
//! Same routing core as the chat bot, reachable over HTTP for a web
//! frontend or for scripting.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::agents::Assistant;
use crate::error::AgentError;
use crate::models::Record;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub conversation_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub conversation_id: String,
    /// File under the server's document directory, relative or absolute
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub conversation_id: String,
    pub decision: String,
    #[serde(default)]
    pub pending: Record,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn failure(e: AgentError) -> ApiResult {
    let status = if e.is_transient() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        match e {
            AgentError::InvalidRequest { .. } | AgentError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    };
    error!("Request failed: {}", e);
    (status, Json(ApiResponse::error(e.to_string())))
}

fn bad_request(message: &str) -> ApiResult {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message.to_string())))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<Assistant>,
    /// Only files under this directory may be processed
    pub document_dir: PathBuf,
}

/// Resolve `requested` to an existing file inside `root`, following symlinks.
async fn resolve_document(root: &Path, requested: &Path) -> Option<PathBuf> {
    let root = tokio::fs::canonicalize(root).await.ok()?;
    let candidate = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };
    let resolved = tokio::fs::canonicalize(&candidate).await.ok()?;
    resolved.starts_with(&root).then_some(resolved)
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn route_message(
    State(state): State<ApiState>,
    Json(req): Json<MessageRequest>,
) -> ApiResult {
    if req.conversation_id.trim().is_empty() {
        return bad_request("conversation_id is required");
    }
    info!(conversation_id = %req.conversation_id, "Inbound API message");

    match state
        .assistant
        .interface
        .handle_text(&req.conversation_id, &req.message)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(ApiResponse::success(outcome))),
        Err(e) => failure(e),
    }
}

async fn process_document(
    State(state): State<ApiState>,
    Json(req): Json<DocumentRequest>,
) -> ApiResult {
    if req.conversation_id.trim().is_empty() {
        return bad_request("conversation_id is required");
    }

    let Some(path) = resolve_document(&state.document_dir, &req.path).await else {
        warn!(path = %req.path.display(), "Refusing document outside the document directory");
        return bad_request("path must name an existing file under the document directory");
    };

    // the upload path never errors; failures come back as the reply text
    let reply = state
        .assistant
        .interface
        .handle_upload(&req.conversation_id, &path)
        .await;

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "conversation_id": req.conversation_id,
            "reply": reply,
        }))),
    )
}

async fn post_decision(
    State(state): State<ApiState>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult {
    if req.conversation_id.trim().is_empty() || req.decision.trim().is_empty() {
        return bad_request("conversation_id and decision are required");
    }

    let router = state.assistant.interface.router();
    if let Err(e) = router
        .post_decision(&req.conversation_id, &req.decision, req.pending)
        .await
    {
        return failure(e);
    }

    match router.context(&req.conversation_id).await {
        Ok(context) => (StatusCode::OK, Json(ApiResponse::success(context))),
        Err(e) => failure(e),
    }
}

async fn list_feedback(State(state): State<ApiState>) -> ApiResult {
    let events = state.assistant.feedback.list().await;
    let tally: std::collections::HashMap<String, usize> = state
        .assistant
        .feedback
        .tally()
        .await
        .into_iter()
        .map(|(category, count)| (category.to_string(), count))
        .collect();

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "events": events,
            "tally": tally,
        }))),
    )
}

/// =============================
/// Router
/// =============================

pub fn create_router(assistant: Arc<Assistant>, document_dir: PathBuf) -> Router {
    let state = ApiState {
        assistant,
        document_dir,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/messages", post(route_message))
        .route("/api/documents", post(process_document))
        .route("/api/decisions", post(post_decision))
        .route("/api/feedback", get(list_feedback))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    assistant: Arc<Assistant>,
    document_dir: PathBuf,
    port: u16,
) -> crate::Result<()> {
    let router = create_router(assistant, document_dir);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;
    use crate::reasoning::Reasoner;
    use crate::retry::{RetryExecutor, RetryPolicy};
    use crate::router::InMemoryContextStore;
    use crate::store::fixtures::sample_database;
    use crate::store::JsonFileStore;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn document_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cfo-api-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn app(backend: Arc<ScriptedBackend>) -> (Router, Arc<Assistant>) {
        app_with_documents(backend, document_dir())
    }

    fn app_with_documents(backend: Arc<ScriptedBackend>, documents: PathBuf) -> (Router, Arc<Assistant>) {
        let retry = RetryExecutor::new(RetryPolicy::new(1, Duration::from_millis(1)));
        let reasoner = Arc::new(Reasoner::new(backend, retry));
        let store = Arc::new(JsonFileStore::from_value(sample_database()).unwrap());
        let assistant = Arc::new(Assistant::assemble(
            reasoner,
            store,
            Arc::new(InMemoryContextStore::new()),
            3000,
        ));
        (create_router(assistant.clone(), documents), assistant)
    }

    async fn send(router: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = app(Arc::new(ScriptedBackend::new()));
        let (status, body) = send(router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_decision_then_message_records_feedback() {
        let backend = Arc::new(ScriptedBackend::with_replies(&[
            "JSON: {\"intent\": \"rejection\", \"is_decision\": true}",
            "Understood: rejected the Tata payment. Holding it.",
        ]));
        let (router, assistant) = app(backend);

        let (status, body) = send(
            router.clone(),
            "POST",
            "/api/decisions",
            Some(json!({"conversation_id": "c1", "decision": "Pay Tata 2L?", "pending": {"invoice_id": "INV-2"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["pending_decision"], "Pay Tata 2L?");

        let (status, body) = send(
            router.clone(),
            "POST",
            "/api/messages",
            Some(json!({"conversation_id": "c1", "message": "No, hold it"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["handed_off"], true);

        let (_, body) = send(router, "GET", "/api/feedback", None).await;
        assert_eq!(body["data"]["tally"]["negative"], 1);
        assert_eq!(assistant.feedback.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_message_failure_maps_to_error_response() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_error(AgentError::Auth {
            status: 403,
            message: "bad key".to_string(),
        });
        let (router, _) = app(backend);

        let (status, body) = send(
            router,
            "POST",
            "/api/messages",
            Some(json!({"conversation_id": "c1", "message": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_missing_conversation_is_bad_request() {
        let (router, _) = app(Arc::new(ScriptedBackend::new()));
        let (status, _) = send(
            router,
            "POST",
            "/api/messages",
            Some(json!({"conversation_id": " ", "message": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_document_failure_is_still_ok() {
        let documents = document_dir();
        std::fs::write(documents.join("bill.txt"), "TAX INVOICE 42").unwrap();
        let (router, _) = app_with_documents(Arc::new(ScriptedBackend::new()), documents);

        let (status, body) = send(
            router,
            "POST",
            "/api/documents",
            Some(json!({"conversation_id": "c1", "path": "bill.txt"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["reply"].as_str().unwrap().contains("bill.txt"));
    }

    #[tokio::test]
    async fn test_document_outside_document_dir_is_refused() {
        let outside = document_dir();
        let secret = outside.join("settings.env");
        std::fs::write(&secret, "GEMINI_API_KEY=sk-very-secret").unwrap();

        let documents = document_dir();
        let backend = Arc::new(ScriptedBackend::new());
        let (router, _) = app_with_documents(backend.clone(), documents.clone());

        let escape = format!("../{}/settings.env", outside.file_name().unwrap().to_string_lossy());
        for path in [secret.display().to_string(), escape, "missing.pdf".to_string()] {
            let (status, body) = send(
                router.clone(),
                "POST",
                "/api/documents",
                Some(json!({"conversation_id": "c1", "path": path})),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["success"], false);
        }
        assert!(backend.calls().is_empty());
    }
}

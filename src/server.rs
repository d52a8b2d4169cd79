//! HTTP front end for a single routing session

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{ContextMap, Orchestrator};

/// Turns are serialized through the mutex
pub type SharedOrchestrator = Arc<Mutex<Orchestrator>>;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub memory_len: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContextResponse {
    pub context: ContextMap,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub path: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

async fn chat_handler(
    State(orchestrator): State<SharedOrchestrator>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let mut orchestrator = orchestrator.lock().await;
    let reply = orchestrator.turn(&req.message).await;
    Json(ChatResponse {
        reply,
        memory_len: orchestrator.memory().len(),
    })
}

async fn context_handler(
    State(orchestrator): State<SharedOrchestrator>,
    Json(data): Json<ContextMap>,
) -> Json<ContextResponse> {
    let mut orchestrator = orchestrator.lock().await;
    orchestrator.update_context(data);
    Json(ContextResponse {
        context: orchestrator.context().clone(),
    })
}

async fn shutdown_handler(
    State(orchestrator): State<SharedOrchestrator>,
) -> (StatusCode, Json<SnapshotResponse>) {
    let orchestrator = orchestrator.lock().await;
    orchestrator.shutdown();
    (
        StatusCode::ACCEPTED,
        Json(SnapshotResponse {
            path: orchestrator.snapshot_path().display().to_string(),
        }),
    )
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "ragrouter".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub fn create_router(orchestrator: SharedOrchestrator) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/context", post(context_handler))
        .route("/shutdown", post(shutdown_handler))
        .with_state(orchestrator)
}

/// Serve until `shutdown_signal` resolves
pub async fn run_server<F>(orchestrator: SharedOrchestrator, port: u16, shutdown_signal: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("0.0.0.0:{}", port);
    info!("Starting ragrouter server on {}", addr);

    let app = create_router(orchestrator);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM for unix targets.
///
/// The SIGTERM handler is installed when this is called, not when first polled.
pub fn termination_signal() -> impl Future<Output = ()> + Send {
    #[cfg(unix)]
    let terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());

    async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match terminate {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received ctrl-c"),
            _ = terminate => info!("Received SIGTERM"),
        }
        info!("Termination requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RouterConfig, ScriptedModel, StaticRetriever, StaticWebSearch};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn shared(dir: &std::path::Path) -> SharedOrchestrator {
        let config = RouterConfig {
            snapshot_dir: dir.to_path_buf(),
            ..Default::default()
        };
        Arc::new(Mutex::new(Orchestrator::new(
            Arc::new(StaticRetriever::from_triples(&[("Closing takes 30 days.", "guide.txt", 0.2)])),
            Arc::new(StaticWebSearch::default()),
            Arc::new(ScriptedModel::new("Happy to help.")),
            config,
        )))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let resp = create_router(shared(dir.path()))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chat_records_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(shared(dir.path()));
        let resp = app
            .oneshot(post_json("/chat", serde_json::json!({"message": "Explain the closing process"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: ChatResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.reply, "Happy to help.");
        assert_eq!(body.memory_len, 1);
    }

    #[tokio::test]
    async fn test_context_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = shared(dir.path());

        let resp = create_router(orchestrator.clone())
            .oneshot(post_json("/context", serde_json::json!({"location": "Miami, FL"})))
            .await
            .unwrap();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: ContextResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.context["location"], "Miami, FL");

        let resp = create_router(orchestrator.clone())
            .oneshot(post_json("/shutdown", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert!(orchestrator.lock().await.snapshot_path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_ends_termination_wait() {
        let signal = termination_signal();
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(std::time::Duration::from_secs(5), signal)
            .await
            .expect("SIGTERM should end the wait");
    }
}

//! Analysis relay server
//!
//! Exposes `POST /api/analyze` for clients that cannot (or should not) talk
//! to the completion endpoint themselves. The body carries the prompt and
//! the caller's credential; the response is the model output as a raw UTF-8
//! text stream.
//!
//! # Endpoints
//!
//! - POST /api/analyze - `{prompt, apiKey, baseUrl?, model?}` -> text stream

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use sdk::errors::EngineError;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::llm::{CompletionRequest, CompletionTransport};

/// Upper bound on one relayed request
pub const MAX_DURATION: Duration = Duration::from_secs(60);

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-5-mini";

/// Request body of `/api/analyze`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AnalyzeRequest {
    prompt: String,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
}

#[derive(Clone)]
struct RelayState {
    upstream: Arc<dyn CompletionTransport>,
}

/// Build the relay router over `upstream`
pub fn router(upstream: Arc<dyn CompletionTransport>) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze_handler))
        .with_state(RelayState { upstream })
}

async fn analyze_handler(
    State(state): State<RelayState>,
    Json(body): Json<AnalyzeRequest>,
) -> Response {
    let Some(api_key) = non_empty(body.api_key) else {
        return (StatusCode::UNAUTHORIZED, "API Key is required").into_response();
    };

    let request = CompletionRequest {
        prompt: body.prompt,
        credential: api_key,
        endpoint_base: non_empty(body.base_url).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        model: non_empty(body.model).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        stream: true,
    };

    tracing::debug!("Relaying analysis request: model={}", request.model);

    let upstream = match tokio::time::timeout(MAX_DURATION, state.upstream.send(&request)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::error!("Relay upstream error: {}", e);
            return generation_failed();
        }
        Err(_) => {
            tracing::error!("Relay upstream timed out after {:?}", MAX_DURATION);
            return generation_failed();
        }
    };

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(upstream),
    )
        .into_response()
}

fn generation_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Failed to generate analysis" })),
    )
        .into_response()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Running relay server
pub struct RelayServer {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RelayServer {
    /// Bind `bind` and start serving in the background
    pub async fn start(
        bind: &str,
        upstream: Arc<dyn CompletionTransport>,
    ) -> Result<Self, EngineError> {
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .map_err(|e| EngineError::Network(format!("Failed to bind to {}: {}", bind, e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| EngineError::Network(format!("Failed to get local address: {}", e)))?;

        let app = router(upstream);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            tracing::info!("Analysis relay listening on http://{}", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.await.ok();
                    tracing::info!("Analysis relay shutting down gracefully");
                })
                .await
                .unwrap_or_else(|e| {
                    tracing::error!("Analysis relay error: {}", e);
                });
        });

        Ok(Self {
            addr,
            shutdown_tx,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight requests
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!("Analysis relay task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_fields_are_optional() {
        let body: AnalyzeRequest = serde_json::from_str(r#"{"prompt":"p"}"#).unwrap();
        assert_eq!(body.prompt, "p");
        assert!(body.api_key.is_none());

        let body: AnalyzeRequest =
            serde_json::from_str(r#"{"prompt":"p","apiKey":"k","baseUrl":"","model":"m"}"#)
                .unwrap();
        assert_eq!(non_empty(body.api_key).as_deref(), Some("k"));
        assert_eq!(non_empty(body.base_url), None);
        assert_eq!(body.model.as_deref(), Some("m"));
    }
}

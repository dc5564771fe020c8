//! HTTP / WebSocket server
//!
//! Exposes the chat service over a WebSocket endpoint plus health and
//! connection monitoring routes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::protocol::OutboundMessage;
use crate::service::ChatService;

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub chat: Arc<ChatService>,
}

/// =============================
/// Response Models
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionsResponse {
    pub active_connections: usize,
    pub connections: Vec<String>,
    pub timestamp: String,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Connection Monitoring
/// =============================

async fn list_connections(State(state): State<ApiState>) -> Json<ConnectionsResponse> {
    let connections: Vec<String> = state
        .chat
        .sessions()
        .connection_ids()
        .await
        .iter()
        .map(|id| id.to_string())
        .collect();

    Json(ConnectionsResponse {
        active_connections: connections.len(),
        connections,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// =============================
/// WebSocket Chat
/// =============================

async fn ws_chat(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ApiState) {
    let connection_id = match state.chat.connect().await {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to open session: {}", e);
            return;
        }
    };

    info!(connection_id = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // Frames are handled one at a time, in the order they arrive.
    while let Some(frame) = receiver.next().await {
        let outbound = match frame {
            Ok(Message::Text(text)) => state.chat.handle_frame(connection_id, &text).await,
            Ok(Message::Binary(_)) => {
                OutboundMessage::error("Invalid message: binary frames are not supported")
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(connection_id = %connection_id, "WebSocket receive error: {}", e);
                break;
            }
        };

        let payload = match outbound.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(connection_id = %connection_id, "Failed to encode frame: {}", e);
                continue;
            }
        };

        if let Err(e) = sender.send(Message::Text(payload)).await {
            debug!(connection_id = %connection_id, "WebSocket send failed: {}", e);
            break;
        }
    }

    state.chat.disconnect(connection_id).await;
}

/// =============================
/// Router
/// =============================

pub fn create_router(chat: Arc<ChatService>) -> Router {
    let state = ApiState { chat };

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/admin/connections", get(list_connections))
        .route("/api/v1/ws/chat", get(ws_chat))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    chat: Arc<ChatService>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = create_router(chat);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Chat relay listening on {}", listener.local_addr()?);
    info!("WebSocket endpoint: ws://0.0.0.0:{}/api/v1/ws/chat", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockMarketData;
    use crate::llm::MockLanguageModel;
    use crate::memory::MemoryConfig;
    use crate::orchestrator::Orchestrator;
    use crate::session::SessionManager;
    use crate::tools::ToolDispatcher;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn chat_service() -> Arc<ChatService> {
        let dispatcher = ToolDispatcher::new(Arc::new(MockMarketData::new()), 1);
        Arc::new(ChatService::new(
            Arc::new(SessionManager::new(MemoryConfig::default())),
            Arc::new(Orchestrator::new(
                dispatcher,
                Arc::new(MockLanguageModel::new()),
            )),
        ))
    }

    #[tokio::test]
    async fn test_health() {
        let response = create_router(chat_service())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_list_connections() {
        let chat = chat_service();
        chat.connect().await.unwrap();
        chat.connect().await.unwrap();

        let response = create_router(chat)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/admin/connections")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: ConnectionsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.active_connections, 2);
        assert!(parsed.connections.iter().all(|id| id.starts_with("conn_")));
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let response = create_router(chat_service())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/ws/chat")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}

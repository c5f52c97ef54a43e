//! HTTP server for landmarks detected by a browser front-end.
//!
//! This module provides an HTTP server that:
//! - Accepts landmark frames via POST /frames and hands them to the remote detector
//! - Exposes the latest monitor status via GET /status
//! - Hands queued reminders to the client via GET /reminders
//!
//! # Architecture
//!
//! ```text
//! Browser (camera + pose model) ──→ POST /frames ──→ RemoteInbox ──→ Monitor
//!            ▲                                                        │
//!            └──────────────── GET /reminders ◀── QueueActuator ◀─────┘
//! ```

use crate::actuator::{OutboundMessage, QueueActuator};
use crate::capture::{DetectorEvent, Landmark, LandmarkFrame, LandmarkSet, PushError, RemoteInbox};
use crate::monitor::MonitorStatus;
use axum::{
    extract::State,
    http::{request::Parts, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// State shared between the HTTP handlers and the monitoring loop.
#[derive(Debug, Clone, Default)]
pub struct ServerState {
    inbox: RemoteInbox,
    reminders: QueueActuator,
    status: Arc<RwLock<Option<MonitorStatus>>>,
}

impl ServerState {
    pub fn new(inbox: RemoteInbox, reminders: QueueActuator) -> Self {
        Self {
            inbox,
            reminders,
            status: Arc::new(RwLock::new(None)),
        }
    }

    /// Replace the status served by GET /status.
    pub fn publish_status(&self, status: MonitorStatus) {
        *self.status.write() = Some(status);
    }
}

/// Landmark frame posted by a client.
///
/// Landmarks may be given as named points or as the detector's full pose
/// array; a frame with neither means no subject was found.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameRequest {
    /// Capture time; defaults to the time of receipt
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub landmarks: Option<LandmarkSet>,
    /// Pose landmarks indexed the way the pose model numbers them
    #[serde(default)]
    pub pose_landmarks: Option<Vec<Option<Landmark>>>,
}

impl FrameRequest {
    fn into_event(self) -> DetectorEvent {
        let landmarks = self.landmarks.or_else(|| {
            self.pose_landmarks
                .as_deref()
                .map(LandmarkSet::from_pose_landmarks)
        });
        match landmarks {
            Some(landmarks) => DetectorEvent::Landmarks(LandmarkFrame::at(
                self.timestamp.unwrap_or_else(Utc::now),
                landmarks,
            )),
            None => DetectorEvent::NoSubject,
        }
    }
}

/// Response from the frames endpoint
#[derive(Debug, Clone, Serialize)]
pub struct FrameResponse {
    pub status: String,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status
async fn status(State(state): State<Arc<ServerState>>) -> Result<Json<MonitorStatus>, ApiError> {
    state.status.read().clone().map(Json).ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Monitor has not reported a status yet".to_string(),
                code: "NO_STATUS".to_string(),
            }),
        )
    })
}

/// POST /frames
///
/// Queues one landmark frame for the monitor.
async fn frames(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<FrameRequest>,
) -> Result<(StatusCode, Json<FrameResponse>), ApiError> {
    match state.inbox.push(request.into_event()) {
        Ok(()) => Ok((
            StatusCode::ACCEPTED,
            Json(FrameResponse {
                status: "accepted".to_string(),
            }),
        )),
        Err(PushError::NotMonitoring) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Monitoring is not running".to_string(),
                code: "NOT_MONITORING".to_string(),
            }),
        )),
        Err(PushError::QueueFull) => {
            tracing::warn!("Frame rejected, monitor queue is full");
            Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorResponse {
                    error: "Frame queue is full".to_string(),
                    code: "QUEUE_FULL".to_string(),
                }),
            ))
        }
    }
}

/// GET /reminders
///
/// Drains queued reminder and error messages.
async fn reminders(State(state): State<Arc<ServerState>>) -> Json<Vec<OutboundMessage>> {
    Json(state.reminders.drain())
}

const LOCAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];

/// Loopback origins on any port, plus browser extensions.
fn is_local_origin(origin: &HeaderValue) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    if origin.starts_with("chrome-extension://") {
        return true;
    }
    let Some(authority) = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
    else {
        return false;
    };
    LOCAL_HOSTS.iter().any(|host| {
        authority
            .strip_prefix(host)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
    })
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: ServerState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/frames", post(frames))
        .route("/reminders", get(reminders))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(
                    |origin: &HeaderValue, _: &Parts| is_local_origin(origin),
                ))
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::new(state));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Posture Guardian server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}

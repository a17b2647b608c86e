//! Health endpoint
//!
//! Reports the public egress IP of the auditor by fetching a check-ip
//! service. Exposed over HTTP by `aws-auditor serve`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use reqwest::Client;
use serde::Serialize;
use std::net::SocketAddr;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("Non-200 response found: {status}")]
    Non200Response { status: u16 },

    #[error("No IP in HTTP response")]
    NoIp,

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status_code: u16,
    pub body: String,
}

/// GET `address` and greet the IP it returns
pub async fn check_ip(client: &Client, address: &str) -> Result<HealthResponse, HealthError> {
    let response = client.get(address).send().await?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(HealthError::Non200Response {
            status: status.as_u16(),
        });
    }

    let body = response.text().await?;
    let ip = body.trim();
    if ip.is_empty() {
        return Err(HealthError::NoIp);
    }

    debug!(ip = %ip, "Resolved egress IP");
    Ok(HealthResponse {
        status_code: StatusCode::OK.as_u16(),
        body: format!("Hello, {}", ip),
    })
}

#[derive(Clone)]
pub struct HealthState {
    pub client: Client,
    pub address: String,
}

impl HealthState {
    pub fn new(client: Client, address: &str) -> Self {
        Self {
            client,
            address: address.to_string(),
        }
    }
}

impl IntoResponse for HealthError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

async fn health(State(state): State<HealthState>) -> Result<String, HealthError> {
    let response = check_ip(&state.client, &state.address).await?;
    Ok(response.body)
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: HealthState) -> anyhow::Result<()> {
    let app = router(state);

    info!("Health endpoint listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

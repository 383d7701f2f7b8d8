// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the notification hub.
//!
//! Both intake endpoints accept POST only; axum answers other methods with
//! 405 and an `Allow` header.

use crate::config::Config;
use crate::hub::{Hub, HubError, HubForm, Intake};
use crate::metrics::Metrics;
use crate::rsscloud::{self, CloudError, RssCloudHub};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Shared application state.
pub struct AppState {
    pub hub: Hub,
    pub cloud: RssCloudHub,
    pub metrics: Metrics,
    pub config: Config,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/hub", post(hub))
        .route("/rssCloud", post(rss_cloud));
    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics));
    }
    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "cares-hub",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn request_host(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::HOST).and_then(|v| v.to_str().ok())
}

/// PubSubHubbub subscribe/unsubscribe intake.
pub async fn hub(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    debug!("PubSubHubbub request");
    let Some(host) = state.config.site.host(request_host(&headers)) else {
        return (StatusCode::BAD_REQUEST, "Host header is required").into_response();
    };

    let form = HubForm::parse(&body);
    let result = match state.hub.validate(&form, host, Utc::now()) {
        Ok(req) => state.hub.intake(req).await,
        Err(e) => Err(e),
    };

    let outcome = match &result {
        Ok(Intake::Verified(_)) => "verified",
        Ok(Intake::Accepted(_)) => "accepted",
        Err(HubError::Store(_)) => "error",
        Err(_) => "rejected",
    };
    state.metrics.hub_requests.with_label_values(&[outcome]).inc();

    match result {
        Ok(Intake::Verified(_)) => StatusCode::NO_CONTENT.into_response(),
        Ok(Intake::Accepted(_)) => {
            info!(callback = %form.callback, "Accepted subscription request for async verification");
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            if let HubError::Store(source) = &e {
                error!(error = %source, "Could not save subscription");
            } else {
                debug!(error = %e, "Rejected subscription request");
            }
            e.into_response()
        }
    }
}

/// RSS-Cloud registration.
pub async fn rss_cloud(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: String,
) -> Response {
    debug!(peer = %peer, "RSS cloud request");
    let server_host = state.config.site.host(request_host(&headers)).unwrap_or_default();
    let forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    let registrant = rsscloud::registrant_host(forwarded_for, Some(peer));

    let result = state
        .cloud
        .register(&body, server_host, registrant, Utc::now())
        .await;

    let outcome = match &result {
        Ok(_) => "registered",
        Err(CloudError::Store { .. }) => "error",
        Err(_) => "fault",
    };
    state
        .metrics
        .cloud_registrations
        .with_label_values(&[outcome])
        .inc();

    rsscloud::respond(&result)
}

/// Prometheus metrics endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Could not render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

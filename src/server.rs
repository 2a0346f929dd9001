//! HTTP surface of the service.
//!
//! - `GET /api/smart?timeout=<ms>`: hedged fetch within the given budget
//! - `GET /health`: liveness check
//! - `GET /metrics`: Prometheus metrics
//! - `GET /openapi.json`: OpenAPI 3.0 schema of the endpoints above

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::ServerConfig,
    metrics::Metrics,
    service::{Outcome, SmartFetch},
};

const EXHAUSTED_MESSAGE: &str =
    "Failed to fetch requests in given timeout, or all of them were unsuccessful.";

#[derive(Clone)]
struct AppState {
    service: SmartFetch,
    metrics: Metrics,
}

#[derive(Debug, Deserialize)]
struct SmartQuery {
    timeout: Option<i64>,
}

/// Builds the router. `metrics` should be the same instance the service
/// records into.
pub fn router(service: SmartFetch, metrics: Metrics) -> Router {
    let state = Arc::new(AppState { service, metrics });

    Router::new()
        .route("/api/smart", get(smart_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(schema_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds to `config` and serves until Ctrl-C.
pub async fn serve(config: &ServerConfig, app: Router) -> anyhow::Result<()> {
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Server starting up on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("Server shutting down.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn smart_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SmartQuery>,
) -> Response {
    let budget_ms = query
        .timeout
        .unwrap_or_else(|| state.service.default_budget_ms());
    tracing::debug!(budget_ms, "received request on /api/smart");

    match state.service.handle(budget_ms).await {
        Outcome::Success(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Outcome::RejectedBudget(reason) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "message": reason }))).into_response()
        }
        Outcome::NoAttemptSucceeded => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({ "message": EXHAUSTED_MESSAGE })),
        )
            .into_response(),
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn schema_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        OPENAPI_SCHEMA,
    )
}

const OPENAPI_SCHEMA: &str = r##"{
  "openapi": "3.0.0",
  "info": {
    "title": "hedged-fetch",
    "version": "0.1.0",
    "description": "Fetches the upstream resource within a caller-given time budget, hedging slow requests"
  },
  "paths": {
    "/api/smart": {
      "get": {
        "summary": "Fetch the upstream payload within a time budget",
        "parameters": [
          {
            "name": "timeout",
            "in": "query",
            "required": false,
            "description": "Budget in milliseconds; the configured default applies when absent",
            "schema": { "type": "integer", "format": "int64", "minimum": 300, "default": 1000 }
          }
        ],
        "responses": {
          "200": {
            "description": "Payload of the first successful upstream attempt",
            "content": { "application/json": { "schema": { "type": "object" } } }
          },
          "400": {
            "description": "Budget below the minimum, or not an integer",
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Message" } } }
          },
          "504": {
            "description": "No attempt succeeded within the budget",
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Message" } } }
          }
        }
      }
    },
    "/health": {
      "get": {
        "summary": "Liveness check",
        "responses": {
          "200": {
            "description": "Service is up",
            "content": {
              "application/json": {
                "schema": {
                  "type": "object",
                  "properties": { "status": { "type": "string", "example": "healthy" } }
                }
              }
            }
          }
        }
      }
    },
    "/metrics": {
      "get": {
        "summary": "Prometheus metrics",
        "responses": {
          "200": {
            "description": "Text exposition format",
            "content": { "text/plain": { "schema": { "type": "string" } } }
          }
        }
      }
    }
  },
  "components": {
    "schemas": {
      "Message": {
        "type": "object",
        "required": ["message"],
        "properties": { "message": { "type": "string" } }
      }
    }
  }
}"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_valid_json() {
        let parsed: serde_json::Value =
            serde_json::from_str(OPENAPI_SCHEMA).expect("OPENAPI_SCHEMA must be valid JSON");
        assert_eq!(parsed["openapi"], "3.0.0");
    }

    #[test]
    fn schema_describes_every_route() {
        let parsed: serde_json::Value = serde_json::from_str(OPENAPI_SCHEMA).expect("valid JSON");
        let paths = parsed["paths"].as_object().expect("paths is object");
        for route in ["/api/smart", "/health", "/metrics"] {
            assert!(paths.contains_key(route), "missing {route}");
        }

        let smart = &paths["/api/smart"]["get"];
        assert_eq!(smart["parameters"][0]["name"], "timeout");
        for status in ["200", "400", "504"] {
            assert!(smart["responses"][status].is_object(), "missing {status}");
        }
    }
}

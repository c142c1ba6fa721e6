//! HTTP surface over the [`Gateway`].
//!
//! ```text
//! GET    /health
//! POST   /v1/sms/send
//! GET    /v1/sms/:request_id
//! GET    /v1/blacklist
//! POST   /v1/blacklist
//! DELETE /v1/blacklist/:number
//! ```
//!
//! Every response carries an `X-Trace-Id` header matching the `trace_id`
//! field of the request's tracing span. `/v1` routes require
//! `Authorization: Bearer <token>` when a token is configured.

mod handlers;

use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::Error;
use crate::gateway::Gateway;

/// Response header carrying the per-request trace id.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// State shared by all handlers.
#[derive(Clone)]
pub struct ApiState {
    gateway: Gateway,
    auth_token: Option<Arc<str>>,
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("auth", &self.auth_token.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiState {
    /// State over `gateway`; `auth_token = None` disables the bearer check.
    pub fn new(gateway: Gateway, auth_token: Option<String>) -> Self {
        Self {
            gateway,
            auth_token: auth_token.map(Arc::from),
        }
    }
}

/// Build the application router.
pub fn router(state: ApiState) -> Router {
    let v1 = Router::new()
        .route("/sms/send", post(handlers::send_sms))
        .route("/sms/:request_id", get(handlers::get_sms))
        .route(
            "/blacklist",
            get(handlers::list_blacklist).post(handlers::add_to_blacklist),
        )
        .route("/blacklist/:number", delete(handlers::remove_from_blacklist))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/v1", v1)
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}

/// Serve on `listener` until `shutdown` is cancelled, then drain in-flight requests.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    info!(%addr, "http api listening");
    if state.auth_token.is_none() {
        warn!("api.auth_token is not set, /v1 routes accept unauthenticated requests");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("http server failed")?;

    info!("http api stopped");
    Ok(())
}

async fn trace_request(request: Request, next: Next) -> Response {
    let trace_id = Uuid::new_v4().to_string();
    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

async fn require_bearer(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.auth_token.as_deref() else {
        return next.run(request).await;
    };

    let rejection = {
        let header = request
            .headers()
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        match header {
            None => Some("Authorization header is required"),
            Some(value) => {
                let mut parts = value.split(' ');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some("Bearer"), Some(token), None) if token == expected => None,
                    (Some("Bearer"), Some(_), None) => Some("Unauthorized"),
                    _ => Some("Invalid authorization format. Expected 'Bearer <token>'"),
                }
            }
        }
    };
    let Some(rejection) = rejection else {
        return next.run(request).await;
    };

    warn!(path = %request.uri().path(), reason = rejection, "rejected unauthenticated request");
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": rejection }))).into_response()
}

/// Maps the crate error taxonomy onto HTTP status codes.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) | Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::Dependency { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Serialization(_) | Error::Send(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

//! Access gate middleware.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::application::access::{AccessGate, GateDecision, RequestDescriptor};

use super::error::ApiError;

pub const SESSION_COOKIE: &str = "__session";

/// Runs ahead of every handler. Protected routes without a verified session
/// are answered here and never reach domain code.
pub async fn access_gate(
    State(gate): State<Arc<AccessGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let descriptor = RequestDescriptor {
        method: request.method().clone(),
        path: request.uri().path().to_string(),
        session_token: session_token(request.headers()),
    };

    match gate.authorize(&descriptor).await {
        Ok(GateDecision::Public) => next.run(request).await,
        Ok(GateDecision::Authenticated(principal)) => {
            request.extensions_mut().insert(principal.clone());
            let mut response = next.run(request).await;
            response.extensions_mut().insert(principal);
            response
        }
        Ok(GateDecision::Unauthenticated) => ApiError::unauthenticated().into_response(),
        Err(err) => {
            warn!(
                target = "chirp::http::gate",
                path = %descriptor.path,
                error = %err,
                "session verification unavailable"
            );
            ApiError::upstream_unavailable(&err).into_response()
        }
    }
}

/// Bearer token first, then the `__session` cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| session_cookie(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

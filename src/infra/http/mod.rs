//! HTTP surface: router, access gate, handlers.

mod error;
mod gate;
mod handlers;
mod middleware;
mod models;

pub use error::{ApiError, codes};
pub use gate::{SESSION_COOKIE, access_gate, session_token};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::access::AccessGate;
use crate::application::feed::FeedService;
use crate::application::posts::PostService;
use crate::application::profile::ProfileService;
use crate::application::repos::PostsRepo;

use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub profiles: Arc<ProfileService>,
    pub health: Arc<dyn PostsRepo>,
}

/// Compose the public router.
///
/// Layer order, outermost first: request context, response logging, access
/// gate. The gate therefore sees every routed request before any handler.
pub fn build_router(state: HttpState, gate: Arc<AccessGate>) -> Router {
    Router::new()
        .route("/", get(handlers::get_feed))
        .route("/api/feed", get(handlers::get_feed))
        .route("/api/posts", post(handlers::create_post))
        .route("/api/posts/{id}", get(handlers::get_post))
        .route("/_health/db", get(handlers::db_health))
        .route("/{username}", get(handlers::profile_page))
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(gate, access_gate))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use uuid::Uuid;

use crate::application::access::SessionPrincipal;
use crate::application::error::{ErrorReport, HttpError};
use crate::application::profile::{ProfileError, ProfilePage};
use crate::domain::error::ValidationError;
use crate::domain::posts::CONTENT_FIELD;
use crate::presentation::views::render_not_found_response;

use super::HttpState;
use super::error::ApiError;
use super::models::{CreatePostRequest, EnrichedPostView, FeedQuery, FeedResponse, PostView};

pub async fn get_feed(
    State(state): State<HttpState>,
    query: Result<Query<FeedQuery>, axum::extract::rejection::QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return ApiError::bad_request(rejection.body_text()).into_response(),
    };

    match state.feed.get_feed(query.limit).await {
        Ok(posts) => Json(FeedResponse::from_posts(&posts)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn get_post(State(state): State<HttpState>, Path(id): Path<Uuid>) -> Response {
    match state.feed.get_post(id).await {
        Ok(post) => Json(EnrichedPostView::from(&post)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn create_post(
    State(state): State<HttpState>,
    Extension(principal): Extension<SessionPrincipal>,
    payload: Result<Json<CreatePostRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(JsonRejection::JsonDataError(_)) => {
            let error = ValidationError::new(CONTENT_FIELD, "content must be a string");
            return ApiError::validation(&error).into_response();
        }
        Err(rejection) => return ApiError::bad_request(rejection.body_text()).into_response(),
    };

    match state
        .posts
        .create_post(&principal.user_id, payload.content)
        .await
    {
        Ok(post) => (StatusCode::CREATED, Json(PostView::from(&post))).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn profile_page(
    State(state): State<HttpState>,
    Path(username): Path<String>,
) -> Response {
    match state.profiles.serve(&username).await {
        Ok(ProfilePage::Found(snapshot)) => Html(snapshot.html.clone()).into_response(),
        Ok(ProfilePage::NotFound) => render_not_found_response("Profile not found"),
        Err(err @ ProfileError::Upstream(_)) => HttpError::from_error(
            "infra::http::handlers::profile_page",
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable",
            &err,
        )
        .into_response(),
        Err(err) => HttpError::from_error(
            "infra::http::handlers::profile_page",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &err,
        )
        .into_response(),
    }
}

pub async fn db_health(State(state): State<HttpState>) -> Response {
    match state.health.health_check().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::handlers::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

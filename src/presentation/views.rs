use crate::application::error::{ErrorReport, HttpError};
use crate::domain::entities::IdentityRecord;
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        HttpError::from_error(
            err.source,
            StatusCode::INTERNAL_SERVER_ERROR,
            err.public_message,
            &err.error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|error| {
        TemplateRenderError {
            source: "presentation::views::render_template",
            public_message: "Template rendering failed",
            error,
        }
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(message: &str) -> Response {
    let template = NotFoundTemplate {
        title: "Not found",
        message,
    };
    let mut response = render_template_response(template, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        message,
    )
    .attach(&mut response);
    response
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate<'a> {
    pub user_id: &'a str,
    pub username: &'a str,
    pub avatar_url: Option<&'a str>,
}

impl<'a> From<&'a IdentityRecord> for ProfileTemplate<'a> {
    fn from(record: &'a IdentityRecord) -> Self {
        Self {
            user_id: record.id.as_str(),
            username: &record.username,
            avatar_url: record.avatar_url.as_deref(),
        }
    }
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate<'a> {
    pub title: &'a str,
    pub message: &'a str,
}

/// Render the profile page body stored in a snapshot.
pub fn render_profile(record: &IdentityRecord) -> Result<String, TemplateRenderError> {
    ProfileTemplate::from(record)
        .render()
        .map_err(|error| TemplateRenderError {
            source: "presentation::views::render_profile",
            public_message: "Profile rendering failed",
            error,
        })
}

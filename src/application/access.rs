//! Route classification and session gating.
//!
//! Every request is matched against an ordered pattern table before any
//! handler runs. The first matching rule decides; a path no rule matches is
//! protected. Protected requests need a session the verifier accepts.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::application::identity::IdentityError;
use crate::domain::entities::UserId;

/// Framework-independent view of an incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub session_token: Option<String>,
}

#[async_trait]
pub trait SessionVerifier: Send + Sync {
    /// User id bound to the request's session, if the session is valid.
    async fn current_user_id(
        &self,
        request: &RequestDescriptor,
    ) -> Result<Option<UserId>, IdentityError>;

    async fn is_authenticated(&self, request: &RequestDescriptor) -> Result<bool, IdentityError> {
        Ok(self.current_user_id(request).await?.is_some())
    }
}

/// Authenticated caller, attached to protected requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPrincipal {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteAccess {
    Public,
    Protected,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern `{0}` must start with `/`")]
    MissingLeadingSlash(String),
    #[error("pattern `{0}` has an empty parameter name")]
    EmptyParameter(String),
    #[error("pattern `{0}` has a wildcard segment before the end")]
    WildcardNotLast(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
    Wildcard,
}

/// Path pattern in router syntax: literal segments, `{name}` for exactly one
/// segment, `{*name}` for one or more trailing segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if !raw.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(raw.to_string()));
        }

        let parts: Vec<&str> = split_path(raw).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(inner) => match inner.strip_prefix('*') {
                    Some(name) => {
                        if name.is_empty() {
                            return Err(PatternError::EmptyParameter(raw.to_string()));
                        }
                        if index + 1 != parts.len() {
                            return Err(PatternError::WildcardNotLast(raw.to_string()));
                        }
                        Segment::Wildcard
                    }
                    None if inner.is_empty() => {
                        return Err(PatternError::EmptyParameter(raw.to_string()));
                    }
                    None => Segment::Param,
                },
                None => Segment::Literal((*part).to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        let mut parts = split_path(path);
        for segment in &self.segments {
            match segment {
                Segment::Wildcard => return parts.next().is_some(),
                Segment::Param => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(literal) => {
                    if parts.next() != Some(literal.as_str()) {
                        return false;
                    }
                }
            }
        }
        parts.next().is_none()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').filter(|segment| !segment.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub pattern: RoutePattern,
    pub access: RouteAccess,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

pub const DEFAULT_ROUTES: &[(&str, RouteAccess)] = &[
    ("/api/posts", RouteAccess::Protected),
    ("/api/{*rest}", RouteAccess::Public),
    ("/", RouteAccess::Public),
    ("/_health/{*rest}", RouteAccess::Public),
];

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = (&'a str, RouteAccess)>,
    {
        let rules = pairs
            .into_iter()
            .map(|(pattern, access)| {
                Ok(RouteRule {
                    pattern: RoutePattern::parse(pattern)?,
                    access,
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;
        Ok(Self::new(rules))
    }

    pub fn classify(&self, path: &str) -> RouteAccess {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(path))
            .map_or(RouteAccess::Protected, |rule| rule.access)
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        let rules = DEFAULT_ROUTES
            .iter()
            .filter_map(|(pattern, access)| {
                RoutePattern::parse(pattern).ok().map(|pattern| RouteRule {
                    pattern,
                    access: *access,
                })
            })
            .collect();
        Self::new(rules)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Public,
    Authenticated(SessionPrincipal),
    Unauthenticated,
}

pub struct AccessGate {
    routes: RouteTable,
    sessions: Arc<dyn SessionVerifier>,
}

impl AccessGate {
    pub fn new(routes: RouteTable, sessions: Arc<dyn SessionVerifier>) -> Self {
        Self { routes, sessions }
    }

    pub fn classify(&self, request: &RequestDescriptor) -> RouteAccess {
        self.routes.classify(&request.path)
    }

    /// Decide whether `request` may proceed.
    ///
    /// Public routes never consult the session verifier. An unreachable
    /// verifier on a protected route surfaces as an error, not a rejection.
    pub async fn authorize(
        &self,
        request: &RequestDescriptor,
    ) -> Result<GateDecision, IdentityError> {
        if self.classify(request) == RouteAccess::Public {
            return Ok(GateDecision::Public);
        }

        if request.session_token.is_none() {
            debug!(method = %request.method, path = %request.path, "no session on protected route");
            return Ok(GateDecision::Unauthenticated);
        }

        match self.sessions.current_user_id(request).await? {
            Some(user_id) => Ok(GateDecision::Authenticated(SessionPrincipal { user_id })),
            None => Ok(GateDecision::Unauthenticated),
        }
    }
}

//! Identity provider adapter over a Clerk-style backend API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::application::access::{RequestDescriptor, SessionVerifier};
use crate::application::identity::{IdentityError, IdentityProvider};
use crate::domain::entities::{IdentityRecord, UserId};

use super::error::InfraError;

#[derive(Debug, Clone)]
pub struct IdentityClientConfig {
    pub base_url: Url,
    pub secret_key: Option<String>,
    pub timeout: Duration,
}

/// Shared HTTP plumbing for the provider and the session verifier.
#[derive(Clone, Debug)]
pub struct IdentityHttpClient {
    client: Client,
    base: Url,
    secret_key: Option<String>,
}

impl IdentityHttpClient {
    pub fn new(config: IdentityClientConfig) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("chirp/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|err| InfraError::identity(err.to_string()))?;
        let base = config
            .base_url
            .join("/")
            .map_err(|err| InfraError::identity(err.to_string()))?;
        Ok(Self {
            client,
            base,
            secret_key: config.secret_key,
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, IdentityError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|err| IdentityError::InvalidResponse(format!("bad url `{path}`: {err}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.secret_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, IdentityError> {
        self.authorize(request)
            .send()
            .await
            .map_err(|err| IdentityError::Unavailable(err.to_string()))
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, IdentityError> {
    let status = response.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(IdentityError::Unavailable(format!("provider returned {status}")));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(IdentityError::InvalidResponse(format!(
            "status {status} body {body}"
        )));
    }
    response
        .json::<T>()
        .await
        .map_err(|err| IdentityError::InvalidResponse(err.to_string()))
}

/// Provider-side user, reduced to the fields clients may see.
#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: String,
    username: Option<String>,
    #[serde(alias = "profile_image_url")]
    image_url: Option<String>,
}

impl ProviderUser {
    /// Users without a username cannot be shown and are treated as absent.
    fn into_record(self) -> Option<IdentityRecord> {
        let username = self.username.filter(|name| !name.trim().is_empty())?;
        Some(IdentityRecord {
            id: UserId::from(self.id),
            username,
            avatar_url: self.image_url.filter(|url| !url.is_empty()),
        })
    }
}

#[derive(Clone, Debug)]
pub struct HttpIdentityProvider {
    http: IdentityHttpClient,
}

impl HttpIdentityProvider {
    pub fn new(http: IdentityHttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: &UserId) -> Result<Option<IdentityRecord>, IdentityError> {
        let url = self.http.url(&format!("v1/users/{id}"), &[])?;
        let response = self.http.send(self.http.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let user: ProviderUser = decode(response).await?;
        Ok(user.into_record())
    }

    #[instrument(skip(self))]
    async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Option<IdentityRecord>, IdentityError> {
        let url = self
            .http
            .url("v1/users", &[("username", username), ("limit", "1")])?;
        let response = self.http.send(self.http.client.get(url)).await?;
        let users: Vec<ProviderUser> = decode(response).await?;
        Ok(users
            .into_iter()
            .filter_map(ProviderUser::into_record)
            .find(|record| record.username.eq_ignore_ascii_case(username)))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn get_by_ids(
        &self,
        ids: &[UserId],
    ) -> Result<HashMap<UserId, IdentityRecord>, IdentityError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let limit = ids.len().to_string();
        let mut query: Vec<(&str, &str)> = ids.iter().map(|id| ("user_id", id.as_str())).collect();
        query.push(("limit", limit.as_str()));

        let url = self.http.url("v1/users", &query)?;
        let response = self.http.send(self.http.client.get(url)).await?;
        let users: Vec<ProviderUser> = decode(response).await?;

        let records: HashMap<UserId, IdentityRecord> = users
            .into_iter()
            .filter_map(ProviderUser::into_record)
            .map(|record| (record.id.clone(), record))
            .collect();
        debug!(requested = ids.len(), returned = records.len(), "batch identity lookup");
        Ok(records)
    }
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifiedSession {
    user_id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Clone, Debug)]
pub struct HttpSessionVerifier {
    http: IdentityHttpClient,
}

impl HttpSessionVerifier {
    pub fn new(http: IdentityHttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SessionVerifier for HttpSessionVerifier {
    async fn current_user_id(
        &self,
        request: &RequestDescriptor,
    ) -> Result<Option<UserId>, IdentityError> {
        let Some(token) = request.session_token.as_deref() else {
            return Ok(None);
        };

        let url = self.http.url("v1/sessions/verify", &[])?;
        let response = self
            .http
            .send(self.http.client.post(url).json(&VerifyRequest { token }))
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                return Ok(None);
            }
            _ => {}
        }

        let session: VerifiedSession = decode(response).await?;
        let active = session
            .status
            .as_deref()
            .is_none_or(|status| status == "active");
        Ok(active.then(|| UserId::from(session.user_id)))
    }
}

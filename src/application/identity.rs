//! Identity provider seam.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{IdentityRecord, UserId};

#[derive(Debug, Clone, Error)]
pub enum IdentityError {
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
    #[error("identity provider returned an unexpected response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_by_id(&self, id: &UserId) -> Result<Option<IdentityRecord>, IdentityError>;

    async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Option<IdentityRecord>, IdentityError>;

    /// Look up many users in one call. Ids the provider does not know are
    /// simply absent from the map.
    async fn get_by_ids(
        &self,
        ids: &[UserId],
    ) -> Result<HashMap<UserId, IdentityRecord>, IdentityError>;
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiKeyId, ProjectId, Scope, ScopeSet, UserId};

/// A project API key. The secret itself is never stored, only its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub scopes: ScopeSet,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn new(id: ApiKeyId, user_id: UserId, project_id: ProjectId, scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self {
            id,
            user_id,
            project_id,
            scopes: scopes.into_iter().collect(),
            key_hash: String::new(),
            description: None,
            expires_at: None,
        }
    }

    pub fn with_hash(mut self, key_hash: impl Into<String>) -> Self {
        self.key_hash = key_hash.into();
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn expanded_scopes(&self) -> ScopeSet {
        Scope::expand(&self.scopes)
    }
}

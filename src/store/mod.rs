//! Data collaborators consumed by the permission evaluator.
//!
//! The evaluator never talks to a database directly; it reads through these
//! traits so the same rules run against SQLite in production and against
//! [`MemoryStore`] in tests.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::{AppError, AppResult, Message};
use crate::models::{
    ApiKey, ApiKeyId, ComputedPermission, KeyId, Language, ProjectId, ProjectPermission, Scope, ScopeSet,
    UserAccount, UserId,
};

#[async_trait]
pub trait PermissionData: Send + Sync {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserAccount>>;

    async fn find_project_permission(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> AppResult<Option<ProjectPermission>>;

    /// Expanded scopes of the user in the project, `None` when the user has
    /// no permission row. A row granting nothing yields an empty set.
    /// Server administrators always hold every scope.
    async fn project_permission_scopes(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> AppResult<Option<ScopeSet>> {
        let user = self
            .find_user(user_id)
            .await?
            .ok_or(AppError::NotFound(Message::UserNotFound))?;
        if user.is_server_admin() {
            return Ok(Some(Scope::all()));
        }

        Ok(self
            .find_project_permission(project_id, user_id)
            .await?
            .map(|permission| ComputedPermission::from_permission(&permission).scopes))
    }

    async fn project_permission_data(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> AppResult<ComputedPermission> {
        let user = self
            .find_user(user_id)
            .await?
            .ok_or(AppError::NotFound(Message::UserNotFound))?;
        let permission = self.find_project_permission(project_id, user_id).await?;
        Ok(ComputedPermission::for_user(&user, permission.as_ref()))
    }

    /// Scopes the user may hand out to a new API key for the project.
    async fn available_scopes(&self, user_id: UserId, project_id: ProjectId) -> AppResult<ScopeSet> {
        self.project_permission_scopes(project_id, user_id)
            .await?
            .ok_or(AppError::NotFound(Message::PermissionNotFound))
    }
}

#[async_trait]
pub trait LanguageStore: Send + Sync {
    /// Resolves every tag to its language; a single unknown tag is an error.
    async fn language_ids_by_tags(
        &self,
        project_id: ProjectId,
        tags: &[String],
    ) -> AppResult<HashMap<String, Language>>;

    /// Lenient lookup: unknown tags are skipped.
    async fn find_by_tags(&self, tags: &[String], project_id: ProjectId) -> AppResult<Vec<Language>>;
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    /// One project id per key id that exists; missing keys contribute nothing.
    async fn project_ids_for_key_ids(&self, key_ids: &[KeyId]) -> AppResult<Vec<ProjectId>>;
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn find_api_key_by_hash(&self, key_hash: &str) -> AppResult<Option<ApiKey>>;

    async fn list_api_keys(&self) -> AppResult<Vec<ApiKey>>;

    /// Compare-and-set on the stored scope list. Returns `false` when the
    /// stored scopes no longer equal `previous`.
    async fn replace_api_key_scopes(
        &self,
        api_key_id: ApiKeyId,
        previous: &ScopeSet,
        next: &ScopeSet,
    ) -> AppResult<bool>;

    async fn create_api_key(&self, api_key: ApiKey) -> AppResult<ApiKey>;
}

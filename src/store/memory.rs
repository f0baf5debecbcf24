use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ApiKeyStore, KeyStore, LanguageStore, PermissionData};
use crate::errors::{AppError, AppResult, Message};
use crate::models::{
    ApiKey, ApiKeyId, Key, KeyId, Language, ProjectId, ProjectPermission, ScopeSet, UserAccount, UserId,
};

/// In-process implementation of every collaborator, used by tests and by
/// embedders that keep permission data elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<UserId, UserAccount>>,
    permissions: RwLock<HashMap<(ProjectId, UserId), ProjectPermission>>,
    languages: RwLock<Vec<Language>>,
    keys: RwLock<HashMap<KeyId, Key>>,
    api_keys: RwLock<HashMap<ApiKeyId, ApiKey>>,
    next_api_key_id: AtomicI64,
    api_key_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: UserAccount) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn insert_permission(&self, permission: ProjectPermission) {
        self.permissions
            .write()
            .await
            .insert((permission.project_id, permission.user_id), permission);
    }

    pub async fn remove_permission(&self, project_id: ProjectId, user_id: UserId) {
        self.permissions.write().await.remove(&(project_id, user_id));
    }

    pub async fn insert_language(&self, language: Language) {
        self.languages.write().await.push(language);
    }

    pub async fn insert_key(&self, key: Key) {
        self.keys.write().await.insert(key.id, key);
    }

    pub async fn insert_api_key(&self, api_key: ApiKey) {
        self.next_api_key_id.fetch_max(api_key.id, Ordering::SeqCst);
        self.api_keys.write().await.insert(api_key.id, api_key);
    }

    pub async fn api_key(&self, api_key_id: ApiKeyId) -> Option<ApiKey> {
        self.api_keys.read().await.get(&api_key_id).cloned()
    }

    /// Number of successful scope rewrites, for asserting on persistence.
    pub fn api_key_writes(&self) -> usize {
        self.api_key_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionData for MemoryStore {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserAccount>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn find_project_permission(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> AppResult<Option<ProjectPermission>> {
        Ok(self.permissions.read().await.get(&(project_id, user_id)).cloned())
    }
}

#[async_trait]
impl LanguageStore for MemoryStore {
    async fn language_ids_by_tags(
        &self,
        project_id: ProjectId,
        tags: &[String],
    ) -> AppResult<HashMap<String, Language>> {
        let found: HashMap<String, Language> = self
            .find_by_tags(tags, project_id)
            .await?
            .into_iter()
            .map(|language| (language.tag.clone(), language))
            .collect();

        if tags.iter().any(|tag| !found.contains_key(tag)) {
            return Err(AppError::not_found(Message::LanguageNotFound));
        }
        Ok(found)
    }

    async fn find_by_tags(&self, tags: &[String], project_id: ProjectId) -> AppResult<Vec<Language>> {
        Ok(self
            .languages
            .read()
            .await
            .iter()
            .filter(|language| language.project_id == project_id && tags.contains(&language.tag))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn project_ids_for_key_ids(&self, key_ids: &[KeyId]) -> AppResult<Vec<ProjectId>> {
        let keys = self.keys.read().await;
        Ok(key_ids
            .iter()
            .filter_map(|id| keys.get(id).map(|key| key.project_id))
            .collect())
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn find_api_key_by_hash(&self, key_hash: &str) -> AppResult<Option<ApiKey>> {
        Ok(self
            .api_keys
            .read()
            .await
            .values()
            .find(|api_key| api_key.key_hash == key_hash)
            .cloned())
    }

    async fn list_api_keys(&self) -> AppResult<Vec<ApiKey>> {
        let mut keys: Vec<ApiKey> = self.api_keys.read().await.values().cloned().collect();
        keys.sort_by_key(|api_key| api_key.id);
        Ok(keys)
    }

    async fn replace_api_key_scopes(
        &self,
        api_key_id: ApiKeyId,
        previous: &ScopeSet,
        next: &ScopeSet,
    ) -> AppResult<bool> {
        let mut api_keys = self.api_keys.write().await;
        match api_keys.get_mut(&api_key_id) {
            Some(stored) if &stored.scopes == previous => {
                stored.scopes = next.clone();
                self.api_key_writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_api_key(&self, mut api_key: ApiKey) -> AppResult<ApiKey> {
        api_key.id = self.next_api_key_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.api_keys.write().await.insert(api_key.id, api_key.clone());
        Ok(api_key)
    }
}

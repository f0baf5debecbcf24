use std::collections::HashMap;
use std::sync::Arc;

use super::principal::Principal;
use crate::errors::{AppError, AppResult, Message};
use crate::models::{
    ApiKey, KeyId, Language, LanguageId, LanguagePermissionKind, ProjectId, Scope, ScopeSet, UserAccount, UserId,
};
use crate::store::{ApiKeyStore, KeyStore, LanguageStore, PermissionData};
use crate::utils::{hash_api_key, utc_now};

/// Project permission evaluator.
///
/// Stateless apart from its collaborators; share it behind an `Arc`. Every
/// check returns `Ok(())` or a typed denial, and only
/// [`fix_invalid_api_key_when_required`](Self::fix_invalid_api_key_when_required)
/// writes anything.
#[derive(Clone)]
pub struct SecurityService {
    permissions: Arc<dyn PermissionData>,
    languages: Arc<dyn LanguageStore>,
    keys: Arc<dyn KeyStore>,
    api_keys: Arc<dyn ApiKeyStore>,
}

impl SecurityService {
    pub fn new(
        permissions: Arc<dyn PermissionData>,
        languages: Arc<dyn LanguageStore>,
        keys: Arc<dyn KeyStore>,
        api_keys: Arc<dyn ApiKeyStore>,
    ) -> Self {
        Self {
            permissions,
            languages,
            keys,
            api_keys,
        }
    }

    /// Wires every collaborator to the same store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: PermissionData + LanguageStore + KeyStore + ApiKeyStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store.clone(), store)
    }

    // ---------------------------------------------------------------------
    // Principal resolution
    // ---------------------------------------------------------------------

    pub async fn principal_for_user(&self, user_id: UserId) -> AppResult<Principal> {
        let user = self
            .permissions
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::unauthorized("user no longer exists"))?;
        Ok(Principal::new(user))
    }

    /// Authenticates a raw project API key and loads its owner.
    pub async fn principal_for_api_key(&self, raw_key: &str) -> AppResult<Principal> {
        let api_key = self
            .api_keys
            .find_api_key_by_hash(&hash_api_key(raw_key))
            .await?
            .ok_or_else(|| AppError::unauthorized("invalid api key"))?;

        if api_key.is_expired(utc_now()) {
            return Err(AppError::unauthorized("api key expired"));
        }

        let principal = self.principal_for_user(api_key.user_id).await?;
        Ok(principal.with_api_key(api_key))
    }

    // ---------------------------------------------------------------------
    // Project checks
    // ---------------------------------------------------------------------

    pub async fn check_any_project_permission(&self, principal: &Principal, project_id: ProjectId) -> AppResult<()> {
        if let Some(api_key) = &principal.api_key {
            Self::check_api_key_project(api_key, project_id)?;
        }
        if principal.is_server_admin() {
            return Ok(());
        }

        let scopes = self
            .permissions
            .project_permission_scopes(project_id, principal.user_id())
            .await?;
        if scopes.map_or(true, |scopes| scopes.is_empty()) {
            tracing::debug!(user_id = %principal.user_id(), project_id, "no project access");
            return Err(AppError::permission_denied());
        }
        Ok(())
    }

    /// The user's own rights are always checked first, even for API-key
    /// sessions, so a key can never outlive a revoked membership.
    pub async fn check_project_permission(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        required: Scope,
    ) -> AppResult<()> {
        self.check_project_permission_no_api_key(&principal.user, project_id, required)
            .await?;

        if let Some(api_key) = &principal.api_key {
            Self::check_api_key_project(api_key, project_id)?;
            Self::check_api_key_scopes(&[required], api_key)?;
        }
        Ok(())
    }

    pub async fn check_project_permission_no_api_key(
        &self,
        user: &UserAccount,
        project_id: ProjectId,
        required: Scope,
    ) -> AppResult<()> {
        if user.is_server_admin() {
            tracing::debug!(user_id = %user.id, project_id, scope = %required, "server admin bypass");
            return Ok(());
        }

        let allowed = self
            .permissions
            .project_permission_scopes(project_id, user.id)
            .await?
            .ok_or_else(|| AppError::denied_with(Message::UserHasNoProjectAccess))?;

        if !allowed.contains(&required) {
            tracing::debug!(user_id = %user.id, project_id, scope = %required, "scope not held");
            return Err(AppError::denied_with_params(
                Message::OperationNotPermitted,
                vec![required.as_str().to_string()],
            ));
        }

        tracing::debug!(user_id = %user.id, project_id, scope = %required, "project permission granted");
        Ok(())
    }

    pub async fn check_user_is_server_admin(&self, principal: &Principal) -> AppResult<()> {
        if principal.is_server_admin() {
            Ok(())
        } else {
            Err(AppError::permission_denied())
        }
    }

    pub async fn check_screenshots_upload_permission(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> AppResult<()> {
        if let Some(api_key) = &principal.api_key {
            Self::check_api_key_scopes(&[Scope::ScreenshotsUpload], api_key)?;
        }
        self.check_project_permission(principal, project_id, Scope::ScreenshotsUpload)
            .await
    }

    pub async fn check_big_meta_upload_permission(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> AppResult<()> {
        self.check_project_permission(principal, project_id, Scope::TranslationsEdit)
            .await
    }

    /// Effective scopes of the session in the project: the user's own scopes,
    /// narrowed to the API key's scopes for key sessions.
    pub async fn project_permission_scopes(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> AppResult<ScopeSet> {
        let user_scopes = self
            .permissions
            .project_permission_scopes(project_id, principal.user_id())
            .await?
            .unwrap_or_default();

        match &principal.api_key {
            Some(api_key) if api_key.project_id != project_id => Ok(ScopeSet::new()),
            Some(api_key) => {
                let key_scopes = api_key.expanded_scopes();
                Ok(user_scopes.intersection(&key_scopes).copied().collect())
            }
            None => Ok(user_scopes),
        }
    }

    // ---------------------------------------------------------------------
    // Language checks
    // ---------------------------------------------------------------------

    pub async fn check_language_permission(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        language_ids: &[LanguageId],
        kind: LanguagePermissionKind,
    ) -> AppResult<()> {
        self.check_project_permission(principal, project_id, kind.required_scope())
            .await?;

        if principal.is_server_admin() {
            return Ok(());
        }

        let computed = self
            .permissions
            .project_permission_data(project_id, principal.user_id())
            .await?;
        computed.check_permitted(kind, language_ids).inspect_err(|_| {
            tracing::debug!(user_id = %principal.user_id(), project_id, kind = kind.as_str(), "language not permitted");
        })
    }

    /// Like [`check_language_permission`](Self::check_language_permission) but
    /// addressed by tag; a denial also names the rejected tags.
    pub async fn check_language_permission_by_tag(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        tags: &[String],
        kind: LanguagePermissionKind,
    ) -> AppResult<()> {
        self.check_project_permission(principal, project_id, kind.required_scope())
            .await?;

        let by_tag = self.languages.language_ids_by_tags(project_id, tags).await?;

        if principal.is_server_admin() {
            return Ok(());
        }

        let language_ids: Vec<LanguageId> = tags.iter().filter_map(|tag| by_tag.get(tag)).map(|l| l.id).collect();
        let computed = self
            .permissions
            .project_permission_data(project_id, principal.user_id())
            .await?;

        match computed.check_permitted(kind, &language_ids) {
            Err(AppError::LanguageNotPermitted { language_ids, .. }) => {
                let language_tags = tags_for_ids(&by_tag, &language_ids);
                tracing::debug!(
                    user_id = %principal.user_id(),
                    project_id,
                    kind = kind.as_str(),
                    tags = ?language_tags,
                    "language not permitted"
                );
                Err(AppError::LanguageNotPermitted {
                    language_ids,
                    language_tags,
                })
            }
            other => other,
        }
    }

    /// View check that degrades to filtering: tags the principal may not see
    /// are dropped instead of failing the whole request.
    pub async fn filter_view_permission_by_tag(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        tags: &[String],
    ) -> AppResult<Vec<String>> {
        let mut unique: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !unique.contains(tag) {
                unique.push(tag.clone());
            }
        }

        match self
            .check_language_permission_by_tag(principal, project_id, &unique, LanguagePermissionKind::View)
            .await
        {
            Ok(()) => Ok(unique),
            Err(AppError::LanguageNotPermitted { language_tags, .. }) => {
                Ok(unique.into_iter().filter(|tag| !language_tags.contains(tag)).collect())
            }
            Err(err) => Err(err),
        }
    }

    /// Translate check over the languages found by tag; unknown tags are ignored.
    pub async fn check_language_tag_permissions(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        tags: &[String],
    ) -> AppResult<()> {
        let languages = self.languages.find_by_tags(tags, project_id).await?;
        let ids: Vec<LanguageId> = languages.iter().map(|language| language.id).collect();
        self.check_language_permission(principal, project_id, &ids, LanguagePermissionKind::Translate)
            .await
    }

    /// Language check for a single translation, addressed by its language.
    pub async fn check_translation_permission(
        &self,
        principal: &Principal,
        language: &Language,
        kind: LanguagePermissionKind,
    ) -> AppResult<()> {
        self.check_language_permission(principal, language.project_id, &[language.id], kind)
            .await
    }

    // ---------------------------------------------------------------------
    // API keys
    // ---------------------------------------------------------------------

    pub fn check_api_key_scopes(required: &[Scope], api_key: &ApiKey) -> AppResult<()> {
        let expanded = api_key.expanded_scopes();
        if required.iter().all(|scope| expanded.contains(scope)) {
            Ok(())
        } else {
            tracing::debug!(api_key_id = api_key.id, required = ?required, "api key scope missing");
            Err(AppError::permission_denied())
        }
    }

    fn check_api_key_project(api_key: &ApiKey, project_id: ProjectId) -> AppResult<()> {
        if api_key.project_id != project_id {
            tracing::debug!(api_key_id = api_key.id, project_id, "api key bound to another project");
            return Err(AppError::denied_with(Message::ApiKeyNotFromProject));
        }
        Ok(())
    }

    /// Scopes requested for a new key must be a subset of what the user can
    /// currently hand out in the project.
    pub async fn check_api_key_scopes_grantable(
        &self,
        user: &UserAccount,
        project_id: ProjectId,
        scopes: &[Scope],
    ) -> AppResult<()> {
        let available = match self.permissions.available_scopes(user.id, project_id).await {
            Ok(available) => available,
            Err(AppError::NotFound(_)) => return Err(AppError::permission_denied()),
            Err(err) => return Err(err),
        };

        if scopes.iter().all(|scope| available.contains(scope)) {
            Ok(())
        } else {
            Err(AppError::permission_denied())
        }
    }

    /// Removes from the key every scope its owner no longer holds in the
    /// key's project. Writes only when something was removed; returns whether
    /// this call persisted a change.
    pub async fn fix_invalid_api_key_when_required(&self, api_key: &mut ApiKey) -> AppResult<bool> {
        let held = self
            .permissions
            .project_permission_scopes(api_key.project_id, api_key.user_id)
            .await?
            .unwrap_or_default();

        let pruned: ScopeSet = api_key.scopes.iter().filter(|scope| held.contains(scope)).copied().collect();
        if pruned.len() == api_key.scopes.len() {
            return Ok(false);
        }

        let written = self
            .api_keys
            .replace_api_key_scopes(api_key.id, &api_key.scopes, &pruned)
            .await?;

        if written {
            tracing::info!(
                api_key_id = api_key.id,
                user_id = %api_key.user_id,
                project_id = api_key.project_id,
                removed = ?api_key.scopes.difference(&pruned).collect::<Vec<_>>(),
                "pruned api key scopes"
            );
        } else {
            // another request pruned it first; recomputing gives the same set
            tracing::debug!(api_key_id = api_key.id, "api key scopes changed concurrently");
        }

        api_key.scopes = pruned;
        Ok(written)
    }

    // ---------------------------------------------------------------------
    // Keys
    // ---------------------------------------------------------------------

    pub async fn check_key_ids_exist_and_is_from_project(
        &self,
        key_ids: &[KeyId],
        project_id: ProjectId,
    ) -> AppResult<()> {
        let mut unique: Vec<KeyId> = Vec::with_capacity(key_ids.len());
        for id in key_ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }
        if unique.is_empty() {
            return Ok(());
        }

        let project_ids = self.keys.project_ids_for_key_ids(&unique).await?;
        if project_ids.len() != unique.len() {
            return Err(AppError::not_found(Message::KeyNotFound));
        }

        let first = project_ids[0];
        if project_ids.iter().any(|id| *id != first) {
            return Err(AppError::denied_with(Message::MultipleProjectsNotSupported));
        }
        if first != project_id {
            return Err(AppError::denied_with(Message::KeyNotFromProject));
        }
        Ok(())
    }
}

fn tags_for_ids(by_tag: &HashMap<String, Language>, language_ids: &[LanguageId]) -> Vec<String> {
    language_ids
        .iter()
        .filter_map(|id| {
            by_tag
                .iter()
                .find(|(_, language)| language.id == *id)
                .map(|(tag, _)| tag.clone())
        })
        .collect()
}

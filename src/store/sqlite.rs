use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{ApiKeyStore, KeyStore, LanguageStore, PermissionData};
use crate::db::row_parsers::{
    api_key_from_row, encode_scopes, language_from_row, permission_from_row, user_from_row,
};
use crate::errors::{AppError, AppResult, Message};
use crate::models::{
    ApiKey, ApiKeyId, KeyId, Language, LanguagePermissionKind, ProjectId, ProjectPermission, ScopeSet,
    UserAccount, UserId,
};

const API_KEY_COLUMNS: &str = "id, user_id, project_id, key_hash, scopes, description, expires_at";

/// SQLite-backed collaborators sharing one connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_language_restrictions(&self, permission: &mut ProjectPermission) -> AppResult<()> {
        let rows = sqlx::query("SELECT language_id, kind FROM permission_languages WHERE permission_id = ?")
            .bind(permission.id)
            .fetch_all(&self.pool)
            .await?;

        for row in rows {
            let language_id: i64 = row.try_get("language_id")?;
            let kind: String = row.try_get("kind")?;
            let target = match kind.as_str() {
                "view" => &mut permission.view_language_ids,
                "translate" => &mut permission.translate_language_ids,
                "state_change" => &mut permission.state_change_language_ids,
                other => return Err(AppError::internal(format!("unknown language permission kind: {other}"))),
            };
            target.insert(language_id);
        }
        Ok(())
    }

    /// Inserts or replaces the user's permission row and its language lists.
    pub async fn save_permission(&self, permission: &ProjectPermission) -> AppResult<ProjectPermission> {
        let mut tx = self.pool.begin().await?;

        let scopes = if permission.scopes.is_empty() {
            None
        } else {
            Some(encode_scopes(&permission.scopes)?)
        };

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO permissions (user_id, project_id, type, scopes) VALUES (?, ?, ?, ?) \
             ON CONFLICT (user_id, project_id) DO UPDATE SET type = excluded.type, scopes = excluded.scopes \
             RETURNING id",
        )
        .bind(permission.user_id)
        .bind(permission.project_id)
        .bind(permission.permission_type.map(|t| t.as_str()))
        .bind(scopes)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM permission_languages WHERE permission_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let lists = [
            (LanguagePermissionKind::View, &permission.view_language_ids),
            (LanguagePermissionKind::Translate, &permission.translate_language_ids),
            (LanguagePermissionKind::StateChange, &permission.state_change_language_ids),
        ];
        for (kind, ids) in lists {
            for language_id in ids {
                sqlx::query("INSERT INTO permission_languages (permission_id, language_id, kind) VALUES (?, ?, ?)")
                    .bind(id)
                    .bind(language_id)
                    .bind(kind.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        let mut saved = permission.clone();
        saved.id = id;
        Ok(saved)
    }
}

#[async_trait]
impl PermissionData for SqliteStore {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserAccount>> {
        let row = sqlx::query("SELECT id, username, role FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_project_permission(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> AppResult<Option<ProjectPermission>> {
        let row = sqlx::query("SELECT id, user_id, project_id, type, scopes FROM permissions WHERE project_id = ? AND user_id = ?")
            .bind(project_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut permission = permission_from_row(&row)?;
        self.load_language_restrictions(&mut permission).await?;
        Ok(Some(permission))
    }
}

#[async_trait]
impl LanguageStore for SqliteStore {
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
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, project_id, tag, name FROM languages WHERE project_id = ");
        query.push_bind(project_id).push(" AND tag IN (");
        let mut separated = query.separated(", ");
        for tag in tags {
            separated.push_bind(tag.clone());
        }
        separated.push_unseparated(") ORDER BY id");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(language_from_row).collect()
    }
}

#[async_trait]
impl KeyStore for SqliteStore {
    async fn project_ids_for_key_ids(&self, key_ids: &[KeyId]) -> AppResult<Vec<ProjectId>> {
        if key_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT project_id FROM keys WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in key_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row.try_get::<i64, _>("project_id").map_err(AppError::from))
            .collect()
    }
}

#[async_trait]
impl ApiKeyStore for SqliteStore {
    async fn find_api_key_by_hash(&self, key_hash: &str) -> AppResult<Option<ApiKey>> {
        let row = sqlx::query(&format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = ?"))
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(api_key_from_row).transpose()
    }

    async fn list_api_keys(&self) -> AppResult<Vec<ApiKey>> {
        let rows = sqlx::query(&format!("SELECT {API_KEY_COLUMNS} FROM api_keys ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(api_key_from_row).collect()
    }

    async fn replace_api_key_scopes(
        &self,
        api_key_id: ApiKeyId,
        previous: &ScopeSet,
        next: &ScopeSet,
    ) -> AppResult<bool> {
        // single statement: the stored text is always written by encode_scopes,
        // so equal sets compare equal as text
        let result = sqlx::query(
            "UPDATE api_keys SET scopes = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND scopes = ?",
        )
        .bind(encode_scopes(next)?)
        .bind(api_key_id)
        .bind(encode_scopes(previous)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn create_api_key(&self, api_key: ApiKey) -> AppResult<ApiKey> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO api_keys (user_id, project_id, key_hash, scopes, description, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(api_key.user_id)
        .bind(api_key.project_id)
        .bind(&api_key.key_hash)
        .bind(encode_scopes(&api_key.scopes)?)
        .bind(&api_key.description)
        .bind(api_key.expires_at.map(|at| at.to_rfc3339()))
        .fetch_one(&self.pool)
        .await?;

        Ok(ApiKey { id, ..api_key })
    }
}

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthPrincipal;
use crate::models::{KeyId, LanguageId, LanguagePermissionKind, ProjectId, Scope};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScopesResponse {
    pub scopes: Vec<Scope>,
    pub api_key_auth: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScopeCheckRequest {
    pub scope: Scope,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LanguageCheckRequest {
    pub kind: LanguagePermissionKind,
    #[serde(default)]
    pub language_ids: Vec<LanguageId>,
    #[serde(default)]
    pub language_tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LanguageTags {
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyCheckRequest {
    pub key_ids: Vec<KeyId>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApiKeyScopesRequest {
    pub scopes: Vec<Scope>,
}

#[utoipa::path(
    get,
    path = "/v2/projects/{project_id}/authz/scopes",
    tag = "Authorization",
    params(("project_id" = i64, Path, description = "Project id")),
    responses(
        (status = 200, description = "Effective scopes of the caller", body = ScopesResponse),
        (status = 403, description = "No access to the project")
    )
)]
pub async fn list_scopes(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(project_id): Path<ProjectId>,
) -> AppResult<Json<ScopesResponse>> {
    state.security.check_any_project_permission(&principal, project_id).await?;
    let scopes = state.security.project_permission_scopes(&principal, project_id).await?;

    Ok(Json(ScopesResponse {
        scopes: scopes.into_iter().collect(),
        api_key_auth: principal.is_api_key_auth(),
    }))
}

#[utoipa::path(
    post,
    path = "/v2/projects/{project_id}/authz/scope",
    tag = "Authorization",
    params(("project_id" = i64, Path, description = "Project id")),
    request_body = ScopeCheckRequest,
    responses(
        (status = 204, description = "Scope held"),
        (status = 403, description = "Scope not held")
    )
)]
pub async fn check_scope(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(project_id): Path<ProjectId>,
    Json(payload): Json<ScopeCheckRequest>,
) -> AppResult<StatusCode> {
    state
        .security
        .check_project_permission(&principal, project_id, payload.scope)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v2/projects/{project_id}/authz/languages",
    tag = "Authorization",
    params(("project_id" = i64, Path, description = "Project id")),
    request_body = LanguageCheckRequest,
    responses(
        (status = 204, description = "Every language permitted"),
        (status = 403, description = "Some languages not permitted"),
        (status = 404, description = "Unknown language tag")
    )
)]
pub async fn check_languages(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(project_id): Path<ProjectId>,
    Json(payload): Json<LanguageCheckRequest>,
) -> AppResult<StatusCode> {
    match (payload.language_ids.is_empty(), payload.language_tags.is_empty()) {
        (false, false) => {
            return Err(AppError::bad_request("send either languageIds or languageTags, not both"));
        }
        (true, false) => {
            state
                .security
                .check_language_permission_by_tag(&principal, project_id, &payload.language_tags, payload.kind)
                .await?
        }
        _ => {
            state
                .security
                .check_language_permission(&principal, project_id, &payload.language_ids, payload.kind)
                .await?
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v2/projects/{project_id}/authz/languages/viewable",
    tag = "Authorization",
    params(("project_id" = i64, Path, description = "Project id")),
    request_body = LanguageTags,
    responses((status = 200, description = "Tags the caller may view", body = LanguageTags))
)]
pub async fn filter_viewable_languages(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(project_id): Path<ProjectId>,
    Json(payload): Json<LanguageTags>,
) -> AppResult<Json<LanguageTags>> {
    let tags = state
        .security
        .filter_view_permission_by_tag(&principal, project_id, &payload.tags)
        .await?;
    Ok(Json(LanguageTags { tags }))
}

#[utoipa::path(
    post,
    path = "/v2/projects/{project_id}/authz/keys",
    tag = "Authorization",
    params(("project_id" = i64, Path, description = "Project id")),
    request_body = KeyCheckRequest,
    responses(
        (status = 204, description = "All keys exist in the project"),
        (status = 403, description = "Keys span projects or belong elsewhere"),
        (status = 404, description = "Some key does not exist")
    )
)]
pub async fn check_keys(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(project_id): Path<ProjectId>,
    Json(payload): Json<KeyCheckRequest>,
) -> AppResult<StatusCode> {
    state
        .security
        .check_project_permission(&principal, project_id, Scope::KeysView)
        .await?;
    state
        .security
        .check_key_ids_exist_and_is_from_project(&payload.key_ids, project_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v2/projects/{project_id}/authz/api-key-scopes",
    tag = "Authorization",
    params(("project_id" = i64, Path, description = "Project id")),
    request_body = ApiKeyScopesRequest,
    responses(
        (status = 204, description = "Caller may grant these scopes"),
        (status = 403, description = "Some scope is not grantable")
    )
)]
pub async fn check_api_key_scopes(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(project_id): Path<ProjectId>,
    Json(payload): Json<ApiKeyScopesRequest>,
) -> AppResult<StatusCode> {
    state
        .security
        .check_api_key_scopes_grantable(&principal.user, project_id, &payload.scopes)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::models::LanguageId;

pub type AppResult<T> = Result<T, AppError>;

/// Machine-readable reason attached to a denial or a missing entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    UserHasNoProjectAccess,
    OperationNotPermitted,
    ApiKeyNotFromProject,
    KeyNotFound,
    MultipleProjectsNotSupported,
    KeyNotFromProject,
    LanguageNotFound,
    LanguageNotPermitted,
    PermissionNotFound,
    UserNotFound,
}

impl Message {
    pub fn code(&self) -> &'static str {
        match self {
            Message::UserHasNoProjectAccess => "user_has_no_project_access",
            Message::OperationNotPermitted => "operation_not_permitted",
            Message::ApiKeyNotFromProject => "api_key_not_from_project",
            Message::KeyNotFound => "key_not_found",
            Message::MultipleProjectsNotSupported => "multiple_projects_not_supported",
            Message::KeyNotFromProject => "key_not_from_project",
            Message::LanguageNotFound => "language_not_found",
            Message::LanguageNotPermitted => "language_not_permitted",
            Message::PermissionNotFound => "permission_not_found",
            Message::UserNotFound => "user_not_found",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("permission denied{}", .code.map(|c| format!(": {}", c.code())).unwrap_or_default())]
    PermissionDenied {
        code: Option<Message>,
        params: Vec<String>,
    },
    #[error("language not permitted: {language_ids:?}")]
    LanguageNotPermitted {
        language_ids: Vec<LanguageId>,
        language_tags: Vec<String>,
    },
    #[error("not found: {}", .0.code())]
    NotFound(Message),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("token error: {0}")]
    Token(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Denial without a specific rule attached.
    pub fn permission_denied() -> Self {
        Self::PermissionDenied { code: None, params: Vec::new() }
    }

    pub fn denied_with(code: Message) -> Self {
        Self::PermissionDenied { code: Some(code), params: Vec::new() }
    }

    pub fn denied_with_params(code: Message, params: Vec<String>) -> Self {
        Self::PermissionDenied { code: Some(code), params }
    }

    pub fn language_not_permitted(language_ids: Vec<LanguageId>) -> Self {
        Self::LanguageNotPermitted { language_ids, language_tags: Vec::new() }
    }

    pub fn not_found(message: Message) -> Self {
        Self::NotFound(message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn token(err: impl Into<String>) -> Self {
        Self::Token(err.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The rule code carried by a denial or not-found error, if any.
    pub fn message(&self) -> Option<Message> {
        match self {
            AppError::PermissionDenied { code, .. } => *code,
            AppError::LanguageNotPermitted { .. } => Some(Message::LanguageNotPermitted),
            AppError::NotFound(message) => Some(*message),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    params: Vec<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            AppError::LanguageNotPermitted { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Token(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();
        let code = self.message();
        let error = match &self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::PermissionDenied { .. } => "permission_denied",
            AppError::LanguageNotPermitted { .. } => "permission_denied",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Configuration(_) => "configuration",
            AppError::Token(_) => "token",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        };

        if let AppError::Database(err) = &self {
            tracing::error!(error = %err, "database failure");
        }

        let params = match self {
            AppError::PermissionDenied { params, .. } => {
                params.into_iter().map(serde_json::Value::String).collect()
            }
            AppError::LanguageNotPermitted { language_ids, language_tags } => vec![
                serde_json::json!(language_ids),
                serde_json::json!(language_tags),
            ],
            _ => Vec::new(),
        };

        let payload = ErrorResponse {
            error: error.to_string(),
            message,
            code,
            params,
        };

        (status, Json(payload)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

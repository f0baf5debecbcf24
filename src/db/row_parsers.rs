use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::errors::AppError;
use crate::models::{ApiKey, Language, PermissionType, ProjectPermission, ScopeSet, ServerRole, UserAccount};

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // RFC3339 first (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite default timestamp format, with optional fractional seconds
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range".to_string()))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn parse_opt_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    match s {
        Some(s) if !s.trim().is_empty() => Ok(Some(parse_datetime(&s)?)),
        _ => Ok(None),
    }
}

/// Scope lists are stored as JSON arrays of wire values.
pub fn parse_scopes(s: &str) -> Result<ScopeSet, AppError> {
    if s.trim().is_empty() {
        return Ok(ScopeSet::new());
    }
    serde_json::from_str(s).map_err(|e| AppError::internal(format!("invalid scope list: {}", e)))
}

pub fn encode_scopes(scopes: &ScopeSet) -> Result<String, AppError> {
    serde_json::to_string(scopes).map_err(|e| AppError::internal(format!("failed to encode scopes: {}", e)))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, AppError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| AppError::internal(format!("missing {}: {}", name, e)))
}

pub fn user_from_row(row: &SqliteRow) -> Result<UserAccount, AppError> {
    let role_s: String = column(row, "role")?;

    Ok(UserAccount {
        id: column(row, "id")?,
        username: column(row, "username")?,
        role: role_s.parse::<ServerRole>()?,
    })
}

pub fn language_from_row(row: &SqliteRow) -> Result<Language, AppError> {
    Ok(Language {
        id: column(row, "id")?,
        project_id: column(row, "project_id")?,
        tag: column(row, "tag")?,
        name: column(row, "name")?,
    })
}

/// Parses the `permissions` row; language restrictions are loaded separately.
pub fn permission_from_row(row: &SqliteRow) -> Result<ProjectPermission, AppError> {
    let type_s: Option<String> = column(row, "type")?;
    let scopes_s: Option<String> = column(row, "scopes")?;

    let mut permission = ProjectPermission::new(column(row, "id")?, column(row, "user_id")?, column(row, "project_id")?);
    permission.permission_type = type_s.as_deref().map(str::parse::<PermissionType>).transpose()?;
    permission.scopes = match scopes_s {
        Some(s) => parse_scopes(&s)?,
        None => ScopeSet::new(),
    };
    Ok(permission)
}

pub fn api_key_from_row(row: &SqliteRow) -> Result<ApiKey, AppError> {
    let scopes_s: String = column(row, "scopes")?;
    let expires_at_s: Option<String> = column(row, "expires_at")?;

    Ok(ApiKey {
        id: column(row, "id")?,
        user_id: column(row, "user_id")?,
        project_id: column(row, "project_id")?,
        scopes: parse_scopes(&scopes_s)?,
        key_hash: column(row, "key_hash")?,
        description: column(row, "description")?,
        expires_at: parse_opt_datetime(expires_at_s)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scope;

    #[test]
    fn parses_sqlite_and_rfc3339_timestamps() {
        let a = parse_datetime("2025-03-01 10:20:30").unwrap();
        let b = parse_datetime("2025-03-01T10:20:30Z").unwrap();
        assert_eq!(a, b);
        assert!(parse_datetime("yesterday").is_err());
    }

    #[test]
    fn scope_lists_are_canonical_json() {
        let scopes = ScopeSet::from([Scope::TranslationsEdit, Scope::KeysView]);
        let encoded = encode_scopes(&scopes).unwrap();
        assert_eq!(encoded, r#"["keys.view","translations.edit"]"#);
        assert_eq!(parse_scopes(&encoded).unwrap(), scopes);
        assert!(parse_scopes("").unwrap().is_empty());
        assert!(parse_scopes(r#"["nope"]"#).is_err());
    }
}

use crate::errors::AppError;
use crate::jwt::JwtConfig;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://authz.db";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Process configuration read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub api_key_header: String,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let port = match std::env::var("APP_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            database_url,
            port,
            api_key_header: api_key_header_from_env(),
            jwt: JwtConfig::from_env()?,
        })
    }
}

pub fn api_key_header_from_env() -> String {
    std::env::var("API_KEY_HEADER")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string())
}

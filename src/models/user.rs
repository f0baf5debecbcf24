use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UserId;
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerRole {
    User,
    Admin,
}

impl ServerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerRole::User => "USER",
            ServerRole::Admin => "ADMIN",
        }
    }
}

impl FromStr for ServerRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(ServerRole::User),
            "ADMIN" => Ok(ServerRole::Admin),
            other => Err(AppError::internal(format!("unknown server role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
    pub role: ServerRole,
}

impl UserAccount {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            role: ServerRole::User,
        }
    }

    pub fn with_role(mut self, role: ServerRole) -> Self {
        self.role = role;
        self
    }

    pub fn is_server_admin(&self) -> bool {
        self.role == ServerRole::Admin
    }
}

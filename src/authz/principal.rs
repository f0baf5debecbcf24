use crate::models::{ApiKey, UserAccount, UserId};

/// The authenticated actor a check runs for.
///
/// A session authenticated with a project API key carries both the key and
/// the key's owner; every check still evaluates the owner's own rights.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: UserAccount,
    pub api_key: Option<ApiKey>,
}

impl Principal {
    pub fn new(user: UserAccount) -> Self {
        Self { user, api_key: None }
    }

    pub fn with_api_key(mut self, api_key: ApiKey) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn is_server_admin(&self) -> bool {
        self.user.is_server_admin()
    }

    pub fn is_api_key_auth(&self) -> bool {
        self.api_key.is_some()
    }
}

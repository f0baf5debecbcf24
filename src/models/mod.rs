pub mod api_key;
pub mod key;
pub mod language;
pub mod permission;
pub mod scope;
pub mod user;

pub use api_key::ApiKey;
pub use key::Key;
pub use language::Language;
pub use permission::{ComputedPermission, LanguagePermissionKind, PermissionOrigin, ProjectPermission};
pub use scope::{PermissionType, Scope, ScopeSet};
pub use user::{ServerRole, UserAccount};

pub type UserId = i64;
pub type ProjectId = i64;
pub type LanguageId = i64;
pub type KeyId = i64;
pub type ApiKeyId = i64;

//! Authorization core.
//!
//! [`SecurityService`] decides whether a [`Principal`] may perform an action
//! identified by a [`Scope`](crate::models::Scope) inside a project, with
//! optional per-language restrictions. Evaluation order for project checks:
//! 1. server admin -> allow
//! 2. the user's own project scopes must contain the required scope
//! 3. for API-key sessions, the key must belong to the project and its
//!    expanded scopes must contain the required scope as well

mod evaluator;
mod principal;

pub use evaluator::SecurityService;
pub use principal::Principal;

/// Prefix of project API keys handed out to users.
pub const API_KEY_PREFIX: &str = "tgpak_";

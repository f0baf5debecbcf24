use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{LanguageId, PermissionType, ProjectId, Scope, ScopeSet, UserAccount, UserId};
use crate::errors::{AppError, AppResult};

/// Which language restriction list a language check consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LanguagePermissionKind {
    View,
    Translate,
    StateChange,
}

impl LanguagePermissionKind {
    /// Project scope that must be held before the language lists are consulted.
    pub fn required_scope(&self) -> Scope {
        match self {
            LanguagePermissionKind::View => Scope::TranslationsView,
            LanguagePermissionKind::Translate => Scope::TranslationsEdit,
            LanguagePermissionKind::StateChange => Scope::TranslationsStateEdit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LanguagePermissionKind::View => "view",
            LanguagePermissionKind::Translate => "translate",
            LanguagePermissionKind::StateChange => "state_change",
        }
    }
}

/// Stored permission of one user in one project.
///
/// Either `permission_type` or `scopes` describes the grant; a type wins when
/// both are present. Empty language lists mean every language is permitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProjectPermission {
    pub id: i64,
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub permission_type: Option<PermissionType>,
    #[schema(value_type = Vec<Scope>)]
    pub scopes: ScopeSet,
    #[schema(value_type = Vec<i64>)]
    pub view_language_ids: BTreeSet<LanguageId>,
    #[schema(value_type = Vec<i64>)]
    pub translate_language_ids: BTreeSet<LanguageId>,
    #[schema(value_type = Vec<i64>)]
    pub state_change_language_ids: BTreeSet<LanguageId>,
}

impl ProjectPermission {
    pub fn new(id: i64, user_id: UserId, project_id: ProjectId) -> Self {
        Self {
            id,
            user_id,
            project_id,
            permission_type: None,
            scopes: ScopeSet::new(),
            view_language_ids: BTreeSet::new(),
            translate_language_ids: BTreeSet::new(),
            state_change_language_ids: BTreeSet::new(),
        }
    }

    pub fn with_type(mut self, permission_type: PermissionType) -> Self {
        self.permission_type = Some(permission_type);
        self
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
        self.scopes = scopes.into_iter().collect();
        self
    }

    pub fn with_languages(
        mut self,
        kind: LanguagePermissionKind,
        ids: impl IntoIterator<Item = LanguageId>,
    ) -> Self {
        let ids = ids.into_iter().collect();
        match kind {
            LanguagePermissionKind::View => self.view_language_ids = ids,
            LanguagePermissionKind::Translate => self.translate_language_ids = ids,
            LanguagePermissionKind::StateChange => self.state_change_language_ids = ids,
        }
        self
    }

    /// Scopes as granted, before expansion.
    pub fn granted_scopes(&self) -> ScopeSet {
        match self.permission_type {
            Some(permission_type) => permission_type.scopes().iter().copied().collect(),
            None => self.scopes.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOrigin {
    Direct,
    ServerAdmin,
    None,
}

/// Check-time view of a user's rights in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ComputedPermission {
    pub origin: PermissionOrigin,
    #[schema(value_type = Vec<Scope>)]
    pub scopes: ScopeSet,
    #[schema(value_type = Vec<i64>)]
    pub view_language_ids: BTreeSet<LanguageId>,
    #[schema(value_type = Vec<i64>)]
    pub translate_language_ids: BTreeSet<LanguageId>,
    #[schema(value_type = Vec<i64>)]
    pub state_change_language_ids: BTreeSet<LanguageId>,
}

impl ComputedPermission {
    pub fn none() -> Self {
        Self {
            origin: PermissionOrigin::None,
            scopes: ScopeSet::new(),
            view_language_ids: BTreeSet::new(),
            translate_language_ids: BTreeSet::new(),
            state_change_language_ids: BTreeSet::new(),
        }
    }

    pub fn server_admin() -> Self {
        Self {
            origin: PermissionOrigin::ServerAdmin,
            scopes: Scope::all(),
            ..Self::none()
        }
    }

    pub fn from_permission(permission: &ProjectPermission) -> Self {
        Self {
            origin: PermissionOrigin::Direct,
            scopes: Scope::expand(&permission.granted_scopes()),
            view_language_ids: permission.view_language_ids.clone(),
            translate_language_ids: permission.translate_language_ids.clone(),
            state_change_language_ids: permission.state_change_language_ids.clone(),
        }
    }

    /// Server administrators are elevated regardless of the stored row.
    pub fn for_user(user: &UserAccount, permission: Option<&ProjectPermission>) -> Self {
        if user.is_server_admin() {
            return Self::server_admin();
        }
        permission.map(Self::from_permission).unwrap_or_else(Self::none)
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    fn is_admin(&self) -> bool {
        self.has_scope(Scope::Admin)
    }

    /// Languages permitted for `kind`, or `None` when every language is.
    pub fn permitted_language_ids(&self, kind: LanguagePermissionKind) -> Option<BTreeSet<LanguageId>> {
        if self.is_admin() {
            return None;
        }
        match kind {
            LanguagePermissionKind::View => {
                if self.view_language_ids.is_empty() {
                    return None;
                }
                // translating or reviewing a language implies seeing it
                Some(
                    self.view_language_ids
                        .iter()
                        .chain(&self.translate_language_ids)
                        .chain(&self.state_change_language_ids)
                        .copied()
                        .collect(),
                )
            }
            LanguagePermissionKind::Translate if self.translate_language_ids.is_empty() => None,
            LanguagePermissionKind::Translate => Some(self.translate_language_ids.clone()),
            LanguagePermissionKind::StateChange if self.state_change_language_ids.is_empty() => None,
            LanguagePermissionKind::StateChange => Some(self.state_change_language_ids.clone()),
        }
    }

    /// Fails with the ids outside the permitted list, in input order.
    pub fn check_permitted(&self, kind: LanguagePermissionKind, language_ids: &[LanguageId]) -> AppResult<()> {
        let Some(permitted) = self.permitted_language_ids(kind) else {
            return Ok(());
        };

        let mut rejected: Vec<LanguageId> = Vec::new();
        for id in language_ids {
            if !permitted.contains(id) && !rejected.contains(id) {
                rejected.push(*id);
            }
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(AppError::language_not_permitted(rejected))
        }
    }
}

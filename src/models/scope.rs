use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// A single project capability. The serialized form is the wire value used by
/// API keys, permission rows and request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum Scope {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "project.edit")]
    ProjectEdit,
    #[serde(rename = "members.view")]
    MembersView,
    #[serde(rename = "members.edit")]
    MembersEdit,
    #[serde(rename = "languages.edit")]
    LanguagesEdit,
    #[serde(rename = "activity.view")]
    ActivityView,
    #[serde(rename = "keys.view")]
    KeysView,
    #[serde(rename = "keys.create")]
    KeysCreate,
    #[serde(rename = "keys.edit")]
    KeysEdit,
    #[serde(rename = "keys.delete")]
    KeysDelete,
    #[serde(rename = "translations.view")]
    TranslationsView,
    #[serde(rename = "translations.edit")]
    TranslationsEdit,
    #[serde(rename = "translations.state-edit")]
    TranslationsStateEdit,
    #[serde(rename = "translation-comments.add")]
    TranslationCommentsAdd,
    #[serde(rename = "translation-comments.edit")]
    TranslationCommentsEdit,
    #[serde(rename = "translation-comments.set-state")]
    TranslationCommentsSetState,
    #[serde(rename = "screenshots.view")]
    ScreenshotsView,
    #[serde(rename = "screenshots.upload")]
    ScreenshotsUpload,
    #[serde(rename = "screenshots.delete")]
    ScreenshotsDelete,
}

pub type ScopeSet = BTreeSet<Scope>;

impl Scope {
    pub const ALL: [Scope; 19] = [
        Scope::Admin,
        Scope::ProjectEdit,
        Scope::MembersView,
        Scope::MembersEdit,
        Scope::LanguagesEdit,
        Scope::ActivityView,
        Scope::KeysView,
        Scope::KeysCreate,
        Scope::KeysEdit,
        Scope::KeysDelete,
        Scope::TranslationsView,
        Scope::TranslationsEdit,
        Scope::TranslationsStateEdit,
        Scope::TranslationCommentsAdd,
        Scope::TranslationCommentsEdit,
        Scope::TranslationCommentsSetState,
        Scope::ScreenshotsView,
        Scope::ScreenshotsUpload,
        Scope::ScreenshotsDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Admin => "admin",
            Scope::ProjectEdit => "project.edit",
            Scope::MembersView => "members.view",
            Scope::MembersEdit => "members.edit",
            Scope::LanguagesEdit => "languages.edit",
            Scope::ActivityView => "activity.view",
            Scope::KeysView => "keys.view",
            Scope::KeysCreate => "keys.create",
            Scope::KeysEdit => "keys.edit",
            Scope::KeysDelete => "keys.delete",
            Scope::TranslationsView => "translations.view",
            Scope::TranslationsEdit => "translations.edit",
            Scope::TranslationsStateEdit => "translations.state-edit",
            Scope::TranslationCommentsAdd => "translation-comments.add",
            Scope::TranslationCommentsEdit => "translation-comments.edit",
            Scope::TranslationCommentsSetState => "translation-comments.set-state",
            Scope::ScreenshotsView => "screenshots.view",
            Scope::ScreenshotsUpload => "screenshots.upload",
            Scope::ScreenshotsDelete => "screenshots.delete",
        }
    }

    /// Scopes granted directly by this one (one level of the hierarchy).
    fn implies(&self) -> &'static [Scope] {
        match self {
            Scope::Admin => &[
                Scope::ProjectEdit,
                Scope::MembersEdit,
                Scope::LanguagesEdit,
                Scope::ActivityView,
                Scope::KeysCreate,
                Scope::KeysEdit,
                Scope::KeysDelete,
                Scope::TranslationsEdit,
                Scope::TranslationsStateEdit,
                Scope::TranslationCommentsAdd,
                Scope::TranslationCommentsEdit,
                Scope::TranslationCommentsSetState,
                Scope::ScreenshotsUpload,
                Scope::ScreenshotsDelete,
            ],
            Scope::MembersEdit => &[Scope::MembersView],
            Scope::KeysCreate | Scope::KeysEdit | Scope::KeysDelete => &[Scope::KeysView],
            Scope::TranslationsView => &[Scope::KeysView],
            Scope::TranslationsEdit
            | Scope::TranslationsStateEdit
            | Scope::TranslationCommentsAdd
            | Scope::TranslationCommentsEdit
            | Scope::TranslationCommentsSetState => &[Scope::TranslationsView],
            Scope::ScreenshotsView => &[Scope::KeysView],
            Scope::ScreenshotsUpload | Scope::ScreenshotsDelete => &[Scope::ScreenshotsView],
            Scope::ProjectEdit
            | Scope::MembersView
            | Scope::LanguagesEdit
            | Scope::ActivityView
            | Scope::KeysView => &[],
        }
    }

    /// Full transitive closure of a single scope, computed once per process.
    pub fn closure(&self) -> &'static ScopeSet {
        static TABLE: OnceLock<Vec<ScopeSet>> = OnceLock::new();
        let table = TABLE.get_or_init(|| {
            Scope::ALL
                .iter()
                .map(|scope| {
                    let mut closed = ScopeSet::from([*scope]);
                    loop {
                        let next: ScopeSet = closed
                            .iter()
                            .flat_map(|s| s.implies().iter().copied())
                            .chain(closed.iter().copied())
                            .collect();
                        if next.len() == closed.len() {
                            break closed;
                        }
                        closed = next;
                    }
                })
                .collect()
        });
        // ALL is declared in discriminant order
        &table[*self as usize]
    }

    /// Expands a granted set into every scope it implies.
    pub fn expand<'a>(scopes: impl IntoIterator<Item = &'a Scope>) -> ScopeSet {
        scopes
            .into_iter()
            .flat_map(|scope| scope.closure().iter().copied())
            .collect()
    }

    /// Every scope in existence, as held by a project administrator.
    pub fn all() -> ScopeSet {
        Scope::ALL.iter().copied().collect()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::ALL
            .iter()
            .find(|scope| scope.as_str() == s)
            .copied()
            .ok_or_else(|| AppError::bad_request(format!("unknown scope: {s}")))
    }
}

/// Named scope presets a permission row may carry instead of explicit scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionType {
    View,
    Translate,
    Review,
    Edit,
    Manage,
}

impl PermissionType {
    pub fn scopes(&self) -> &'static [Scope] {
        match self {
            PermissionType::View => &[Scope::TranslationsView, Scope::ScreenshotsView, Scope::KeysView],
            PermissionType::Translate => &[
                Scope::KeysView,
                Scope::TranslationsView,
                Scope::TranslationsEdit,
                Scope::ScreenshotsView,
                Scope::TranslationCommentsAdd,
                Scope::TranslationCommentsSetState,
            ],
            PermissionType::Review => &[
                Scope::KeysView,
                Scope::TranslationsView,
                Scope::TranslationsEdit,
                Scope::TranslationsStateEdit,
                Scope::ScreenshotsView,
                Scope::TranslationCommentsAdd,
                Scope::TranslationCommentsSetState,
            ],
            PermissionType::Edit => &[
                Scope::KeysView,
                Scope::KeysCreate,
                Scope::KeysEdit,
                Scope::KeysDelete,
                Scope::TranslationsView,
                Scope::TranslationsEdit,
                Scope::TranslationsStateEdit,
                Scope::ScreenshotsView,
                Scope::ScreenshotsUpload,
                Scope::ScreenshotsDelete,
                Scope::ActivityView,
                Scope::LanguagesEdit,
                Scope::TranslationCommentsAdd,
                Scope::TranslationCommentsEdit,
                Scope::TranslationCommentsSetState,
            ],
            PermissionType::Manage => &[Scope::Admin],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::View => "VIEW",
            PermissionType::Translate => "TRANSLATE",
            PermissionType::Review => "REVIEW",
            PermissionType::Edit => "EDIT",
            PermissionType::Manage => "MANAGE",
        }
    }
}

impl FromStr for PermissionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VIEW" => Ok(PermissionType::View),
            "TRANSLATE" => Ok(PermissionType::Translate),
            "REVIEW" => Ok(PermissionType::Review),
            "EDIT" => Ok(PermissionType::Edit),
            "MANAGE" => Ok(PermissionType::Manage),
            other => Err(AppError::bad_request(format!("unknown permission type: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_expands_to_every_scope() {
        assert_eq!(Scope::expand(&[Scope::Admin]), Scope::all());
    }

    #[test]
    fn expansion_follows_transitive_implications() {
        let expanded = Scope::expand(&[Scope::ScreenshotsUpload]);
        assert_eq!(
            expanded,
            ScopeSet::from([Scope::ScreenshotsUpload, Scope::ScreenshotsView, Scope::KeysView])
        );

        let expanded = Scope::expand(&[Scope::TranslationsStateEdit]);
        assert!(expanded.contains(&Scope::TranslationsView));
        assert!(expanded.contains(&Scope::KeysView));
        assert!(!expanded.contains(&Scope::TranslationsEdit));
    }

    #[test]
    fn expansion_is_idempotent() {
        for scope in Scope::ALL {
            let once = Scope::expand(&[scope]);
            let twice = Scope::expand(&once);
            assert_eq!(once, twice, "expanding {scope} twice changed the set");
        }

        let mixed = Scope::expand(&[Scope::MembersEdit, Scope::KeysCreate]);
        assert_eq!(Scope::expand(&mixed), mixed);
    }

    #[test]
    fn leaf_scopes_expand_to_themselves() {
        assert_eq!(Scope::expand(&[Scope::KeysView]), ScopeSet::from([Scope::KeysView]));
        assert_eq!(Scope::expand(&[Scope::ProjectEdit]), ScopeSet::from([Scope::ProjectEdit]));
    }

    #[test]
    fn wire_values_round_trip_through_from_str() {
        for scope in Scope::ALL {
            assert_eq!(scope.as_str().parse::<Scope>().unwrap(), scope);
        }
        assert!("translations.delete".parse::<Scope>().is_err());
    }

    #[test]
    fn serde_uses_wire_values() {
        let json = serde_json::to_string(&Scope::TranslationsStateEdit).unwrap();
        assert_eq!(json, "\"translations.state-edit\"");
        let scope: Scope = serde_json::from_str("\"screenshots.upload\"").unwrap();
        assert_eq!(scope, Scope::ScreenshotsUpload);
    }

    #[test]
    fn manage_type_grants_admin() {
        let expanded = Scope::expand(PermissionType::Manage.scopes());
        assert_eq!(expanded, Scope::all());
        assert_eq!("review".parse::<PermissionType>().unwrap(), PermissionType::Review);
    }
}

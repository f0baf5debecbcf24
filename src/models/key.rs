use serde::{Deserialize, Serialize};

use super::{KeyId, ProjectId};

/// A translation key. Only its project binding matters for authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub id: KeyId,
    pub project_id: ProjectId,
    pub name: String,
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{LanguageId, ProjectId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Language {
    pub id: LanguageId,
    pub project_id: ProjectId,
    #[schema(example = "en")]
    pub tag: String,
    #[schema(example = "English")]
    pub name: String,
}

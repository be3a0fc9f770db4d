use uuid::Uuid;

use crate::store::StoreError;
use crate::validation::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("Group with `id` matching `{0}` not found.")]
    NotFound(Uuid),

    #[error("Parent Group \"{0}\" does not exist.")]
    ParentNotFound(Uuid),

    #[error("Group cannot be its own parent.")]
    SelfParent,

    #[error("Group \"{parent}\" is a descendant of \"{id}\" and cannot become its parent.")]
    Cycle { id: Uuid, parent: Uuid },

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Store(#[from] StoreError),
}

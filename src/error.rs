use thiserror::Error;

/// Failures surfaced by the cascade engine.
///
/// Validation variants are raised before any mutation; a collaborator
/// failure aborts the remaining relationships in the current branch and is
/// never retried here.
#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("entity type `{entity_type}` does not support soft deletes")]
    SoftDeleteNotSupported { entity_type: String },

    /// Every offending relationship name, in declaration order.
    #[error("cascade declares invalid relationships: {}", .names.join(", "))]
    InvalidRelationships { names: Vec<String> },

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

pub type Result<T, E = CascadeError> = std::result::Result<T, E>;

impl CascadeError {
    pub fn collaborator(err: impl Into<anyhow::Error>) -> Self {
        CascadeError::Collaborator(err.into())
    }
}

impl From<sqlx::Error> for CascadeError {
    fn from(err: sqlx::Error) -> Self {
        CascadeError::Collaborator(anyhow::Error::new(err))
    }
}

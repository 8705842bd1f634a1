use bastion_core::RestrictionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestrictionError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("restriction not found: {id}")]
    NotFound { id: RestrictionId },
}

pub type Result<T> = std::result::Result<T, RestrictionError>;

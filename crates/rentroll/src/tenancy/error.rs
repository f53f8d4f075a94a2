use super::domain::{UnitId, UnitStatus};

/// Failure reported by a [`TenancyStore`](super::store::TenancyStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("unit {unit_id} changed concurrently (found {found})")]
    UnitStatusMismatch { unit_id: UnitId, found: UnitStatus },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Domain error surfaced to callers of the tenancy services.
#[derive(Debug, thiserror::Error)]
pub enum TenancyError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Store(StoreError),
}

impl TenancyError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub(crate) fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }
}

impl From<StoreError> for TenancyError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(detail) => Self::Conflict(detail),
            StoreError::UnitStatusMismatch { unit_id, found } => {
                Self::Conflict(format!("unit {unit_id} is now {found}"))
            }
            other => Self::Store(other),
        }
    }
}

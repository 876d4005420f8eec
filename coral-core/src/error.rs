use coral_reclaim::PoolError;
use thiserror::Error;

/// Failures surfaced by the containers.
///
/// Lookups that find nothing are not errors; they return `None`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ContainerError {
    #[error("failed to allocate storage for {nodes} nodes")]
    InitializationFailure { nodes: usize },

    #[error("container is full ({capacity} nodes)")]
    OutOfCapacity { capacity: usize },

    #[error("payload word {word:#x} is not pointer-aligned")]
    AlignmentViolation { word: usize },
}

impl From<PoolError> for ContainerError {
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::InitializationFailure { nodes } => ContainerError::InitializationFailure { nodes },
            PoolError::OutOfCapacity { capacity } => ContainerError::OutOfCapacity { capacity },
        }
    }
}

pub type ContainerResult<T> = Result<T, ContainerError>;

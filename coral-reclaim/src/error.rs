use thiserror::Error;

/// Failures of the node pool.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("failed to reserve backing storage for {nodes} nodes")]
    InitializationFailure { nodes: usize },

    #[error("node pool exhausted ({capacity} nodes in use)")]
    OutOfCapacity { capacity: usize },
}

pub type PoolResult<T> = Result<T, PoolError>;

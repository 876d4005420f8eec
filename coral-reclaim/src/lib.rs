//! Fixed-capacity node pools with lock-free reclamation.
//!
//! A [`NodePool`] owns every node a container will ever use. Nodes are handed
//! out by [`NodePool::allocate`], shared through counted [`Retained`] handles,
//! and go back on the pool's free list once the last reference is released.
//! Links between nodes are [`MarkedLink`] words: a slot index plus a delete
//! flag, updated with a single CAS.

#[doc(hidden)]
pub mod tracing_helpers;

pub mod error;
pub mod marked_link;
pub mod pool;
pub mod primitives;

pub use error::{PoolError, PoolResult};
pub use marked_link::{cas_link, mark_link, MarkedLink, Slot};
pub use pool::{NodePool, PoolNode, Retained};
pub use primitives::{Backoff, BackoffConfig};

use std::fmt::Debug;

use crate::error::ContainerResult;
use crate::payload::Payload;

/// Capacity used by `Default` implementations.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Outcome of a successful insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion<P> {
    /// A new entry was linked.
    Inserted,
    /// The key was already present; the existing entry was kept and the
    /// rejected payload is handed back.
    Duplicate(P),
    /// The key was already present; its payload was swapped for the new one
    /// and the previous payload is handed back.
    Replaced(P),
}

impl<P> Insertion<P> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Insertion::Inserted)
    }

    /// The payload that did not end up in the container, if any.
    pub fn into_displaced(self) -> Option<P> {
        match self {
            Insertion::Inserted => None,
            Insertion::Duplicate(payload) | Insertion::Replaced(payload) => Some(payload),
        }
    }
}

/// Fixed-capacity container ordered by key, drained from the minimum.
///
/// All operations are lock-free and may be called from any number of threads.
pub trait OrderedContainer<P: Payload> {
    type Key: Copy + Ord + Debug;

    /// Create an empty container holding at most `capacity` entries.
    fn with_capacity(capacity: usize) -> ContainerResult<Self>
    where
        Self: Sized;

    /// Insert `payload` under `key`.
    ///
    /// What happens to an existing entry with the same key is up to the
    /// container, and is reported through [`Insertion`].
    fn insert(&self, key: Self::Key, payload: P) -> ContainerResult<Insertion<P>>;

    /// Remove and return the entry with the smallest key.
    fn extract_minimum(&self) -> Option<(Self::Key, P)>;

    /// Number of live entries. Exact only while no operation is in flight.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    fn capacity(&self) -> usize;

    /// Unused nodes in the backing pool. Exact only at quiescence.
    fn available(&self) -> usize;
}

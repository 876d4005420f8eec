//! Fixed-capacity, lock-free ordered containers.
//!
//! - [`SortedList`]: sorted by signed key, extract by key or minimum; inserting an
//!   existing key keeps the entry already there.
//! - [`PriorityQueue`]: skip list keyed by unsigned priority; inserting an
//!   existing key replaces its payload. Supports a single-consumer `peek`.
//!
//! Both containers allocate all of their nodes up front and recycle them through
//! a [`coral_reclaim::NodePool`]; a full container reports
//! [`ContainerError::OutOfCapacity`] instead of growing.

pub mod common_tests;
pub mod data_structures;
pub mod error;
pub mod payload;

pub use data_structures::{
    Insertion, OrderedContainer, PriorityQueue, QueueOptions, SortedList, DEFAULT_CAPACITY,
    MAX_LEVELS,
};
pub use error::{ContainerError, ContainerResult};
pub use payload::Payload;

pub use coral_reclaim::BackoffConfig;

//! Data structures backed by fixed node pools.
//!
//! # Organization
//!
//! - [`sorted`] - Lock-free ordered containers (SortedList, PriorityQueue)
//! - [`ordered_container`] - Trait and result types shared by both

pub mod ordered_container;
pub mod sorted;

pub use ordered_container::{Insertion, OrderedContainer, DEFAULT_CAPACITY};
pub use sorted::{PriorityQueue, QueueOptions, SortedList, MAX_LEVELS};

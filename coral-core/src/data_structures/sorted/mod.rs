//! Lock-free containers ordered by key.
//!
//! - [`SortedList`] - single-level list keyed by signed words, drop-on-duplicate
//! - [`PriorityQueue`] - skip list keyed by unsigned priorities, replace-on-duplicate

pub mod priority_queue;
pub mod sorted_list;

pub use priority_queue::{PriorityQueue, QueueOptions, MAX_LEVELS};
pub use sorted_list::SortedList;

//! Test suites shared by every [`OrderedContainer`](crate::OrderedContainer).
//!
//! Integration tests instantiate these generic functions once per container
//! with `rstest` cases.

pub mod ordered_container_stress_tests;

use std::fmt::Debug;
use std::hash::Hash;

/// Keys the shared suites can generate from a plain index.
pub trait TestKey: Copy + Ord + Hash + Debug + Send + 'static {
    fn from_index(index: u32) -> Self;
}

impl TestKey for isize {
    fn from_index(index: u32) -> Self {
        index as isize
    }
}

impl TestKey for u64 {
    fn from_index(index: u32) -> Self {
        u64::from(index)
    }
}

/// A pointer-aligned payload word that encodes `index`.
pub fn payload_for(index: u32) -> usize {
    (index as usize + 1) * std::mem::align_of::<usize>()
}

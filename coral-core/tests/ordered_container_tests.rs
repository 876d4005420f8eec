use coral_core::common_tests::ordered_container_core_tests::*;
use coral_core::common_tests::TestKey;
use coral_core::{OrderedContainer, PriorityQueue, SortedList};
use rstest::rstest;
use serial_test::serial;

// Trait for type-level parametrization
trait TestOrderedContainer {
    type ContainerType: OrderedContainer<usize, Key = Self::Key> + Default + Send + Sync + 'static;
    type Key: TestKey;
}

// Marker types for each container
struct UseSortedList;
struct UsePriorityQueue;

impl TestOrderedContainer for UseSortedList {
    type ContainerType = SortedList<usize>;
    type Key = isize;
}

impl TestOrderedContainer for UsePriorityQueue {
    type ContainerType = PriorityQueue<usize>;
    type Key = u64;
}

#[rstest]
#[case::sorted_list(UseSortedList)]
#[case::priority_queue(UsePriorityQueue)]
fn test_basic<T: TestOrderedContainer>(#[case] _type: T) {
    test_basic_operations(&T::ContainerType::default());
}

#[rstest]
#[case::sorted_list(UseSortedList)]
#[case::priority_queue(UsePriorityQueue)]
fn test_duplicates<T: TestOrderedContainer>(#[case] _type: T) {
    test_duplicate_keeps_single_entry(&T::ContainerType::default());
}

#[rstest]
#[case::sorted_list(UseSortedList)]
#[case::priority_queue(UsePriorityQueue)]
fn test_alignment<T: TestOrderedContainer>(#[case] _type: T) {
    test_misaligned_payload(&T::ContainerType::default());
}

#[rstest]
#[case::sorted_list(UseSortedList)]
#[case::priority_queue(UsePriorityQueue)]
fn test_capacity<T: TestOrderedContainer>(#[case] _type: T) {
    test_capacity_recycling::<T::ContainerType>();
}

#[rstest]
#[case::sorted_list(UseSortedList)]
#[case::priority_queue(UsePriorityQueue)]
fn test_sequential<T: TestOrderedContainer>(#[case] _type: T) {
    test_sequential_operations::<T::ContainerType>();
}

#[rstest]
#[serial]
#[case::sorted_list(UseSortedList)]
#[case::priority_queue(UsePriorityQueue)]
fn test_concurrent<T: TestOrderedContainer>(#[case] _type: T) {
    test_concurrent_operations::<T::ContainerType>();
}

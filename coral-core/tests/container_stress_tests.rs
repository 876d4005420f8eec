use coral_core::common_tests::ordered_container_stress_tests::*;
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
#[serial(stress_tests)]
#[case::sorted_list(UseSortedList)]
#[case::priority_queue(UsePriorityQueue)]
fn stress_producers_consumers<T: TestOrderedContainer>(#[case] _type: T) {
    test_producers_consumers::<T::ContainerType>();
}

#[rstest]
#[serial(stress_tests)]
#[case::sorted_list(UseSortedList)]
#[case::priority_queue(UsePriorityQueue)]
fn stress_extract_minimum<T: TestOrderedContainer>(#[case] _type: T) {
    test_concurrent_extract_minimum::<T::ContainerType>();
}

#[rstest]
#[serial(stress_tests)]
#[case::sorted_list(UseSortedList)]
#[case::priority_queue(UsePriorityQueue)]
fn stress_count_invariant<T: TestOrderedContainer>(#[case] _type: T) {
    test_count_invariant::<T::ContainerType>();
}

#[rstest]
#[serial(stress_tests)]
#[case::sorted_list(UseSortedList)]
#[case::priority_queue(UsePriorityQueue)]
fn stress_same_key_inserts<T: TestOrderedContainer>(#[case] _type: T) {
    test_concurrent_same_key_inserts::<T::ContainerType>();
}

#[rstest]
#[serial(stress_tests)]
#[case::sorted_list(UseSortedList)]
#[case::priority_queue(UsePriorityQueue)]
fn stress_extract_respects_completed_inserts<T: TestOrderedContainer>(#[case] _type: T) {
    test_extract_minimum_respects_completed_inserts::<T::ContainerType>();
}

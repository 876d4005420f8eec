use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use coral_reclaim::primitives::store_barrier;
use coral_reclaim::{cas_link, trace_log, MarkedLink, NodePool, PoolNode, Retained, Slot};
use crossbeam_utils::CachePadded;

use crate::data_structures::{Insertion, OrderedContainer, DEFAULT_CAPACITY};
use crate::error::{ContainerError, ContainerResult};
use crate::payload::{checked_word, Payload};

// =============================================================================
// SORTED LIST INVARIANTS
// =============================================================================
//
// List Structure (sorted ascending, nodes are pool slots):
// ┌──────┐    ┌──────┐    ┌──────┐    ┌──────┐    ┌──────┐
// │ HEAD │───►│  3   │───►│  5   │───►│  7   │───►│ TAIL │
// │(sent)│    │      │    │      │    │      │    │(sent)│
// └──────┘    └──────┘    └──────┘    └──────┘    └──────┘
//
// Marked Link: the mark bit on node.next indicates the NODE is logically deleted.
//
// INVARIANTS:
// 1. List is always sorted by key (ascending); HEAD and TAIL are compared by
//    identity, so every key including isize::MIN and isize::MAX is usable
// 2. No duplicate keys among live nodes; an insert that finds its key keeps
//    the existing entry
// 3. HEAD and TAIL are never marked or removed
// 4. Every linked node carries one reference owned by the link pointing to it
// 5. Only the thread whose CAS sets the mark owns the removal: it returns the
//    payload and drops the link's reference once the node is unlinked
//
// =============================================================================
// REMOVE OPERATION (Two-Phase Delete)
// =============================================================================
//
// Phase 1: LOGICAL DELETE (mark curr.next)
// Phase 2: PHYSICAL UNLINK (CAS prev.next from curr to curr.next)
//
//          prev ──────► curr ──────► next
//
// Step 1 - Mark curr:
//          prev ──────► curr ──╳───► next
//
// Step 2 - Unlink, then leave a cleared (marked nil) link behind:
//          prev ─────────────────────► next
//                       curr ──╳       (returned to the pool after the last release)
//
// Any traversal that meets a marked node unlinks it before moving on. If the
// owner's own unlink CAS fails, prev changed under it; a fresh search from HEAD
// passes the node's position and therefore unlinks it.
//
#[derive(Default)]
struct ListNode {
    ref_count: AtomicUsize,
    next: [AtomicUsize; 1],
    key: AtomicIsize,
    data: AtomicUsize,
}

impl ListNode {
    #[inline]
    fn next(&self) -> &AtomicUsize {
        &self.next[0]
    }

    #[inline]
    fn key(&self) -> isize {
        self.key.load(Ordering::Relaxed)
    }
}

impl PoolNode for ListNode {
    fn ref_count(&self) -> &AtomicUsize {
        &self.ref_count
    }

    fn links(&self) -> &[AtomicUsize] {
        &self.next
    }
}

type NodeRef<'a> = Retained<'a, ListNode>;

/// Fixed-capacity lock-free sorted list, based on Harris's two-phase delete with
/// Valois-style reference counted nodes.
///
/// Inserting a key that is already present keeps the existing entry.
pub struct SortedList<P: Payload> {
    pool: NodePool<ListNode>,
    head: Slot,
    tail: Slot,
    capacity: usize,
    len: CachePadded<AtomicIsize>,
    _payload: PhantomData<P>,
}

impl<P: Payload> SortedList<P> {
    /// Create a list able to hold `capacity` entries.
    ///
    /// All node memory, sentinels included, is allocated here in one block.
    pub fn new(capacity: usize) -> ContainerResult<Self> {
        let nodes = capacity
            .checked_add(2)
            .ok_or(ContainerError::InitializationFailure { nodes: usize::MAX })?;
        let pool = NodePool::<ListNode>::new(nodes)?;

        let (head, tail) = {
            let head = pool.allocate()?;
            let tail = pool.allocate()?;
            head.key.store(isize::MIN, Ordering::Relaxed);
            tail.key.store(isize::MAX, Ordering::Relaxed);
            head.next().store(tail.link().into_raw(), Ordering::Relaxed);
            store_barrier();
            (head.into_slot(), tail.into_slot())
        };

        Ok(SortedList {
            pool,
            head,
            tail,
            capacity,
            len: CachePadded::new(AtomicIsize::new(0)),
            _payload: PhantomData,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn retain_head(&self) -> NodeRef<'_> {
        // SAFETY: the sentinel's own reference is never released.
        unsafe { self.pool.retain_slot(self.head) }
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Find the first live node with a key >= `key` (or TAIL) and its live
    /// predecessor, unlinking every marked node met on the way.
    fn search(&self, key: isize) -> (NodeRef<'_>, NodeRef<'_>) {
        'retry: loop {
            let mut prev = self.retain_head();
            let Some(mut curr) = self.pool.safe_read(prev.next()) else {
                continue 'retry;
            };

            loop {
                if curr.is(self.tail) {
                    return (prev, curr);
                }

                if MarkedLink::load(curr.next()).is_marked() {
                    if !self.unlink(&prev, &curr) {
                        trace_log!(key, "predecessor moved while helping, restarting search");
                        continue 'retry;
                    }
                    match self.pool.safe_read(prev.next()) {
                        Some(next) => curr = next,
                        None => continue 'retry,
                    }
                    continue;
                }

                // Marked since the check above: go around and help.
                let Some(next) = self.pool.safe_read(curr.next()) else {
                    continue;
                };

                if curr.key() >= key {
                    return (prev, curr);
                }
                prev = curr;
                curr = next;
            }
        }
    }

    /// Physically unlink the logically deleted `curr` from behind `prev`.
    ///
    /// Fails if `prev` no longer points to `curr`, either because `prev` was
    /// itself deleted or because `curr` is already gone.
    fn unlink(&self, prev: &NodeRef<'_>, curr: &NodeRef<'_>) -> bool {
        let next = MarkedLink::load(curr.next());
        debug_assert!(next.is_marked());

        if cas_link(prev.next(), curr.link(), next.with_mark(false)) {
            store_barrier();
            curr.next().store(MarkedLink::CLEARED.into_raw(), Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Set the delete mark on `node`; `true` if this thread now owns the removal.
    fn mark(&self, node: &NodeRef<'_>) -> bool {
        let next = MarkedLink::load(node.next());
        !next.is_marked() && cas_link(node.next(), next, next.with_mark(true))
    }

    /// Complete a removal this thread owns: make sure the node is unlinked,
    /// then give back the link's reference.
    fn finish_removal(&self, prev: NodeRef<'_>, curr: NodeRef<'_>) {
        if !self.unlink(&prev, &curr) {
            drop(prev);
            let _ = self.search(curr.key());
        }
        self.len.fetch_sub(1, Ordering::Relaxed);

        // SAFETY: the node was reachable until now, so the link's reference is
        // still outstanding and belongs to the owner of the removal.
        let link_ref = unsafe { self.pool.adopt_slot(curr.slot()) };
        drop(curr);
        drop(link_ref);
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Insert `payload` under `key`.
    ///
    /// If `key` is already present the existing entry is left untouched and
    /// `payload` comes back as [`Insertion::Duplicate`].
    pub fn insert(&self, key: isize, payload: P) -> ContainerResult<Insertion<P>> {
        let word = checked_word(payload)?;
        let node = self.pool.allocate().map_err(|_| ContainerError::OutOfCapacity {
            capacity: self.capacity,
        })?;
        node.key.store(key, Ordering::Relaxed);
        node.data.store(word, Ordering::Relaxed);

        loop {
            let (prev, curr) = self.search(key);
            if !curr.is(self.tail) && curr.key() == key {
                return Ok(Insertion::Duplicate(payload));
            }

            node.next().store(curr.link().into_raw(), Ordering::Relaxed);
            store_barrier();
            if cas_link(prev.next(), curr.link(), node.link()) {
                self.len.fetch_add(1, Ordering::Relaxed);
                // The link from `prev` now owns the allocation's reference.
                node.into_slot();
                return Ok(Insertion::Inserted);
            }
        }
    }

    /// Remove the entry with `key` and return its payload.
    pub fn extract_by_key(&self, key: isize) -> Option<P> {
        loop {
            let (prev, curr) = self.search(key);
            if curr.is(self.tail) || curr.key() != key {
                return None;
            }

            if !self.mark(&curr) {
                continue;
            }

            let word = curr.data.load(Ordering::SeqCst);
            self.finish_removal(prev, curr);
            // SAFETY: only words produced by `P::to_word` are stored as data.
            return Some(unsafe { P::from_word(word) });
        }
    }

    /// Remove and return the entry with the smallest key.
    pub fn extract_minimum(&self) -> Option<(isize, P)> {
        loop {
            let head = self.retain_head();
            let Some(first) = self.pool.safe_read(head.next()) else {
                continue;
            };
            if first.is(self.tail) {
                return None;
            }

            if MarkedLink::load(first.next()).is_marked() {
                self.unlink(&head, &first);
                continue;
            }

            // A smaller key may have been linked in front since the read.
            if !MarkedLink::load(head.next()).points_to(first.slot()) {
                continue;
            }
            if !self.mark(&first) {
                continue;
            }

            let key = first.key();
            let word = first.data.load(Ordering::SeqCst);
            self.finish_removal(head, first);
            // SAFETY: only words produced by `P::to_word` are stored as data.
            return Some((key, unsafe { P::from_word(word) }));
        }
    }

    /// Live entries in key order.
    ///
    /// Marked nodes are skipped. Under concurrent modification the result is
    /// a best-effort view rather than an atomic snapshot.
    pub fn entries(&self) -> Vec<(isize, P)> {
        let mut entries = Vec::new();
        let mut curr = self.retain_head();
        loop {
            let next = match self.pool.safe_read(curr.next()) {
                Some(next) => next,
                // `curr` is being removed; resume behind its key.
                None => match curr.key().checked_add(1) {
                    Some(after) => self.search(after).1,
                    None => break,
                },
            };
            if next.is(self.tail) {
                break;
            }
            if !MarkedLink::load(next.next()).is_marked() {
                let word = next.data.load(Ordering::SeqCst);
                // SAFETY: only words produced by `P::to_word` are stored as data.
                entries.push((next.key(), unsafe { P::from_word(word) }));
            }
            curr = next;
        }
        entries
    }

    /// Free nodes left in the pool. Exact only at quiescence.
    pub fn available(&self) -> usize {
        self.pool.available()
    }
}

impl<P: Payload> OrderedContainer<P> for SortedList<P> {
    type Key = isize;

    fn with_capacity(capacity: usize) -> ContainerResult<Self> {
        SortedList::new(capacity)
    }

    fn insert(&self, key: isize, payload: P) -> ContainerResult<Insertion<P>> {
        SortedList::insert(self, key, payload)
    }

    fn extract_minimum(&self) -> Option<(isize, P)> {
        SortedList::extract_minimum(self)
    }

    fn len(&self) -> usize {
        SortedList::len(self)
    }

    fn capacity(&self) -> usize {
        SortedList::capacity(self)
    }

    fn available(&self) -> usize {
        SortedList::available(self)
    }
}

impl<P: Payload> Default for SortedList<P> {
    /// # Panics
    ///
    /// Panics if the default-sized pool cannot be allocated.
    fn default() -> Self {
        match SortedList::new(DEFAULT_CAPACITY) {
            Ok(list) => list,
            Err(error) => panic!("failed to create sorted list: {error}"),
        }
    }
}

impl<P: Payload> fmt::Debug for SortedList<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortedList")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

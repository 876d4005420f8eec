use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicIsize, AtomicU64, AtomicUsize, Ordering};

use coral_reclaim::primitives::{load_barrier, store_barrier};
use coral_reclaim::{
    cas_link, mark_link, trace_log, warn_log, Backoff, BackoffConfig, MarkedLink, NodePool,
    PoolNode, Retained, Slot,
};
use crossbeam_utils::CachePadded;

use crate::data_structures::{Insertion, OrderedContainer, DEFAULT_CAPACITY};
use crate::error::{ContainerError, ContainerResult};
use crate::payload::{checked_word, Payload};

/// Upper bound on node height.
pub const MAX_LEVELS: usize = 12;

/// Height used when [`QueueOptions`] does not say otherwise.
pub const DEFAULT_MAX_HEIGHT: usize = 6;

const DATA_MARK: usize = 1;

// =============================================================================
// SKIP LIST PRIORITY QUEUE INVARIANTS
// =============================================================================
//
// Level 2:  HEAD ──────────────────────────► 30 ─────────────────► TAIL
// Level 1:  HEAD ──────────► 10 ───────────► 30 ─────────────────► TAIL
// Level 0:  HEAD ──────────► 10 ────► 20 ──► 30 ──────────► 40 ──► TAIL
//
// Deletion is committed by marking node.data, not a link. The links are marked
// afterwards, on every level, and then unlinked top-down.
//
// INVARIANTS:
// 1. Every level is sorted by key; HEAD and TAIL are compared by identity
// 2. A node is linked at level 0 before any higher level, and only the level-0
//    link owns a reference to it
// 3. valid_to_height = number of bottom levels that are linked and safe to use
//    as a starting point for a search
// 4. node.prev holds a counted reference to the predecessor the extractor saw.
//    It is a hint only and is released when the node is reclaimed
// 5. A link left behind by a physical unlink is CLEARED (marked nil), which
//    tells late helpers the level is already done
//
// =============================================================================
// HELPING
// =============================================================================
//
// A traversal that reads from a node whose data is marked, or whose link at
// the current level is marked, finishes the deletion at that level first:
//
//   1. mark node.next[level..height]
//   2. find a predecessor: node.prev if it is linked at this level, otherwise
//      a fresh search from HEAD
//   3. CAS pred.next[level] from node to node.next[level], back off on failure
//   4. continue from that predecessor
//
// An insert still linking upper levels checks the data mark before and after
// each link, so a level linked after the extractor finished gets unlinked by
// the inserter itself.
//
#[derive(Default)]
struct QueueNode {
    ref_count: AtomicUsize,
    next: [AtomicUsize; MAX_LEVELS],
    prev: AtomicUsize,
    key: AtomicU64,
    data: AtomicUsize,
    height: AtomicUsize,
    valid_to_height: AtomicUsize,
}

impl QueueNode {
    #[inline]
    fn key(&self) -> u64 {
        self.key.load(Ordering::Relaxed)
    }

    #[inline]
    fn height(&self) -> usize {
        self.height.load(Ordering::Relaxed)
    }

    #[inline]
    fn valid_to_height(&self) -> usize {
        self.valid_to_height.load(Ordering::SeqCst)
    }

    #[inline]
    fn is_deleted(&self) -> bool {
        self.data.load(Ordering::SeqCst) & DATA_MARK != 0
    }
}

impl PoolNode for QueueNode {
    fn ref_count(&self) -> &AtomicUsize {
        &self.ref_count
    }

    fn links(&self) -> &[AtomicUsize] {
        &self.next
    }

    fn back_ref(&self) -> Option<&AtomicUsize> {
        Some(&self.prev)
    }
}

type NodeRef<'a> = Retained<'a, QueueNode>;

/// Construction parameters for a [`PriorityQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    pub capacity: usize,
    /// Number of levels; clamped to `1..=MAX_LEVELS`.
    pub max_height: usize,
    /// Backoff used by contended CAS loops.
    pub backoff: BackoffConfig,
}

impl QueueOptions {
    pub fn new(capacity: usize) -> Self {
        QueueOptions {
            capacity,
            ..QueueOptions::default()
        }
    }

    pub fn with_max_height(mut self, max_height: usize) -> Self {
        self.max_height = max_height;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        QueueOptions {
            capacity: DEFAULT_CAPACITY,
            max_height: DEFAULT_MAX_HEIGHT,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Fixed-capacity lock-free priority queue on a skip list.
///
/// Any number of threads may insert and extract concurrently. Inserting an
/// existing key replaces its payload. [`peek`](PriorityQueue::peek) is only
/// meaningful with a single consumer.
pub struct PriorityQueue<P: Payload> {
    pool: NodePool<QueueNode>,
    head: Slot,
    tail: Slot,
    capacity: usize,
    max_height: usize,
    backoff: BackoffConfig,
    len: CachePadded<AtomicIsize>,
    _payload: PhantomData<P>,
}

impl<P: Payload> PriorityQueue<P> {
    pub fn new(capacity: usize) -> ContainerResult<Self> {
        Self::with_options(QueueOptions::new(capacity))
    }

    pub fn with_options(options: QueueOptions) -> ContainerResult<Self> {
        let max_height = options.max_height.clamp(1, MAX_LEVELS);
        if max_height != options.max_height {
            warn_log!(
                requested = options.max_height,
                max_height,
                "priority queue height clamped"
            );
        }

        let nodes = options
            .capacity
            .checked_add(2)
            .ok_or(ContainerError::InitializationFailure { nodes: usize::MAX })?;
        let pool = NodePool::<QueueNode>::new(nodes)?;

        let (head, tail) = {
            let head = pool.allocate()?;
            let tail = pool.allocate()?;
            tail.key.store(u64::MAX, Ordering::Relaxed);
            for sentinel in [&head, &tail] {
                sentinel.height.store(max_height, Ordering::Relaxed);
                sentinel.valid_to_height.store(max_height, Ordering::Relaxed);
            }
            for link in &head.next[..max_height] {
                link.store(tail.link().into_raw(), Ordering::Relaxed);
            }
            store_barrier();
            (head.into_slot(), tail.into_slot())
        };

        Ok(PriorityQueue {
            pool,
            head,
            tail,
            capacity: options.capacity,
            max_height,
            backoff: options.backoff,
            len: CachePadded::new(AtomicIsize::new(0)),
            _payload: PhantomData,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_height(&self) -> usize {
        self.max_height
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

    /// True if `node` sorts strictly before `key`.
    #[inline]
    fn precedes(&self, node: &NodeRef<'_>, key: u64) -> bool {
        !node.is(self.tail) && node.key() < key
    }

    #[inline]
    fn has_key(&self, node: &NodeRef<'_>, key: u64) -> bool {
        !node.is(self.tail) && node.key() == key
    }

    /// Generate a height for a new node.
    ///
    /// One random word, counting trailing ones: each one bit is a coin flip
    /// that came up heads, so level N is reached with probability (1/2)^(N-1).
    #[inline]
    fn random_height(&self) -> usize {
        let random_bits = fastrand::u32(..);
        let extra_levels = random_bits.trailing_ones() as usize;
        (1 + extra_levels).min(self.max_height)
    }

    // =========================================================================
    // Traversal and helping
    // =========================================================================

    /// Successor of `node` at `level`, finishing any deletion in the way.
    ///
    /// If `node` itself is being deleted it is replaced by a live predecessor.
    fn read_next<'a>(&'a self, node: &mut NodeRef<'a>, level: usize) -> NodeRef<'a> {
        if node.is_deleted() {
            *node = self.help_delete(node.clone(), level);
        }
        loop {
            if let Some(next) = self.pool.safe_read(&node.next[level]) {
                return next;
            }
            *node = self.help_delete(node.clone(), level);
        }
    }

    /// Advance `prev` along `level` while its successor sorts before `key`;
    /// returns that successor.
    fn scan_for_key<'a>(&'a self, prev: &mut NodeRef<'a>, level: usize, key: u64) -> NodeRef<'a> {
        let mut next = self.read_next(prev, level);
        while self.precedes(&next, key) {
            *prev = next;
            next = self.read_next(prev, level);
        }
        next
    }

    /// First level-0 node with a key >= `key`, or TAIL.
    fn find_from_head(&self, key: u64) -> NodeRef<'_> {
        let mut prev = self.retain_head();
        for level in (1..self.max_height).rev() {
            drop(self.scan_for_key(&mut prev, level, key));
        }
        self.scan_for_key(&mut prev, 0, key)
    }

    /// Finish deleting `node` at `level` and return a predecessor to resume from.
    fn help_delete<'a>(&'a self, node: NodeRef<'a>, level: usize) -> NodeRef<'a> {
        let height = node.height();
        debug_assert!(level < height);

        for link in &node.next[level..height] {
            mark_link(link);
        }

        let hint = MarkedLink::load(&node.prev).slot();
        let mut prev = match hint {
            // SAFETY: `node` holds a reference to its hint for as long as we
            // hold `node`.
            Some(slot) if level < self.pool.node(slot).valid_to_height() => unsafe {
                self.pool.retain_slot(slot)
            },
            _ => {
                let mut prev = self.retain_head();
                for search_level in (level..self.max_height).rev() {
                    drop(self.scan_for_key(&mut prev, search_level, node.key()));
                }
                prev
            }
        };

        self.unlink_at_level(&node, &mut prev, level);
        prev
    }

    /// Whether `node` is no longer reachable at `level`.
    ///
    /// Leaves `prev` at the node's predecessor when it is still linked.
    fn is_unlinked_at_level<'a>(
        &'a self,
        node: &NodeRef<'a>,
        prev: &mut NodeRef<'a>,
        level: usize,
    ) -> bool {
        let key = node.key();
        let mut next = self.scan_for_key(prev, level, key);

        if !next.is(node.slot()) && self.has_key(&next, key) {
            // A newer entry with the same key sits in front; look behind it.
            let mut cursor = prev.clone();
            next = self.read_next(&mut cursor, level);
            while self.has_key(&next, key) && !next.is(node.slot()) {
                cursor = next;
                next = self.read_next(&mut cursor, level);
            }
            if next.is(node.slot()) {
                *prev = cursor;
            }
        }

        !next.is(node.slot())
    }

    /// Physically remove the marked `node` at `level`.
    fn unlink_at_level<'a>(&'a self, node: &NodeRef<'a>, prev: &mut NodeRef<'a>, level: usize) {
        debug_assert!(level < node.height());
        let link = &node.next[level];
        let mut backoff = Backoff::new(&self.backoff);

        loop {
            if MarkedLink::load(link) == MarkedLink::CLEARED {
                return;
            }
            if self.is_unlinked_at_level(node, prev, level)
                || MarkedLink::load(link) == MarkedLink::CLEARED
            {
                return;
            }

            let next = MarkedLink::load(link).with_mark(false);
            if cas_link(&prev.next[level], node.link(), next) {
                store_barrier();
                link.store(MarkedLink::CLEARED.into_raw(), Ordering::SeqCst);
                return;
            }

            if MarkedLink::load(link) == MarkedLink::CLEARED {
                return;
            }
            trace_log!(level, "unlink raced with another update, backing off");
            backoff.wait();
        }
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Insert `payload` with priority `key`.
    ///
    /// If a live entry already has `key`, its payload is swapped for the new
    /// one and the previous payload comes back as [`Insertion::Replaced`].
    pub fn insert(&self, key: u64, payload: P) -> ContainerResult<Insertion<P>> {
        let word = checked_word(payload)?;
        let height = self.random_height();

        let node = self.pool.allocate().map_err(|_| ContainerError::OutOfCapacity {
            capacity: self.capacity,
        })?;
        node.key.store(key, Ordering::Relaxed);
        node.data.store(word, Ordering::Relaxed);
        node.height.store(height, Ordering::Relaxed);
        node.valid_to_height.store(0, Ordering::Relaxed);
        store_barrier();

        // `node` becomes the level-0 link's reference once linked; `working` is
        // this thread's own.
        let working = node.clone();

        // Top-down search, remembering where to link each upper level.
        let mut saved: [Option<NodeRef<'_>>; MAX_LEVELS] = Default::default();
        let mut insertion_point = self.retain_head();
        for level in (1..self.max_height).rev() {
            drop(self.scan_for_key(&mut insertion_point, level, key));
            if level < height {
                saved[level] = Some(insertion_point.clone());
            }
        }

        let mut backoff = Backoff::new(&self.backoff);
        loop {
            let next = self.scan_for_key(&mut insertion_point, 0, key);

            if self.has_key(&next, key) {
                let old = next.data.load(Ordering::SeqCst);
                if old & DATA_MARK == 0 {
                    if next
                        .data
                        .compare_exchange(old, word, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        // SAFETY: only words produced by `P::to_word` are stored as data.
                        return Ok(Insertion::Replaced(unsafe { P::from_word(old) }));
                    }
                    continue;
                }
            }

            node.next[0].store(next.link().into_raw(), Ordering::Relaxed);
            store_barrier();
            if cas_link(&insertion_point.next[0], next.link(), node.link()) {
                node.into_slot();
                break;
            }
            backoff.wait();
        }
        drop(insertion_point);
        self.len.fetch_add(1, Ordering::Relaxed);

        for level in 1..height {
            working.valid_to_height.store(level, Ordering::SeqCst);
            let Some(mut insertion_point) = saved[level].take() else {
                break;
            };

            let mut backoff = Backoff::new(&self.backoff);
            loop {
                let next = self.scan_for_key(&mut insertion_point, level, key);
                working.next[level].store(next.link().into_raw(), Ordering::SeqCst);
                store_barrier();

                if working.is_deleted() {
                    working.next[level].store(MarkedLink::CLEARED.into_raw(), Ordering::SeqCst);
                    break;
                }
                if cas_link(&insertion_point.next[level], next.link(), working.link()) {
                    // Marked after linking: the deleter may already consider this
                    // level done, so take it out again here.
                    if working.is_deleted()
                        && MarkedLink::load(&working.next[level]) != MarkedLink::CLEARED
                    {
                        self.unlink_at_level(&working, &mut insertion_point, level);
                    }
                    break;
                }
                backoff.wait();
            }
        }

        working.valid_to_height.store(height, Ordering::SeqCst);
        if working.is_deleted() {
            drop(self.help_delete(working, 0));
        }

        Ok(Insertion::Inserted)
    }

    /// Remove and return the entry with the smallest key.
    pub fn extract_minimum(&self) -> Option<(u64, P)> {
        let mut prev = self.retain_head();

        let (first, word) = 'search: loop {
            let first = self.read_next(&mut prev, 0);
            if first.is(self.tail) {
                return None;
            }

            loop {
                // Still the first node?
                if MarkedLink::load(&prev.next[0]).slot() != Some(first.slot()) {
                    continue 'search;
                }

                let data = first.data.load(Ordering::SeqCst);
                if data & DATA_MARK != 0 {
                    prev = self.help_delete(first, 0);
                    continue 'search;
                }

                if first
                    .data
                    .compare_exchange(data, data | DATA_MARK, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    store_barrier();
                    // The hint keeps the reference we held on `prev`.
                    let hint = MarkedLink::to_slot(prev.into_slot());
                    first.prev.store(hint.into_raw(), Ordering::SeqCst);
                    break 'search (first, data);
                }
            }
        };
        self.len.fetch_sub(1, Ordering::Relaxed);

        let height = first.height();
        for link in &first.next[..height] {
            mark_link(link);
        }

        let mut prev = self.retain_head();
        for level in (0..height).rev() {
            self.unlink_at_level(&first, &mut prev, level);
        }
        drop(prev);

        let key = first.key();
        // SAFETY: the level-0 link's reference now belongs to this thread.
        let link_ref = unsafe { self.pool.adopt_slot(first.slot()) };
        drop(first);
        drop(link_ref);

        // SAFETY: only words produced by `P::to_word` are stored as data.
        Some((key, unsafe { P::from_word(word) }))
    }

    /// The entry with the smallest key, without removing it.
    ///
    /// This is a single read of HEAD's successor and takes no reference. It is
    /// only meaningful when this thread is the sole consumer: with concurrent
    /// [`extract_minimum`](PriorityQueue::extract_minimum) callers the entry
    /// may already be gone, or its slot reused, by the time it is returned.
    pub fn peek(&self) -> Option<(u64, P)> {
        let head = self.pool.node(self.head);
        let first = MarkedLink::load(&head.next[0]).slot()?;
        if first == self.tail {
            return None;
        }
        load_barrier();

        let node = self.pool.node(first);
        let key = node.key.load(Ordering::SeqCst);
        let word = node.data.load(Ordering::SeqCst) & !DATA_MARK;
        // SAFETY: a linked slot always holds a word produced by `P::to_word`.
        Some((key, unsafe { P::from_word(word) }))
    }

    /// Live entries in key order.
    ///
    /// Entries being deleted are skipped. Under concurrent modification the
    /// result is a best-effort view rather than an atomic snapshot.
    pub fn entries(&self) -> Vec<(u64, P)> {
        let mut entries = Vec::new();
        let mut curr = self.retain_head();
        loop {
            let next = match self.pool.safe_read(&curr.next[0]) {
                Some(next) => next,
                // `curr` is being removed; resume behind its key.
                None => match curr.key().checked_add(1) {
                    Some(after) => self.find_from_head(after),
                    None => break,
                },
            };
            if next.is(self.tail) {
                break;
            }
            let data = next.data.load(Ordering::SeqCst);
            if data & DATA_MARK == 0 {
                // SAFETY: only words produced by `P::to_word` are stored as data.
                entries.push((next.key(), unsafe { P::from_word(data) }));
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

impl<P: Payload> OrderedContainer<P> for PriorityQueue<P> {
    type Key = u64;

    fn with_capacity(capacity: usize) -> ContainerResult<Self> {
        PriorityQueue::new(capacity)
    }

    fn insert(&self, key: u64, payload: P) -> ContainerResult<Insertion<P>> {
        PriorityQueue::insert(self, key, payload)
    }

    fn extract_minimum(&self) -> Option<(u64, P)> {
        PriorityQueue::extract_minimum(self)
    }

    fn len(&self) -> usize {
        PriorityQueue::len(self)
    }

    fn capacity(&self) -> usize {
        PriorityQueue::capacity(self)
    }

    fn available(&self) -> usize {
        PriorityQueue::available(self)
    }
}

impl<P: Payload> Default for PriorityQueue<P> {
    /// # Panics
    ///
    /// Panics if the default-sized pool cannot be allocated.
    fn default() -> Self {
        match PriorityQueue::with_options(QueueOptions::default()) {
            Ok(queue) => queue,
            Err(error) => panic!("failed to create priority queue: {error}"),
        }
    }
}

impl<P: Payload> fmt::Debug for PriorityQueue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("capacity", &self.capacity)
            .field("max_height", &self.max_height)
            .field("len", &self.len())
            .finish()
    }
}

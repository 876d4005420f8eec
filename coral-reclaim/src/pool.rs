// Fixed node pool with retain-count reclamation.
//
// Every node carries a reference counter that stores the number of outstanding
// references times two, plus a low "claimed" bit:
//
//   ref_count = 2 * refs | claimed
//
//   even  -> live, at least one thread or link holds the node
//   odd   -> claimed, the node sits on (or is moving onto) the free list
//
// The last release does not drop the counter to zero. It flips 2 -> 1 in one
// CAS, which is the claim: only the thread that performs it may push the node
// onto the free list. A racing retain on a claimed node only adds 2, keeping
// the count odd, so a stale reader can never revive a node mid-reclaim.
//
//   free_head -> [s3] -> [s7] -> [s1] -> nil      (link 0 threads the list)
//
// Readers never dereference a link they have not validated. `safe_read` loads
// the link, retains the target, and re-reads the link; if it moved, the target
// may have been recycled and the retain is undone.
//
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::error::{PoolError, PoolResult};
use crate::marked_link::{cas_link, MarkedLink, Slot};
use crate::primitives::{full_barrier, spin_hint, store_barrier};
use crate::{debug_log, trace_log, warn_log};

const REF_ONE: usize = 2;
const CLAIMED: usize = 1;

/// Node stored in a [`NodePool`].
///
/// Implementations expose their protocol fields as atomics. `links()[0]` doubles
/// as the free-list link while the node is claimed.
pub trait PoolNode: Default + Send + Sync {
    /// The `2 * refs | claimed` counter.
    fn ref_count(&self) -> &AtomicUsize;

    /// Forward links, at least one.
    fn links(&self) -> &[AtomicUsize];

    /// Counted back-reference to another node of the same pool, released when
    /// this node is claimed.
    fn back_ref(&self) -> Option<&AtomicUsize> {
        None
    }
}

/// A fixed set of nodes carved from one allocation, recycled through a
/// lock-free free list.
pub struct NodePool<N: PoolNode> {
    nodes: Box<[N]>,
    free_head: CachePadded<AtomicUsize>,
}

impl<N: PoolNode> NodePool<N> {
    /// Reserve `capacity` nodes and thread all of them onto the free list.
    pub fn new(capacity: usize) -> PoolResult<Self> {
        let mut nodes: Vec<N> = Vec::new();
        nodes
            .try_reserve_exact(capacity)
            .map_err(|_| PoolError::InitializationFailure { nodes: capacity })?;
        nodes.resize_with(capacity, N::default);

        for (slot, node) in nodes.iter().enumerate() {
            node.ref_count().store(CLAIMED, Ordering::Relaxed);
            let next = if slot + 1 < capacity {
                MarkedLink::to_slot(slot + 1)
            } else {
                MarkedLink::NIL
            };
            node.links()[0].store(next.into_raw(), Ordering::Relaxed);
        }

        let head = if capacity > 0 {
            MarkedLink::to_slot(0)
        } else {
            MarkedLink::NIL
        };
        store_barrier();

        debug_log!(capacity, "node pool initialized");

        Ok(NodePool {
            nodes: nodes.into_boxed_slice(),
            free_head: CachePadded::new(AtomicUsize::new(head.into_raw())),
        })
    }

    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Direct access to a node without taking a reference.
    ///
    /// The slot may be recycled at any time unless the caller holds a
    /// reference to it through some other path.
    #[inline]
    pub fn node(&self, slot: Slot) -> &N {
        &self.nodes[slot]
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Pop a node from the free list.
    ///
    /// The returned handle is the only reference to the node and its links are
    /// nil except for whatever the previous user left above level 0, which is
    /// cleared on reclaim.
    pub fn allocate(&self) -> PoolResult<Retained<'_, N>> {
        loop {
            let Some(head) = self.safe_read(&self.free_head) else {
                warn_log!(capacity = self.capacity(), "node pool exhausted");
                return Err(PoolError::OutOfCapacity {
                    capacity: self.capacity(),
                });
            };

            let next = MarkedLink::load(&head.links()[0]);
            if cas_link(&self.free_head, head.link(), next) {
                let previous = head.ref_count().fetch_sub(CLAIMED, Ordering::SeqCst);
                debug_assert_eq!(previous & CLAIMED, CLAIMED, "allocated node was not claimed");
                head.links()[0].store(MarkedLink::NIL.into_raw(), Ordering::SeqCst);
                return Ok(head);
            }
            // Lost the race; dropping `head` undoes the retain.
        }
    }

    fn push_free(&self, slot: Slot) {
        let node = self.node(slot);
        loop {
            let head = self.free_head.load(Ordering::SeqCst);
            node.links()[0].store(head, Ordering::Relaxed);
            store_barrier();
            if self
                .free_head
                .compare_exchange(
                    head,
                    MarkedLink::to_slot(slot).into_raw(),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                return;
            }
            spin_hint();
        }
    }

    // =========================================================================
    // Reference counting
    // =========================================================================

    /// Take one more reference on `slot`.
    ///
    /// # Safety
    ///
    /// The caller must already hold a reference to `slot`, directly or through
    /// a node that holds one (a back-reference, a sentinel owned by the
    /// container). Retaining an unvalidated slot could revive a node that is
    /// being recycled.
    #[inline]
    pub unsafe fn retain_slot(&self, slot: Slot) -> Retained<'_, N> {
        self.retain_raw(slot);
        Retained { pool: self, slot }
    }

    /// Adopt a reference that was previously handed out by
    /// [`Retained::into_slot`].
    ///
    /// # Safety
    ///
    /// `slot` must carry exactly one reference owned by the caller, which is
    /// transferred into the returned handle.
    #[inline]
    pub unsafe fn adopt_slot(&self, slot: Slot) -> Retained<'_, N> {
        Retained { pool: self, slot }
    }

    #[inline]
    fn retain_raw(&self, slot: Slot) {
        self.node(slot).ref_count().fetch_add(REF_ONE, Ordering::SeqCst);
    }

    /// Drop one reference; the last one claims the node and recycles it.
    ///
    /// A claimed node's back-reference is released in turn. The chain is
    /// walked iteratively so long chains cannot exhaust the stack.
    fn release(&self, slot: Slot) {
        let mut next = Some(slot);
        while let Some(slot) = next.take() {
            let node = self.node(slot);
            if !Self::decrement_and_claim(node.ref_count()) {
                return;
            }

            let back = node
                .back_ref()
                .map(|cell| MarkedLink::from_raw(cell.swap(MarkedLink::NIL.into_raw(), Ordering::SeqCst)));
            for link in node.links().iter().skip(1) {
                link.store(MarkedLink::NIL.into_raw(), Ordering::Relaxed);
            }
            self.push_free(slot);
            trace_log!(slot, "node reclaimed");

            next = back.and_then(|link| link.slot());
        }
    }

    /// Subtract one reference, or claim the node if it was the last one.
    ///
    /// Returns `true` when this call performed the claim.
    fn decrement_and_claim(count: &AtomicUsize) -> bool {
        let mut current = count.load(Ordering::SeqCst);
        loop {
            debug_assert!(current >= REF_ONE, "release without a matching retain");
            let new = if current == REF_ONE {
                CLAIMED
            } else {
                current.wrapping_sub(REF_ONE)
            };
            match count.compare_exchange_weak(current, new, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return current == REF_ONE,
                Err(actual) => current = actual,
            }
        }
    }

    /// Retain the node a link points to, provided the link is unmarked and still
    /// points to it after the retain.
    ///
    /// Returns `None` for marked or nil links.
    pub fn safe_read(&self, cell: &AtomicUsize) -> Option<Retained<'_, N>> {
        loop {
            let link = MarkedLink::load(cell);
            if link.is_marked() {
                return None;
            }
            let slot = link.slot()?;

            self.retain_raw(slot);
            full_barrier();
            if MarkedLink::load(cell) == link {
                return Some(Retained { pool: self, slot });
            }
            self.release(slot);
        }
    }

    /// Parity check: `true` while the node is live.
    #[inline]
    pub fn is_retained(&self, slot: Slot) -> bool {
        self.node(slot).ref_count().load(Ordering::SeqCst) & CLAIMED == 0
    }

    /// Number of nodes on the free list.
    ///
    /// Only meaningful while no other thread is using the pool.
    pub fn available(&self) -> usize {
        let mut count = 0;
        let mut link = MarkedLink::load(&self.free_head);
        while let Some(slot) = link.slot() {
            if count == self.capacity() {
                break;
            }
            count += 1;
            link = MarkedLink::load(&self.node(slot).links()[0]);
        }
        count
    }
}

impl<N: PoolNode> fmt::Debug for NodePool<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePool")
            .field("capacity", &self.capacity())
            .field("free_head", &MarkedLink::load(&self.free_head))
            .finish()
    }
}

/// One counted reference to a pool node.
///
/// Cloning retains, dropping releases. A reference that must outlive the
/// handle (a link owned by a container, a back-reference) is detached with
/// [`into_slot`](Retained::into_slot).
pub struct Retained<'p, N: PoolNode> {
    pool: &'p NodePool<N>,
    slot: Slot,
}

impl<'p, N: PoolNode> Retained<'p, N> {
    #[inline]
    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Unmarked link to this node.
    #[inline]
    pub fn link(&self) -> MarkedLink {
        MarkedLink::to_slot(self.slot)
    }

    #[inline]
    pub fn is(&self, slot: Slot) -> bool {
        self.slot == slot
    }

    /// Give up the handle without releasing its reference.
    #[inline]
    pub fn into_slot(self) -> Slot {
        let slot = self.slot;
        std::mem::forget(self);
        slot
    }
}

impl<N: PoolNode> Deref for Retained<'_, N> {
    type Target = N;

    #[inline]
    fn deref(&self) -> &N {
        self.pool.node(self.slot)
    }
}

impl<N: PoolNode> Clone for Retained<'_, N> {
    fn clone(&self) -> Self {
        self.pool.retain_raw(self.slot);
        Retained {
            pool: self.pool,
            slot: self.slot,
        }
    }
}

impl<N: PoolNode> Drop for Retained<'_, N> {
    fn drop(&mut self) {
        self.pool.release(self.slot);
    }
}

impl<N: PoolNode> fmt::Debug for Retained<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Retained").field(&self.slot).finish()
    }
}

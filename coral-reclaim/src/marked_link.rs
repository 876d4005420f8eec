// Markable links: a slot index and a delete flag packed into one word.
//
// Bit layout:
//   Bit 0:     DELETE_MARK - the owning node is logically deleted at this level
//   Bits 1..:  slot index + 1 (zero means "no node")
//
// Link words:
//   0b00 (0): nil, unmarked     (end of the free list, fresh node link)
//   0b01 (1): nil, marked       (link cleared after a physical unlink)
//   (s+1)<<1: slot s, unmarked
//   ((s+1)<<1)|1: slot s, marked
//
// Every transition of a link goes through a single CAS on the whole word, so the
// index and the flag can never be observed out of step.
//
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

const DELETE_MARK: usize = 0b1;
const INDEX_SHIFT: u32 = 1;

/// Index of a node inside a [`NodePool`](crate::NodePool).
pub type Slot = usize;

/// A slot reference with a delete flag, stored in a single atomic word.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct MarkedLink {
    word: usize,
}

impl MarkedLink {
    /// Unmarked nil link.
    pub const NIL: MarkedLink = MarkedLink { word: 0 };

    /// Marked nil link, left behind in a link once its node has been unlinked.
    pub const CLEARED: MarkedLink = MarkedLink { word: DELETE_MARK };

    // =========================================================================
    // Construction
    // =========================================================================

    /// Unmarked link to `slot`.
    #[inline]
    pub fn to_slot(slot: Slot) -> Self {
        debug_assert!(slot < (usize::MAX >> INDEX_SHIFT));
        MarkedLink {
            word: (slot + 1) << INDEX_SHIFT,
        }
    }

    /// Reinterpret a raw word loaded from an atomic link.
    #[inline]
    pub fn from_raw(word: usize) -> Self {
        MarkedLink { word }
    }

    /// Load a link with sequentially consistent ordering.
    #[inline]
    pub fn load(cell: &AtomicUsize) -> Self {
        MarkedLink::from_raw(cell.load(Ordering::SeqCst))
    }

    // =========================================================================
    // Extraction
    // =========================================================================

    /// Referenced slot, ignoring the mark. `None` for nil links.
    #[inline]
    pub fn slot(&self) -> Option<Slot> {
        match self.word >> INDEX_SHIFT {
            0 => None,
            index => Some(index - 1),
        }
    }

    /// Raw word with the mark intact (for CAS operations).
    #[inline]
    pub fn into_raw(self) -> usize {
        self.word
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// Check if DELETE-marked (bit 0).
    #[inline]
    pub fn is_marked(&self) -> bool {
        (self.word & DELETE_MARK) != 0
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        self.slot().is_none()
    }

    /// True if the link is unmarked and references `slot`.
    #[inline]
    pub fn points_to(&self, slot: Slot) -> bool {
        *self == MarkedLink::to_slot(slot)
    }

    // =========================================================================
    // Transformers
    // =========================================================================

    /// Same target with the delete flag set or cleared.
    #[inline]
    pub fn with_mark(&self, mark: bool) -> Self {
        let word = if mark {
            self.word | DELETE_MARK
        } else {
            self.word & !DELETE_MARK
        };
        MarkedLink { word }
    }
}

impl fmt::Debug for MarkedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot() {
            Some(slot) => write!(f, "Link({slot}{})", if self.is_marked() { ", marked" } else { "" }),
            None if self.is_marked() => f.write_str("Link(cleared)"),
            None => f.write_str("Link(nil)"),
        }
    }
}

/// Compare-and-swap a link word, returning whether the swap happened.
#[inline]
pub fn cas_link(cell: &AtomicUsize, current: MarkedLink, new: MarkedLink) -> bool {
    cell.compare_exchange(current.word, new.word, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// Set the delete flag on a link unless it is already set.
///
/// Returns `true` if this call set the flag.
pub fn mark_link(cell: &AtomicUsize) -> bool {
    loop {
        let current = MarkedLink::load(cell);
        if current.is_marked() {
            return false;
        }
        if cas_link(cell, current, current.with_mark(true)) {
            return true;
        }
    }
}

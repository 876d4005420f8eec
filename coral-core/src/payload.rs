//! Values stored alongside keys.
//!
//! Containers keep payloads as single machine words. The low bit of that word
//! is reserved for deletion marks, so every payload must convert to a word that
//! is a multiple of the pointer alignment. Misaligned words are rejected before
//! anything is mutated.

use std::mem::align_of;
use std::ptr::NonNull;

use crate::error::{ContainerError, ContainerResult};

/// A pointer-aligned value that round-trips through a `usize`.
///
/// # Safety
///
/// `from_word(to_word(p))` must reproduce `p`, and any word produced by
/// `to_word` must remain a valid `Self` for as long as the value could be
/// used, since containers hand words back after arbitrary delays.
pub unsafe trait Payload: Copy {
    fn to_word(self) -> usize;

    /// # Safety
    ///
    /// `word` must have been produced by [`Payload::to_word`] on this type.
    unsafe fn from_word(word: usize) -> Self;
}

unsafe impl<'a, T> Payload for &'a T {
    #[inline]
    fn to_word(self) -> usize {
        self as *const T as usize
    }

    #[inline]
    unsafe fn from_word(word: usize) -> Self {
        &*(word as *const T)
    }
}

/// Raw pointers are passed through untouched; the caller owns their validity.
unsafe impl<T> Payload for NonNull<T> {
    #[inline]
    fn to_word(self) -> usize {
        self.as_ptr() as usize
    }

    #[inline]
    unsafe fn from_word(word: usize) -> Self {
        NonNull::new_unchecked(word as *mut T)
    }
}

/// Opaque handle words, for payloads that are not pointers at all.
unsafe impl Payload for usize {
    #[inline]
    fn to_word(self) -> usize {
        self
    }

    #[inline]
    unsafe fn from_word(word: usize) -> Self {
        word
    }
}

/// Convert a payload to its word, rejecting misaligned values.
pub(crate) fn checked_word<P: Payload>(payload: P) -> ContainerResult<usize> {
    let word = payload.to_word();
    if word % align_of::<usize>() != 0 {
        return Err(ContainerError::AlignmentViolation { word });
    }
    Ok(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_round_trip() {
        let value = 17u64;
        let word = checked_word(&value).unwrap();
        let back: &u64 = unsafe { <&u64 as Payload>::from_word(word) };
        assert!(std::ptr::eq(back, &value));
    }

    #[test]
    fn test_misaligned_pointer_rejected() {
        let bytes = [0u64; 2];
        let base = NonNull::from(&bytes).cast::<u8>();
        let odd = unsafe { NonNull::new_unchecked(base.as_ptr().add(1)) };
        assert_eq!(
            checked_word(odd),
            Err(ContainerError::AlignmentViolation {
                word: odd.as_ptr() as usize
            })
        );
    }

    #[test]
    fn test_handle_words() {
        assert_eq!(checked_word(64usize), Ok(64));
        assert_eq!(checked_word(0usize), Ok(0));
        assert!(matches!(
            checked_word(13usize),
            Err(ContainerError::AlignmentViolation { word: 13 })
        ));
    }
}

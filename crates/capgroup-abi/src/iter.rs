//! Pull-based iterator protocol.
//!
//! The consumer calls `func` until it reports done. The output slot is written only when an
//! element is returned; on the terminating pull its content is unspecified and ignored.
//! Iterators are single pass and cannot be restarted.

use core::ffi::c_void;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr;

/// Returned by `func` when an element was written.
pub const ITER_ITEM: i32 = 0;
/// Returned by `func` once the source is exhausted.
pub const ITER_DONE: i32 = 1;

pub type NextFn<T> = unsafe extern "C" fn(iter: *mut c_void, out: *mut MaybeUninit<T>) -> i32;

/// FFI-safe iterator borrowing an arbitrary Rust iterator.
///
/// `CIterator` is itself an [`Iterator`]. Once `func` has reported done it is never called
/// again, so sources that misbehave after exhaustion are never pulled twice.
#[repr(C)]
pub struct CIterator<'a, T> {
    iter: *mut c_void,
    func: NextFn<T>,
    _lifetime: PhantomData<&'a mut c_void>,
}

unsafe extern "C" fn next_from<I: Iterator<Item = T>, T>(
    iter: *mut c_void,
    out: *mut MaybeUninit<T>,
) -> i32 {
    // SAFETY: `iter` was produced from `&mut I` in `From<&mut I>`.
    let iter = unsafe { &mut *iter.cast::<I>() };
    match iter.next() {
        Some(item) => {
            // SAFETY: the consumer passes a valid, writable slot.
            unsafe { (*out).write(item) };
            ITER_ITEM
        }
        None => ITER_DONE,
    }
}

impl<'a, I: Iterator<Item = T>, T> From<&'a mut I> for CIterator<'a, T> {
    fn from(iter: &'a mut I) -> Self {
        Self {
            iter: (iter as *mut I).cast(),
            func: next_from::<I, T>,
            _lifetime: PhantomData,
        }
    }
}

impl<'a, T> CIterator<'a, T> {
    /// Assemble an iterator from a foreign state pointer and pull function.
    ///
    /// # Safety
    ///
    /// `func` must accept `iter` for the whole of `'a` and follow the `ITER_ITEM`/`ITER_DONE`
    /// contract.
    pub unsafe fn from_raw(iter: *mut c_void, func: NextFn<T>) -> Self {
        Self {
            iter,
            func,
            _lifetime: PhantomData,
        }
    }

    /// Whether a pull has already reported done.
    pub fn is_done(&self) -> bool {
        self.iter.is_null()
    }
}

impl<T> Iterator for CIterator<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.iter.is_null() {
            return None;
        }

        let mut out = MaybeUninit::uninit();
        // SAFETY: `iter` is live for `'a` and `func` matches it.
        match unsafe { (self.func)(self.iter, &mut out) } {
            ITER_ITEM => {
                // SAFETY: `ITER_ITEM` means the slot was written.
                Some(unsafe { out.assume_init() })
            }
            _ => {
                self.iter = ptr::null_mut();
                None
            }
        }
    }
}

impl<T> core::iter::FusedIterator for CIterator<'_, T> {}

/// Borrow any iterator as a [`CIterator`].
pub trait AsCIterator: Iterator + Sized {
    fn as_citer(&mut self) -> CIterator<'_, Self::Item> {
        CIterator::from(self)
    }
}

impl<I: Iterator> AsCIterator for I {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_squares_in_order() {
        let mut squares = (0..32).map(|i: i32| i * i);
        let collected: Vec<i32> = squares.as_citer().collect();

        assert_eq!(collected.len(), 32);
        assert_eq!(collected[0], 0);
        assert_eq!(collected[31], 961);
        assert!(collected.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_no_pull_after_done() {
        let pulls = Cell::new(0);
        let mut left = 3;
        let mut source = std::iter::from_fn(|| {
            pulls.set(pulls.get() + 1);
            if left == 0 {
                return None;
            }
            left -= 1;
            Some(left)
        });
        let mut citer = CIterator::from(&mut source);

        assert_eq!(citer.by_ref().count(), 3);
        assert!(citer.is_done());
        assert_eq!(citer.next(), None);
        assert_eq!(citer.next(), None);
        // Three elements plus the single pull that reported done.
        assert_eq!(pulls.get(), 4);
    }

    #[test]
    fn test_lazy_infinite_source() {
        let mut naturals = 0u64..;
        let first: Vec<u64> = naturals.as_citer().take(4).collect();

        assert_eq!(first, vec![0, 1, 2, 3]);
        assert_eq!(naturals.next(), Some(4));
    }

    #[test]
    fn test_foreign_pull_function() {
        unsafe extern "C" fn countdown(state: *mut c_void, out: *mut MaybeUninit<u8>) -> i32 {
            let left = unsafe { &mut *state.cast::<u8>() };
            if *left == 0 {
                return ITER_DONE;
            }
            *left -= 1;
            unsafe { (*out).write(*left) };
            ITER_ITEM
        }

        let mut state = 3u8;
        let citer = unsafe { CIterator::from_raw((&mut state as *mut u8).cast(), countdown) };

        assert_eq!(citer.collect::<Vec<_>>(), vec![2, 1, 0]);
    }
}

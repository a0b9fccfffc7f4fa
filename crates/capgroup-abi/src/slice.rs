//! Pointer + length views.
//!
//! A slice view is borrowed for the duration of one call. The producer guarantees the buffer
//! outlives the call; nothing is freed through a view.

use core::borrow::Borrow;
use core::fmt;
use core::marker::PhantomData;
use std::borrow::Cow;

/// Read-only `&'a [T]` with a C layout.
#[repr(C)]
pub struct CSliceRef<'a, T> {
    data: *const T,
    len: usize,
    _lifetime: PhantomData<&'a [T]>,
}

unsafe impl<T: Sync> Send for CSliceRef<'_, T> {}
unsafe impl<T: Sync> Sync for CSliceRef<'_, T> {}

impl<T> Clone for CSliceRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CSliceRef<'_, T> {}

impl<'a, T> CSliceRef<'a, T> {
    pub const fn from_slice(slice: &'a [T]) -> Self {
        Self {
            data: slice.as_ptr(),
            len: slice.len(),
            _lifetime: PhantomData,
        }
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn as_slice(&self) -> &'a [T] {
        if self.data.is_null() || self.len == 0 {
            &[]
        } else {
            // SAFETY: built from a live `&'a [T]`, or by a foreign producer bound to the same
            // contract.
            unsafe { core::slice::from_raw_parts(self.data, self.len) }
        }
    }
}

impl<'a> CSliceRef<'a, u8> {
    pub const fn from_str(s: &'a str) -> Self {
        Self::from_slice(s.as_bytes())
    }

    pub fn to_str(&self) -> Result<&'a str, core::str::Utf8Error> {
        core::str::from_utf8(self.as_slice())
    }

    /// Decode as UTF-8, replacing invalid sequences.
    pub fn to_string_lossy(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.as_slice())
    }
}

impl<'a, T> From<&'a [T]> for CSliceRef<'a, T> {
    fn from(slice: &'a [T]) -> Self {
        Self::from_slice(slice)
    }
}

impl<'a> From<&'a str> for CSliceRef<'a, u8> {
    fn from(s: &'a str) -> Self {
        Self::from_str(s)
    }
}

impl<T> Default for CSliceRef<'_, T> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}

impl<T> core::ops::Deref for CSliceRef<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> Borrow<[T]> for CSliceRef<'_, T> {
    fn borrow(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: PartialEq> PartialEq for CSliceRef<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq> Eq for CSliceRef<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for CSliceRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_slice().fmt(f)
    }
}

/// Mutable `&'a mut [T]` with a C layout.
#[repr(C)]
pub struct CSliceMut<'a, T> {
    data: *mut T,
    len: usize,
    _lifetime: PhantomData<&'a mut [T]>,
}

unsafe impl<T: Send> Send for CSliceMut<'_, T> {}
unsafe impl<T: Sync> Sync for CSliceMut<'_, T> {}

impl<'a, T> CSliceMut<'a, T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[T] {
        if self.data.is_null() || self.len == 0 {
            &[]
        } else {
            // SAFETY: built from a live `&'a mut [T]`.
            unsafe { core::slice::from_raw_parts(self.data, self.len) }
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        if self.data.is_null() || self.len == 0 {
            &mut []
        } else {
            // SAFETY: see `as_slice`; `&mut self` gives exclusive access.
            unsafe { core::slice::from_raw_parts_mut(self.data, self.len) }
        }
    }

    pub fn into_mut_slice(self) -> &'a mut [T] {
        if self.data.is_null() || self.len == 0 {
            &mut []
        } else {
            // SAFETY: the view is consumed, so the unique borrow moves to the caller.
            unsafe { core::slice::from_raw_parts_mut(self.data, self.len) }
        }
    }
}

impl<'a, T> From<&'a mut [T]> for CSliceMut<'a, T> {
    fn from(slice: &'a mut [T]) -> Self {
        Self {
            data: slice.as_mut_ptr(),
            len: slice.len(),
            _lifetime: PhantomData,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CSliceMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_slice().fmt(f)
    }
}

//! The implicit `self` of every vtable call.

use core::ffi::c_void;
use core::fmt;
use core::mem::MaybeUninit;

use crate::arc::CArc;
use crate::boxed::CBox;

/// Instance handle + library context + per-container scratch storage.
///
/// Fields drop in declaration order, so the instance is released before the context gives up
/// its library reference.
#[repr(C)]
pub struct Container<'a, R = ()> {
    instance: CBox<'a, c_void>,
    context: CArc<c_void>,
    ret_tmp: R,
}

impl<'a, R> Container<'a, R> {
    pub fn new(instance: CBox<'a, c_void>, context: CArc<c_void>, ret_tmp: R) -> Self {
        Self {
            instance,
            context,
            ret_tmp,
        }
    }

    pub fn instance(&self) -> &CBox<'a, c_void> {
        &self.instance
    }

    pub fn context(&self) -> &CArc<c_void> {
        &self.context
    }

    /// Whether releasing the container frees its instance.
    pub fn is_owning(&self) -> bool {
        self.instance.is_owning()
    }

    /// # Safety
    ///
    /// The instance must be a live `T`.
    pub unsafe fn instance_ref<T>(&self) -> &T {
        // SAFETY: guaranteed by the caller.
        unsafe { &*self.instance.as_ptr().cast::<T>() }
    }

    /// # Safety
    ///
    /// The instance must be a live `T`.
    pub unsafe fn instance_mut<T>(&mut self) -> &mut T {
        // SAFETY: guaranteed by the caller.
        unsafe { &mut *self.instance.as_ptr().cast::<T>() }
    }

    /// Scratch slot for methods that return references.
    pub fn ret_tmp_mut(&mut self) -> &mut R {
        &mut self.ret_tmp
    }

    pub fn into_parts(self) -> (CBox<'a, c_void>, CArc<c_void>, R) {
        (self.instance, self.context, self.ret_tmp)
    }
}

impl<R> fmt::Debug for Container<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("instance", &self.instance)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Scratch value returned by reference.
///
/// Each [`set`](RetTmp::set) overwrites the previous value. The slot is never read before it
/// has been populated.
#[repr(C)]
pub struct RetTmp<T> {
    value: MaybeUninit<T>,
    filled: bool,
}

impl<T> Default for RetTmp<T> {
    fn default() -> Self {
        Self {
            value: MaybeUninit::uninit(),
            filled: false,
        }
    }
}

impl<T> RetTmp<T> {
    pub fn set(&mut self, value: T) -> &mut T {
        self.clear();
        self.filled = true;
        self.value.write(value)
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        // SAFETY: `filled` is only true after a write.
        self.filled.then(|| unsafe { self.value.assume_init_mut() })
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn clear(&mut self) {
        if std::mem::take(&mut self.filled) {
            // SAFETY: the slot held a value, and `filled` was reset first.
            unsafe { self.value.assume_init_drop() };
        }
    }
}

impl<T> Drop for RetTmp<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

//! Owning handle with an attached release function.

use core::ffi::c_void;
use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ptr;

/// Release function stored next to the instance pointer.
pub type DropFn<T> = unsafe extern "C" fn(*mut T);

/// FFI-safe owning box.
///
/// The handle carries the function that frees its instance, so whichever side of the
/// boundary ends up holding it releases memory with the allocator that produced it.
/// A handle without a release function is a non-owning alias of somebody else's storage.
///
/// Release happens at most once. After [`release`](CBox::release) or
/// [`forget`](CBox::forget) both fields are nulled and further releases are no-ops.
#[repr(C)]
pub struct CBox<'a, T> {
    instance: *mut T,
    drop_fn: Option<DropFn<T>>,
    _marker: PhantomData<(&'a mut (), T)>,
}

unsafe impl<T: Send> Send for CBox<'_, T> {}
unsafe impl<T: Sync> Sync for CBox<'_, T> {}

unsafe extern "C" fn cbox_drop<T>(instance: *mut T) {
    // SAFETY: only installed by `From<Box<T>>`, which produced `instance` with `Box::into_raw`.
    drop(unsafe { Box::from_raw(instance) });
}

impl<T> From<Box<T>> for CBox<'_, T> {
    fn from(boxed: Box<T>) -> Self {
        Self {
            instance: Box::into_raw(boxed),
            drop_fn: Some(cbox_drop::<T>),
            _marker: PhantomData,
        }
    }
}

impl<'a, T> CBox<'a, T> {
    /// Non-owning alias of `instance`. Dropping it never touches the referent.
    pub fn borrowed(instance: &'a mut T) -> Self {
        Self {
            instance,
            drop_fn: None,
            _marker: PhantomData,
        }
    }

    /// Assemble a handle from raw parts.
    ///
    /// # Safety
    ///
    /// `instance` must stay valid for `'a`. If `drop_fn` is set, calling it once on `instance`
    /// must be the correct way to free it and nobody else may free it.
    pub unsafe fn from_raw(instance: *mut T, drop_fn: Option<DropFn<T>>) -> Self {
        Self {
            instance,
            drop_fn,
            _marker: PhantomData,
        }
    }

    pub fn as_ptr(&self) -> *mut T {
        self.instance
    }

    /// Whether releasing this handle frees the instance.
    pub fn is_owning(&self) -> bool {
        self.drop_fn.is_some() && !self.instance.is_null()
    }

    /// Whether the handle was released or forgotten.
    pub fn is_forgotten(&self) -> bool {
        self.instance.is_null()
    }

    pub fn as_ref(&self) -> Option<&T> {
        // SAFETY: a non-null instance is valid for the handle's lifetime.
        unsafe { self.instance.as_ref() }
    }

    pub fn as_mut(&mut self) -> Option<&mut T> {
        // SAFETY: see `as_ref`; `&mut self` gives exclusive access.
        unsafe { self.instance.as_mut() }
    }

    /// Free the instance if this handle owns it, then forget the handle.
    ///
    /// Calling this on a forgotten handle does nothing.
    pub fn release(&mut self) {
        let instance = core::mem::replace(&mut self.instance, ptr::null_mut());
        if let Some(drop_fn) = self.drop_fn.take() {
            if !instance.is_null() {
                // SAFETY: `drop_fn` was taken out, so it runs at most once for this instance.
                unsafe { drop_fn(instance) };
            }
        }
    }

    /// Null both fields without freeing anything.
    ///
    /// Used right after the payload moved into a new owner.
    pub fn forget(&mut self) {
        self.instance = ptr::null_mut();
        self.drop_fn = None;
    }

    /// Erase the instance type.
    ///
    /// `CBox<c_void>` is always `Send` and `Sync`, so only thread-safe payloads may be erased:
    ///
    /// ```compile_fail
    /// use capgroup_abi::CBox;
    /// let opaque = CBox::from(Box::new(std::rc::Rc::new(1u8))).into_opaque();
    /// ```
    pub fn into_opaque(self) -> CBox<'a, c_void>
    where
        T: Send + Sync,
    {
        let this = ManuallyDrop::new(self);
        CBox {
            instance: this.instance.cast(),
            // SAFETY: `*mut T` and `*mut c_void` have the same ABI.
            drop_fn: this
                .drop_fn
                .map(|f| unsafe { core::mem::transmute::<DropFn<T>, DropFn<c_void>>(f) }),
            _marker: PhantomData,
        }
    }

    /// Move the instance out as a native box.
    ///
    /// # Safety
    ///
    /// The handle must be owning and must have been created from a `Box<T>` by this module
    /// (same allocator). Handles received from another module are not eligible.
    pub unsafe fn into_box(self) -> Box<T> {
        let mut this = ManuallyDrop::new(self);
        debug_assert!(this.is_owning(), "into_box on a non-owning handle");
        let instance = this.instance;
        this.forget();
        // SAFETY: guaranteed by the caller.
        unsafe { Box::from_raw(instance) }
    }
}

impl<'a> CBox<'a, c_void> {
    /// Restore a concrete instance type.
    ///
    /// # Safety
    ///
    /// The handle must have been produced by `into_opaque` on a `CBox<'a, T>`.
    pub unsafe fn cast<T>(self) -> CBox<'a, T> {
        let this = ManuallyDrop::new(self);
        CBox {
            instance: this.instance.cast(),
            // SAFETY: reverses the transmute in `into_opaque`.
            drop_fn: this
                .drop_fn
                .map(|f| unsafe { core::mem::transmute::<DropFn<c_void>, DropFn<T>>(f) }),
            _marker: PhantomData,
        }
    }
}

impl<T> Drop for CBox<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> fmt::Debug for CBox<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CBox")
            .field("instance", &self.instance)
            .field("owning", &self.drop_fn.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_release_runs_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut handle = CBox::from(Box::new(Tracked(drops.clone())));

        handle.release();
        handle.release();
        drop(handle);

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_forget_skips_release() {
        let drops = Arc::new(AtomicUsize::new(0));
        let boxed = Box::new(Tracked(drops.clone()));
        let raw = Box::into_raw(boxed);

        // SAFETY: `raw` came from `Box::into_raw` and is reclaimed below.
        let mut handle = unsafe { CBox::from_raw(raw, Some(cbox_drop::<Tracked>)) };
        handle.forget();
        assert!(handle.is_forgotten());
        drop(handle);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(unsafe { Box::from_raw(raw) });
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_borrowed_never_frees() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut value = Tracked(drops.clone());

        let handle = CBox::borrowed(&mut value);
        assert!(!handle.is_owning());
        drop(handle);

        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(value);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_opaque_roundtrip_keeps_release() {
        let drops = Arc::new(AtomicUsize::new(0));
        let opaque = CBox::from(Box::new(Tracked(drops.clone()))).into_opaque();
        assert!(opaque.is_owning());

        let typed = unsafe { opaque.cast::<Tracked>() };
        let boxed = unsafe { typed.into_box() };
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(boxed);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

//! Reference-counted handle with attached clone and release functions.
//!
//! The only resource shared across the boundary this way is the loaded library itself: every
//! object derived from a plugin keeps one reference, and the library is unmapped when the last
//! reference goes away.

use core::ffi::c_void;
use core::fmt;
use core::mem::ManuallyDrop;
use core::ptr;
use std::sync::Arc;

pub type CloneFn<T> = unsafe extern "C" fn(*const T) -> *const T;
pub type ArcDropFn<T> = unsafe extern "C" fn(*const T);

/// FFI-safe `Arc`.
///
/// Built from a native [`Arc`], so the count is atomic and clones or releases may race across
/// threads. A *borrowed* copy (see [`CArc::borrowed`]) has neither function set: it aliases the
/// resource without holding a reference.
#[repr(C)]
pub struct CArc<T> {
    instance: *const T,
    clone_fn: Option<CloneFn<T>>,
    drop_fn: Option<ArcDropFn<T>>,
}

unsafe impl<T: Send + Sync> Send for CArc<T> {}
unsafe impl<T: Send + Sync> Sync for CArc<T> {}

unsafe extern "C" fn carc_clone<T>(instance: *const T) -> *const T {
    // SAFETY: `instance` came from `Arc::into_raw` and is still referenced by the caller.
    unsafe { Arc::increment_strong_count(instance) };
    instance
}

unsafe extern "C" fn carc_drop<T>(instance: *const T) {
    // SAFETY: each owning handle gives up exactly one strong reference.
    unsafe { Arc::decrement_strong_count(instance) };
}

impl<T> From<Arc<T>> for CArc<T> {
    fn from(arc: Arc<T>) -> Self {
        Self {
            instance: Arc::into_raw(arc),
            clone_fn: Some(carc_clone::<T>),
            drop_fn: Some(carc_drop::<T>),
        }
    }
}

impl<T> CArc<T> {
    /// Raw copy that does not take a reference.
    ///
    /// Releasing it is a no-op and cloning it yields another raw copy. It must not outlive
    /// every owning handle of the same resource.
    pub fn borrowed(&self) -> Self {
        Self {
            instance: self.instance,
            clone_fn: None,
            drop_fn: None,
        }
    }

    /// Whether this handle holds a reference.
    pub fn is_owning(&self) -> bool {
        self.drop_fn.is_some() && !self.instance.is_null()
    }

    pub fn as_ptr(&self) -> *const T {
        self.instance
    }

    pub fn as_ref(&self) -> Option<&T> {
        // SAFETY: the resource outlives every handle, owning or borrowed, by contract.
        unsafe { self.instance.as_ref() }
    }

    /// Give up this handle's reference, then forget the handle.
    pub fn release(&mut self) {
        let instance = core::mem::replace(&mut self.instance, ptr::null());
        self.clone_fn = None;
        if let Some(drop_fn) = self.drop_fn.take() {
            if !instance.is_null() {
                // SAFETY: the function was taken out, so this reference is given up once.
                unsafe { drop_fn(instance) };
            }
        }
    }

    /// Null all fields without releasing the reference.
    pub fn forget(&mut self) {
        self.instance = ptr::null();
        self.clone_fn = None;
        self.drop_fn = None;
    }

    /// Hold an extra reference until the returned guard drops.
    pub fn guard(&self) -> ContextGuard<T> {
        ContextGuard(self.clone())
    }

    /// Erase the resource type.
    ///
    /// The erased handle is `Send` and `Sync`, so the resource must be too:
    ///
    /// ```compile_fail
    /// use capgroup_abi::CArc;
    /// let opaque = CArc::from(std::sync::Arc::new(std::cell::Cell::new(1u8))).into_opaque();
    /// ```
    pub fn into_opaque(self) -> CArc<c_void>
    where
        T: Send + Sync,
    {
        let this = ManuallyDrop::new(self);
        // SAFETY: pointer parameters differ only in pointee type.
        unsafe {
            CArc {
                instance: this.instance.cast(),
                clone_fn: this
                    .clone_fn
                    .map(|f| core::mem::transmute::<CloneFn<T>, CloneFn<c_void>>(f)),
                drop_fn: this
                    .drop_fn
                    .map(|f| core::mem::transmute::<ArcDropFn<T>, ArcDropFn<c_void>>(f)),
            }
        }
    }
}

impl<T> Clone for CArc<T> {
    fn clone(&self) -> Self {
        match self.clone_fn {
            Some(clone_fn) if !self.instance.is_null() => Self {
                // SAFETY: `self` holds a reference, so the resource is alive.
                instance: unsafe { clone_fn(self.instance) },
                clone_fn: self.clone_fn,
                drop_fn: self.drop_fn,
            },
            _ => self.borrowed(),
        }
    }
}

impl<T> Drop for CArc<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> fmt::Debug for CArc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CArc")
            .field("instance", &self.instance)
            .field("owning", &self.drop_fn.is_some())
            .finish()
    }
}

/// Extra reference held across a call that consumes the original handle.
///
/// A consuming call hands the container's own reference to code that lives inside the
/// referenced library. The guard keeps one more reference alive until the call has returned.
#[must_use = "the reference is given up as soon as the guard is dropped"]
pub struct ContextGuard<T>(CArc<T>);

impl<T> ContextGuard<T> {
    pub fn context(&self) -> &CArc<T> {
        &self.0
    }
}

impl<T> fmt::Debug for ContextGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextGuard").field(&self.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_and_release_track_count() {
        let tracker = Arc::new(());
        let handle = CArc::from(tracker.clone());
        assert_eq!(Arc::strong_count(&tracker), 2);

        let second = handle.clone();
        assert_eq!(Arc::strong_count(&tracker), 3);

        drop(handle);
        drop(second);
        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_borrowed_copy_leaves_count() {
        let tracker = Arc::new(());
        let handle = CArc::from(tracker.clone()).into_opaque();

        let borrowed = handle.borrowed();
        let borrowed_clone = borrowed.clone();
        assert!(!borrowed.is_owning());
        assert!(!borrowed_clone.is_owning());
        drop(borrowed_clone);
        drop(borrowed);

        assert_eq!(Arc::strong_count(&tracker), 2);
        drop(handle);
        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let tracker = Arc::new(());
        let mut handle = CArc::from(tracker.clone());

        handle.release();
        handle.release();
        assert_eq!(Arc::strong_count(&tracker), 1);
        assert!(handle.as_ref().is_none());
    }

    #[test]
    fn test_guard_holds_reference() {
        let tracker = Arc::new(());
        let handle = CArc::from(tracker.clone()).into_opaque();

        let guard = handle.guard();
        assert_eq!(Arc::strong_count(&tracker), 3);
        assert!(guard.context().is_owning());

        drop(guard);
        assert_eq!(Arc::strong_count(&tracker), 2);
    }

    #[test]
    fn test_release_from_other_thread() {
        let tracker = Arc::new(());
        let handle = CArc::from(tracker.clone());
        let clones: Vec<_> = (0..4).map(|_| handle.clone()).collect();

        let joins: Vec<_> = clones
            .into_iter()
            .map(|c| std::thread::spawn(move || drop(c)))
            .collect();
        for join in joins {
            join.join().unwrap();
        }

        assert_eq!(Arc::strong_count(&tracker), 2);
    }
}

//! The root plugin object and the borrow/own state machine.
//!
//! A freshly created [`PluginInnerBox`] can hand out its features three ways:
//!
//! - [`borrow_features`](PluginInnerBox::borrow_features): a temporary view. The root stays
//!   mutably borrowed until the view is dropped, and dropping the view never touches the
//!   library refcount.
//! - [`mut_features`](PluginInnerBox::mut_features): a reference to a group kept in the root's
//!   scratch slot, overwritten by the next call. It aliases the root's storage and cannot be
//!   cloned.
//! - [`into_features`](PluginInnerBox::into_features): consumes the root and moves its storage
//!   and library reference into an owned group.

use core::fmt;

use capgroup_abi::{c_void, CArc, CBox, Container, RetTmp};

use crate::group::{FeaturesGroup, FeaturesImpl};

/// Root interface implemented by every plugin.
///
/// [`PluginInnerBox`] is `Send` and `Sync`, so the root must be too.
pub trait PluginInner: Send + Sync + Sized {
    /// Temporary view over the root's storage.
    type Borrowed<'a>: FeaturesImpl
    where
        Self: 'a;

    /// Result of consuming the root.
    type Owned: FeaturesImpl + 'static;

    /// Object exposed by reference.
    type OwnedMut: FeaturesImpl;

    fn borrow_features(&mut self) -> Self::Borrowed<'_>;

    fn into_features(self) -> Self::Owned;

    fn mut_features(&mut self) -> &mut Self::OwnedMut;
}

/// Scratch storage of the root container.
#[repr(C)]
#[derive(Default)]
pub struct PluginRetTmp {
    mut_features: RetTmp<FeaturesGroup<'static>>,
}

pub type RootContainer = Container<'static, PluginRetTmp>;

#[repr(C)]
pub struct PluginInnerVtbl {
    pub borrow_features: for<'a> extern "C" fn(cont: &'a mut RootContainer) -> FeaturesGroup<'a>,
    pub into_features: extern "C" fn(cont: RootContainer) -> FeaturesGroup<'static>,
    pub mut_features: for<'a> extern "C" fn(cont: &'a mut RootContainer) -> &'a mut FeaturesGroup<'a>,
}

extern "C" fn borrow_features<'a, T: PluginInner + 'static>(cont: &'a mut RootContainer) -> FeaturesGroup<'a> {
    let context = cont.context().borrowed();
    // SAFETY: root containers always hold a `T`.
    let view = unsafe { cont.instance_mut::<T>() }.borrow_features();
    let instance = CBox::from(Box::new(view)).into_opaque();
    // SAFETY: `instance` was just erased from a boxed view. The view borrows the root, which
    // the returned group keeps mutably borrowed for `'a`.
    unsafe { FeaturesGroup::from_container::<T::Borrowed<'a>>(Container::new(instance, context, ())) }
}

extern "C" fn into_features<T: PluginInner + 'static>(cont: RootContainer) -> FeaturesGroup<'static> {
    let (instance, context, _ret_tmp) = cont.into_parts();
    // SAFETY: root containers are built by `PluginInnerBox::new` from a `Box<T>` allocated in
    // this module.
    let root = unsafe { instance.cast::<T>().into_box() };
    let owned = (*root).into_features();
    FeaturesGroup::from_boxed(Box::new(owned), context)
}

extern "C" fn mut_features<'a, T: PluginInner + 'static>(cont: &'a mut RootContainer) -> &'a mut FeaturesGroup<'a> {
    let context = cont.context().borrowed();
    // SAFETY: root containers always hold a `T`.
    let target: *mut T::OwnedMut = unsafe { cont.instance_mut::<T>() }.mut_features();
    // SAFETY: non-owning alias into the root's storage, which outlives the scratch slot.
    let instance = unsafe { CBox::from_raw(target, None) }.into_opaque();
    // SAFETY: `instance` points to a live `T::OwnedMut`.
    let group = unsafe { FeaturesGroup::from_container::<T::OwnedMut>(Container::new(instance, context, ())) }
        .without_clone();
    let slot = cont.ret_tmp_mut().mut_features.set(group);
    // SAFETY: the slot lives as long as the root; the returned borrow of the root restores
    // the real lifetime.
    unsafe { &mut *(slot as *mut FeaturesGroup<'static>).cast::<FeaturesGroup<'a>>() }
}

impl PluginInnerVtbl {
    pub fn of<T: PluginInner + 'static>() -> &'static Self {
        &PluginInnerVtbl {
            borrow_features: borrow_features::<T>,
            into_features: into_features::<T>,
            mut_features: mut_features::<T>,
        }
    }
}

/// Root plugin handle.
#[repr(C)]
pub struct PluginInnerBox {
    vtbl: &'static PluginInnerVtbl,
    container: RootContainer,
}

impl PluginInnerBox {
    /// Wrap `root`, keeping a reference to `library` for as long as the root or anything
    /// derived from it lives.
    pub fn new<T: PluginInner + 'static>(root: T, library: CArc<c_void>) -> Self {
        let instance = CBox::from(Box::new(root)).into_opaque();
        Self {
            vtbl: PluginInnerVtbl::of::<T>(),
            container: Container::new(instance, library, PluginRetTmp::default()),
        }
    }

    /// The library reference held by this root.
    pub fn context(&self) -> &CArc<c_void> {
        self.container.context()
    }

    /// Temporary view of the features. The root is unusable until the view is dropped.
    pub fn borrow_features(&mut self) -> FeaturesGroup<'_> {
        (self.vtbl.borrow_features)(&mut self.container)
    }

    /// Group kept in the root's scratch slot.
    ///
    /// Each call replaces the group returned by the previous one. The group never exposes
    /// `Clone`, since it neither owns the instance nor holds a library reference.
    pub fn mut_features(&mut self) -> &mut FeaturesGroup<'_> {
        (self.vtbl.mut_features)(&mut self.container)
    }

    /// Consume the root and return an owned group.
    ///
    /// The conversion function runs inside the plugin library and takes over the root's
    /// library reference, so an extra reference is held until it has returned.
    pub fn into_features(self) -> FeaturesGroup<'static> {
        let Self { vtbl, container } = self;
        let guard = container.context().guard();
        let owned = (vtbl.into_features)(container);
        drop(guard);
        owned
    }
}

impl fmt::Debug for PluginInnerBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInnerBox")
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

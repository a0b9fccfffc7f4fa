//! The `FeaturesGroup` capability group.
//!
//! A group pairs one container with the mandatory [`MainFeature`] vtable and a nullable
//! pointer for each optional interface. A pointer is set if and only if the concrete object
//! implements that interface, which makes the pointers the one way to discover capabilities.
//! The safe API only hands out optional interfaces through `Option`, so dispatching through an
//! absent vtable cannot be written.

use core::fmt;

use bitflags::bitflags;
use capgroup_abi::{c_void, CArc, CBox, CIterator, Container};

use crate::features::{KeyValueCallback, KeyValueDumper, KeyValueStore, MainFeature};
use crate::vtable::{
    clone_vtbl, key_value_dumper_vtbl, key_value_store_vtbl, main_feature_vtbl, CloneVtbl,
    GroupContainer, KeyValueDumperVtbl, KeyValueStoreVtbl, MainFeatureVtbl,
};

bitflags! {
    /// Optional interfaces present on a group.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        const KEY_VALUE_STORE = 1 << 0;
        const KEY_VALUE_DUMPER = 1 << 1;
        const CLONE = 1 << 2;
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = vec!["MainFeature"];
        if self.contains(Self::KEY_VALUE_STORE) {
            names.push("KeyValueStore");
        }
        if self.contains(Self::KEY_VALUE_DUMPER) {
            names.push("KeyValueDumper");
        }
        if self.contains(Self::CLONE) {
            names.push("Clone");
        }
        write!(f, "{}", names.join(" + "))
    }
}

/// The vtable set a concrete type contributes to a group.
#[derive(Clone, Copy)]
pub struct FeaturesVtables {
    main: &'static MainFeatureVtbl,
    clone: Option<&'static CloneVtbl>,
    dumper: Option<&'static KeyValueDumperVtbl>,
    store: Option<&'static KeyValueStoreVtbl>,
}

impl FeaturesVtables {
    /// Only the mandatory interface.
    pub fn new<T: MainFeature>() -> Self {
        Self {
            main: main_feature_vtbl::<T>(),
            clone: None,
            dumper: None,
            store: None,
        }
    }

    pub fn with_key_value_store<T: KeyValueStore>(mut self) -> Self {
        self.store = Some(key_value_store_vtbl::<T>());
        self
    }

    /// The dump callback borrows from the instance for the whole call, so `T` must not borrow.
    pub fn with_key_value_dumper<T: KeyValueDumper + 'static>(mut self) -> Self {
        self.dumper = Some(key_value_dumper_vtbl::<T>());
        self
    }

    pub fn with_clone<T: Clone + Send + Sync>(mut self) -> Self {
        self.clone = Some(clone_vtbl::<T>());
        self
    }
}

/// A type that can be placed in a [`FeaturesGroup`].
///
/// Usually implemented with [`impl_features!`](crate::impl_features), which lists the
/// optional interfaces the type exposes. Groups may be moved across threads, so the type must
/// be `Send` and `Sync`.
pub trait FeaturesImpl: MainFeature + Send + Sync + Sized {
    fn features_vtables() -> FeaturesVtables;
}

/// Capability group over [`MainFeature`] with optional [`KeyValueStore`], [`KeyValueDumper`]
/// and `Clone`.
#[repr(C)]
pub struct FeaturesGroup<'a> {
    vtbl_mainfeature: &'static MainFeatureVtbl,
    vtbl_clone: Option<&'static CloneVtbl>,
    vtbl_keyvaluedumper: Option<&'static KeyValueDumperVtbl>,
    vtbl_keyvaluestore: Option<&'static KeyValueStoreVtbl>,
    container: GroupContainer<'a>,
}

impl<'a> FeaturesGroup<'a> {
    /// Group over a container whose instance is a `T`.
    ///
    /// # Safety
    ///
    /// The container's instance must point to a live `T` for `'a`.
    pub unsafe fn from_container<T: FeaturesImpl>(container: GroupContainer<'a>) -> Self {
        let vtables = T::features_vtables();
        Self {
            vtbl_mainfeature: vtables.main,
            vtbl_clone: vtables.clone,
            vtbl_keyvaluedumper: vtables.dumper,
            vtbl_keyvaluestore: vtables.store,
            container,
        }
    }

    /// Owning group: the instance is freed when the group is released.
    ///
    /// Groups are `Send`, so instances that are not cannot be wrapped:
    ///
    /// ```compile_fail
    /// use std::rc::Rc;
    /// use capgroup_plugin_api::prelude::*;
    ///
    /// struct Shared(Rc<usize>);
    ///
    /// impl MainFeature for Shared {
    ///     fn print_self(&self) {}
    ///
    ///     fn describe(&self) -> usize {
    ///         *self.0
    ///     }
    /// }
    ///
    /// capgroup_plugin_api::impl_features!(Shared);
    /// ```
    pub fn from_boxed<T: FeaturesImpl + 'a>(instance: Box<T>, context: CArc<c_void>) -> Self {
        let instance = CBox::from(instance).into_opaque();
        // SAFETY: the instance was just erased from a `Box<T>`.
        unsafe { Self::from_container::<T>(Container::new(instance, context, ())) }
    }

    /// Optional interfaces whose vtable is present.
    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        caps.set(Capabilities::KEY_VALUE_STORE, self.vtbl_keyvaluestore.is_some());
        caps.set(Capabilities::KEY_VALUE_DUMPER, self.vtbl_keyvaluedumper.is_some());
        caps.set(Capabilities::CLONE, self.vtbl_clone.is_some());
        caps
    }

    pub fn container(&self) -> &GroupContainer<'a> {
        &self.container
    }

    /// Whether releasing this group frees a plugin-side instance.
    pub fn is_owning(&self) -> bool {
        self.container.is_owning()
    }

    pub fn as_key_value_store(&mut self) -> Option<KeyValueStoreRef<'_, 'a>> {
        let vtbl = self.vtbl_keyvaluestore?;
        Some(KeyValueStoreRef { group: self, vtbl })
    }

    pub fn as_key_value_dumper(&self) -> Option<KeyValueDumperRef<'_, 'a>> {
        let vtbl = self.vtbl_keyvaluedumper?;
        Some(KeyValueDumperRef { group: self, vtbl })
    }

    /// Both optional key-value interfaces at once, or `None` if either is missing.
    pub fn as_store_dumper(&mut self) -> Option<StoreDumperRef<'_, 'a>> {
        let store = self.vtbl_keyvaluestore?;
        let dumper = self.vtbl_keyvaluedumper?;
        Some(StoreDumperRef {
            group: self,
            store,
            dumper,
        })
    }

    /// Drop the `Clone` vtable.
    ///
    /// Groups that alias storage they do not own also carry a non-owning context, and a clone
    /// of one would not keep the library loaded.
    pub(crate) fn without_clone(mut self) -> Self {
        self.vtbl_clone = None;
        self
    }

    /// An independent copy with its own library reference, if the object is cloneable.
    pub fn try_clone(&self) -> Option<Self> {
        let vtbl = self.vtbl_clone?;
        Some(Self {
            vtbl_mainfeature: self.vtbl_mainfeature,
            vtbl_clone: self.vtbl_clone,
            vtbl_keyvaluedumper: self.vtbl_keyvaluedumper,
            vtbl_keyvaluestore: self.vtbl_keyvaluestore,
            container: (vtbl.clone)(&self.container),
        })
    }
}

impl MainFeature for FeaturesGroup<'_> {
    fn print_self(&self) {
        (self.vtbl_mainfeature.print_self)(&self.container)
    }

    fn describe(&self) -> usize {
        (self.vtbl_mainfeature.describe)(&self.container)
    }
}

impl fmt::Debug for FeaturesGroup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeaturesGroup")
            .field("capabilities", &self.capabilities())
            .field("container", &self.container)
            .finish()
    }
}

fn store_write(vtbl: &KeyValueStoreVtbl, group: &mut FeaturesGroup<'_>, name: &str, val: usize) {
    (vtbl.write_key_value)(&mut group.container, name.into(), val)
}

fn store_get(vtbl: &KeyValueStoreVtbl, group: &FeaturesGroup<'_>, name: &str) -> usize {
    (vtbl.get_key_value)(&group.container, name.into())
}

/// A group known to implement [`KeyValueStore`].
pub struct KeyValueStoreRef<'g, 'a> {
    group: &'g mut FeaturesGroup<'a>,
    vtbl: &'static KeyValueStoreVtbl,
}

impl MainFeature for KeyValueStoreRef<'_, '_> {
    fn print_self(&self) {
        self.group.print_self()
    }

    fn describe(&self) -> usize {
        self.group.describe()
    }
}

impl KeyValueStore for KeyValueStoreRef<'_, '_> {
    fn write_key_value(&mut self, name: &str, val: usize) {
        store_write(self.vtbl, self.group, name, val)
    }

    fn get_key_value(&self, name: &str) -> usize {
        store_get(self.vtbl, &*self.group, name)
    }
}

/// A group known to implement [`KeyValueDumper`].
pub struct KeyValueDumperRef<'g, 'a> {
    group: &'g FeaturesGroup<'a>,
    vtbl: &'static KeyValueDumperVtbl,
}

impl MainFeature for KeyValueDumperRef<'_, '_> {
    fn print_self(&self) {
        self.group.print_self()
    }

    fn describe(&self) -> usize {
        self.group.describe()
    }
}

impl KeyValueDumper for KeyValueDumperRef<'_, '_> {
    fn dump_key_values<'b>(&'b self, callback: KeyValueCallback<'b>) {
        (self.vtbl.dump_key_values)(&self.group.container, callback)
    }

    fn print_ints(&self, iter: CIterator<'_, i32>) {
        (self.vtbl.print_ints)(&self.group.container, iter)
    }

    fn sum_ints(&self, iter: CIterator<'_, i32>) -> i64 {
        (self.vtbl.sum_ints)(&self.group.container, iter)
    }
}

/// A group known to implement both [`KeyValueStore`] and [`KeyValueDumper`].
pub struct StoreDumperRef<'g, 'a> {
    group: &'g mut FeaturesGroup<'a>,
    store: &'static KeyValueStoreVtbl,
    dumper: &'static KeyValueDumperVtbl,
}

impl MainFeature for StoreDumperRef<'_, '_> {
    fn print_self(&self) {
        self.group.print_self()
    }

    fn describe(&self) -> usize {
        self.group.describe()
    }
}

impl KeyValueStore for StoreDumperRef<'_, '_> {
    fn write_key_value(&mut self, name: &str, val: usize) {
        store_write(self.store, self.group, name, val)
    }

    fn get_key_value(&self, name: &str) -> usize {
        store_get(self.store, &*self.group, name)
    }
}

impl KeyValueDumper for StoreDumperRef<'_, '_> {
    fn dump_key_values<'b>(&'b self, callback: KeyValueCallback<'b>) {
        (self.dumper.dump_key_values)(&self.group.container, callback)
    }

    fn print_ints(&self, iter: CIterator<'_, i32>) {
        (self.dumper.print_ints)(&self.group.container, iter)
    }

    fn sum_ints(&self, iter: CIterator<'_, i32>) -> i64 {
        (self.dumper.sum_ints)(&self.group.container, iter)
    }
}

/// Implement [`FeaturesImpl`] for a type, listing the optional interfaces it exposes.
///
/// ```
/// use capgroup_plugin_api::prelude::*;
///
/// #[derive(Clone, Default)]
/// struct Counter(usize);
///
/// impl MainFeature for Counter {
///     fn print_self(&self) {
///         println!("{}", self.0);
///     }
///
///     fn describe(&self) -> usize {
///         self.0
///     }
/// }
///
/// capgroup_plugin_api::impl_features!(Counter => Clone);
/// ```
#[macro_export]
macro_rules! impl_features {
    (@with $vtables:ident, KeyValueStore) => {
        $vtables.with_key_value_store::<Self>()
    };
    (@with $vtables:ident, KeyValueDumper) => {
        $vtables.with_key_value_dumper::<Self>()
    };
    (@with $vtables:ident, Clone) => {
        $vtables.with_clone::<Self>()
    };
    ($ty:ty $(=> $($cap:ident),* $(,)?)?) => {
        impl $crate::group::FeaturesImpl for $ty {
            fn features_vtables() -> $crate::group::FeaturesVtables {
                let vtables = $crate::group::FeaturesVtables::new::<Self>();
                $($(let vtables = $crate::impl_features!(@with vtables, $cap);)*)?
                vtables
            }
        }
    };
}

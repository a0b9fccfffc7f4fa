//! Per-interface vtables over the group container.
//!
//! Each vtable holds one `extern "C"` function per interface method. The first argument is the
//! container: `&` for read-only methods, `&mut` for mutating ones, by value for consuming ones.
//! The getters below return process-lifetime singletons instantiated for a concrete `T`; a
//! vtable for `T` may only ever be paired with a container whose instance is a `T`.

use capgroup_abi::{CIterator, CSliceRef, Container};

use crate::features::{KeyValueCallback, KeyValueDumper, KeyValueStore, MainFeature};

/// Container shape shared by every capability group.
pub type GroupContainer<'a> = Container<'a, ()>;

#[repr(C)]
pub struct MainFeatureVtbl {
    pub print_self: extern "C" fn(cont: &GroupContainer<'_>),
    pub describe: extern "C" fn(cont: &GroupContainer<'_>) -> usize,
}

#[repr(C)]
pub struct KeyValueStoreVtbl {
    pub write_key_value: extern "C" fn(cont: &mut GroupContainer<'_>, name: CSliceRef<'_, u8>, val: usize),
    pub get_key_value: extern "C" fn(cont: &GroupContainer<'_>, name: CSliceRef<'_, u8>) -> usize,
}

#[repr(C)]
pub struct KeyValueDumperVtbl {
    pub dump_key_values: for<'a> extern "C" fn(cont: &'a GroupContainer<'_>, callback: KeyValueCallback<'a>),
    pub print_ints: extern "C" fn(cont: &GroupContainer<'_>, iter: CIterator<'_, i32>),
    pub sum_ints: extern "C" fn(cont: &GroupContainer<'_>, iter: CIterator<'_, i32>) -> i64,
}

#[repr(C)]
pub struct CloneVtbl {
    pub clone: for<'a> extern "C" fn(cont: &GroupContainer<'a>) -> GroupContainer<'a>,
}

extern "C" fn print_self<T: MainFeature>(cont: &GroupContainer<'_>) {
    // SAFETY: this vtable is only paired with containers holding a `T`.
    unsafe { cont.instance_ref::<T>() }.print_self()
}

extern "C" fn describe<T: MainFeature>(cont: &GroupContainer<'_>) -> usize {
    // SAFETY: as above.
    unsafe { cont.instance_ref::<T>() }.describe()
}

extern "C" fn write_key_value<T: KeyValueStore>(
    cont: &mut GroupContainer<'_>,
    name: CSliceRef<'_, u8>,
    val: usize,
) {
    // SAFETY: as above.
    unsafe { cont.instance_mut::<T>() }.write_key_value(&name.to_string_lossy(), val)
}

extern "C" fn get_key_value<T: KeyValueStore>(cont: &GroupContainer<'_>, name: CSliceRef<'_, u8>) -> usize {
    // SAFETY: as above.
    unsafe { cont.instance_ref::<T>() }.get_key_value(&name.to_string_lossy())
}

extern "C" fn dump_key_values<'a, T: KeyValueDumper + 'static>(cont: &'a GroupContainer<'_>, callback: KeyValueCallback<'a>) {
    // SAFETY: as above.
    unsafe { cont.instance_ref::<T>() }.dump_key_values(callback)
}

extern "C" fn print_ints<T: KeyValueDumper>(cont: &GroupContainer<'_>, iter: CIterator<'_, i32>) {
    // SAFETY: as above.
    unsafe { cont.instance_ref::<T>() }.print_ints(iter)
}

extern "C" fn sum_ints<T: KeyValueDumper>(cont: &GroupContainer<'_>, iter: CIterator<'_, i32>) -> i64 {
    // SAFETY: as above.
    unsafe { cont.instance_ref::<T>() }.sum_ints(iter)
}

extern "C" fn clone_container<'a, T: Clone + Send + Sync>(cont: &GroupContainer<'a>) -> GroupContainer<'a> {
    // SAFETY: as above.
    let this = unsafe { cont.instance_ref::<T>() };
    let instance = capgroup_abi::CBox::from(Box::new(this.clone())).into_opaque();
    Container::new(instance, cont.context().clone(), ())
}

pub fn main_feature_vtbl<T: MainFeature>() -> &'static MainFeatureVtbl {
    &MainFeatureVtbl {
        print_self: print_self::<T>,
        describe: describe::<T>,
    }
}

pub fn key_value_store_vtbl<T: KeyValueStore>() -> &'static KeyValueStoreVtbl {
    &KeyValueStoreVtbl {
        write_key_value: write_key_value::<T>,
        get_key_value: get_key_value::<T>,
    }
}

pub fn key_value_dumper_vtbl<T: KeyValueDumper + 'static>() -> &'static KeyValueDumperVtbl {
    &KeyValueDumperVtbl {
        dump_key_values: dump_key_values::<T>,
        print_ints: print_ints::<T>,
        sum_ints: sum_ints::<T>,
    }
}

pub fn clone_vtbl<T: Clone + Send + Sync>() -> &'static CloneVtbl {
    &CloneVtbl {
        clone: clone_container::<T>,
    }
}

//! Layout of every type that crosses the plugin boundary.
//!
//! Host and plugin each compile their own copy of [`ROOT_LAYOUT`]. The loader asks the plugin
//! for its copy and compares it with the host's before calling into anything else.

use capgroup_abi::layout::{LayoutDescriptor, LayoutEntry};
use capgroup_abi::{c_void, layout_entries, CArc, CBox, CIterator, CSliceRef, OpaqueCallback};

use crate::features::KeyValue;
use crate::group::FeaturesGroup;
use crate::root::{PluginInnerBox, PluginInnerVtbl, PluginRetTmp, RootContainer};
use crate::vtable::{CloneVtbl, GroupContainer, KeyValueDumperVtbl, KeyValueStoreVtbl, MainFeatureVtbl};

/// Bumped on any change to the calling convention that sizes alone would not reveal.
pub const ABI_VERSION: u32 = 1;

const ROOT_ENTRIES: &[LayoutEntry] = &layout_entries![
    CBox<'static, c_void>,
    CArc<c_void>,
    CSliceRef<'static, u8>,
    CIterator<'static, i32>,
    OpaqueCallback<'static, KeyValue<'static>>,
    KeyValue<'static>,
    GroupContainer<'static>,
    MainFeatureVtbl,
    KeyValueStoreVtbl,
    KeyValueDumperVtbl,
    CloneVtbl,
    FeaturesGroup<'static>,
    PluginRetTmp,
    RootContainer,
    PluginInnerVtbl,
    PluginInnerBox,
    LayoutDescriptor,
];

/// Layout this build of the interface crate was compiled with.
pub static ROOT_LAYOUT: LayoutDescriptor =
    LayoutDescriptor::new(ABI_VERSION, env!("CARGO_PKG_VERSION"), ROOT_ENTRIES);

pub fn root_layout() -> &'static LayoutDescriptor {
    &ROOT_LAYOUT
}

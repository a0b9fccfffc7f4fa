//! Interfaces a plugin object can implement.
//!
//! [`MainFeature`] is mandatory for every capability group. [`KeyValueStore`],
//! [`KeyValueDumper`] and `Clone` are optional and detected per object.

use capgroup_abi::{CIterator, CSliceRef, OpaqueCallback};

/// One `(key, value)` pair handed to a dump callback.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KeyValue<'a>(pub CSliceRef<'a, u8>, pub usize);

impl<'a> KeyValue<'a> {
    pub fn new(key: &'a str, value: usize) -> Self {
        Self(key.into(), value)
    }

    pub fn key(&self) -> std::borrow::Cow<'a, str> {
        self.0.to_string_lossy()
    }

    pub fn value(&self) -> usize {
        self.1
    }
}

pub type KeyValueCallback<'a> = OpaqueCallback<'a, KeyValue<'a>>;

/// Mandatory interface.
pub trait MainFeature {
    /// Print a human-readable form of the object to stdout.
    fn print_self(&self);

    /// Number of entries the object holds.
    fn describe(&self) -> usize;
}

pub trait KeyValueStore {
    fn write_key_value(&mut self, name: &str, val: usize);

    /// Value stored under `name`, or `0` when absent.
    fn get_key_value(&self, name: &str) -> usize;
}

pub trait KeyValueDumper {
    /// Feed every pair into `callback` until it declines.
    fn dump_key_values<'a>(&'a self, callback: KeyValueCallback<'a>);

    /// Print each element as `"{index}: {value}"`.
    fn print_ints(&self, iter: CIterator<'_, i32>);

    /// Sum of all elements.
    fn sum_ints(&self, iter: CIterator<'_, i32>) -> i64;
}

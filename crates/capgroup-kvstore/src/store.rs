//! The key-value store and its borrowed view.

use std::collections::BTreeMap;

use capgroup_plugin_api::abi::{CIterator, FeedCallback};
use capgroup_plugin_api::{impl_features, KeyValue, KeyValueCallback, KeyValueDumper, KeyValueStore, MainFeature};

/// Owned store. Keys are kept sorted so dumps are deterministic.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KvStore {
    map: BTreeMap<String, usize>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl FromIterator<(String, usize)> for KvStore {
    fn from_iter<I: IntoIterator<Item = (String, usize)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

impl MainFeature for KvStore {
    fn print_self(&self) {
        println!("{:?}", self.map);
    }

    fn describe(&self) -> usize {
        self.map.len()
    }
}

impl KeyValueStore for KvStore {
    fn write_key_value(&mut self, name: &str, val: usize) {
        tracing::trace!("write {} = {}", name, val);
        self.map.insert(name.to_string(), val);
    }

    fn get_key_value(&self, name: &str) -> usize {
        self.map.get(name).copied().unwrap_or(0)
    }
}

impl KeyValueDumper for KvStore {
    fn dump_key_values<'a>(&'a self, callback: KeyValueCallback<'a>) {
        let fed = self
            .map
            .iter()
            .map(|(k, v)| KeyValue::new(k, *v))
            .feed_into(callback);
        tracing::trace!("dumped {} of {} pairs", fed, self.map.len());
    }

    fn print_ints(&self, iter: CIterator<'_, i32>) {
        for (idx, val) in iter.enumerate() {
            println!("{idx}: {val}");
        }
    }

    fn sum_ints(&self, iter: CIterator<'_, i32>) -> i64 {
        iter.map(i64::from).sum()
    }
}

/// Temporary view over a root's store.
///
/// Exposes reads and writes only; it cannot be cloned out of the root or dumped.
#[derive(Debug)]
pub struct KvStoreView<'a> {
    store: &'a mut KvStore,
}

impl<'a> KvStoreView<'a> {
    pub fn new(store: &'a mut KvStore) -> Self {
        Self { store }
    }
}

impl MainFeature for KvStoreView<'_> {
    fn print_self(&self) {
        self.store.print_self()
    }

    fn describe(&self) -> usize {
        self.store.describe()
    }
}

impl KeyValueStore for KvStoreView<'_> {
    fn write_key_value(&mut self, name: &str, val: usize) {
        self.store.write_key_value(name, val)
    }

    fn get_key_value(&self, name: &str) -> usize {
        self.store.get_key_value(name)
    }
}

impl_features!(KvStore => KeyValueStore, KeyValueDumper, Clone);
impl_features!(KvStoreView<'_> => KeyValueStore);

//! Integration tests for the key-value plugin
//!
//! Runs the plugin's exported entry points in-process through the loader and drives the
//! root through borrow, reference and ownership conversions.

use std::sync::Arc;

use capgroup_kvstore::{capgroup_create_plugin, capgroup_root_layout, KvRoot};
use capgroup_plugin_api::abi::{c_void, AsCIterator, CArc};
use capgroup_plugin_api::loader::EntryPoints;
use capgroup_plugin_api::prelude::*;
use capgroup_plugin_api::{LoaderConfig, PluginLibrary, PluginLoader};

struct InProcess;

impl PluginLibrary for InProcess {
    fn entry_points(&self) -> capgroup_plugin_api::Result<EntryPoints> {
        Ok(EntryPoints {
            create: capgroup_create_plugin,
            root_layout: capgroup_root_layout,
        })
    }
}

fn load() -> (Arc<InProcess>, PluginInnerBox) {
    let library = Arc::new(InProcess);
    let root = PluginLoader::new(LoaderConfig::new())
        .instantiate(library.clone())
        .unwrap();
    (library, root)
}

fn seeded(seed: &str) -> (Arc<()>, PluginInnerBox) {
    let tracker = Arc::new(());
    let context: CArc<c_void> = CArc::from(tracker.clone()).into_opaque();
    let root = PluginInnerBox::new(KvRoot::from_seed(seed).unwrap(), context);
    (tracker, root)
}

fn dump(group: &mut FeaturesGroup<'_>) -> Vec<(String, usize)> {
    let mut pairs = Vec::new();
    let mut sink = |kv: KeyValue<'_>| {
        pairs.push((kv.key().into_owned(), kv.value()));
        true
    };
    group
        .as_key_value_dumper()
        .unwrap()
        .dump_key_values((&mut sink).into());
    pairs
}

#[test]
fn test_borrow_then_own() {
    let (library, mut root) = load();
    assert_eq!(Arc::strong_count(&library), 2);

    {
        let mut borrowed = root.borrow_features();
        assert_eq!(borrowed.capabilities(), Capabilities::KEY_VALUE_STORE);
        assert!(borrowed.as_key_value_dumper().is_none());
        assert!(borrowed.try_clone().is_none());

        let mut store = borrowed.as_key_value_store().unwrap();
        store.write_key_value("a", 7);
        assert_eq!(store.get_key_value("a"), 7);
        assert_eq!(store.get_key_value("absent"), 0);
    }
    assert_eq!(Arc::strong_count(&library), 2);

    let mut owned = root.into_features();
    assert_eq!(Arc::strong_count(&library), 2);
    assert_eq!(
        owned.capabilities(),
        Capabilities::KEY_VALUE_STORE | Capabilities::KEY_VALUE_DUMPER | Capabilities::CLONE
    );
    assert_eq!(dump(&mut owned), vec![("a".to_string(), 7)]);

    drop(owned);
    assert_eq!(Arc::strong_count(&library), 1);
}

#[test]
fn test_mut_features_shares_root_storage() {
    let (library, mut root) = load();

    root.mut_features()
        .as_key_value_store()
        .unwrap()
        .write_key_value("k", 3);

    let group = root.mut_features();
    assert!(!group.is_owning());
    assert!(!group.container().context().is_owning());
    assert_eq!(
        group.capabilities(),
        Capabilities::KEY_VALUE_STORE | Capabilities::KEY_VALUE_DUMPER
    );
    assert!(group.try_clone().is_none());
    assert_eq!(dump(group), vec![("k".to_string(), 3)]);
    assert_eq!(Arc::strong_count(&library), 2);

    let owned = root.into_features();
    assert_eq!(owned.describe(), 1);
}

#[test]
fn test_clone_is_independent() {
    let (library, root) = load();
    let mut owned = root.into_features();
    owned.as_key_value_store().unwrap().write_key_value("x", 1);

    let mut copy = owned.try_clone().unwrap();
    assert_eq!(Arc::strong_count(&library), 3);

    let mut both = copy.as_store_dumper().unwrap();
    both.write_key_value("y", 2);
    assert_eq!(both.get_key_value("x"), 1);
    assert_eq!(owned.describe(), 1);
    assert_eq!(copy.describe(), 2);

    drop(owned);
    assert_eq!(Arc::strong_count(&library), 2);
    drop(copy);
    assert_eq!(Arc::strong_count(&library), 1);
}

#[test]
fn test_iterator_through_group() {
    let (_library, root) = load();
    let owned = root.into_features();
    let dumper = owned.as_key_value_dumper().unwrap();

    let mut squares = (0..32).map(|i: i32| i * i);
    assert_eq!(dumper.sum_ints(squares.as_citer()), 10416);

    let mut empty = std::iter::empty::<i32>();
    assert_eq!(dumper.sum_ints(empty.as_citer()), 0);
}

#[test]
fn test_dump_stops_on_fifth() {
    let seed: Vec<String> = (0..10).map(|i| format!("key{i:02}={i}")).collect();
    let (tracker, root) = seeded(&seed.join(","));
    let owned = root.into_features();

    let mut seen = 0;
    let mut sink = |_: KeyValue<'_>| {
        seen += 1;
        seen < 5
    };
    owned
        .as_key_value_dumper()
        .unwrap()
        .dump_key_values((&mut sink).into());

    assert_eq!(seen, 5);
    assert_eq!(owned.describe(), 10);
    drop(owned);
    assert_eq!(Arc::strong_count(&tracker), 1);
}

#[test]
fn test_seeded_borrow_sees_entries() {
    let (_tracker, mut root) = seeded("a=1,b=2");
    let borrowed = root.borrow_features();
    assert_eq!(borrowed.describe(), 2);
}

//! Key-value store plugin.
//!
//! Built as a `cdylib` for hosts that load it at runtime, and as an `rlib` so its types can be
//! exercised in-process.
//!
//! The root hands out:
//! - a borrowed [`KvStoreView`] with `MainFeature + KeyValueStore`;
//! - an owned [`KvStore`] with `MainFeature + KeyValueStore + KeyValueDumper + Clone`;
//! - a reference to the root's own [`KvStore`] with the same set.
//!
//! The store starts empty unless `CAPGROUP_KVSTORE_SEED` holds comma-separated `key=value`
//! pairs.

mod store;

use capgroup_plugin_api::{export_plugin, ConstructorError, PluginInner};

pub use store::{KvStore, KvStoreView};

/// Environment variable read when the plugin is created.
pub const SEED_ENV: &str = "CAPGROUP_KVSTORE_SEED";

/// Errors parsing a seed string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeedError {
    #[error("Seed entry {0:?} is not of the form key=value")]
    MissingSeparator(String),

    #[error("Seed entry {0:?} has an empty key")]
    EmptyKey(String),

    #[error("Seed value for {key:?} is not a number: {value:?}")]
    InvalidValue { key: String, value: String },
}

impl From<SeedError> for ConstructorError {
    fn from(err: SeedError) -> Self {
        ConstructorError::new(err.to_string())
    }
}

/// Plugin root.
#[derive(Debug, Default)]
pub struct KvRoot {
    store: KvStore,
}

impl KvRoot {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    /// Root with entries parsed from `a=1,b=2`. Blank entries are skipped.
    pub fn from_seed(seed: &str) -> Result<Self, SeedError> {
        let store = seed
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(parse_entry)
            .collect::<Result<KvStore, _>>()?;
        Ok(Self::new(store))
    }

    /// Constructor used by the exported entry point.
    pub fn from_env() -> Result<Self, ConstructorError> {
        match std::env::var(SEED_ENV) {
            Ok(seed) => {
                let root = Self::from_seed(&seed)?;
                tracing::debug!("Seeded store with {} entries", root.store.len());
                Ok(root)
            }
            Err(_) => Ok(Self::default()),
        }
    }
}

fn parse_entry(entry: &str) -> Result<(String, usize), SeedError> {
    let (key, value) = entry
        .split_once('=')
        .ok_or_else(|| SeedError::MissingSeparator(entry.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(SeedError::EmptyKey(entry.to_string()));
    }
    let value = value.trim();
    let parsed = value.parse().map_err(|_| SeedError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    Ok((key.to_string(), parsed))
}

impl PluginInner for KvRoot {
    type Borrowed<'a> = KvStoreView<'a> where Self: 'a;
    type Owned = KvStore;
    type OwnedMut = KvStore;

    fn borrow_features(&mut self) -> KvStoreView<'_> {
        KvStoreView::new(&mut self.store)
    }

    fn into_features(self) -> KvStore {
        tracing::debug!("Converting root into owned store");
        self.store
    }

    fn mut_features(&mut self) -> &mut KvStore {
        &mut self.store
    }
}

export_plugin!(KvRoot, KvRoot::from_env);

#[cfg(test)]
mod tests {
    use super::*;
    use capgroup_plugin_api::KeyValueStore;

    #[test]
    fn test_seed_parsing() {
        let root = KvRoot::from_seed(" a=1, b = 2 ,,").unwrap();
        assert_eq!(root.store.get_key_value("a"), 1);
        assert_eq!(root.store.get_key_value("b"), 2);
        assert_eq!(root.store.len(), 2);

        assert!(KvRoot::from_seed("").unwrap().store.is_empty());
    }

    #[test]
    fn test_seed_errors() {
        assert_eq!(
            KvRoot::from_seed("a").unwrap_err(),
            SeedError::MissingSeparator("a".into())
        );
        assert_eq!(
            KvRoot::from_seed("=3").unwrap_err(),
            SeedError::EmptyKey("=3".into())
        );
        assert!(matches!(
            KvRoot::from_seed("a=x").unwrap_err(),
            SeedError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_seed_error_becomes_constructor_error() {
        let err: ConstructorError = SeedError::EmptyKey("=1".into()).into();
        assert!(err.message.contains("empty key"));
    }
}

//! capgroup plugin interfaces
//!
//! Shared by hosts and plugins:
//!
//! - the demo interfaces ([`MainFeature`], [`KeyValueStore`], [`KeyValueDumper`]);
//! - [`FeaturesGroup`], a capability group with one mandatory and several optional vtables;
//! - [`PluginInnerBox`], the root object with its borrow/own conversions;
//! - the loader ([`PluginLoader`], [`load_plugin`]) and the [`export_plugin!`] macro.
//!
//! # Writing a plugin
//!
//! ```ignore
//! use capgroup_plugin_api::prelude::*;
//!
//! #[derive(Default)]
//! struct Root(Store);
//!
//! impl PluginInner for Root {
//!     type Borrowed<'a> = StoreView<'a>;
//!     type Owned = Store;
//!     type OwnedMut = Store;
//!     // ...
//! }
//!
//! capgroup_plugin_api::impl_features!(Store => KeyValueStore, KeyValueDumper, Clone);
//! capgroup_plugin_api::export_plugin!(Root);
//! ```

pub mod config;
pub mod error;
pub mod features;
pub mod group;
pub mod layout;
pub mod loader;
#[doc(hidden)]
pub mod macros;
pub mod root;
pub mod vtable;

pub use capgroup_abi as abi;

pub use config::{ConfigError, LoaderConfig};
pub use error::{ConstructorError, LoadError, Result};
pub use features::{KeyValue, KeyValueCallback, KeyValueDumper, KeyValueStore, MainFeature};
pub use group::{Capabilities, FeaturesGroup, FeaturesImpl, FeaturesVtables};
pub use layout::{root_layout, ABI_VERSION, ROOT_LAYOUT};
pub use loader::{capgroup_load_plugin, load_plugin, LoadedPlugin, PluginLibrary, PluginLoader};
pub use root::{PluginInner, PluginInnerBox};

/// Prelude module with common imports
pub mod prelude {
    pub use crate::error::ConstructorError;
    pub use crate::features::{KeyValue, KeyValueCallback, KeyValueDumper, KeyValueStore, MainFeature};
    pub use crate::group::{Capabilities, FeaturesGroup, FeaturesImpl};
    pub use crate::root::{PluginInner, PluginInnerBox};
    pub use capgroup_abi::prelude::*;
}

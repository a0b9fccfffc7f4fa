//! Plugin loader.
//!
//! Loading runs in a fixed order: resolve the path, open the library, resolve both exports,
//! compare layouts, and only then call the plugin's constructor. A layout mismatch therefore
//! never runs any plugin code beyond the layout query.

use std::mem::MaybeUninit;
use std::num::NonZeroI32;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use capgroup_abi::layout::LayoutDescriptor;
use capgroup_abi::result::{from_int_out_result, into_int_out_result};
use capgroup_abi::{c_void, compare_layouts, CArc, CSliceRef};
use libloading::Library;

use crate::config::LoaderConfig;
use crate::error::{LoadError, Result};
use crate::layout::root_layout;
use crate::root::PluginInnerBox;

/// Constructor exported by every plugin.
pub const CREATE_SYMBOL: &str = "capgroup_create_plugin";

/// Layout query exported by every plugin.
pub const LAYOUT_SYMBOL: &str = "capgroup_root_layout";

/// Writes a new root into `out` and returns `0`, or returns a non-zero error code.
///
/// The plugin clones `library` into the root; the caller keeps its own reference.
pub type CreatePluginFn =
    unsafe extern "C" fn(library: &CArc<c_void>, out: &mut MaybeUninit<PluginInnerBox>) -> i32;

pub type RootLayoutFn = extern "C" fn() -> Option<&'static LayoutDescriptor>;

/// The two functions every plugin exports.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoints {
    pub create: CreatePluginFn,
    pub root_layout: RootLayoutFn,
}

/// Source of plugin entry points.
///
/// Implemented for [`libloading::Library`]. Tests implement it for in-process entry points.
/// Whatever implements it is kept alive until the last object created from it is released.
pub trait PluginLibrary: Send + Sync + 'static {
    fn entry_points(&self) -> Result<EntryPoints>;
}

impl PluginLibrary for Library {
    fn entry_points(&self) -> Result<EntryPoints> {
        let missing = |symbol: &str, e: libloading::Error| LoadError::Symbol {
            symbol: symbol.to_string(),
            message: e.to_string(),
        };

        // SAFETY: both symbols are declared by `export_plugin!` with exactly these types.
        let create = unsafe { self.get::<CreatePluginFn>(CREATE_SYMBOL.as_bytes()) }
            .map_err(|e| missing(CREATE_SYMBOL, e))?;
        // SAFETY: as above.
        let root_layout = unsafe { self.get::<RootLayoutFn>(LAYOUT_SYMBOL.as_bytes()) }
            .map_err(|e| missing(LAYOUT_SYMBOL, e))?;

        Ok(EntryPoints {
            create: *create,
            root_layout: *root_layout,
        })
    }
}

/// A plugin root together with where it came from.
#[derive(Debug)]
pub struct LoadedPlugin {
    pub path: PathBuf,
    pub root: PluginInnerBox,
}

/// Plugin loader.
#[derive(Debug, Clone, Default)]
pub struct PluginLoader {
    config: LoaderConfig,
}

impl PluginLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Map a plugin name to a library path.
    ///
    /// A bare name is turned into a platform file name (`libfoo.so`, `foo.dll`) and looked up
    /// in the search paths in order. A name with a path separator is used as-is.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let as_path = Path::new(name);
        if as_path.components().count() > 1 || as_path.is_absolute() {
            self.config.validate_path(as_path)?;
            return Ok(as_path.to_path_buf());
        }

        let file_name = libloading::library_filename(name);
        for dir in &self.config.search_paths {
            let candidate = dir.join(&file_name);
            tracing::debug!("Looking for plugin at {}", candidate.display());
            if candidate.exists() {
                self.config.validate_path(&candidate)?;
                return Ok(candidate);
            }
        }

        Err(LoadError::NotFound(name.to_string()))
    }

    /// Resolve, open and instantiate the plugin called `name`.
    pub fn load(&self, name: &str) -> Result<LoadedPlugin> {
        let path = self.resolve(name)?;
        tracing::info!("Loading plugin {} from {}", name, path.display());

        // SAFETY: loading runs the library's initialisers. Plugins are trusted code.
        let library = unsafe { Library::new(&path) }.map_err(|e| LoadError::Loading {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let root = self.instantiate(Arc::new(library))?;
        Ok(LoadedPlugin { path, root })
    }

    /// Check the layout `library` reports and create its root.
    ///
    /// If anything fails the library reference is dropped before returning, so nothing built
    /// from it survives.
    pub fn instantiate<L: PluginLibrary>(&self, library: Arc<L>) -> Result<PluginInnerBox> {
        let entry = library.entry_points()?;

        let found = (entry.root_layout)();
        if let Err(mismatch) =
            compare_layouts(Some(root_layout()), found, self.config.require_exact_layout)
        {
            tracing::warn!("Plugin layout rejected: {}", mismatch);
            return Err(mismatch.into());
        }
        tracing::debug!("Plugin layout accepted");

        let context = CArc::from(library).into_opaque();
        let mut out = MaybeUninit::uninit();
        // SAFETY: the layout check passed, so `out` has the shape the plugin writes.
        let code = unsafe { (entry.create)(&context, &mut out) };
        // SAFETY: the constructor writes `out` whenever it returns `0`.
        let root = unsafe { from_int_out_result::<_, NonZeroI32>(code, out) }.map_err(|code| {
            tracing::warn!("Plugin constructor failed with code {}", code);
            LoadError::Constructor(code.get())
        })?;

        tracing::info!("Plugin root created");
        Ok(root)
    }
}

/// Load `name` with the default configuration and `CAPGROUP_PLUGIN_DIR`.
pub fn load_plugin(name: &str) -> Result<PluginInnerBox> {
    PluginLoader::new(LoaderConfig::from_env())
        .load(name)
        .map(|loaded| loaded.root)
}

/// [`load_plugin`] for foreign hosts.
///
/// Returns `0` and writes `out` on success, or the [`LoadError`] code.
#[no_mangle]
pub extern "C" fn capgroup_load_plugin(
    name: CSliceRef<'_, u8>,
    out: &mut MaybeUninit<PluginInnerBox>,
) -> i32 {
    let result = name
        .to_str()
        .map_err(|e| LoadError::Path {
            path: PathBuf::from(name.to_string_lossy().into_owned()),
            reason: e.to_string(),
        })
        .and_then(load_plugin);
    into_int_out_result(result, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader_in(dir: &Path) -> PluginLoader {
        PluginLoader::new(LoaderConfig::new().with_search_paths(vec![dir.to_path_buf()]))
    }

    #[test]
    fn test_resolve_bare_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(libloading::library_filename("demo"));
        std::fs::write(&file, b"not really a library").unwrap();

        assert_eq!(loader_in(dir.path()).resolve("demo").unwrap(), file);
    }

    #[test]
    fn test_resolve_search_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let file_name = libloading::library_filename("demo");
        std::fs::write(first.path().join(&file_name), b"1").unwrap();
        std::fs::write(second.path().join(&file_name), b"2").unwrap();

        let loader = PluginLoader::new(
            LoaderConfig::new()
                .with_search_paths(vec![second.path().to_path_buf()])
                .with_search_path(first.path()),
        );

        assert_eq!(loader.resolve("demo").unwrap(), first.path().join(&file_name));
    }

    #[test]
    fn test_resolve_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = loader_in(dir.path()).resolve("absent").unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
        assert_eq!(err.code(), 2);
    }

    #[test]
    fn test_explicit_path_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plugin.txt");
        std::fs::write(&file, b"x").unwrap();

        let err = loader_in(dir.path())
            .resolve(file.to_str().unwrap())
            .unwrap_err();
        assert_eq!(err.code(), 1);
    }

    #[test]
    fn test_garbage_library_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(libloading::library_filename("garbage")),
            b"definitely not an object file",
        )
        .unwrap();

        let err = loader_in(dir.path()).load("garbage").unwrap_err();
        assert!(matches!(err, LoadError::Loading { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_library_without_entry_points() {
        // The test executable links this crate but never exports a plugin.
        let library: Library = libloading::os::unix::Library::this().into();

        let err = library.entry_points().unwrap_err();
        assert_eq!(err.code(), 3);
        assert!(matches!(err, LoadError::Symbol { ref symbol, .. } if symbol == CREATE_SYMBOL));
    }

    #[test]
    fn test_foreign_entry_reports_code() {
        let mut out = MaybeUninit::uninit();
        let code = capgroup_load_plugin("surely_no_such_capgroup_plugin".into(), &mut out);
        assert_eq!(code, 2);
    }
}

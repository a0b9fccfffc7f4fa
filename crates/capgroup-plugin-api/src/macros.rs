//! Plugin export macro and its runtime helper.

use std::mem::MaybeUninit;

use capgroup_abi::result::into_int_out_result;
use capgroup_abi::{c_void, CArc};

use crate::error::ConstructorError;
use crate::root::{PluginInner, PluginInnerBox};

/// Body of the generated `capgroup_create_plugin`.
#[doc(hidden)]
pub fn create_root<T, F>(library: &CArc<c_void>, out: &mut MaybeUninit<PluginInnerBox>, ctor: F) -> i32
where
    T: PluginInner + 'static,
    F: FnOnce() -> Result<T, ConstructorError>,
{
    let result = ctor().map(|root| PluginInnerBox::new(root, library.clone()));
    match &result {
        Ok(_) => tracing::debug!("Created plugin root {}", std::any::type_name::<T>()),
        Err(e) => tracing::warn!("Plugin constructor failed: {}", e),
    }
    into_int_out_result(result, out)
}

/// Export a [`PluginInner`] type as a plugin.
///
/// Generates `capgroup_create_plugin` and `capgroup_root_layout`. The one-argument form builds
/// the root with `Default`; the two-argument form takes a constructor returning
/// `Result<T, ConstructorError>`.
///
/// ```ignore
/// capgroup_plugin_api::export_plugin!(MyRoot);
/// capgroup_plugin_api::export_plugin!(MyRoot, MyRoot::from_env);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($ty:ty) => {
        $crate::export_plugin!($ty, || {
            ::core::result::Result::<$ty, $crate::ConstructorError>::Ok(
                <$ty as ::core::default::Default>::default(),
            )
        });
    };
    ($ty:ty, $ctor:expr) => {
        /// Plugin constructor.
        ///
        /// # Safety
        ///
        /// `library` must be the caller's handle to this library.
        #[no_mangle]
        pub unsafe extern "C" fn capgroup_create_plugin(
            library: &$crate::abi::CArc<$crate::abi::c_void>,
            out: &mut ::core::mem::MaybeUninit<$crate::PluginInnerBox>,
        ) -> i32 {
            $crate::macros::create_root::<$ty, _>(library, out, $ctor)
        }

        /// Interface layout this plugin was compiled with.
        #[no_mangle]
        pub extern "C" fn capgroup_root_layout(
        ) -> ::core::option::Option<&'static $crate::abi::layout::LayoutDescriptor> {
            ::core::option::Option::Some($crate::layout::root_layout())
        }

        const _: $crate::loader::CreatePluginFn = capgroup_create_plugin;
        const _: $crate::loader::RootLayoutFn = capgroup_root_layout;
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::MainFeature;
    use crate::impl_features;
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct Unit;

    impl MainFeature for Unit {
        fn print_self(&self) {}

        fn describe(&self) -> usize {
            0
        }
    }

    impl_features!(Unit => Clone);

    impl PluginInner for Unit {
        type Borrowed<'a> = Unit where Self: 'a;
        type Owned = Unit;
        type OwnedMut = Unit;

        fn borrow_features(&mut self) -> Unit {
            self.clone()
        }

        fn into_features(self) -> Unit {
            self
        }

        fn mut_features(&mut self) -> &mut Unit {
            self
        }
    }

    fn library() -> (Arc<()>, CArc<c_void>) {
        let tracker = Arc::new(());
        (tracker.clone(), CArc::from(tracker).into_opaque())
    }

    #[test]
    fn test_create_root_clones_library() {
        let (tracker, library) = library();
        let mut out = MaybeUninit::uninit();

        let code = create_root(&library, &mut out, || Ok(Unit));
        assert_eq!(code, 0);
        assert_eq!(Arc::strong_count(&tracker), 3);

        drop(unsafe { out.assume_init() });
        assert_eq!(Arc::strong_count(&tracker), 2);
    }

    #[test]
    fn test_create_root_failure_leaves_nothing() {
        let (tracker, library) = library();
        let mut out = MaybeUninit::uninit();

        let code = create_root::<Unit, _>(&library, &mut out, || Err(ConstructorError::new("no")));
        assert_eq!(code, 5);
        assert_eq!(Arc::strong_count(&tracker), 2);
    }
}

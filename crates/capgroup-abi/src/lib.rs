//! capgroup ABI primitives
//!
//! Building blocks for objects that cross a dynamic-library boundary as plain data and
//! function pointers:
//!
//! - [`CBox`] and [`CArc`]: owning and reference-counted handles that carry their own release
//!   functions.
//! - [`CSliceRef`], [`CIterator`] and [`OpaqueCallback`]: borrowed views, pull iterators and
//!   push sinks, plus the collect sinks in [`collect`].
//! - [`Container`]: the instance + context pair every vtable function receives.
//! - [`LayoutDescriptor`]: a comparable record of the compiled shapes, checked before any
//!   plugin code runs.
//!
//! # Example
//!
//! ```rust
//! use capgroup_abi::prelude::*;
//!
//! let mut squares = (0..4).map(|i: i32| i * i);
//! let mut collect = DynamicCollect::new();
//! squares.as_citer().feed_into(collect.callback());
//! assert_eq!(collect.into_vec(), vec![0, 1, 4, 9]);
//! ```

pub mod arc;
pub mod boxed;
pub mod callback;
pub mod collect;
pub mod container;
pub mod iter;
pub mod layout;
pub mod result;
pub mod slice;

pub use core::ffi::c_void;

pub use arc::{CArc, ContextGuard};
pub use boxed::CBox;
pub use callback::{FeedCallback, OpaqueCallback};
pub use collect::{CountCollect, DynamicCollect, StaticCollect, Truncated};
pub use container::{Container, RetTmp};
pub use iter::{AsCIterator, CIterator};
pub use layout::{compare_layouts, LayoutDescriptor, LayoutEntry, LayoutMismatch};
pub use result::{IntError, IntResult};
pub use slice::{CSliceMut, CSliceRef};

/// Prelude module with common imports
pub mod prelude {
    pub use crate::arc::{CArc, ContextGuard};
    pub use crate::boxed::CBox;
    pub use crate::callback::{FeedCallback, OpaqueCallback};
    pub use crate::collect::{CountCollect, DynamicCollect, StaticCollect};
    pub use crate::container::{Container, RetTmp};
    pub use crate::iter::{AsCIterator, CIterator};
    pub use crate::result::{IntError, IntResult};
    pub use crate::slice::{CSliceMut, CSliceRef};
    pub use core::ffi::c_void;
}

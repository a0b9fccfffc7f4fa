//! Bulk-collect sinks built on [`OpaqueCallback`].
//!
//! - [`StaticCollect`] fills a caller-provided buffer and drops anything past its capacity.
//! - [`DynamicCollect`] grows by doubling from [`INITIAL_CAPACITY`] and keeps what it has when
//!   it cannot grow.
//! - [`CountCollect`] only counts.

use core::ffi::c_void;
use core::fmt;

use crate::callback::OpaqueCallback;
use crate::slice::CSliceMut;

/// Capacity of the first allocation made by [`DynamicCollect`].
pub const INITIAL_CAPACITY: usize = 64;

/// Sink writing into a fixed buffer.
pub struct StaticCollect<'a, T> {
    buf: CSliceMut<'a, T>,
    size: usize,
}

extern "C" fn static_collect<T>(context: *mut c_void, element: T) -> bool {
    // SAFETY: `context` is the `StaticCollect` that built this callback.
    let this = unsafe { &mut *context.cast::<StaticCollect<'_, T>>() };
    let capacity = this.buf.len();
    if this.size < capacity {
        this.buf.as_mut_slice()[this.size] = element;
        this.size += 1;
    }
    this.size < capacity
}

impl<'a, T> StaticCollect<'a, T> {
    pub fn new(buf: &'a mut [T]) -> Self {
        Self {
            buf: buf.into(),
            size: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of elements written so far.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_full(&self) -> bool {
        self.size >= self.buf.len()
    }

    pub fn callback(&mut self) -> OpaqueCallback<'_, T> {
        // SAFETY: the callback borrows `self` mutably for its whole life.
        unsafe { OpaqueCallback::from_raw((self as *mut Self).cast(), static_collect::<T>) }
    }

    /// The written prefix of the buffer.
    pub fn into_collected(self) -> &'a mut [T] {
        let size = self.size;
        &mut self.buf.into_mut_slice()[..size]
    }
}

/// Sink appending to a buffer that doubles whenever it is full.
pub struct DynamicCollect<T> {
    buf: Vec<T>,
    capacity: usize,
    limit: Option<usize>,
    failed_growth: Option<usize>,
}

extern "C" fn dynamic_collect<T>(context: *mut c_void, element: T) -> bool {
    // SAFETY: `context` is the `DynamicCollect` that built this callback.
    let this = unsafe { &mut *context.cast::<DynamicCollect<T>>() };
    this.push(element)
}

impl<T> Default for DynamicCollect<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DynamicCollect<T> {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            capacity: 0,
            limit: None,
            failed_growth: None,
        }
    }

    /// Refuse to grow past `limit` elements, as if the allocator had failed.
    pub fn with_capacity_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Current capacity under the doubling policy.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.buf
    }

    /// Whether collection stopped because the buffer could not grow.
    pub fn is_truncated(&self) -> bool {
        self.failed_growth.is_some()
    }

    pub fn callback(&mut self) -> OpaqueCallback<'_, T> {
        // SAFETY: the callback borrows `self` mutably for its whole life.
        unsafe { OpaqueCallback::from_raw((self as *mut Self).cast(), dynamic_collect::<T>) }
    }

    fn push(&mut self, element: T) -> bool {
        if self.failed_growth.is_some() {
            return false;
        }

        if self.buf.len() == self.capacity {
            let requested = if self.capacity == 0 {
                INITIAL_CAPACITY
            } else {
                self.capacity.saturating_mul(2)
            };

            if let Err(reason) = self.grow(requested) {
                tracing::warn!(
                    collected = self.buf.len(),
                    requested,
                    reason,
                    "Dynamic collect stopped: buffer could not grow"
                );
                self.failed_growth = Some(requested);
                return false;
            }
        }

        self.buf.push(element);
        true
    }

    fn grow(&mut self, requested: usize) -> Result<(), &'static str> {
        if self.limit.is_some_and(|limit| requested > limit) {
            return Err("capacity limit reached");
        }
        self.buf
            .try_reserve_exact(requested - self.buf.len())
            .map_err(|_| "allocation failed")?;
        self.capacity = requested;
        Ok(())
    }

    /// Everything collected, whether or not collection was cut short.
    pub fn into_vec(self) -> Vec<T> {
        self.buf
    }

    /// Everything collected, or a [`Truncated`] error carrying it when growth failed.
    pub fn into_result(self) -> Result<Vec<T>, Truncated<T>> {
        match self.failed_growth {
            None => Ok(self.buf),
            Some(requested) => Err(Truncated {
                collected: self.buf,
                requested,
            }),
        }
    }
}

/// Dynamic collection stopped early because the buffer could not grow.
pub struct Truncated<T> {
    /// Elements collected before the failure.
    pub collected: Vec<T>,
    /// Capacity the failed growth asked for.
    pub requested: usize,
}

impl<T> fmt::Debug for Truncated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Truncated")
            .field("collected", &self.collected.len())
            .field("requested", &self.requested)
            .finish()
    }
}

impl<T> fmt::Display for Truncated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "collection stopped after {} elements: buffer could not grow to {}",
            self.collected.len(),
            self.requested
        )
    }
}

impl<T> std::error::Error for Truncated<T> {}

/// Sink that ignores payloads and counts them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CountCollect {
    count: usize,
}

extern "C" fn count_collect<T>(context: *mut c_void, _element: T) -> bool {
    // SAFETY: `context` is the `CountCollect` that built this callback.
    let this = unsafe { &mut *context.cast::<CountCollect>() };
    this.count += 1;
    true
}

impl CountCollect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn callback<T>(&mut self) -> OpaqueCallback<'_, T> {
        // SAFETY: the callback borrows `self` mutably for its whole life.
        unsafe { OpaqueCallback::from_raw((self as *mut Self).cast(), count_collect::<T>) }
    }
}

//! Push-based sink protocol.

use core::ffi::c_void;
use core::marker::PhantomData;

pub type CallbackFn<T> = extern "C" fn(context: *mut c_void, element: T) -> bool;

/// FFI-safe `FnMut(T) -> bool`.
///
/// The producer invokes the sink once per element and stops as soon as it returns `false`.
#[repr(C)]
pub struct OpaqueCallback<'a, T> {
    context: *mut c_void,
    func: CallbackFn<T>,
    _lifetime: PhantomData<&'a mut c_void>,
}

extern "C" fn call_closure<F: FnMut(T) -> bool, T>(context: *mut c_void, element: T) -> bool {
    // SAFETY: `context` was produced from `&mut F` in `From<&mut F>`.
    let closure = unsafe { &mut *context.cast::<F>() };
    closure(element)
}

impl<'a, F: FnMut(T) -> bool, T> From<&'a mut F> for OpaqueCallback<'a, T> {
    fn from(closure: &'a mut F) -> Self {
        Self {
            context: (closure as *mut F).cast(),
            func: call_closure::<F, T>,
            _lifetime: PhantomData,
        }
    }
}

impl<T> OpaqueCallback<'_, T> {
    /// Assemble a sink from a context pointer and a function.
    ///
    /// # Safety
    ///
    /// `func` must accept `context` for as long as the callback lives.
    pub unsafe fn from_raw(context: *mut c_void, func: CallbackFn<T>) -> Self {
        Self {
            context,
            func,
            _lifetime: PhantomData,
        }
    }

    /// Deliver one element. Returns whether the sink wants more.
    pub fn call(&mut self, element: T) -> bool {
        (self.func)(self.context, element)
    }
}

/// Producer side of the sink protocol.
pub trait FeedCallback<T> {
    /// Push elements into `callback` until it declines or the source ends.
    ///
    /// Returns the number of elements delivered, including the one that was declined.
    fn feed_into_mut(self, callback: &mut OpaqueCallback<'_, T>) -> usize;

    fn feed_into(self, mut callback: OpaqueCallback<'_, T>) -> usize
    where
        Self: Sized,
    {
        self.feed_into_mut(&mut callback)
    }
}

impl<I: IntoIterator<Item = T>, T> FeedCallback<T> for I {
    fn feed_into_mut(self, callback: &mut OpaqueCallback<'_, T>) -> usize {
        let mut delivered = 0;
        for element in self {
            delivered += 1;
            if !callback.call(element) {
                break;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_stops_after_fifth() {
        let mut seen = Vec::new();
        let mut sink = |v: u32| {
            seen.push(v);
            seen.len() < 5
        };

        let delivered = (0..100u32).feed_into((&mut sink).into());

        assert_eq!(delivered, 5);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_accepting_sink_exhausts_source() {
        let mut total = 0u64;
        let mut sink = |v: u64| {
            total += v;
            true
        };

        let delivered = (1..=10u64).feed_into((&mut sink).into());

        assert_eq!(delivered, 10);
        assert_eq!(total, 55);
    }

    #[test]
    fn test_feed_into_mut_reuses_sink() {
        let mut seen = Vec::new();
        let mut sink = |v: char| {
            seen.push(v);
            true
        };
        let mut callback = OpaqueCallback::from(&mut sink);

        "ab".chars().feed_into_mut(&mut callback);
        "cd".chars().feed_into_mut(&mut callback);
        drop(callback);

        assert_eq!(seen, vec!['a', 'b', 'c', 'd']);
    }
}

//! Integer result convention.
//!
//! A fallible call returns an `i32`: `0` means success and the out slot was written, anything
//! else is an error code the error type knows how to produce and interpret.

use core::mem::MaybeUninit;
use core::num::NonZeroI32;

/// Error type with a non-zero integer representation.
pub trait IntError {
    fn into_int_err(self) -> NonZeroI32;
    fn from_int_err(err: NonZeroI32) -> Self;
}

impl IntError for NonZeroI32 {
    fn into_int_err(self) -> NonZeroI32 {
        self
    }

    fn from_int_err(err: NonZeroI32) -> Self {
        err
    }
}

/// Shorthand methods on `Result`.
pub trait IntResult<T> {
    fn into_int_result(self) -> i32;
    fn into_int_out_result(self, ok_out: &mut MaybeUninit<T>) -> i32;
}

impl<T, E: IntError> IntResult<T> for Result<T, E> {
    fn into_int_result(self) -> i32 {
        into_int_result(self)
    }

    fn into_int_out_result(self, ok_out: &mut MaybeUninit<T>) -> i32 {
        into_int_out_result(self, ok_out)
    }
}

pub fn into_int_result<T, E: IntError>(res: Result<T, E>) -> i32 {
    match res {
        Ok(_) => 0,
        Err(e) => e.into_int_err().get(),
    }
}

/// Write the success value into `ok_out` and return `0`, or return the error code.
pub fn into_int_out_result<T, E: IntError>(res: Result<T, E>, ok_out: &mut MaybeUninit<T>) -> i32 {
    match res {
        Ok(value) => {
            ok_out.write(value);
            0
        }
        Err(e) => e.into_int_err().get(),
    }
}

/// Read back a result produced by [`into_int_out_result`].
///
/// # Safety
///
/// When `code` is `0`, `ok_out` must have been written.
pub unsafe fn from_int_out_result<T, E: IntError>(code: i32, ok_out: MaybeUninit<T>) -> Result<T, E> {
    match NonZeroI32::new(code) {
        // SAFETY: guaranteed by the caller.
        None => Ok(unsafe { ok_out.assume_init() }),
        Some(err) => Err(E::from_int_err(err)),
    }
}

pub fn from_int_result<E: IntError>(code: i32) -> Result<(), E> {
    match NonZeroI32::new(code) {
        None => Ok(()),
        Some(err) => Err(E::from_int_err(err)),
    }
}

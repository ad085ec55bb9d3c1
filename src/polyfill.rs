//! Polyfills for features that are unstable or were stabilized recently.
//!
//! The implementations in this module are copied more-or-less verbatim
//! from the standard library source.

// #![feature(int_log)]

pub trait UsizeExt {
    fn log2(self) -> u32;
}

impl UsizeExt for usize {
    #[inline]
    fn log2(self) -> u32 {
        Self::BITS - 1 - self.leading_zeros()
    }
}

// #![feature(strict_provenance)]

#[cfg(feature = "sptr")]
pub use sptr::Strict;

#[cfg(feature = "sptr")]
use core::{num::NonZeroUsize, ptr::NonNull};

#[cfg(feature = "sptr")]
pub trait NonNullStrict<T> {
    fn addr(self) -> NonZeroUsize
    where
        T: Sized;

    fn with_addr(self, addr: NonZeroUsize) -> Self
    where
        T: Sized;

    fn map_addr(self, f: impl FnOnce(NonZeroUsize) -> NonZeroUsize) -> Self
    where
        T: Sized;
}

#[cfg(feature = "sptr")]
impl<T> NonNullStrict<T> for NonNull<T> {
    fn addr(self) -> NonZeroUsize
    where
        T: Sized,
    {
        // SAFETY: The pointer is guaranteed by the type to be non-null,
        // meaning that the address will be non-zero.
        unsafe { NonZeroUsize::new_unchecked(self.as_ptr().addr()) }
    }

    fn with_addr(self, addr: NonZeroUsize) -> Self
    where
        T: Sized,
    {
        // SAFETY: The result of `ptr::with_addr` is non-null because `addr`
        // is guaranteed to be non-zero.
        unsafe { NonNull::new_unchecked(self.as_ptr().with_addr(addr.get()) as *mut _) }
    }

    fn map_addr(self, f: impl FnOnce(NonZeroUsize) -> NonZeroUsize) -> Self
    where
        T: Sized,
    {
        self.with_addr(f(self.addr()))
    }
}

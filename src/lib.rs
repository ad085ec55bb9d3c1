#![doc = include_str!("../README.md")]
#![no_std]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
// `sptr` deliberately shadows pointer methods that have since been
// stabilized under the same names.
#![allow(unstable_name_collisions)]

#[cfg(any(feature = "alloc", test))]
extern crate alloc;

mod base;
mod polyfill;
mod tree;

pub mod buddy;

#[cfg(feature = "alloc")]
pub mod tracked;


use core::{alloc::Layout, fmt, ptr::NonNull};

#[doc(inline)]
pub use crate::{
    buddy::{Buddy, FreeBlocks},
    tree::BlockStatus,
};

#[cfg(feature = "alloc")]
#[doc(inline)]
pub use crate::tracked::Tracked;

/// The error type returned by failed allocations.
///
/// Each variant is reported by [`Buddy::allocate`] without any change to
/// allocator state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// Zero bytes were requested.
    ZeroSize,

    /// The request exceeds the size of the managed region.
    Oversize,

    /// No sufficiently large free block exists, even accounting for
    /// splits of larger blocks.
    Exhausted,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AllocError::ZeroSize => "requested zero bytes",
            AllocError::Oversize => "request exceeds the managed region",
            AllocError::Exhausted => "no sufficiently large block available",
        };

        f.write_str(msg)
    }
}

/// The error type for allocator constructors.
#[derive(Clone, Debug)]
pub enum AllocInitError {
    /// A necessary allocation failed.
    ///
    /// This variant is returned when a constructor attempts to allocate
    /// the managed region or its metadata, but the underlying allocator
    /// fails.
    ///
    /// The variant contains the [`Layout`] that could not be allocated.
    AllocFailed(Layout),

    /// The configuration of the allocator is invalid.
    ///
    /// This variant is returned when a provided region does not satisfy
    /// the allocator's layout requirements.
    InvalidConfig,

    /// The location of the allocator is invalid.
    ///
    /// This variant is returned when the full size of the managed region
    /// would not fit at the provided address, i.e., pointer calculations
    /// would overflow.
    InvalidLocation,
}

/// Types which provide memory which backs an allocator.
///
/// This trait is implemented by the following types:
/// - The [`Raw`] marker type indicates that an allocator is not backed by
///   another allocator. This is the case when constructing the allocator
///   from raw pointers. Memory used by the allocator can be reclaimed
///   using `.into_raw_parts()`.
/// - The [`Global`] marker type indicates that an allocator is backed by
///   the global allocator. The allocator will free its memory on drop.
pub trait BackingAllocator: Sealed {
    /// Deallocates the memory referenced by `ptr`.
    ///
    /// # Safety
    ///
    /// * `ptr` must denote a block of memory [*currently allocated*] via this allocator, and
    /// * `layout` must [*fit*] that block of memory.
    ///
    /// [*currently allocated*]: https://doc.rust-lang.org/nightly/alloc/alloc/trait.Allocator.html#currently-allocated-memory
    /// [*fit*]: https://doc.rust-lang.org/nightly/alloc/alloc/trait.Allocator.html#memory-fitting
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// A marker type indicating that an allocator is backed by raw pointers.
#[derive(Clone, Debug)]
pub struct Raw;

impl Sealed for Raw {}

impl BackingAllocator for Raw {
    unsafe fn deallocate(&self, _: NonNull<u8>, _: Layout) {}
}

/// The global memory allocator.
#[cfg(any(feature = "alloc", test))]
#[derive(Clone, Debug)]
pub struct Global;

#[cfg(any(feature = "alloc", test))]
impl Sealed for Global {}

#[cfg(any(feature = "alloc", test))]
impl BackingAllocator for Global {
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

#[doc(hidden)]
mod private {
    pub trait Sealed {}
}
use private::Sealed;

//! Release validation via a side table.
//!
//! The core allocator treats the release of an invalid pointer as
//! undefined behavior: it trusts the caller and reconstructs everything
//! else. [`Tracked`] trades memory and a map lookup per call for safety:
//! it records every outstanding allocation in a side table keyed by block
//! offset, so a double free or a pointer the allocator never returned is
//! rejected instead of corrupting the free lists. With the table standing
//! guard, releasing becomes a safe operation.

use alloc::collections::BTreeMap;

use core::{fmt, ptr::NonNull};

use crate::{buddy::Buddy, AllocError, AllocInitError, BackingAllocator};

#[cfg(feature = "sptr")]
use crate::polyfill::NonNullStrict;

use crate::Global;

/// The error type returned by [`Tracked::release`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReleaseError {
    /// The pointer does not denote a block inside the managed region.
    OutOfRegion,

    /// The pointer denotes a block that is not currently allocated:
    /// either it was already released (a double free), or it was never
    /// returned by this allocator.
    Untracked,
}

impl fmt::Display for ReleaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ReleaseError::OutOfRegion => "pointer outside the managed region",
            ReleaseError::Untracked => "pointer does not denote a live allocation",
        };

        f.write_str(msg)
    }
}

/// A buddy allocator that validates releases.
///
/// `Tracked` wraps a [`Buddy`] and keeps a side table of the offset and
/// size of every outstanding allocation. [`Tracked::release`] consults
/// the table before touching the allocator, so invalid pointers are
/// reported as errors rather than being undefined behavior.
pub struct Tracked<const LEVELS: usize, const MIN_SIZE: usize, A: BackingAllocator> {
    inner: Buddy<LEVELS, MIN_SIZE, A>,
    live: BTreeMap<usize, usize>,
}

impl<const LEVELS: usize, const MIN_SIZE: usize> Tracked<LEVELS, MIN_SIZE, Global> {
    /// Attempts to construct a new `Tracked` allocator backed by the
    /// global allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if sufficient memory could not be allocated from
    /// the global allocator.
    pub fn try_new(
        requested: usize,
    ) -> Result<Tracked<LEVELS, MIN_SIZE, Global>, AllocInitError> {
        Buddy::try_new(requested).map(Tracked::new)
    }
}

impl<const LEVELS: usize, const MIN_SIZE: usize, A: BackingAllocator> Tracked<LEVELS, MIN_SIZE, A> {
    /// Wraps `inner`, which must have no outstanding allocations.
    ///
    /// Blocks allocated from `inner` before it was wrapped are unknown to
    /// the side table, and releasing them through the wrapper is reported
    /// as [`ReleaseError::Untracked`].
    pub fn new(inner: Buddy<LEVELS, MIN_SIZE, A>) -> Tracked<LEVELS, MIN_SIZE, A> {
        Tracked {
            inner,
            live: BTreeMap::new(),
        }
    }

    /// Returns a shared reference to the wrapped allocator.
    pub fn allocator(&self) -> &Buddy<LEVELS, MIN_SIZE, A> {
        &self.inner
    }

    /// Attempts to allocate a block of at least `size` bytes.
    ///
    /// # Errors
    ///
    /// As [`Buddy::allocate`].
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<[u8]>, AllocError> {
        let block = self.inner.allocate(size)?;

        let offset = self
            .inner
            .block_offset(block.cast::<u8>().addr())
            .expect("allocated block outside the region");
        self.live.insert(offset, block.len());

        Ok(block)
    }

    /// Releases the block at `ptr` back to the allocator.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the allocator untouched, if `ptr` does
    /// not denote a currently allocated block.
    pub fn release(&mut self, ptr: NonNull<u8>) -> Result<(), ReleaseError> {
        let offset = self
            .inner
            .block_offset(ptr.addr())
            .ok_or(ReleaseError::OutOfRegion)?;

        self.live
            .remove(&offset)
            .ok_or(ReleaseError::Untracked)?;

        // SAFETY: the side table records exactly the blocks returned by
        // `allocate` and not yet released.
        unsafe { self.inner.release(ptr) };

        Ok(())
    }

    /// Returns the number of outstanding allocations.
    pub fn live_blocks(&self) -> usize {
        self.live.len()
    }

    /// Returns the total size in bytes of all outstanding allocations,
    /// counted at their block sizes.
    pub fn live_bytes(&self) -> usize {
        self.live.values().sum()
    }
}

impl<const LEVELS: usize, const MIN_SIZE: usize, A: BackingAllocator> fmt::Debug
    for Tracked<LEVELS, MIN_SIZE, A>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("inner", &self.inner)
            .field("live_blocks", &self.live.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    type RefTracked = Tracked<5, 16, Global>;

    #[test]
    fn release_of_live_block_succeeds() {
        let mut alloc = RefTracked::try_new(256).unwrap();

        let block = alloc.allocate(28).unwrap();
        assert_eq!(alloc.live_blocks(), 1);
        assert_eq!(alloc.live_bytes(), 32);

        alloc.release(block.cast()).unwrap();
        assert_eq!(alloc.live_blocks(), 0);
        assert_eq!(alloc.live_bytes(), 0);
    }

    #[test]
    fn double_free_is_rejected() {
        let mut alloc = RefTracked::try_new(256).unwrap();

        let block: NonNull<u8> = alloc.allocate(40).unwrap().cast();
        alloc.release(block).unwrap();

        assert_eq!(alloc.release(block), Err(ReleaseError::Untracked));
    }

    #[test]
    fn alien_block_is_rejected() {
        let mut alloc = RefTracked::try_new(256).unwrap();
        let _block = alloc.allocate(16).unwrap();

        let mut alien = 0u128;
        let alien_ptr = NonNull::new(&mut alien as *mut u128 as *mut u8).unwrap();

        assert_eq!(alloc.release(alien_ptr), Err(ReleaseError::OutOfRegion));
        assert_eq!(alloc.live_blocks(), 1);
    }

    #[test]
    fn interior_pointer_is_rejected() {
        let mut alloc = RefTracked::try_new(256).unwrap();

        let block: NonNull<u8> = alloc.allocate(64).unwrap().cast();

        // An address inside the block, on a minimum-block boundary, is in
        // the region but tracks no allocation.
        let interior = NonNull::new(unsafe { block.as_ptr().add(16) }).unwrap();
        assert_eq!(alloc.release(interior), Err(ReleaseError::Untracked));

        alloc.release(block).unwrap();
    }
}

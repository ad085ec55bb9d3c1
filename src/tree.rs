//! The block-status tree.
//!
//! The managed region is described by a complete binary tree stored as a
//! flat array of status cells. Cell 0 is the root block covering the
//! whole region; the two children of a block are its halves. A cell is
//! the unit of accounting only while its parent is [`Split`]; deeper
//! cells keep stale values until a split exposes them again.
//!
//! [`Split`]: BlockStatus::Split

use core::alloc::Layout;

/// The status of one block in the tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockStatus {
    /// The block is available. It is linked into the free list for its
    /// level, and its payload bytes host the list link.
    Free = 0,

    /// The block is held by the caller. Its payload is opaque to the
    /// allocator.
    Allocated = 1,

    /// The block is not itself available; its two children are the unit
    /// of accounting.
    Split = 2,
}

/// Returns the tree index of the parent of the block at `index`.
#[inline]
pub fn parent(index: usize) -> usize {
    debug_assert!(index > 0);

    (index - 1) / 2
}

/// Returns the tree index of the front half of the block at `index`.
#[inline]
pub fn left_child(index: usize) -> usize {
    2 * index + 1
}

/// Returns the tree index of the back half of the block at `index`.
#[inline]
pub fn right_child(index: usize) -> usize {
    2 * index + 2
}

/// Returns the tree index of the buddy of the block at `index`.
///
/// The buddy is the sibling produced by the same split. The root has no
/// buddy.
#[inline]
pub fn buddy_of(index: usize) -> usize {
    debug_assert!(index > 0);

    if index % 2 == 0 {
        index - 1
    } else {
        index + 1
    }
}

/// Returns the tree index of the first block of `level`.
#[inline]
pub fn level_start(level: usize) -> usize {
    (1 << level) - 1
}

/// A flat array of block-status cells backed by raw metadata memory.
pub struct StatusTree {
    num_cells: usize,
    cells: *mut u8,
}

impl StatusTree {
    /// Returns the layout of a metadata region suitable for a tree of
    /// `num_cells` cells.
    pub fn map_layout(num_cells: usize) -> Layout {
        Layout::array::<u8>(num_cells).expect("status tree metadata layout error")
    }

    /// Constructs a new tree of `num_cells` cells, backed by `cells`.
    ///
    /// All cells are initialized to [`BlockStatus::Free`].
    ///
    /// A `Layout` describing a suitable region for `cells` can be
    /// obtained with [`StatusTree::map_layout`].
    ///
    /// # Safety
    ///
    /// `cells` must be valid for reads and writes for `num_cells` bytes.
    pub unsafe fn new(num_cells: usize, cells: *mut u8) -> StatusTree {
        assert!(num_cells > 0);
        assert!(!cells.is_null());

        for i in 0..(num_cells as isize) {
            unsafe { cells.offset(i).write(BlockStatus::Free as u8) };
        }

        StatusTree { num_cells, cells }
    }

    /// Returns the number of cells in the tree.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// Gets the status of the indexed cell.
    #[inline]
    pub fn get(&self, index: usize) -> BlockStatus {
        assert!(index < self.num_cells);

        let index: isize = index.try_into().expect("get: index overflowed an isize");

        // SAFETY: index is within the tree, whose cells are initialized.
        let raw = unsafe { self.cells.offset(index).read() };

        match raw {
            0 => BlockStatus::Free,
            1 => BlockStatus::Allocated,
            2 => BlockStatus::Split,
            _ => unreachable!("corrupt status cell"),
        }
    }

    /// Sets the status of the indexed cell.
    #[inline]
    pub fn set(&mut self, index: usize, status: BlockStatus) {
        assert!(index < self.num_cells);

        let index: isize = index.try_into().expect("set: index overflowed an isize");

        // SAFETY: index is within the tree.
        unsafe { self.cells.offset(index).write(status as u8) };
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::mem::ManuallyDrop;
    use std::prelude::rust_2021::*;

    use super::*;

    #[test]
    fn index_arithmetic_round_trips() {
        for index in 1..1024 {
            assert!(parent(left_child(index)) == index);
            assert!(parent(right_child(index)) == index);
            assert_eq!(buddy_of(left_child(index)), right_child(index));
            assert_eq!(buddy_of(right_child(index)), left_child(index));
        }
    }

    #[test]
    fn level_starts() {
        assert_eq!(level_start(0), 0);
        assert_eq!(level_start(1), 1);
        assert_eq!(level_start(2), 3);
        assert_eq!(level_start(3), 7);
        assert_eq!(level_start(4), 15);
    }

    struct VecStatusTree {
        tree: ManuallyDrop<StatusTree>,
        len: usize,
        cap: usize,
    }

    impl VecStatusTree {
        fn new(num_cells: usize) -> VecStatusTree {
            let mut v = Vec::with_capacity(num_cells);
            v.resize(num_cells, 0u8);

            let mut v = ManuallyDrop::new(v);
            let cells = v.as_mut_ptr();
            let len = v.len();
            let cap = v.capacity();

            VecStatusTree {
                tree: ManuallyDrop::new(unsafe { StatusTree::new(num_cells, cells) }),
                len,
                cap,
            }
        }
    }

    impl Drop for VecStatusTree {
        fn drop(&mut self) {
            unsafe {
                let StatusTree { cells, .. } = ManuallyDrop::take(&mut self.tree);

                // Reconstitute the original Vec.
                let v = Vec::from_raw_parts(cells, self.len, self.cap);

                drop(v);
            }
        }
    }

    #[test]
    fn cells_start_free() {
        let fixture = VecStatusTree::new(31);

        for index in 0..31 {
            assert_eq!(fixture.tree.get(index), BlockStatus::Free);
        }
    }

    #[test]
    fn set_and_get() {
        let mut fixture = VecStatusTree::new(7);

        fixture.tree.set(0, BlockStatus::Split);
        fixture.tree.set(1, BlockStatus::Allocated);
        fixture.tree.set(2, BlockStatus::Free);

        assert_eq!(fixture.tree.get(0), BlockStatus::Split);
        assert_eq!(fixture.tree.get(1), BlockStatus::Allocated);
        assert_eq!(fixture.tree.get(2), BlockStatus::Free);

        fixture.tree.set(0, BlockStatus::Free);
        assert_eq!(fixture.tree.get(0), BlockStatus::Free);
    }
}

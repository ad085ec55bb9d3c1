#![no_main]

use std::ptr::NonNull;

use arbitrary::Arbitrary;
use buddytree::{Buddy, Global};
use libfuzzer_sys::fuzz_target;

const LEVELS: usize = 8;
const MIN_SIZE: usize = 16;

#[derive(Clone, Debug, Arbitrary)]
enum BuddyOp {
    Allocate { size: u16 },
    Release { index: usize },
}

#[derive(Clone, Debug, Arbitrary)]
struct Args {
    region_size: u16,
    ops: Vec<BuddyOp>,
}

struct Allocation {
    id: u8,
    block: NonNull<[u8]>,
}

unsafe fn paint(block: NonNull<[u8]>, id: u8) {
    let buf = std::slice::from_raw_parts_mut(block.cast::<u8>().as_ptr(), block.len());
    buf.fill(id);
}

unsafe fn verify(block: NonNull<[u8]>, id: u8) {
    let buf = std::slice::from_raw_parts(block.cast::<u8>().as_ptr(), block.len());
    assert!(
        buf.iter().all(|&byte| byte == id),
        "allocation payload clobbered"
    );
}

fuzz_target!(|args: Args| {
    let mut alloc: Buddy<LEVELS, MIN_SIZE, Global> =
        match Buddy::try_new(args.region_size as usize) {
            Ok(a) => a,
            Err(_) => return,
        };

    let mut outstanding: Vec<Allocation> = Vec::new();

    for (id, op) in args.ops.into_iter().enumerate() {
        let id = id as u8;

        match op {
            BuddyOp::Allocate { size } => {
                if let Ok(block) = alloc.allocate(size as usize) {
                    unsafe { paint(block, id) };
                    outstanding.push(Allocation { id, block });
                }
            }

            BuddyOp::Release { index } => {
                if outstanding.is_empty() {
                    continue;
                }

                let a = outstanding.swap_remove(index % outstanding.len());
                unsafe {
                    verify(a.block, a.id);
                    alloc.release(a.block.cast());
                }
            }
        }
    }

    for a in outstanding {
        unsafe {
            verify(a.block, a.id);
            alloc.release(a.block.cast());
        }
    }

    // Everything was released, so the region must be one free block again.
    assert_eq!(alloc.free_blocks(0).count(), 1);
});

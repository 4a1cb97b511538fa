
use core::alloc::Layout;

use crate::arena::SliceArena;
use crate::freelist::NULL_OFFSET;

use super::*;

/// A guard that backs a heap with memory from the system allocator on
/// creation and releases it when dropped.
struct HeapInitGuard {
    addr: usize,
    layout: Layout,
    heap: Allocator<SliceArena>,
}

impl HeapInitGuard {
    /// Creates and initializes a heap that can grow up to `capacity` bytes.
    fn init(capacity: usize) -> Self {
        let layout = Layout::from_size_align(capacity, DOUBLEWORD_SIZE).unwrap();
        let addr = unsafe { std::alloc::alloc(layout) as usize };
        assert!(addr != 0);

        let arena = unsafe { SliceArena::new(addr, capacity) };
        let mut heap = Allocator::new(arena);
        heap.init().expect("failed to initialize the test heap");

        Self { addr, layout, heap }
    }

    /// The payload address the first allocation lands on: one doubleword
    /// past the prologue payload.
    fn first_payload_addr(&self) -> usize {
        self.heap.base + DOUBLEWORD_SIZE
    }

    /// Collects the total sizes of all blocks on the free list, in list
    /// order.
    fn free_block_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::new();
        let mut offset = self.heap.free_list.head_offset();
        while offset != NULL_OFFSET {
            let block = unsafe { self.heap.free_list.block_at(offset) };
            unsafe {
                sizes.push(block.size());
                offset = block.succ_offset();
            }
        }
        sizes
    }

    /// The bytes of heap not taken by the padding word and the sentinels.
    fn usable_heap_size(&self) -> usize {
        self.heap.arena.size() - 2 * DOUBLEWORD_SIZE
    }

    /// Asserts that the invariant checker finds a clean heap.
    fn assert_consistent(&self) {
        assert_eq!(self.heap.check(false), 0);
    }
}

impl Drop for HeapInitGuard {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.addr as *mut u8, self.layout) }
    }
}

/// Enough room for the sentinels and a handful of chunks.
const SMALL_HEAP: usize = 2 * DOUBLEWORD_SIZE + 4 * CHUNK_SIZE;

/// Exactly the sentinels plus the initial chunk; the arena cannot grow any
/// further after `init`.
const EXHAUSTED_HEAP: usize = 2 * DOUBLEWORD_SIZE + CHUNK_SIZE;

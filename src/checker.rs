//! The heap invariant checker.
//!
//! Walks the physical block chain from the prologue to the epilogue and the
//! free list from its anchor, and reports every structural violation through
//! the logging channel. The return value is the number of violations found,
//! so tests can use the checker as an oracle after every mutating operation.

use crate::alignment::is_aligned;
use crate::arena::Arena;
use crate::block::Block;
use crate::freelist::NULL_OFFSET;
use crate::{Allocator, DOUBLEWORD_SIZE, MIN_BLOCK_SIZE};

pub(crate) fn check_heap<A: Arena>(heap: &Allocator<A>, verbose: bool) -> usize {
    let lo = heap.arena.lo();
    let hi = heap.arena.hi();
    let mut violations = 0usize;

    if verbose {
        log::trace!("heap [{:#x}, {:#x}), base {:#x}", lo, hi, heap.base);
    }

    let prologue = unsafe { Block::from_payload_addr(heap.base) };
    unsafe {
        if prologue.size() != DOUBLEWORD_SIZE || !prologue.is_allocated() {
            log::error!(
                "bad prologue header {:#x} at {:#x}",
                prologue.header().raw(),
                prologue.header_addr()
            );
            // the walk below steps over the prologue by its size, which
            // cannot be trusted anymore.
            return violations + 1;
        }
    }

    let mut free_blocks_by_walk = 0usize;
    let mut block = prologue;
    loop {
        unsafe {
            if verbose {
                trace_block(block);
            }
            if block.is_epilogue() {
                break;
            }
            if block != prologue {
                let size = block.size();

                // a block whose size is broken would derail the walk, so
                // report it and stop here.
                if size < MIN_BLOCK_SIZE
                    || size % DOUBLEWORD_SIZE != 0
                    || block.payload_addr() + size > hi
                {
                    log::error!(
                        "block at {:#x} has a corrupt size {}",
                        block.payload_addr(),
                        size
                    );
                    return violations + 1;
                }

                if !is_aligned(block.payload_addr(), DOUBLEWORD_SIZE) {
                    log::error!(
                        "payload at {:#x} is not doubleword aligned",
                        block.payload_addr()
                    );
                    violations += 1;
                }

                if block.header().raw() != block.footer().raw() {
                    log::error!(
                        "block at {:#x}: header {:#x} does not match footer {:#x}",
                        block.payload_addr(),
                        block.header().raw(),
                        block.footer().raw()
                    );
                    violations += 1;
                }

                if !block.is_allocated() {
                    free_blocks_by_walk += 1;

                    // immediate coalescing means two free neighbours can
                    // never survive a mutating operation.
                    if !block.next_physical().is_allocated() {
                        log::error!(
                            "adjacent free blocks at {:#x} and {:#x}",
                            block.payload_addr(),
                            block.next_physical().payload_addr()
                        );
                        violations += 1;
                    }
                }
            }
            block = block.next_physical();
        }
    }

    unsafe {
        if block.payload_addr() != hi {
            log::error!(
                "physical walk ended at {:#x} instead of the heap top {:#x}",
                block.payload_addr(),
                hi
            );
            violations += 1;
        }
        if block.size() != 0 || !block.is_allocated() {
            log::error!("bad epilogue header {:#x}", block.header().raw());
            violations += 1;
        }
    }

    violations += check_free_list(heap, lo, hi, free_blocks_by_walk);

    violations
}

fn check_free_list<A: Arena>(
    heap: &Allocator<A>,
    lo: usize,
    hi: usize,
    free_blocks_by_walk: usize,
) -> usize {
    let mut violations = 0usize;
    let mut free_blocks_by_list = 0usize;

    let head = heap.free_list.head_offset();
    if head != NULL_OFFSET {
        let head_block = unsafe { heap.free_list.block_at(head) };
        if head_block.payload_addr() >= lo && head_block.payload_addr() < hi {
            unsafe {
                if head_block.pred_offset() != NULL_OFFSET {
                    log::error!(
                        "free list head at {:#x} has a predecessor",
                        head_block.payload_addr()
                    );
                    violations += 1;
                }
            }
        }
    }

    // a sound list can never hold more blocks than physically fit in the
    // heap; anything longer means a link cycle.
    let max_steps = (hi - lo) / MIN_BLOCK_SIZE + 1;
    let mut steps = 0usize;

    let mut offset = head;
    while offset != NULL_OFFSET {
        steps += 1;
        if steps > max_steps {
            log::error!("free list does not terminate");
            return violations + 1;
        }

        let block = unsafe { heap.free_list.block_at(offset) };
        let addr = block.payload_addr();
        if addr < lo || addr >= hi || !is_aligned(addr, DOUBLEWORD_SIZE) {
            log::error!("free list link {:#x} points outside the heap", offset);
            return violations + 1;
        }

        unsafe {
            if block.is_allocated() {
                log::error!("allocated block at {:#x} is on the free list", addr);
                violations += 1;
            }

            free_blocks_by_list += 1;

            let succ = block.succ_offset();
            if succ != NULL_OFFSET {
                let succ_addr = heap.free_list.block_at(succ).payload_addr();
                if succ_addr >= lo
                    && succ_addr < hi
                    && heap.free_list.block_at(succ).pred_offset() != offset
                {
                    log::error!(
                        "successor of {:#x} does not point back at it",
                        addr
                    );
                    violations += 1;
                }
            }
            offset = succ;
        }
    }

    if free_blocks_by_list != free_blocks_by_walk {
        log::error!(
            "free block counts disagree: {} on the list, {} in the heap",
            free_blocks_by_list,
            free_blocks_by_walk
        );
        violations += 1;
    }

    violations
}

/// Reports one block through the logging channel, the free list links
/// included for free blocks.
unsafe fn trace_block(block: Block) {
    if block.is_epilogue() {
        log::trace!("{:#x}: epilogue", block.payload_addr());
        return;
    }

    let header = block.header();
    let footer = block.footer();
    let state = |allocated: bool| if allocated { 'a' } else { 'f' };

    log::trace!(
        "{:#x}: header = [{}:{}], footer = [{}:{}]",
        block.payload_addr(),
        header.size(),
        state(header.is_allocated()),
        footer.size(),
        state(footer.is_allocated())
    );

    if !header.is_allocated() {
        log::trace!(
            "\tpred = [{}], succ = [{}]",
            block.pred_offset(),
            block.succ_offset()
        );
    }
}

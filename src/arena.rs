use crate::alignment::{align_down, align_up};
use crate::DOUBLEWORD_SIZE;

/// The page level provider that the allocator grows its heap from.
///
/// The heap is a single contiguous region `[lo, hi)` that only ever grows:
/// every successful [`grow`](Arena::grow) appends bytes at `hi` and returns
/// the address of the first appended byte. Implementations must hand out a
/// doubleword aligned `lo` on the first growth, and every later growth must
/// continue exactly where the previous one ended.
pub trait Arena {
    /// Appends `bytes` bytes to the heap and returns the address of the
    /// first new byte, or `None` if the arena cannot grow (quota, out of
    /// backing memory). The allocator only ever asks for doubleword
    /// multiples.
    fn grow(&mut self, bytes: usize) -> Option<usize>;

    /// The lowest address of the heap region. Zero before the first growth.
    fn lo(&self) -> usize;

    /// One past the highest address of the heap region.
    fn hi(&self) -> usize;

    /// The current heap size in bytes.
    fn size(&self) -> usize {
        self.hi() - self.lo()
    }
}

/// An arena over a fixed, caller provided memory region. The heap grows
/// inside the region until its capacity is exhausted.
///
/// This is the arena used by the test suite, backed by memory from the
/// system allocator, but it works over any exclusively owned region.
pub struct SliceArena {
    lo: usize,
    brk: usize,
    end: usize,
}

impl SliceArena {
    /// Creates an arena over the region `[addr, addr + capacity)`.
    ///
    /// The usable region is trimmed to doubleword boundaries on both ends.
    ///
    /// # Safety
    ///
    /// The region must be valid, writable, not used by anything else, and
    /// must stay alive for as long as the arena (and any allocator built on
    /// top of it) is in use.
    pub unsafe fn new(addr: usize, capacity: usize) -> Self {
        let lo = align_up(addr, DOUBLEWORD_SIZE);
        let end = align_down(addr + capacity, DOUBLEWORD_SIZE);
        Self { lo, brk: lo, end }
    }

    /// The bytes still available for growth.
    pub fn remaining(&self) -> usize {
        self.end - self.brk
    }
}

impl Arena for SliceArena {
    fn grow(&mut self, bytes: usize) -> Option<usize> {
        let new_brk = self.brk.checked_add(bytes)?;
        if new_brk > self.end {
            return None;
        }
        let prev = self.brk;
        self.brk = new_brk;
        Some(prev)
    }

    fn lo(&self) -> usize {
        self.lo
    }

    fn hi(&self) -> usize {
        self.brk
    }
}

/// An arena that grows the heap by moving the program break with `sbrk(2)`.
///
/// The first growth rounds the break up to a doubleword boundary so that
/// the heap starts aligned; after that the break moves in lockstep with the
/// heap end.
#[cfg(feature = "sbrk")]
pub struct SbrkArena {
    lo: usize,
    brk: usize,
}

#[cfg(feature = "sbrk")]
impl SbrkArena {
    /// Creates an arena that has not yet touched the program break.
    pub const fn new() -> Self {
        Self { lo: 0, brk: 0 }
    }
}

#[cfg(feature = "sbrk")]
impl Default for SbrkArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "sbrk")]
impl Arena for SbrkArena {
    fn grow(&mut self, bytes: usize) -> Option<usize> {
        use libc::{intptr_t, sbrk};

        if self.lo == 0 {
            // first growth: the current break may be unaligned, so request
            // the padding up front and start the heap past it.
            let current = unsafe { sbrk(0) };
            if current as isize == -1 {
                return None;
            }
            let pad = align_up(current as usize, DOUBLEWORD_SIZE) - current as usize;
            let previous = unsafe { sbrk((bytes + pad) as intptr_t) };
            if previous as isize == -1 {
                return None;
            }
            self.lo = previous as usize + pad;
            self.brk = self.lo + bytes;
            Some(self.lo)
        } else {
            let previous = unsafe { sbrk(bytes as intptr_t) };
            if previous as isize == -1 {
                return None;
            }
            self.brk = previous as usize + bytes;
            Some(previous as usize)
        }
    }

    fn lo(&self) -> usize {
        self.lo
    }

    fn hi(&self) -> usize {
        self.brk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::alloc::Layout;

    struct Backing {
        addr: usize,
        layout: Layout,
    }

    impl Backing {
        fn new(capacity: usize) -> Self {
            let layout = Layout::from_size_align(capacity, DOUBLEWORD_SIZE).unwrap();
            let addr = unsafe { std::alloc::alloc(layout) as usize };
            assert!(addr != 0);
            Self { addr, layout }
        }
    }

    impl Drop for Backing {
        fn drop(&mut self) {
            unsafe { std::alloc::dealloc(self.addr as *mut u8, self.layout) }
        }
    }

    #[test]
    fn growth_is_contiguous() {
        let backing = Backing::new(256);
        let mut arena = unsafe { SliceArena::new(backing.addr, 256) };

        let first = arena.grow(16).unwrap();
        let second = arena.grow(64).unwrap();

        assert_eq!(first, arena.lo());
        assert_eq!(second, first + 16);
        assert_eq!(arena.hi(), first + 80);
        assert_eq!(arena.size(), 80);
    }

    #[test]
    fn growth_past_capacity_fails_without_moving_the_heap_end() {
        let backing = Backing::new(64);
        let mut arena = unsafe { SliceArena::new(backing.addr, 64) };

        arena.grow(48).unwrap();
        let hi = arena.hi();

        assert_eq!(arena.grow(64), None);
        assert_eq!(arena.hi(), hi);

        // the remaining capacity is still usable after a failed growth.
        assert!(arena.grow(16).is_some());
    }

    #[test]
    fn region_is_trimmed_to_doubleword_bounds() {
        let backing = Backing::new(128);
        // push the start off alignment on purpose.
        let mut arena = unsafe { SliceArena::new(backing.addr + 3, 64) };

        let lo = arena.grow(16).unwrap();
        assert_eq!(lo % DOUBLEWORD_SIZE, 0);
        assert_eq!(lo, arena.lo());
    }
}

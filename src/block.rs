use crate::alignment::is_aligned;
use crate::tag::BoundaryTag;
use crate::{DOUBLEWORD_SIZE, WORD_SIZE};

/// A view of one physical block, addressed by its payload pointer.
///
/// The payload address is what callers of the allocator receive; the header
/// word sits one word below it and the footer word sits at the end of the
/// block. A free block additionally stores its predecessor and successor
/// offsets in the first two payload words.
///
/// ```text
/// [ header | payload ........................... | footer ]
///          ^ payload_addr         payload_addr + size - 8 ^
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Block(usize);

impl Block {
    /// Returns a [`Block`] for the given payload address.
    ///
    /// # Safety
    ///
    /// `addr` must be the doubleword aligned payload address of a block
    /// inside the heap.
    pub unsafe fn from_payload_addr(addr: usize) -> Block {
        debug_assert!(is_aligned(addr, DOUBLEWORD_SIZE));
        Block(addr)
    }

    /// The payload address of this block.
    pub fn payload_addr(self) -> usize {
        self.0
    }

    /// The address of this block's header word.
    pub fn header_addr(self) -> usize {
        self.0 - WORD_SIZE
    }

    /// Reads this block's header tag.
    ///
    /// # Safety
    ///
    /// The block must be valid.
    pub unsafe fn header(self) -> BoundaryTag {
        BoundaryTag::read(self.header_addr())
    }

    /// The address of this block's footer word.
    ///
    /// # Safety
    ///
    /// The block must be valid, since the footer position depends on the
    /// size stored in the header.
    pub unsafe fn footer_addr(self) -> usize {
        self.0 + self.size() - DOUBLEWORD_SIZE
    }

    /// Reads this block's footer tag.
    ///
    /// # Safety
    ///
    /// The block must be valid.
    pub unsafe fn footer(self) -> BoundaryTag {
        BoundaryTag::read(self.footer_addr())
    }

    /// The total size of this block, header and footer included.
    ///
    /// # Safety
    ///
    /// The block must be valid.
    pub unsafe fn size(self) -> usize {
        self.header().size() as usize
    }

    /// Is this block allocated?
    ///
    /// # Safety
    ///
    /// The block must be valid.
    pub unsafe fn is_allocated(self) -> bool {
        self.header().is_allocated()
    }

    /// Is this block the epilogue sentinel? The epilogue is the only block
    /// whose header encodes a zero size.
    ///
    /// # Safety
    ///
    /// The block must be valid.
    pub unsafe fn is_epilogue(self) -> bool {
        self.size() == 0
    }

    /// Writes matching header and footer tags for this block.
    ///
    /// # Safety
    ///
    /// The whole range `[header_addr, payload_addr + size)` must be writable
    /// heap memory owned by this block.
    pub unsafe fn write_tags(self, size: usize, allocated: bool) {
        let tag = BoundaryTag::pack(size as u32, allocated);
        tag.write(self.header_addr());
        tag.write(self.0 + size - DOUBLEWORD_SIZE);
    }

    /// The physically next block, found by skipping over this block's size.
    ///
    /// # Safety
    ///
    /// The block must be valid and must not be the epilogue.
    pub unsafe fn next_physical(self) -> Block {
        Block(self.0 + self.size())
    }

    /// The physically previous block, found through the previous block's
    /// footer, which sits directly below this block's header.
    ///
    /// # Safety
    ///
    /// The block must be valid and must not be the prologue.
    pub unsafe fn prev_physical(self) -> Block {
        let prev_footer = BoundaryTag::read(self.0 - DOUBLEWORD_SIZE);
        Block(self.0 - prev_footer.size() as usize)
    }

    /// Reads the tag of the physically previous block's footer without
    /// materializing the previous block.
    ///
    /// # Safety
    ///
    /// The block must be valid and must not be the prologue.
    pub unsafe fn prev_footer(self) -> BoundaryTag {
        BoundaryTag::read(self.0 - DOUBLEWORD_SIZE)
    }

    /// The predecessor offset stored in the first payload word.
    ///
    /// # Safety
    ///
    /// The block must be valid and free.
    pub unsafe fn pred_offset(self) -> u32 {
        (self.0 as *const u32).read()
    }

    /// The successor offset stored in the second payload word.
    ///
    /// # Safety
    ///
    /// The block must be valid and free.
    pub unsafe fn succ_offset(self) -> u32 {
        ((self.0 + WORD_SIZE) as *const u32).read()
    }

    /// Stores the predecessor offset in the first payload word.
    ///
    /// # Safety
    ///
    /// The block must be valid and free.
    pub unsafe fn set_pred_offset(self, offset: u32) {
        (self.0 as *mut u32).write(offset)
    }

    /// Stores the successor offset in the second payload word.
    ///
    /// # Safety
    ///
    /// The block must be valid and free.
    pub unsafe fn set_succ_offset(self, offset: u32) {
        ((self.0 + WORD_SIZE) as *mut u32).write(offset)
    }

    /// Zeroes both link words.
    ///
    /// # Safety
    ///
    /// The block must be valid and free.
    pub unsafe fn clear_links(self) {
        self.set_pred_offset(0);
        self.set_succ_offset(0);
    }
}

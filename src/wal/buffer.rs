//! Block-aligned write buffer.
//!
//! Direct I/O needs the source address, the length and the file offset
//! of every write to be multiples of the device block. The buffer is
//! built from 4096-byte aligned blocks so its base address always
//! qualifies, and [`AlignedBuffer::padded`] zero-fills up to the next
//! block boundary.

/// Block size for aligned writes.
pub const ALIGNMENT: usize = 4096;

/// Smallest header-sized gap the reader can recognise as padding.
const MIN_PAD: usize = 8;

#[repr(C, align(4096))]
#[derive(Clone, Copy)]
struct Block([u8; ALIGNMENT]);

const _: () = assert!(std::mem::size_of::<Block>() == ALIGNMENT);

/// Zero bytes needed after `len` to reach a block boundary.
///
/// A gap shorter than one header word is stretched by a whole block so a
/// reader landing in the padding always sees a full zero word.
#[inline]
pub fn padding_len(len: u64) -> u64 {
    let align = ALIGNMENT as u64;
    let pad = (align - len % align) % align;
    if pad != 0 && pad < MIN_PAD as u64 {
        pad + align
    } else {
        pad
    }
}

/// Append-only byte buffer on an aligned allocation.
pub struct AlignedBuffer {
    blocks: Vec<Block>,
    capacity: usize,
    len: usize,
}

impl AlignedBuffer {
    /// Create a buffer holding at least `capacity` bytes of records.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).div_ceil(ALIGNMENT) * ALIGNMENT;
        // One spare block for the stretched padding case.
        let blocks = vec![Block([0; ALIGNMENT]); capacity / ALIGNMENT + 1];
        Self {
            blocks,
            capacity,
            len: 0,
        }
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: `Block` is a plain byte array with no padding, so the
        // block vector is `blocks.len() * ALIGNMENT` initialized bytes.
        unsafe {
            std::slice::from_raw_parts(
                self.blocks.as_ptr().cast::<u8>(),
                self.blocks.len() * ALIGNMENT,
            )
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `bytes`, with exclusive access through `&mut self`.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.blocks.as_mut_ptr().cast::<u8>(),
                self.blocks.len() * ALIGNMENT,
            )
        }
    }

    /// Usable capacity for record bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes that can still be appended before a flush is needed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.len
    }

    /// Reserve `n` zeroed bytes at the end and return them for writing.
    ///
    /// The caller checks `remaining()` first.
    pub fn append_zeroed(&mut self, n: usize) -> &mut [u8] {
        debug_assert!(n <= self.remaining());
        let start = self.len;
        self.len += n;
        let region = &mut self.bytes_mut()[start..start + n];
        region.fill(0);
        region
    }

    /// Buffered bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes()[..self.len]
    }

    /// Buffered bytes zero-padded to a block boundary.
    pub fn padded(&mut self) -> &[u8] {
        let end = self.len + padding_len(self.len as u64) as usize;
        let len = self.len;
        self.bytes_mut()[len..end].fill(0);
        &self.bytes()[..end]
    }

    /// Discard buffered bytes.
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Drop the first `n` bytes and move the rest to the front.
    ///
    /// `n` must be a multiple of [`ALIGNMENT`] so the kept bytes stay at
    /// the same offset within their block.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len && n % ALIGNMENT == 0);
        let len = self.len;
        self.bytes_mut().copy_within(n..len, 0);
        self.len = len - n;
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len)
            .finish()
    }
}

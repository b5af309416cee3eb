use core::fmt;

use thiserror::Error;

use crate::Word;

/// Default capacity, in bytes, of a freshly constructed [`Memory`].
///
/// Callers that need a different budget use [`Memory::with_capacity`].
pub const DEFAULT_MEM_CAP: usize = 102_400;

/// Fatal memory-access fault. All variants are fatal: the VM has no
/// recovery path for an out-of-bounds access.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// A write would exceed the buffer's fixed capacity.
    #[error("out of memory: write of {len} bytes at offset {offset} exceeds capacity {capacity}")]
    OutOfMemory {
        /// Offset the write started at.
        offset: usize,
        /// Number of bytes the write attempted.
        len: usize,
        /// The buffer's fixed capacity.
        capacity: usize,
    },
    /// A 32-byte load would read past the buffer's fixed capacity.
    #[error("invalid memory access: 32-byte load at offset {offset} exceeds capacity {capacity}")]
    InvalidAccess {
        /// Offset the load started at.
        offset: usize,
        /// The buffer's fixed capacity.
        capacity: usize,
    },
}

/// A pre-allocated, fixed-capacity byte buffer backing VM linear memory.
///
/// There is no growth: capacity is fixed at construction and every write
/// is bounds-checked against it. `size` tracks one past the highest byte
/// offset ever written, matching the "preallocated segment" semantics the
/// emitter relies on when it serializes the prefix of memory that holds
/// string/constant literals into the program image (see
/// [`Memory::store`]).
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    buf: Vec<u8>,
    capacity: usize,
    size: usize,
}

impl Memory {
    /// Construct an empty buffer with the default capacity
    /// ([`DEFAULT_MEM_CAP`]).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEM_CAP)
    }

    /// Construct an empty buffer with an explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Memory {
            buf: vec![0u8; capacity],
            capacity,
            size: 0,
        }
    }

    /// Fixed capacity of this buffer, in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// One past the highest byte offset ever written.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Zero the buffer and reset `size`, keeping its capacity. Used when a
    /// VM instance is reused across transactions that don't share memory.
    pub fn clear(&mut self) {
        self.buf.iter_mut().for_each(|b| *b = 0);
        self.size = 0;
    }

    /// Overwrite the whole buffer with `data`, zero-padding any remainder,
    /// and set `size` to `data.len()`. Used to install the emitter's
    /// preallocated memory image at the start of a run.
    pub fn load_image(&mut self, data: &[u8]) -> Result<(), MemoryError> {
        if data.len() > self.capacity {
            return Err(MemoryError::OutOfMemory {
                offset: 0,
                len: data.len(),
                capacity: self.capacity,
            });
        }
        self.buf[..data.len()].copy_from_slice(data);
        self.buf[data.len()..].iter_mut().for_each(|b| *b = 0);
        self.size = data.len();
        Ok(())
    }

    /// Write a 32-byte big-endian word at `offset`, zero-padding the slot
    /// first. Idempotent with respect to `size`: writing twice at the same
    /// offset leaves `size` unchanged on the second call.
    pub fn set32(&mut self, offset: usize, word: Word) -> Result<(), MemoryError> {
        self.set(offset, &word.to_be_bytes())
    }

    /// Write `bytes` starting at `offset`.
    pub fn set(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= self.capacity)
            .ok_or(MemoryError::OutOfMemory {
                offset,
                len: bytes.len(),
                capacity: self.capacity,
            })?;
        self.buf[offset..end].copy_from_slice(bytes);
        self.size = self.size.max(end);
        Ok(())
    }

    /// Write a single byte at `offset`.
    pub fn set8(&mut self, offset: usize, byte: u8) -> Result<(), MemoryError> {
        self.set(offset, &[byte])
    }

    /// Read a 32-byte big-endian word starting at `offset`.
    pub fn load32(&self, offset: usize) -> Result<Word, MemoryError> {
        let bytes = self.load(offset, 32)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Word::from_be_bytes(&arr))
    }

    /// Read `len` bytes starting at `offset`.
    pub fn load(&self, offset: usize, len: usize) -> Result<&[u8], MemoryError> {
        let end = offset
            .checked_add(len)
            // strictly `capacity - len`, not `capacity`: a read that ends
            // exactly at `capacity` is in bounds.
            .filter(|&end| end <= self.capacity)
            .ok_or(MemoryError::InvalidAccess {
                offset,
                capacity: self.capacity,
            })?;
        Ok(&self.buf[offset..end])
    }

    /// Return a copy of the first `size` bytes: the portion of the buffer
    /// that has ever been written. Used by the emitter to serialize the
    /// preallocated segment into a [`crate`]-external program image.
    pub fn store(&self) -> Vec<u8> {
        self.buf[..self.size].to_vec()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("capacity", &self.capacity)
            .field("size", &self.size)
            .field("prefix", &hex::encode(&self.buf[..self.size.min(32)]))
            .finish()
    }
}

//! Growable byte container used by streams for their input and output queues.
//!
//! A [`Buffer`] tracks its own logical capacity so growth is observable and
//! deterministic: appends double the capacity until the data fits, and
//! capacity never shrinks until the buffer is dropped.

use crate::error::{Error, Result};

/// A growable byte buffer with explicit length and capacity.
///
/// Invariant: `len() <= capacity()`.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    data: Vec<u8>,
    capacity: usize,
}

impl Buffer {
    /// Allocates an empty buffer able to hold `capacity` bytes.
    ///
    /// A requested capacity of zero is rounded up to one byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Alloc`] if the memory cannot be reserved.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut buffer = Self::default();
        buffer.reserve(capacity.max(1))?;

        Ok(buffer)
    }

    /// Copies `bytes` into a new buffer sized to fit them.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let mut buffer = Self::with_capacity(bytes.len())?;
        buffer.append(bytes)?;

        Ok(buffer)
    }

    /// Ensures the buffer can hold at least `capacity` bytes.
    ///
    /// Requests at or below the current capacity are no-ops.
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity {
            return Ok(());
        }

        self.data.try_reserve_exact(capacity - self.data.len())?;
        self.capacity = capacity;

        Ok(())
    }

    /// Appends `bytes`, doubling the capacity until they fit.
    ///
    /// Bytes already stored are never modified.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let needed = self
            .data
            .len()
            .checked_add(bytes.len())
            .ok_or(Error::OutOfRange("buffer length overflow"))?;

        if needed > self.capacity {
            let mut grown = self.capacity.max(1);
            while grown < needed {
                grown = grown
                    .checked_mul(2)
                    .ok_or(Error::OutOfRange("buffer capacity overflow"))?;
            }

            self.reserve(grown)?;
        }

        self.data.extend_from_slice(bytes);

        Ok(())
    }

    /// Copies `len` bytes starting at `offset` into a new, independent buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if the range exceeds the stored data.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Buffer> {
        let end = offset
            .checked_add(len)
            .ok_or(Error::OutOfRange("slice range overflow"))?;

        if offset > self.data.len() || end > self.data.len() {
            return Err(Error::OutOfRange("slice exceeds buffer length"));
        }

        let mut out = Buffer::with_capacity(len)?;
        out.append(&self.data[offset..end])?;

        Ok(out)
    }

    /// Removes the first `count` bytes, shifting the remainder to the front.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.data.len());
        self.data.drain(..count);
    }

    /// Drops all stored bytes; capacity is kept.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

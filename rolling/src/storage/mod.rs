//! Storage backends for [crate::RollingBuffer].
//!
//! A [Storage] owns the slots of the ring and knows nothing about cursors: callers pass in the
//! index at which to read or write, and bulk operations wrap from the end of the storage back to
//! its start when a range crosses the boundary (see [split]).

use crate::{Element, Error};

mod heap;
pub(crate) use heap::Heap;
mod native;
pub(crate) use native::Native;

/// Owned backing slots of a ring.
pub(crate) trait Storage<T: Element>: Send {
    /// Number of slots, or zero once released.
    fn capacity(&self) -> usize;

    /// Whether the slots can be exposed as a slice.
    fn is_array_backed(&self) -> bool;

    /// Returns the slots as a slice, if array backed.
    fn array(&self) -> Option<&[T]>;

    /// Returns the slots as a mutable slice, if array backed.
    fn array_mut(&mut self) -> Option<&mut [T]>;

    /// Read the slot at `index`.
    fn read(&self, index: usize) -> Result<T, Error>;

    /// Write `value` into the slot at `index`.
    fn write(&mut self, index: usize, value: T) -> Result<(), Error>;

    /// Read `dst.len()` slots starting at `index`, wrapping at the end of the storage.
    fn read_slice(&self, index: usize, dst: &mut [T]) -> Result<(), Error>;

    /// Write all of `src` starting at `index`, wrapping at the end of the storage.
    fn write_slice(&mut self, index: usize, src: &[T]) -> Result<(), Error>;

    /// Replace the slots with `capacity` fresh ones, relocating the `len` slots starting at `start`
    /// (wrapping) to the beginning of the new storage.
    ///
    /// On error, the existing slots are left untouched.
    fn grow(&mut self, capacity: usize, start: usize, len: usize) -> Result<(), Error>;

    /// Return the slots to the system. Safe to call more than once.
    fn release(&mut self);
}

/// Split a range of `len` slots starting at `index` into the part before the end of the storage
/// and the part that wraps around to its start.
pub(crate) fn split(index: usize, len: usize, capacity: usize) -> Result<(usize, usize), Error> {
    if index >= capacity || len > capacity {
        return Err(Error::InvalidRange(index, len, capacity));
    }
    let first = len.min(capacity - index);
    Ok((first, len - first))
}

/// Ensure `capacity` is non-zero and its byte size can be represented.
pub(crate) fn layout_check<T: Element>(capacity: usize) -> Result<(), Error> {
    if capacity == 0 {
        return Err(Error::InvalidCapacity(capacity));
    }
    std::alloc::Layout::array::<T>(capacity).map_err(|_| Error::CapacityOverflow)?;
    Ok(())
}

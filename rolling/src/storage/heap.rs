use super::{layout_check, split, Storage};
use crate::{Element, Error};

/// Allocate `capacity` default-initialized slots without aborting on allocation failure.
fn slots<T: Element>(capacity: usize) -> Result<Vec<T>, Error> {
    layout_check::<T>(capacity)?;
    let mut data = Vec::new();
    data.try_reserve_exact(capacity)
        .map_err(|_| Error::AllocationFailed(capacity))?;
    data.resize(capacity, T::default());
    Ok(data)
}

/// [Storage] backed by a `Vec<T>` that can be exposed to callers.
pub(crate) struct Heap<T: Element> {
    data: Vec<T>,
}

impl<T: Element> Heap<T> {
    /// Allocate `capacity` default-initialized slots.
    pub(crate) fn new(capacity: usize) -> Result<Self, Error> {
        Ok(Self {
            data: slots(capacity)?,
        })
    }

    /// Adopt `data` as the slots, without copying.
    pub(crate) fn wrap(data: Vec<T>) -> Result<Self, Error> {
        if data.is_empty() {
            return Err(Error::EmptyArray);
        }
        Ok(Self { data })
    }
}

impl<T: Element> Storage<T> for Heap<T> {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn is_array_backed(&self) -> bool {
        true
    }

    fn array(&self) -> Option<&[T]> {
        Some(&self.data)
    }

    fn array_mut(&mut self) -> Option<&mut [T]> {
        Some(&mut self.data)
    }

    fn read(&self, index: usize) -> Result<T, Error> {
        self.data
            .get(index)
            .copied()
            .ok_or(Error::InvalidRange(index, 1, self.data.len()))
    }

    fn write(&mut self, index: usize, value: T) -> Result<(), Error> {
        let len = self.data.len();
        let slot = self
            .data
            .get_mut(index)
            .ok_or(Error::InvalidRange(index, 1, len))?;
        *slot = value;
        Ok(())
    }

    fn read_slice(&self, index: usize, dst: &mut [T]) -> Result<(), Error> {
        let (first, second) = split(index, dst.len(), self.data.len())?;
        dst[..first].copy_from_slice(&self.data[index..index + first]);
        dst[first..].copy_from_slice(&self.data[..second]);
        Ok(())
    }

    fn write_slice(&mut self, index: usize, src: &[T]) -> Result<(), Error> {
        let (first, second) = split(index, src.len(), self.data.len())?;
        self.data[index..index + first].copy_from_slice(&src[..first]);
        self.data[..second].copy_from_slice(&src[first..]);
        Ok(())
    }

    fn grow(&mut self, capacity: usize, start: usize, len: usize) -> Result<(), Error> {
        if capacity < len {
            return Err(Error::InvalidRange(0, len, capacity));
        }
        let mut next = slots(capacity)?;
        if len > 0 {
            self.read_slice(start, &mut next[..len])?;
        }
        self.data = next;
        Ok(())
    }

    fn release(&mut self) {
        self.data = Vec::new();
    }
}

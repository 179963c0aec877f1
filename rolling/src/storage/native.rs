use super::{layout_check, split, Storage};
use crate::{
    memory::{Platform, RawBlock},
    Element, Error,
};
use tracing::debug;

/// [Storage] backed by a block of native memory.
///
/// The block is freed exactly once: on [Storage::grow] (after its contents have been copied), on
/// [Storage::release], or on drop. An empty `block` records that the memory has already been
/// returned, independent of whether the owning buffer considers itself released.
pub(crate) struct Native<T: Element> {
    platform: Platform,
    block: Option<RawBlock<T>>,
}

impl<T: Element> Native<T> {
    /// Allocate a zeroed block of `capacity` slots from `platform`.
    pub(crate) fn new(platform: Platform, capacity: usize) -> Result<Self, Error> {
        layout_check::<T>(capacity)?;
        let block = platform.allocate(capacity)?;
        Ok(Self {
            platform,
            block: Some(block),
        })
    }

    fn block(&self) -> Result<&RawBlock<T>, Error> {
        self.block.as_ref().ok_or(Error::Released)
    }

    fn block_mut(&mut self) -> Result<&mut RawBlock<T>, Error> {
        self.block.as_mut().ok_or(Error::Released)
    }
}

impl<T: Element> Storage<T> for Native<T> {
    fn capacity(&self) -> usize {
        self.block.as_ref().map_or(0, RawBlock::len)
    }

    fn is_array_backed(&self) -> bool {
        false
    }

    fn array(&self) -> Option<&[T]> {
        None
    }

    fn array_mut(&mut self) -> Option<&mut [T]> {
        None
    }

    fn read(&self, index: usize) -> Result<T, Error> {
        self.platform.read(self.block()?, index)
    }

    fn write(&mut self, index: usize, value: T) -> Result<(), Error> {
        let platform = self.platform;
        platform.write(self.block_mut()?, index, value)
    }

    fn read_slice(&self, index: usize, dst: &mut [T]) -> Result<(), Error> {
        let block = self.block()?;
        let (first, second) = split(index, dst.len(), block.len())?;
        self.platform.copy_to_slice(block, index, dst, 0, first)?;
        if second > 0 {
            self.platform.copy_to_slice(block, 0, dst, first, second)?;
        }
        Ok(())
    }

    fn write_slice(&mut self, index: usize, src: &[T]) -> Result<(), Error> {
        let platform = self.platform;
        let block = self.block_mut()?;
        let (first, second) = split(index, src.len(), block.len())?;
        platform.copy_from_slice(src, 0, block, index, first)?;
        if second > 0 {
            platform.copy_from_slice(src, first, block, 0, second)?;
        }
        Ok(())
    }

    fn grow(&mut self, capacity: usize, start: usize, len: usize) -> Result<(), Error> {
        if capacity < len {
            return Err(Error::InvalidRange(0, len, capacity));
        }
        layout_check::<T>(capacity)?;

        // Copy the live range into the new block before touching the old one
        let old = self.block()?;
        let mut next = self.platform.allocate(capacity)?;
        if len > 0 {
            let (first, second) = split(start, len, old.len())?;
            self.platform.copy(old, start, &mut next, 0, first)?;
            if second > 0 {
                self.platform.copy(old, 0, &mut next, first, second)?;
            }
        }

        if let Some(old) = self.block.replace(next) {
            self.platform.free(old);
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(block) = self.block.take() {
            debug!(capacity = block.len(), "freeing native storage");
            self.platform.free(block);
        }
    }
}

impl<T: Element> Drop for Native<T> {
    fn drop(&mut self) {
        self.release();
    }
}

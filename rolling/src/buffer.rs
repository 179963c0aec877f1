use crate::{
    memory::Platform,
    storage::{Heap, Native, Storage},
    Element, Error,
};
use std::num::NonZeroUsize;
use tracing::{debug, warn};

/// Where a [RollingBuffer] keeps its elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backing {
    /// A heap-allocated array that can be exposed via [RollingBuffer::array].
    Heap,
    /// A block of native memory (falls back to [Backing::Heap] if unavailable).
    Native,
}

/// Configuration for a [RollingBuffer].
#[derive(Clone, Debug)]
pub struct Config {
    /// The number of elements the buffer can hold before growing.
    pub capacity: NonZeroUsize,

    /// The storage to request.
    pub backing: Backing,

    /// The platform consulted (and used) for native memory.
    pub platform: Platform,
}

impl Config {
    /// Configuration for a heap-backed buffer.
    pub fn heap(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            backing: Backing::Heap,
            platform: Platform::detect(),
        }
    }

    /// Configuration for a buffer backed by native memory, if available.
    pub fn native(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            backing: Backing::Native,
            platform: Platform::detect(),
        }
    }
}

/// Compute the capacity to grow to when `increment` more elements must fit.
///
/// Small increments grow the buffer by roughly half, while increments larger than half of the
/// current capacity at least double it. The result always leaves room for `increment` new
/// elements, even when `increment` exceeds the current capacity.
fn grown_capacity(capacity: usize, increment: usize) -> Option<usize> {
    let grown = if increment.checked_mul(2)? <= capacity {
        capacity.checked_mul(3)? / 2 + 1
    } else {
        capacity.checked_mul(2)?
    };
    Some(grown.max(capacity.checked_add(increment)?))
}

/// A growable circular buffer of fixed-width elements.
///
/// Elements are written at `put_index` and read from `take_index`, both wrapping modulo the
/// capacity. The `size` live elements always occupy the (possibly wrapping) range starting at
/// `take_index`.
///
/// The buffer is not thread-safe. Once [Self::release] is called (or the buffer is dropped), its
/// storage is returned to the system and every other operation fails with [Error::Released].
pub struct RollingBuffer<T: Element> {
    storage: Box<dyn Storage<T>>,

    capacity: usize,
    put_index: usize,
    take_index: usize,
    size: usize,

    released: bool,
}

impl<T: Element> RollingBuffer<T> {
    fn new(storage: Box<dyn Storage<T>>) -> Self {
        let capacity = storage.capacity();
        Self {
            storage,
            capacity,
            put_index: 0,
            take_index: 0,
            size: 0,
            released: false,
        }
    }

    /// Create an empty buffer using the provided configuration.
    ///
    /// If native storage is requested but `cfg.platform` has no native memory, the buffer is
    /// backed by the heap instead.
    pub fn init(cfg: Config) -> Result<Self, Error> {
        let capacity = cfg.capacity.get();
        let storage: Box<dyn Storage<T>> = match cfg.backing {
            Backing::Native if cfg.platform.has_native_memory() => {
                Box::new(Native::new(cfg.platform, capacity)?)
            }
            Backing::Native => {
                warn!(capacity, "native memory unavailable, falling back to heap");
                Box::new(Heap::new(capacity)?)
            }
            Backing::Heap => Box::new(Heap::new(capacity)?),
        };
        Ok(Self::new(storage))
    }

    /// Create an empty heap-backed buffer of `capacity` elements.
    pub fn allocate(capacity: usize) -> Result<Self, Error> {
        let capacity = NonZeroUsize::new(capacity).ok_or(Error::InvalidCapacity(capacity))?;
        Self::init(Config::heap(capacity))
    }

    /// Create an empty buffer of `capacity` elements backed by native memory, if available.
    pub fn allocate_native(capacity: usize) -> Result<Self, Error> {
        let capacity = NonZeroUsize::new(capacity).ok_or(Error::InvalidCapacity(capacity))?;
        Self::init(Config::native(capacity))
    }

    /// Create an empty buffer that adopts `array` as its storage.
    ///
    /// The buffer's capacity is `array.len()`, and [Self::array] returns the adopted elements.
    pub fn wrap(array: Vec<T>) -> Result<Self, Error> {
        Ok(Self::new(Box::new(Heap::wrap(array)?)))
    }

    #[inline]
    fn check(&self) -> Result<(), Error> {
        if self.released {
            return Err(Error::Released);
        }
        Ok(())
    }

    /// Returns whether [Self::release] has been called.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Returns the number of elements the buffer can hold without growing.
    pub fn capacity(&self) -> Result<usize, Error> {
        self.check()?;
        Ok(self.capacity)
    }

    /// Returns the number of elements held.
    pub fn size(&self) -> Result<usize, Error> {
        self.check()?;
        Ok(self.size)
    }

    /// Returns whether no elements are held.
    pub fn is_empty(&self) -> Result<bool, Error> {
        self.check()?;
        Ok(self.size == 0)
    }

    /// Returns whether the buffer holds `capacity` elements.
    pub fn is_full(&self) -> Result<bool, Error> {
        self.check()?;
        Ok(self.size == self.capacity)
    }

    /// Returns the number of free slots.
    pub fn remaining(&self) -> Result<usize, Error> {
        self.check()?;
        Ok(self.capacity - self.size)
    }

    /// Returns the slot the next element will be written to.
    pub fn put_index(&self) -> Result<usize, Error> {
        self.check()?;
        Ok(self.put_index)
    }

    /// Returns the slot the next element will be read from.
    pub fn take_index(&self) -> Result<usize, Error> {
        self.check()?;
        Ok(self.take_index)
    }

    /// Discard all held elements, leaving storage contents and capacity untouched.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.check()?;
        self.put_index = 0;
        self.take_index = 0;
        self.size = 0;
        Ok(())
    }

    /// Grow the buffer, if needed, so that `increment` more elements fit.
    pub fn expand_capacity(&mut self, increment: usize) -> Result<(), Error> {
        self.check()?;
        self.ensure_capacity(increment)
    }

    /// Grow when `increment` is not strictly less than the free slots, relocating the live
    /// elements to the start of the new storage.
    fn ensure_capacity(&mut self, increment: usize) -> Result<(), Error> {
        let remaining = self.capacity - self.size;
        if increment < remaining {
            return Ok(());
        }
        let capacity =
            grown_capacity(self.capacity, increment).ok_or(Error::CapacityOverflow)?;
        self.storage.grow(capacity, self.take_index, self.size)?;
        debug!(
            from = self.capacity,
            to = capacity,
            size = self.size,
            increment,
            "grew buffer"
        );

        self.capacity = capacity;
        self.take_index = 0;
        self.put_index = self.size;
        Ok(())
    }

    #[inline]
    fn advance_put(&mut self, step: usize) {
        self.put_index = (self.put_index + step) % self.capacity;
        self.size += step;
    }

    #[inline]
    fn advance_take(&mut self, step: usize) {
        self.take_index = (self.take_index + step) % self.capacity;
        self.size -= step;
    }

    /// Append a single element.
    pub fn put(&mut self, value: T) -> Result<(), Error> {
        self.check()?;
        if self.capacity - self.size <= 1 {
            self.ensure_capacity(1)?;
        }
        self.storage.write(self.put_index, value)?;
        self.advance_put(1);
        Ok(())
    }

    /// Append all elements of `src`.
    pub fn put_slice(&mut self, src: &[T]) -> Result<(), Error> {
        self.put_range(src, 0, src.len())
    }

    /// Append the `len` elements of `src` starting at `offset`.
    pub fn put_range(&mut self, src: &[T], offset: usize, len: usize) -> Result<(), Error> {
        self.check()?;
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= src.len())
            .ok_or(Error::InvalidRange(offset, len, src.len()))?;
        if self.capacity - self.size <= len {
            self.ensure_capacity(len)?;
        }
        self.storage.write_slice(self.put_index, &src[offset..end])?;
        self.advance_put(len);
        Ok(())
    }

    /// Remove and return the oldest element.
    pub fn take(&mut self) -> Result<T, Error> {
        self.check()?;
        if self.size < 1 {
            return Err(Error::Empty);
        }
        let value = self.storage.read(self.take_index)?;
        self.advance_take(1);
        Ok(value)
    }

    /// Remove and return the `n` oldest elements.
    pub fn take_n(&mut self, n: usize) -> Result<Vec<T>, Error> {
        self.check()?;
        if n < 1 || n > self.size {
            return Err(Error::InsufficientData(n, self.size));
        }
        let mut out = vec![T::default(); n];
        self.storage.read_slice(self.take_index, &mut out)?;
        self.advance_take(n);
        Ok(out)
    }

    /// Remove the `n` oldest elements, writing them into `dst` starting at `offset`.
    pub fn take_into(&mut self, dst: &mut [T], offset: usize, n: usize) -> Result<(), Error> {
        self.check()?;
        let end = offset
            .checked_add(n)
            .filter(|end| *end <= dst.len())
            .ok_or(Error::InvalidRange(offset, n, dst.len()))?;
        if n < 1 || n > self.size {
            return Err(Error::InsufficientData(n, self.size));
        }
        self.storage
            .read_slice(self.take_index, &mut dst[offset..end])?;
        self.advance_take(n);
        Ok(())
    }

    /// Remove and return every held element.
    ///
    /// Like [Self::take_n], fails with [Error::InsufficientData] if the buffer is empty.
    pub fn take_all(&mut self) -> Result<Vec<T>, Error> {
        self.check()?;
        self.take_n(self.size)
    }

    /// Remove every held element, writing them into `dst` starting at `offset`. Returns the number
    /// of elements written.
    pub fn take_all_into(&mut self, dst: &mut [T], offset: usize) -> Result<usize, Error> {
        self.check()?;
        let n = self.size;
        self.take_into(dst, offset, n)?;
        Ok(n)
    }

    /// Returns whether the buffer is backed by an array accessible via [Self::array].
    pub fn has_array(&self) -> Result<bool, Error> {
        self.check()?;
        Ok(self.storage.is_array_backed())
    }

    /// Returns the backing array.
    ///
    /// The slice aliases the buffer's storage: elements are found at the (possibly wrapping)
    /// range starting at [Self::take_index]. Fails with [Error::NotArrayBacked] for native
    /// storage.
    pub fn array(&self) -> Result<&[T], Error> {
        self.check()?;
        self.storage.array().ok_or(Error::NotArrayBacked)
    }

    /// Returns the backing array for direct writes.
    ///
    /// After writing at [Self::put_index] (wrapping), call [Self::shift_put_index] to make the
    /// written elements visible to `take`.
    pub fn array_mut(&mut self) -> Result<&mut [T], Error> {
        self.check()?;
        self.storage.array_mut().ok_or(Error::NotArrayBacked)
    }

    /// Discard `step` of the oldest elements without copying them (for example, after reading
    /// them directly from [Self::array]).
    pub fn shift_take_index(&mut self, step: usize) -> Result<(), Error> {
        self.check()?;
        if step > self.size {
            return Err(Error::InsufficientData(step, self.size));
        }
        self.advance_take(step);
        Ok(())
    }

    /// Mark `step` slots starting at [Self::put_index] as written (for example, after writing
    /// them directly through [Self::array_mut]).
    pub fn shift_put_index(&mut self, step: usize) -> Result<(), Error> {
        self.check()?;
        let remaining = self.capacity - self.size;
        if step > remaining {
            return Err(Error::InsufficientSpace(step, remaining));
        }
        self.advance_put(step);
        Ok(())
    }

    /// Return the buffer's storage to the system.
    ///
    /// Calling this more than once has no further effect.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.storage.release();
        debug!(capacity = self.capacity, size = self.size, "released buffer");
        self.capacity = 0;
        self.put_index = 0;
        self.take_index = 0;
        self.size = 0;
        self.released = true;
    }
}

impl<T: Element> Drop for RollingBuffer<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Element> std::fmt::Debug for RollingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingBuffer")
            .field("capacity", &self.capacity)
            .field("put_index", &self.put_index)
            .field("take_index", &self.take_index)
            .field("size", &self.size)
            .field("array_backed", &self.storage.is_array_backed())
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RollingCharBuffer;
    use commonware_macros::test_traced;
    use commonware_utils::NZUsize;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::VecDeque;
    use test_case::test_case;

    fn buffer<T: Element>(backing: Backing, capacity: usize) -> RollingBuffer<T> {
        RollingBuffer::init(Config {
            capacity: NZUsize!(capacity),
            backing,
            platform: Platform::detect(),
        })
        .unwrap()
    }

    /// Assert the cursor state of `buffer`.
    fn assert_state<T: Element>(
        buffer: &RollingBuffer<T>,
        capacity: usize,
        size: usize,
        take_index: usize,
        put_index: usize,
    ) {
        assert_eq!(buffer.capacity().unwrap(), capacity);
        assert_eq!(buffer.size().unwrap(), size);
        assert_eq!(buffer.take_index().unwrap(), take_index);
        assert_eq!(buffer.put_index().unwrap(), put_index);
        assert_eq!(buffer.remaining().unwrap(), capacity - size);
    }

    #[test]
    fn test_grown_capacity() {
        // Small increments grow by half (plus one)
        assert_eq!(grown_capacity(6, 1), Some(10));
        assert_eq!(grown_capacity(6, 3), Some(10));
        assert_eq!(grown_capacity(10, 2), Some(16));

        // Increments beyond half of the capacity double it
        assert_eq!(grown_capacity(6, 4), Some(12));
        assert_eq!(grown_capacity(1, 1), Some(2));

        // Increments beyond the capacity always fit
        assert_eq!(grown_capacity(6, 10), Some(16));
        assert_eq!(grown_capacity(2, 100), Some(102));

        // Overflow
        assert_eq!(grown_capacity(usize::MAX, 1), None);
        assert_eq!(grown_capacity(4, usize::MAX), None);
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_operation_sequence(backing: Backing) {
        let mut buffer = buffer::<char>(backing, 6);
        assert_eq!(buffer.has_array().unwrap(), backing == Backing::Heap);

        buffer.put('1').unwrap();
        buffer.put_slice(&['2', '3']).unwrap();
        buffer.put_slice(&['4', '5']).unwrap();
        assert_state(&buffer, 6, 5, 0, 5);

        assert_eq!(buffer.take().unwrap(), '1');
        assert_eq!(buffer.size().unwrap(), 4);
        assert_eq!(buffer.take_n(2).unwrap(), vec!['2', '3']);
        assert_state(&buffer, 6, 2, 3, 5);

        // Four slots free, so three elements fit without growing (and wrap)
        buffer.put_slice(&['6', 'a', 'b']).unwrap();
        assert_state(&buffer, 6, 5, 3, 2);
        if backing == Backing::Heap {
            assert_eq!(buffer.array().unwrap(), &['a', 'b', '3', '4', '5', '6']);
        }

        // One slot free, so two elements force growth (6 * 3 / 2 + 1)
        buffer.put_slice(&['c', 'd']).unwrap();
        assert_state(&buffer, 10, 7, 0, 7);
        if backing == Backing::Heap {
            assert_eq!(
                buffer.array().unwrap(),
                &['4', '5', '6', 'a', 'b', 'c', 'd', '\0', '\0', '\0']
            );
        }

        assert_eq!(
            buffer.take_all().unwrap(),
            vec!['4', '5', '6', 'a', 'b', 'c', 'd']
        );
        assert_state(&buffer, 10, 0, 7, 7);

        buffer.release();
        assert!(buffer.is_released());
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_growth_preserves_wrapped_order(backing: Backing) {
        let mut buffer = buffer::<u16>(backing, 6);

        // Arrange take_index = 4, put_index = 2
        buffer.put_slice(&[0, 0, 0, 0]).unwrap();
        buffer.shift_take_index(4).unwrap();
        buffer.put_slice(&[1, 2, 3, 4]).unwrap();
        assert_state(&buffer, 6, 4, 4, 2);

        // Force growth with wrapped live data
        buffer.put_slice(&[5, 6]).unwrap();
        assert_state(&buffer, 10, 6, 0, 6);
        assert!(buffer.remaining().unwrap() >= 2);
        assert_eq!(buffer.take_all().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_large_put_fits(backing: Backing) {
        let mut buffer = buffer::<u8>(backing, 6);
        let data: Vec<u8> = (0..10).collect();
        buffer.put_slice(&data).unwrap();
        assert!(buffer.capacity().unwrap() >= 16);
        assert_eq!(buffer.size().unwrap(), 10);
        assert_eq!(buffer.take_n(10).unwrap(), data);
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_wraparound(backing: Backing) {
        let mut buffer = buffer::<char>(backing, 6);
        buffer.put_slice(&['a', 'b', 'c', 'd']).unwrap();
        assert_eq!(buffer.take_n(3).unwrap(), vec!['a', 'b', 'c']);

        // Write across the end of the storage
        buffer.put_slice(&['e', 'f', 'g']).unwrap();
        assert_state(&buffer, 6, 4, 3, 1);
        assert!(buffer.take_index().unwrap() > buffer.put_index().unwrap());

        // Read across the end of the storage
        let mut dst = ['x'; 6];
        buffer.take_into(&mut dst, 1, 4).unwrap();
        assert_eq!(dst, ['x', 'd', 'e', 'f', 'g', 'x']);
        assert_state(&buffer, 6, 0, 1, 1);
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_round_trip_without_growth(backing: Backing) {
        let mut buffer = buffer::<i32>(backing, 16);
        let data = [7, -1, 3, 0, 42];
        buffer.put_slice(&data).unwrap();
        assert_eq!(buffer.capacity().unwrap(), 16);
        assert_eq!(buffer.take_n(data.len()).unwrap(), data);
        assert!(buffer.is_empty().unwrap());
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_single_put_grows_before_full(backing: Backing) {
        let mut buffer = buffer::<u8>(backing, 2);
        buffer.put(1).unwrap();
        assert_state(&buffer, 2, 1, 0, 1);

        // One slot free is not enough for a single put
        buffer.put(2).unwrap();
        assert_state(&buffer, 4, 2, 0, 2);
        assert!(!buffer.is_full().unwrap());
        assert_eq!(buffer.take().unwrap(), 1);
        assert_eq!(buffer.take().unwrap(), 2);
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_put_range(backing: Backing) {
        let mut buffer = buffer::<u8>(backing, 8);
        let src = [1, 2, 3, 4, 5];
        buffer.put_range(&src, 1, 3).unwrap();
        assert_eq!(buffer.take_all().unwrap(), vec![2, 3, 4]);

        // Empty ranges are accepted anywhere within the source
        buffer.put_range(&src, 5, 0).unwrap();
        buffer.put_slice(&[]).unwrap();
        assert!(buffer.is_empty().unwrap());

        // Rejected ranges leave the buffer untouched
        let before = (buffer.take_index().unwrap(), buffer.put_index().unwrap());
        assert_eq!(
            buffer.put_range(&src, 3, 3),
            Err(Error::InvalidRange(3, 3, 5))
        );
        assert_eq!(
            buffer.put_range(&src, usize::MAX, 2),
            Err(Error::InvalidRange(usize::MAX, 2, 5))
        );
        assert_eq!(
            before,
            (buffer.take_index().unwrap(), buffer.put_index().unwrap())
        );
        assert_eq!(buffer.capacity().unwrap(), 8);
        assert!(buffer.is_empty().unwrap());
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_take_errors(backing: Backing) {
        let mut buffer = buffer::<u8>(backing, 4);
        assert_eq!(buffer.take(), Err(Error::Empty));
        assert_eq!(buffer.take_n(1), Err(Error::InsufficientData(1, 0)));

        buffer.put_slice(&[1, 2]).unwrap();
        assert_eq!(buffer.take_n(0), Err(Error::InsufficientData(0, 2)));
        assert_eq!(buffer.take_n(3), Err(Error::InsufficientData(3, 2)));

        let mut dst = [0u8; 2];
        assert_eq!(
            buffer.take_into(&mut dst, 1, 2),
            Err(Error::InvalidRange(1, 2, 2))
        );
        assert_eq!(
            buffer.take_into(&mut dst, 0, 3),
            Err(Error::InvalidRange(0, 3, 2))
        );
        let mut big = [0u8; 8];
        assert_eq!(
            buffer.take_into(&mut big, 0, 3),
            Err(Error::InsufficientData(3, 2))
        );
        assert_eq!(
            buffer.take_all_into(&mut dst, 1),
            Err(Error::InvalidRange(1, 2, 2))
        );

        // Nothing was consumed by the rejected takes
        assert_state(&buffer, 4, 2, 0, 2);
        assert_eq!(buffer.take_all_into(&mut dst, 0).unwrap(), 2);
        assert_eq!(dst, [1, 2]);
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_take_all_when_empty(backing: Backing) {
        let mut buffer = buffer::<u8>(backing, 4);
        assert_eq!(buffer.take_all(), Err(Error::InsufficientData(0, 0)));

        let mut dst = [9u8; 2];
        assert_eq!(
            buffer.take_all_into(&mut dst, 0),
            Err(Error::InsufficientData(0, 0))
        );
        assert_eq!(
            buffer.take_all_into(&mut dst, 3),
            Err(Error::InvalidRange(3, 0, 2))
        );
        assert_eq!(dst, [9, 9]);

        // Draining empties the buffer, so a second drain fails
        buffer.put_slice(&[1, 2]).unwrap();
        assert_eq!(buffer.take_all_into(&mut dst, 0).unwrap(), 2);
        assert_eq!(dst, [1, 2]);
        assert_eq!(buffer.take_all(), Err(Error::InsufficientData(0, 0)));
        assert_state(&buffer, 4, 0, 2, 2);
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_empty_put_grows_full_buffer(backing: Backing) {
        let mut buffer = buffer::<u8>(backing, 4);
        buffer.shift_put_index(4).unwrap();
        assert!(buffer.is_full().unwrap());

        // No free slots, so even an empty put grows (4 * 3 / 2 + 1)
        buffer.put_slice(&[]).unwrap();
        assert_state(&buffer, 7, 4, 0, 4);
        buffer.put_range(&[1, 2], 2, 0).unwrap();
        assert_state(&buffer, 7, 4, 0, 4);

        buffer.put(5).unwrap();
        assert_eq!(buffer.take_all().unwrap(), vec![0, 0, 0, 0, 5]);
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_reset(backing: Backing) {
        let mut buffer = buffer::<u8>(backing, 4);
        buffer.put_slice(&[1, 2, 3]).unwrap();
        buffer.take().unwrap();
        buffer.reset().unwrap();
        assert_state(&buffer, 4, 0, 0, 0);

        // Contents are untouched, so shifting the put index exposes them again
        buffer.shift_put_index(3).unwrap();
        assert_eq!(buffer.take_all().unwrap(), vec![1, 2, 3]);
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_shift_bounds(backing: Backing) {
        let mut buffer = buffer::<u8>(backing, 4);
        assert_eq!(
            buffer.shift_take_index(1),
            Err(Error::InsufficientData(1, 0))
        );
        assert_eq!(
            buffer.shift_put_index(5),
            Err(Error::InsufficientSpace(5, 4))
        );

        // Filling every slot through the cursor is allowed
        buffer.shift_put_index(4).unwrap();
        assert!(buffer.is_full().unwrap());
        assert_state(&buffer, 4, 4, 0, 0);
        assert_eq!(
            buffer.shift_put_index(1),
            Err(Error::InsufficientSpace(1, 0))
        );

        // Native slots are zeroed, heap slots default-initialized
        assert_eq!(buffer.take_all().unwrap(), vec![0, 0, 0, 0]);
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_expand_capacity(backing: Backing) {
        let mut buffer = buffer::<u8>(backing, 8);
        buffer.put_slice(&[1, 2, 3]).unwrap();

        // Enough room already
        buffer.expand_capacity(4).unwrap();
        assert_eq!(buffer.capacity().unwrap(), 8);

        // Not strictly less than the free slots
        buffer.expand_capacity(5).unwrap();
        assert_eq!(buffer.capacity().unwrap(), 16);
        assert_eq!(
            buffer.expand_capacity(usize::MAX),
            Err(Error::CapacityOverflow)
        );
        assert_state(&buffer, 16, 3, 0, 3);
        assert_eq!(buffer.take_all().unwrap(), vec![1, 2, 3]);
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_release(backing: Backing) {
        let mut buffer = buffer::<char>(backing, 4);
        buffer.put_slice(&['a', 'b']).unwrap();
        buffer.release();
        buffer.release();
        assert!(buffer.is_released());

        // Every operation fails, every time
        for _ in 0..2 {
            assert_eq!(buffer.capacity(), Err(Error::Released));
            assert_eq!(buffer.size(), Err(Error::Released));
            assert_eq!(buffer.is_empty(), Err(Error::Released));
            assert_eq!(buffer.is_full(), Err(Error::Released));
            assert_eq!(buffer.remaining(), Err(Error::Released));
            assert_eq!(buffer.put_index(), Err(Error::Released));
            assert_eq!(buffer.take_index(), Err(Error::Released));
            assert_eq!(buffer.reset(), Err(Error::Released));
            assert_eq!(buffer.expand_capacity(1), Err(Error::Released));
            assert_eq!(buffer.put('c'), Err(Error::Released));
            assert_eq!(buffer.put_slice(&['c']), Err(Error::Released));
            assert_eq!(buffer.put_range(&['c'], 0, 1), Err(Error::Released));
            assert_eq!(buffer.take(), Err(Error::Released));
            assert_eq!(buffer.take_n(1), Err(Error::Released));
            assert_eq!(buffer.take_into(&mut ['x'], 0, 1), Err(Error::Released));
            assert_eq!(buffer.take_all(), Err(Error::Released));
            assert_eq!(buffer.take_all_into(&mut ['x'], 0), Err(Error::Released));
            assert_eq!(buffer.has_array(), Err(Error::Released));
            assert_eq!(buffer.array().err(), Some(Error::Released));
            assert_eq!(buffer.array_mut().err(), Some(Error::Released));
            assert_eq!(buffer.shift_take_index(0), Err(Error::Released));
            assert_eq!(buffer.shift_put_index(0), Err(Error::Released));
        }
    }

    #[test_traced]
    fn test_array_aliases_storage() {
        let mut buffer = RollingCharBuffer::wrap(vec!['\0'; 6]).unwrap();
        assert_state(&buffer, 6, 0, 0, 0);

        // Write directly, then publish
        buffer.array_mut().unwrap()[..3].copy_from_slice(&['x', 'y', 'z']);
        buffer.shift_put_index(3).unwrap();
        assert_eq!(buffer.take().unwrap(), 'x');

        // Read directly, then consume
        let take_index = buffer.take_index().unwrap();
        assert_eq!(buffer.array().unwrap()[take_index], 'y');
        buffer.shift_take_index(1).unwrap();
        assert_eq!(buffer.take_all().unwrap(), vec!['z']);

        // Writes through the buffer are visible in the array
        buffer.put('w').unwrap();
        assert_eq!(buffer.array().unwrap()[3], 'w');
    }

    #[test_traced]
    fn test_native_has_no_array() {
        let mut buffer = RollingCharBuffer::allocate_native(4).unwrap();
        assert!(!buffer.has_array().unwrap());
        assert_eq!(buffer.array().err(), Some(Error::NotArrayBacked));
        assert_eq!(buffer.array_mut().err(), Some(Error::NotArrayBacked));
    }

    #[test_traced]
    fn test_native_falls_back_to_heap() {
        let mut buffer = RollingCharBuffer::init(Config {
            capacity: NZUsize!(6),
            backing: Backing::Native,
            platform: Platform::heap_only(),
        })
        .unwrap();
        assert!(buffer.has_array().unwrap());

        buffer.put_slice(&['1', '2', '3', '4', '5']).unwrap();
        assert_eq!(buffer.take_n(3).unwrap(), vec!['1', '2', '3']);
        buffer.put_slice(&['6', '7', '8', '9']).unwrap();
        assert_eq!(
            buffer.take_all().unwrap(),
            vec!['4', '5', '6', '7', '8', '9']
        );
    }

    #[test_traced]
    fn test_invalid_construction() {
        assert_eq!(
            RollingCharBuffer::allocate(0).err(),
            Some(Error::InvalidCapacity(0))
        );
        assert_eq!(
            RollingCharBuffer::allocate_native(0).err(),
            Some(Error::InvalidCapacity(0))
        );
        assert_eq!(
            RollingCharBuffer::wrap(Vec::new()).err(),
            Some(Error::EmptyArray)
        );
        assert_eq!(
            RollingBuffer::<u64>::allocate(usize::MAX).err(),
            Some(Error::CapacityOverflow)
        );
    }

    #[test_traced]
    fn test_drop_releases() {
        // Dropping mid-use (including after growth) must free native storage exactly once
        for _ in 0..16 {
            let mut buffer = RollingBuffer::<u64>::allocate_native(3).unwrap();
            buffer.put_slice(&[1, 2, 3, 4, 5]).unwrap();
            buffer.take().unwrap();
        }
        let mut buffer = RollingBuffer::<u64>::allocate_native(3).unwrap();
        buffer.release();
        drop(buffer);
    }

    #[test_case(Backing::Heap; "heap")]
    #[test_case(Backing::Native; "native")]
    fn test_random_fifo(backing: Backing) {
        let mut rng = StdRng::seed_from_u64(0);
        let mut buffer = buffer::<u32>(backing, 3);
        let mut model = VecDeque::new();
        let mut next = 0u32;
        let (mut put, mut taken) = (0usize, 0usize);

        for _ in 0..2_000 {
            match rng.gen_range(0..4) {
                0 => {
                    buffer.put(next).unwrap();
                    model.push_back(next);
                    next += 1;
                    put += 1;
                }
                1 => {
                    let len = rng.gen_range(0..8);
                    let data: Vec<u32> = (next..next + len).collect();
                    buffer.put_slice(&data).unwrap();
                    model.extend(data);
                    next += len;
                    put += len as usize;
                }
                2 => {
                    if model.is_empty() {
                        assert_eq!(buffer.take(), Err(Error::Empty));
                        continue;
                    }
                    assert_eq!(buffer.take().unwrap(), model.pop_front().unwrap());
                    taken += 1;
                }
                _ => {
                    if model.is_empty() {
                        continue;
                    }
                    let n = rng.gen_range(1..=model.len());
                    let expected: Vec<u32> = model.drain(..n).collect();
                    assert_eq!(buffer.take_n(n).unwrap(), expected);
                    taken += n;
                }
            }
            assert_eq!(buffer.size().unwrap(), put - taken);
            assert_eq!(
                buffer.put_index().unwrap(),
                (buffer.take_index().unwrap() + buffer.size().unwrap())
                    % buffer.capacity().unwrap()
            );
        }
        if !model.is_empty() {
            assert_eq!(buffer.take_all().unwrap(), Vec::from(model));
        }
        assert!(buffer.is_empty().unwrap());
    }
}

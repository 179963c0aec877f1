//! Allocate, access, and copy raw blocks of native memory.
//!
//! Every primitive is a method on [Platform], a capability token reporting whether native memory
//! can be used. [Platform::detect] probes the system allocator once per process, while
//! [Platform::heap_only] reports no native memory at all (useful for exercising fallback paths).
//!
//! Blocks returned by [Platform::allocate] are zero-initialized and freed exactly once: either by
//! passing them to [Platform::free] or by dropping them.

use crate::{Element, Error};
use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    marker::PhantomData,
    ptr::NonNull,
    sync::OnceLock,
};
use tracing::{debug, trace};

/// Result of the native memory probe, computed on first use.
static NATIVE: OnceLock<bool> = OnceLock::new();

/// Returns the size of a native memory page in bytes (4KB where it cannot be queried).
#[cfg(unix)]
pub fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

/// Returns the size of a native memory page in bytes (4KB where it cannot be queried).
#[cfg(not(unix))]
pub fn page_size() -> usize {
    4096
}

/// Returns the number of `T` that fit in one page (at least one).
pub fn page_elements<T: Element>() -> usize {
    (page_size() / std::mem::size_of::<T>()).max(1)
}

/// Returns whether native memory is available on this system.
pub fn has_native_memory() -> bool {
    Platform::detect().has_native_memory()
}

/// Allocate and free a single page to confirm the system allocator hands out native memory.
fn probe() -> bool {
    let available = match Layout::from_size_align(page_size(), std::mem::align_of::<u64>()) {
        Ok(layout) => {
            // SAFETY: layout has a non-zero size.
            let ptr = unsafe { alloc_zeroed(layout) };
            if ptr.is_null() {
                false
            } else {
                // SAFETY: ptr was allocated above with this layout.
                unsafe { dealloc(ptr, layout) };
                true
            }
        }
        Err(_) => false,
    };
    debug!(available, "probed native memory");
    available
}

/// Ensure `[offset, offset + count)` fits within `bound`.
fn check_range(offset: usize, count: usize, bound: usize) -> Result<(), Error> {
    match offset.checked_add(count) {
        Some(end) if end <= bound => Ok(()),
        _ => Err(Error::InvalidRange(offset, count, bound)),
    }
}

/// A zero-initialized block of native memory holding `len` elements of `T`.
///
/// Deallocates itself on drop using the stored layout.
pub struct RawBlock<T: Element> {
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
    _marker: PhantomData<T>,
}

// SAFETY: RawBlock exclusively owns its memory and `T: Send`.
unsafe impl<T: Element> Send for RawBlock<T> {}

impl<T: Element> RawBlock<T> {
    /// Returns the number of elements the block holds.
    #[allow(clippy::len_without_is_empty)]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    const fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    #[inline]
    fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }
}

impl<T: Element> std::fmt::Debug for RawBlock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawBlock")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl<T: Element> Drop for RawBlock<T> {
    fn drop(&mut self) {
        trace!(len = self.len, "freeing native block");
        // SAFETY: ptr was allocated with this layout and is only freed here.
        unsafe { dealloc(self.ptr.as_ptr() as *mut u8, self.layout) };
    }
}

/// Capability to operate on native memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Platform {
    native: bool,
}

impl Default for Platform {
    fn default() -> Self {
        Self::detect()
    }
}

impl Platform {
    /// Returns the platform of the running process, probing native memory on first use.
    pub fn detect() -> Self {
        Self {
            native: *NATIVE.get_or_init(probe),
        }
    }

    /// Returns a platform without native memory.
    pub const fn heap_only() -> Self {
        Self { native: false }
    }

    /// Returns whether native memory operations are available.
    pub const fn has_native_memory(&self) -> bool {
        self.native
    }

    #[inline]
    const fn check(&self) -> Result<(), Error> {
        if !self.native {
            return Err(Error::NativeUnavailable);
        }
        Ok(())
    }

    /// Allocate a zero-initialized block of `count` elements.
    pub fn allocate<T: Element>(&self, count: usize) -> Result<RawBlock<T>, Error> {
        self.check()?;
        if count == 0 {
            return Err(Error::InvalidCapacity(count));
        }
        let layout = Layout::array::<T>(count).map_err(|_| Error::CapacityOverflow)?;

        // SAFETY: layout is valid and non-zero in size (`Element` types are never zero-sized).
        let ptr = unsafe { alloc_zeroed(layout) } as *mut T;
        let ptr = NonNull::new(ptr).ok_or(Error::AllocationFailed(count))?;
        trace!(count, bytes = layout.size(), "allocated native block");
        Ok(RawBlock {
            ptr,
            len: count,
            layout,
            _marker: PhantomData,
        })
    }

    /// Free a block previously returned by [Self::allocate].
    pub fn free<T: Element>(&self, block: RawBlock<T>) {
        drop(block);
    }

    /// Read the element at `index`.
    pub fn read<T: Element>(&self, block: &RawBlock<T>, index: usize) -> Result<T, Error> {
        self.check()?;
        check_range(index, 1, block.len)?;

        // SAFETY: index is in bounds and every slot holds a valid `T` (zeroed or written).
        Ok(unsafe { block.as_ptr().add(index).read() })
    }

    /// Write `value` at `index`.
    pub fn write<T: Element>(
        &self,
        block: &mut RawBlock<T>,
        index: usize,
        value: T,
    ) -> Result<(), Error> {
        self.check()?;
        check_range(index, 1, block.len)?;

        // SAFETY: index is in bounds.
        unsafe { block.as_mut_ptr().add(index).write(value) };
        Ok(())
    }

    /// Copy `count` elements from `src` (starting at `src_offset`) to `dst` (starting at
    /// `dst_offset`).
    pub fn copy<T: Element>(
        &self,
        src: &RawBlock<T>,
        src_offset: usize,
        dst: &mut RawBlock<T>,
        dst_offset: usize,
        count: usize,
    ) -> Result<(), Error> {
        self.check()?;
        check_range(src_offset, count, src.len)?;
        check_range(dst_offset, count, dst.len)?;

        // SAFETY: both ranges are in bounds and the blocks are distinct allocations.
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr().add(src_offset),
                dst.as_mut_ptr().add(dst_offset),
                count,
            )
        };
        Ok(())
    }

    /// Copy `count` elements from the slice `src` (starting at `src_offset`) into `dst` (starting
    /// at `dst_offset`).
    pub fn copy_from_slice<T: Element>(
        &self,
        src: &[T],
        src_offset: usize,
        dst: &mut RawBlock<T>,
        dst_offset: usize,
        count: usize,
    ) -> Result<(), Error> {
        self.check()?;
        check_range(src_offset, count, src.len())?;
        check_range(dst_offset, count, dst.len)?;

        // SAFETY: both ranges are in bounds and a slice cannot alias an owned block.
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr().add(src_offset),
                dst.as_mut_ptr().add(dst_offset),
                count,
            )
        };
        Ok(())
    }

    /// Copy `count` elements from `src` (starting at `src_offset`) into the slice `dst` (starting
    /// at `dst_offset`).
    pub fn copy_to_slice<T: Element>(
        &self,
        src: &RawBlock<T>,
        src_offset: usize,
        dst: &mut [T],
        dst_offset: usize,
        count: usize,
    ) -> Result<(), Error> {
        self.check()?;
        check_range(src_offset, count, src.len)?;
        check_range(dst_offset, count, dst.len())?;

        // SAFETY: both ranges are in bounds and a slice cannot alias an owned block.
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr().add(src_offset),
                dst.as_mut_ptr().add(dst_offset),
                count,
            )
        };
        Ok(())
    }
}

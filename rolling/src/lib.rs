//! Grow and drain a circular buffer backed by heap or native memory.
//!
//! [RollingBuffer] stores fixed-width [Element]s in a ring. Producers `put` data at the tail and
//! consumers `take` it from the head without reallocating per element. When a `put` would leave
//! the ring (nearly) full, the buffer grows and relocates its live data to the start of the new
//! storage, unwrapping it in the process.
//!
//! # Storage
//!
//! Each buffer owns exactly one storage backend, selected at construction:
//!
//! - [Backing::Heap]: a `Vec<T>` that can be exposed to callers (see [RollingBuffer::array]) for
//!   zero-copy reads and writes.
//! - [Backing::Native]: a zero-initialized block obtained directly from the system allocator via
//!   [memory::Platform]. The block is freed deterministically when the buffer is released or
//!   dropped.
//!
//! Requesting native storage on a [memory::Platform] without native memory transparently falls
//! back to heap storage.
//!
//! # Status
//!
//! `commonware-rolling` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.
//!
//! # Example
//!
//! ```rust
//! use commonware_rolling::{Config, RollingCharBuffer};
//! use commonware_utils::NZUsize;
//!
//! let cfg = Config::native(NZUsize!(6));
//! let mut buffer = RollingCharBuffer::init(cfg).unwrap();
//!
//! buffer.put('1').unwrap();
//! buffer.put_slice(&['2', '3', '4']).unwrap();
//! assert_eq!(buffer.take().unwrap(), '1');
//!
//! // Force growth, which relocates the live data to the start of larger storage
//! buffer.put_slice(&['5', '6', '7', '8']).unwrap();
//! assert_eq!(buffer.take_all().unwrap(), vec!['2', '3', '4', '5', '6', '7', '8']);
//!
//! // Release the underlying storage
//! buffer.release();
//! assert!(buffer.size().is_err());
//! ```

use thiserror::Error;

mod buffer;
pub use buffer::{Backing, Config, RollingBuffer};
mod element;
pub use element::Element;
pub mod memory;
mod storage;

/// A [RollingBuffer] of Unicode scalar values.
pub type RollingCharBuffer = RollingBuffer<char>;

/// A [RollingBuffer] of UTF-16 code units.
pub type RollingUtf16Buffer = RollingBuffer<u16>;

/// Errors that can occur when interacting with a [RollingBuffer] or [memory::Platform].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid capacity: {0}")]
    InvalidCapacity(usize),
    #[error("cannot wrap an empty array")]
    EmptyArray,
    #[error("buffer released")]
    Released,
    #[error("buffer empty")]
    Empty,
    #[error("insufficient data: {0} > {1}")]
    InsufficientData(usize, usize), // requested, available
    #[error("insufficient space: {0} > {1}")]
    InsufficientSpace(usize, usize), // requested, available
    #[error("invalid range: {0}+{1} > {2}")]
    InvalidRange(usize, usize, usize), // offset, len, bound
    #[error("buffer not array backed")]
    NotArrayBacked,
    #[error("native memory unavailable")]
    NativeUnavailable,
    #[error("capacity overflow")]
    CapacityOverflow,
    #[error("allocation failed: {0} elements")]
    AllocationFailed(usize),
}

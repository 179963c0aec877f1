use std::fmt::Debug;

/// A fixed-width scalar that can be stored in a [crate::RollingBuffer].
///
/// # Safety
///
/// The all-zero bit pattern must be a valid value of the implementing type. Native storage is
/// zero-initialized and slots may be read before they are written (for example after
/// [crate::RollingBuffer::shift_put_index]).
pub unsafe trait Element: Copy + Default + Debug + Send + Sync + 'static {}

macro_rules! impl_element {
    ($($t:ty),*) => {
        $(
            // SAFETY: zero is a valid value of every primitive integer type.
            unsafe impl Element for $t {}
        )*
    };
}

impl_element!(u8, u16, u32, u64, i8, i16, i32, i64);

// SAFETY: '\0' is a valid Unicode scalar value.
unsafe impl Element for char {}

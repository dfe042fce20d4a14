//! Collection of utility functions.

pub use self::future::*;

mod future;

/// Divide `x` by `y` and round up towards infinity. Only defined for non-negative operands,
/// which is all the grid and range arithmetic in this workspace needs.
#[inline]
pub fn div_ceil(x: usize, y: usize) -> usize {
    (x + y - 1) / y
}

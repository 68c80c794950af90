//! Row blocks of a processing window.
//!
//! The engine never holds a whole raster: it streams the
//! overlap window through in blocks that span its full
//! width and `block_height` rows, the last block holding
//! the remaining rows. Drivers read fastest along their
//! native block boundaries, so the block height is the
//! largest native height among the sources and the output
//! unless the caller fixes it.

/// Row blocking of a processing window. Supports
/// configuring the following parameters.
///
/// - `width`, `height` - the dimensions of the window.
///
/// - `block_height` - rows per block. Grows to the largest
/// value offered through [`add_block_height`].
///
/// [`add_block_height`]: BlockPlan::add_block_height
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockPlan {
    width: usize,
    height: usize,
    block_height: usize,
}

/// The type of item produced by the iterations. Consists
/// of:
///
/// 1. reference to the underlying `BlockPlan`
/// 1. the first row of this block
/// 1. the number of rows in this block
pub type BlockWindow<'a> = (&'a BlockPlan, usize, usize);

mod builder;
mod iters;

#[cfg(feature = "use-rayon")]
mod par_iters;

/// Smallest multiple of `m` not less than `num`.
#[inline]
pub(crate) fn mod_ceil(num: usize, m: usize) -> usize {
    let rem = num % m;
    if rem == 0 {
        num
    } else {
        num + (m - rem)
    }
}

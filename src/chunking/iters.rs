use super::{BlockPlan, BlockWindow};
use std::{iter::*, ops::Range};

impl<'a> IntoIterator for &'a BlockPlan {
    type Item = BlockWindow<'a>;
    type IntoIter = Map<Range<usize>, Box<dyn Fn(usize) -> BlockWindow<'a> + 'a>>;

    fn into_iter(self) -> Self::IntoIter {
        let (count, func) = self.iter_mapper();
        (0..count).map(Box::new(func))
    }
}

impl BlockPlan {
    pub(super) fn iter_mapper<'a>(&'a self) -> (usize, impl Fn(usize) -> BlockWindow<'a> + 'a) {
        debug_assert!(self.block_height > 0, "BlockPlan preconditions failed");

        let full = self.full_blocks();
        (self.len(), move |i| {
            let start = i * self.block_height;
            let rows = if i < full {
                self.block_height
            } else {
                self.remainder_rows()
            };
            (self, start, rows)
        })
    }

    /// Create an [ `ExactSizeIterator` ] from the plan.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = BlockWindow> + '_ {
        let (count, func) = self.iter_mapper();
        (0..count).map(func)
    }
}

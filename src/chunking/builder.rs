use super::BlockPlan;

/// Constructors
impl BlockPlan {
    /// Construct a `BlockPlan` for a window of the given
    /// size, reading one row at a time.
    pub fn with_dims(width: usize, height: usize) -> Self {
        if width < 1 || height < 1 {
            panic!("dimensions must both be at least 1");
        }
        BlockPlan {
            width,
            height,
            block_height: 1,
        }
    }
}

/// Builder methods to configure the parameters
impl BlockPlan {
    /// Offer a block height: the plan keeps the largest
    /// height offered so far.
    pub fn add_block_height(mut self, block_height: usize) -> Self {
        self.block_height = self.block_height.max(block_height);
        self
    }

    /// Force the block height, ignoring earlier offers.
    pub fn with_block_height(mut self, block_height: usize) -> Self {
        if block_height < 1 {
            panic!("block_height should be at least 1");
        }
        self.block_height = block_height;
        self
    }
}

/// Getter methods to read the parameters of the plan
impl BlockPlan {
    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    pub fn block_height(&self) -> usize {
        self.block_height
    }

    /// Number of blocks of exactly `block_height` rows.
    pub fn full_blocks(&self) -> usize {
        self.height / self.block_height
    }

    /// Rows left over after the full blocks.
    pub fn remainder_rows(&self) -> usize {
        self.height - self.full_blocks() * self.block_height
    }

    /// Total number of blocks, including the remainder.
    pub fn len(&self) -> usize {
        self.full_blocks() + if self.remainder_rows() > 0 { 1 } else { 0 }
    }
}

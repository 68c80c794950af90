use tracing::info;

/// Reports roughly ten evenly spaced milestones while rows
/// are processed.
pub(crate) struct Progress {
    total: usize,
    step: usize,
    next: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        let step = (total / 10).max(1);
        info!(target: "rastercalc::progress", rows = total, "started");
        Progress {
            total,
            step,
            next: 0,
        }
    }

    /// Called once per processed row.
    #[inline]
    pub fn row(&mut self, row: usize) {
        if row >= self.next {
            let percent = (row * 100) / self.total.max(1);
            info!(target: "rastercalc::progress", percent, row, "processing");
            self.next = row + self.step;
        }
    }

    pub fn finish(&self) {
        info!(target: "rastercalc::progress", rows = self.total, "complete");
    }
}

use super::flag;
use crate::calc::{Neighbourhood, WindowCalc};
use crate::Result;

/// Grows the cloud mask: a pixel becomes cloud when at
/// least `floor(area / 2 + 0.5) + 1` cells of its window
/// are cloud. Cloud pixels stay cloud. Reads the first band
/// of the neighbourhood; cloud is `1`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MajorityFilter;

impl MajorityFilter {
    pub fn new() -> Self {
        MajorityFilter
    }

    /// Cloud cells needed in a window of `area` cells.
    pub fn threshold(area: usize) -> usize {
        (area as f64 * 0.5 + 0.5).floor() as usize + 1
    }
}

impl WindowCalc for MajorityFilter {
    fn num_out_bands(&self) -> usize {
        1
    }

    fn calc(&mut self, window: &Neighbourhood, out: &mut [f64]) -> Result<()> {
        let (_, rows, cols) = window.dim();
        if window[[0, rows / 2, cols / 2]] == 1. {
            out[0] = 1.;
            return Ok(());
        }
        let band = window.index_axis(ndarray::Axis(0), 0);
        let clouds = band.iter().filter(|v| **v == 1.).count();
        out[0] = flag(clouds >= Self::threshold(rows * cols));
        Ok(())
    }
}

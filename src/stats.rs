//! Running min, max, mean and standard deviation of
//! raster bands.
use serde_derive::Serialize;
use std::ops::AddAssign;

use crate::calc::BandVisitor;
use crate::Result;

/// Running moments of one band. Samples are added with
/// `+=`; two accumulators merge with `+= &other`.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelStats {
    max: f64,
    min: f64,
    sum: f64,
    sum_2: f64,
    count: usize,
}

impl Default for PixelStats {
    fn default() -> Self {
        PixelStats {
            max: f64::NEG_INFINITY,
            min: f64::INFINITY,
            sum: 0.,
            sum_2: 0.,
            count: 0,
        }
    }
}

impl AddAssign<f64> for PixelStats {
    fn add_assign(&mut self, val: f64) {
        self.max = self.max.max(val);
        self.min = self.min.min(val);
        self.sum += val;
        self.sum_2 += val * val;
        self.count += 1;
    }
}

impl AddAssign<&PixelStats> for PixelStats {
    fn add_assign(&mut self, other: &PixelStats) {
        self.max = self.max.max(other.max);
        self.min = self.min.min(other.min);
        self.sum += other.sum;
        self.sum_2 += other.sum_2;
        self.count += other.count;
    }
}

impl PixelStats {
    #[inline]
    pub fn max(&self) -> f64 {
        self.max
    }

    #[inline]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }

    /// Population variance.
    #[inline]
    pub fn variance(&self) -> f64 {
        let mean = self.mean();
        (self.sum_2 / self.count as f64 - mean * mean).max(0.)
    }

    #[inline]
    pub fn std_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    /// `None` for a band without samples.
    pub fn summary(&self) -> Option<StatsSummary> {
        if self.is_empty() {
            return None;
        }
        Some(StatsSummary {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.mean(),
            std_deviation: self.std_deviation(),
        })
    }
}

/// Serializable view of a [`PixelStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_deviation: f64,
}

/// Per-band [`PixelStats`] of a raster, collected through
/// the engine's no-output mode. Values equal to the
/// configured no-data value (or NaN) are skipped.
#[derive(Debug, Clone, Default)]
pub struct BandStats {
    bands: Vec<PixelStats>,
    no_data: Option<f64>,
}

impl BandStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_no_data(mut self, no_data: f64) -> Self {
        self.no_data = Some(no_data);
        self
    }

    pub fn bands(&self) -> &[PixelStats] {
        &self.bands
    }

    pub fn band(&self, band: usize) -> Option<&PixelStats> {
        self.bands.get(band)
    }

    /// One entry per band, `None` where every value was
    /// skipped.
    pub fn summaries(&self) -> Vec<Option<StatsSummary>> {
        self.bands.iter().map(PixelStats::summary).collect()
    }
}

impl BandVisitor for BandStats {
    fn visit(&mut self, bands: &[f64]) -> Result<()> {
        if self.bands.len() < bands.len() {
            self.bands.resize(bands.len(), PixelStats::default());
        }
        for (stats, val) in self.bands.iter_mut().zip(bands) {
            if val.is_nan() || Some(*val) == self.no_data {
                continue;
            }
            *stats += *val;
        }
        Ok(())
    }
}

impl AddAssign<&BandStats> for BandStats {
    fn add_assign(&mut self, other: &BandStats) {
        if self.bands.len() < other.bands.len() {
            self.bands.resize(other.bands.len(), PixelStats::default());
        }
        for (a, b) in self.bands.iter_mut().zip(&other.bands) {
            *a += b;
        }
    }
}

//! Fixed-width histograms and the percentiles read off
//! them.

use anyhow::bail;
use serde_derive::Serialize;

use crate::error::CalcError;
use crate::Result;

/// Bin layout: `len` bins of width `step` starting at
/// `min`.
#[derive(Debug, PartialEq, Clone, Copy, Serialize)]
pub struct Config {
    min: f64,
    step: f64,
    len: usize,
}

impl Config {
    /// Largest number of bins a histogram may hold.
    pub const MAX_BINS: usize = 1 << 24;

    /// Bins of width `step` covering `[min, max]`; the last
    /// bin holds `max`. Fails if the range is empty or
    /// needs more than [`Config::MAX_BINS`] bins.
    pub fn spanning(min: f64, max: f64, step: f64) -> Result<Self> {
        if !(step > 0.) || !(min <= max) {
            bail!(CalcError::config(format!(
                "invalid histogram range [{}, {}] with bin width {}",
                min, max, step
            )));
        }
        let bins = ((max - min) / step).floor();
        if !bins.is_finite() || bins >= Self::MAX_BINS as f64 {
            bail!(CalcError::config(format!(
                "histogram over [{}, {}] with bin width {} needs more than {} bins",
                min,
                max,
                step,
                Self::MAX_BINS
            )));
        }
        Ok(Config {
            min,
            step,
            len: bins as usize + 1,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn step(&self) -> f64 {
        self.step
    }

    #[inline]
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Centre of bin `i`.
    #[inline]
    pub fn centre(&self, i: usize) -> f64 {
        self.min + (i as f64 + 0.5) * self.step
    }

    /// Bin holding `val`, clamped to the first and last
    /// bins.
    #[inline]
    pub fn bin_for(&self, val: f64) -> usize {
        if val <= self.min {
            0
        } else {
            (((val - self.min) / self.step).floor() as usize).min(self.len - 1)
        }
    }
}

/// Counts per bin of a [`Config`].
#[derive(Clone, Debug, Serialize)]
pub struct Histogram {
    cfg: Config,
    bins: Vec<usize>,
    count: usize,
}

impl Histogram {
    pub fn new(cfg: Config) -> Self {
        Histogram {
            cfg,
            bins: vec![0; cfg.len()],
            count: 0,
        }
    }

    /// Histogram of the finite `values`, with bins of width
    /// `step` spanning them. `None` if no value is finite.
    pub fn of_values(values: &[f64], step: f64) -> Result<Option<Self>> {
        let finite = || values.iter().copied().filter(|v| v.is_finite());
        let (min, max) = finite().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if min > max {
            return Ok(None);
        }

        let mut hist = Histogram::new(Config::spanning(min, max, step)?);
        finite().for_each(|v| hist += v);
        Ok(Some(hist))
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn bins(&self) -> &[usize] {
        &self.bins
    }

    /// Centre of the first bin at which the cumulative
    /// count reaches `p * count` (`p` in `[0, 1]`). `None`
    /// if empty.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let target = (p.max(0.).min(1.) * self.count as f64).max(1.);

        let mut cumulative = 0;
        for (i, count) in self.bins.iter().enumerate() {
            cumulative += count;
            if cumulative as f64 >= target {
                return Some(self.cfg.centre(i));
            }
        }
        Some(self.cfg.centre(self.cfg.len() - 1))
    }
}

use std::ops::AddAssign;
impl AddAssign<f64> for Histogram {
    fn add_assign(&mut self, val: f64) {
        let bin = self.cfg.bin_for(val);
        self.bins[bin] += 1;
        self.count += 1;
    }
}

/// Percentiles (fractions in `[0, 1]`) of `values`, read
/// off a histogram of bin width `step`. Non-finite values
/// are ignored. Returns `None` if no value is left, and
/// fails if the values spread over too many bins.
pub fn percentiles(values: &[f64], step: f64, ps: &[f64]) -> Result<Option<Vec<f64>>> {
    Ok(match Histogram::of_values(values, step)? {
        Some(hist) => ps.iter().map(|p| hist.percentile(*p)).collect(),
        None => None,
    })
}

//! Per-clump attributes consumed by the shadow fit:
//! extents, pixel counts, temperatures and the cloud base
//! height search range.

use std::f64::consts::PI;

use anyhow::bail;
use tracing::debug;

use crate::calc::{ImageCalc, LocatedBandVisitor, MixedBandVisitor, PixelLocation};
use crate::error::CalcError;
use crate::geometry::{BoundsExt, Envelope};
use crate::histogram::percentiles;
use crate::raster::RasterSource;
use crate::table::{columns, AttributeTable, MemAttributeTable};
use crate::Result;

/// Temperature lapse rate of dry air, in degrees per km.
pub const DRY_LAPSE_RATE: f64 = 9.8;
/// Temperature lapse rate of saturated air, in degrees per
/// km.
pub const WET_LAPSE_RATE: f64 = 6.5;

/// Lowest and highest cloud base heights searched (km).
pub const MIN_BASE_HEIGHT: f64 = 0.2;
pub const MAX_BASE_HEIGHT: f64 = 12.;

/// Bin width of temperature and height histograms.
pub(crate) const BIN_WIDTH: f64 = 0.1;

pub(super) fn clump_id(val: f64) -> Option<usize> {
    if val.is_finite() && val >= 0. {
        Some(val as usize)
    } else {
        None
    }
}

/// Pixel count and geographic extent of every clump of a
/// single-band clump raster.
#[derive(Clone, Debug, Default)]
pub struct ClumpExtents {
    counts: Vec<i64>,
    extents: Vec<Option<Envelope>>,
}

impl ClumpExtents {
    pub fn new() -> Self {
        Default::default()
    }

    /// Number of table rows needed: the largest clump id
    /// plus one.
    pub fn row_count(&self) -> usize {
        self.counts.len()
    }

    pub fn count(&self, clump: usize) -> i64 {
        self.counts.get(clump).copied().unwrap_or(0)
    }

    pub fn extent(&self, clump: usize) -> Option<&Envelope> {
        self.extents.get(clump).and_then(|e| e.as_ref())
    }

    /// Write the `Histogram` and extent columns. Empty
    /// clumps get a zero extent.
    pub fn write(&self, table: &mut dyn AttributeTable) -> Result<()> {
        let rows = table.row_count();
        if rows < self.row_count() {
            bail!(CalcError::Mismatch {
                what: "attribute table rows",
                found: rows,
                expected: self.row_count(),
            });
        }

        let mut counts = self.counts.clone();
        counts.resize(rows, 0);
        table.write_int_column(columns::HISTOGRAM, &counts)?;

        let column = |f: &dyn Fn(&Envelope) -> f64| -> Vec<f64> {
            (0..rows)
                .map(|i| self.extent(i).map_or(0., |e| f(e)))
                .collect()
        };
        table.write_real_column(columns::MIN_X, &column(&|e| e.min().x))?;
        table.write_real_column(columns::MAX_X, &column(&|e| e.max().x))?;
        table.write_real_column(columns::MIN_Y, &column(&|e| e.min().y))?;
        table.write_real_column(columns::MAX_Y, &column(&|e| e.max().y))?;
        Ok(())
    }

    /// A new table holding the extent columns.
    pub fn to_table(&self) -> Result<MemAttributeTable> {
        let mut table = MemAttributeTable::with_rows(self.row_count());
        self.write(&mut table)?;
        Ok(table)
    }
}

impl LocatedBandVisitor for ClumpExtents {
    fn visit(&mut self, bands: &[f64], loc: &PixelLocation) -> Result<()> {
        let id = match clump_id(bands[0]) {
            Some(id) => id,
            None => return Ok(()),
        };
        if id >= self.counts.len() {
            self.counts.resize(id + 1, 0);
            self.extents.resize(id + 1, None);
        }

        self.counts[id] += 1;
        self.extents[id] = Some(match self.extents[id] {
            Some(mut ext) => {
                ext.expand_to_include(loc.extent.min().x, loc.extent.min().y);
                ext.expand_to_include(loc.extent.max().x, loc.extent.max().y);
                ext
            }
            None => loc.extent,
        });
        Ok(())
    }
}

/// Temperature samples of the pixels of every clump, read
/// from an integer clump band and a float temperature band
/// (degrees Celsius).
#[derive(Clone, Debug, Default)]
pub struct ClumpTemperatures {
    samples: Vec<Vec<f64>>,
}

impl ClumpTemperatures {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn samples(&self, clump: usize) -> &[f64] {
        self.samples.get(clump).map(|s| s.as_slice()).unwrap_or(&[])
    }

    pub fn row_count(&self) -> usize {
        self.samples.len()
    }

    pub fn min(&self, clump: usize) -> Option<f64> {
        self.samples(clump).iter().copied().fold(None, |acc, v| {
            Some(acc.map_or(v, |a: f64| a.min(v)))
        })
    }

    pub fn max(&self, clump: usize) -> Option<f64> {
        self.samples(clump).iter().copied().fold(None, |acc, v| {
            Some(acc.map_or(v, |a: f64| a.max(v)))
        })
    }

    /// Representative cloud base temperature. Clumps whose
    /// equivalent radius `sqrt(count / 2pi)` exceeds 8 pixels
    /// use the `100 (R - 8)^2 / R^2` percentile of their
    /// temperatures, smaller ones the minimum.
    pub fn cloud_base(&self, clump: usize) -> Result<Option<f64>> {
        let samples = self.samples(clump);
        let radius = (samples.len() as f64 / (2. * PI)).sqrt();
        if radius > 8. {
            let p = (radius - 8.).powi(2) / radius.powi(2);
            Ok(percentiles(samples, BIN_WIDTH, &[p])?.map(|ps| ps[0]))
        } else {
            Ok(self.min(clump))
        }
    }
}

impl MixedBandVisitor for ClumpTemperatures {
    fn visit(&mut self, ints: &[i64], floats: &[f64]) -> Result<()> {
        if ints[0] < 0 || !floats[0].is_finite() {
            return Ok(());
        }
        let id = ints[0] as usize;
        if id >= self.samples.len() {
            self.samples.resize(id + 1, vec![]);
        }
        self.samples[id].push(floats[0]);
        Ok(())
    }
}

/// Search range of the cloud base height (km) of a clump
/// with base temperature `cloud_base` and maximum
/// temperature `max_temp`, given the lower clear land
/// temperature.
pub fn base_height_range(lower_land_temp: f64, cloud_base: f64, max_temp: f64) -> (f64, f64) {
    let min = ((lower_land_temp - 4. - cloud_base) / DRY_LAPSE_RATE).max(MIN_BASE_HEIGHT);
    let max = (max_temp + 4. - cloud_base).min(MAX_BASE_HEIGHT);
    (min, max)
}

/// Height of a cloud top above its base (km), from a pixel
/// temperature and the clump's base temperature.
#[inline]
pub fn top_height(temperature: f64, cloud_base: f64) -> f64 {
    (cloud_base - temperature.min(cloud_base)) / WET_LAPSE_RATE
}

/// Fill the `MinT`, `MaxT`, `CloudBase`, `HBaseMin` and
/// `HBaseMax` columns of `table` from the clumps and
/// temperature rasters. Row 0 (background) and empty clumps
/// are left at zero.
pub fn populate_cloud_heights(
    calc: &ImageCalc,
    clumps: &dyn RasterSource,
    temperature: &dyn RasterSource,
    table: &mut dyn AttributeTable,
    lower_land_temp: f64,
) -> Result<()> {
    let mut temps = ClumpTemperatures::new();
    calc.calc_mixed_no_output(&[clumps], &[temperature], &mut temps)?;

    let rows = table.row_count();
    if temps.row_count() > rows {
        bail!(CalcError::Mismatch {
            what: "attribute table rows",
            found: rows,
            expected: temps.row_count(),
        });
    }

    let mut min_t = vec![0.; rows];
    let mut max_t = vec![0.; rows];
    let mut base = vec![0.; rows];
    let mut h_min = vec![0.; rows];
    let mut h_max = vec![0.; rows];
    for id in 1..temps.row_count() {
        let (lo, hi, cb) = match (temps.min(id), temps.max(id), temps.cloud_base(id)?) {
            (Some(lo), Some(hi), Some(cb)) => (lo, hi, cb),
            _ => continue,
        };
        let (hmin, hmax) = base_height_range(lower_land_temp, cb, hi);
        debug!(
            "clump {}: base temperature {:.2}, heights {:.2}..{:.2}",
            id, cb, hmin, hmax
        );
        min_t[id] = lo;
        max_t[id] = hi;
        base[id] = cb;
        h_min[id] = hmin;
        h_max[id] = hmax;
    }

    table.write_real_column(columns::MIN_T, &min_t)?;
    table.write_real_column(columns::MAX_T, &max_t)?;
    table.write_real_column(columns::CLOUD_BASE, &base)?;
    table.write_real_column(columns::H_BASE_MIN, &h_min)?;
    table.write_real_column(columns::H_BASE_MAX, &h_max)?;
    Ok(())
}

/// Pixel counts and extents of the clumps of `clumps` as a
/// new attribute table.
pub fn populate_clump_extents(
    calc: &ImageCalc,
    clumps: &dyn RasterSource,
) -> Result<MemAttributeTable> {
    let mut extents = ClumpExtents::new();
    calc.calc_located_no_output(&[clumps], &mut extents)?;
    extents.to_table()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeoTransform;
    use crate::raster::{MemRaster, PixelType};

    #[test]
    fn extents_of_clumps() -> Result<()> {
        // Clump 1: an L over cols 0..2, rows 0..2; clump 3 one
        // pixel; no clump 2.
        let mut clumps = MemRaster::new((4, 3), 1, PixelType::UInt32)
            .with_transform(GeoTransform::new(100., 10., 500., -10.));
        clumps.set(0, 0, 0, 1.);
        clumps.set(0, 0, 1, 1.);
        clumps.set(0, 1, 1, 1.);
        clumps.set(0, 3, 2, 3.);

        let table = populate_clump_extents(&ImageCalc::new(), &clumps)?;
        assert_eq!(table.row_count(), 4);
        assert_eq!(table.read_int_column(columns::HISTOGRAM)?, vec![8, 3, 0, 1]);
        assert_eq!(table.read_real_column(columns::MIN_X)?[1], 100.);
        assert_eq!(table.read_real_column(columns::MAX_X)?[1], 120.);
        assert_eq!(table.read_real_column(columns::MIN_Y)?[1], 480.);
        assert_eq!(table.read_real_column(columns::MAX_Y)?[1], 500.);
        assert_eq!(table.read_real_column(columns::MAX_X)?[2], 0.);
        assert_eq!(table.read_real_column(columns::MIN_Y)?[3], 470.);
        Ok(())
    }

    #[test]
    fn small_clump_uses_minimum() -> Result<()> {
        let mut temps = ClumpTemperatures::new();
        for t in &[-10., -12.5, -3.] {
            temps.visit(&[2], &[*t])?;
        }
        assert_eq!(temps.row_count(), 3);
        assert_eq!(temps.cloud_base(2)?, Some(-12.5));
        assert_eq!(temps.max(2), Some(-3.));
        assert_eq!(temps.cloud_base(1)?, None);
        Ok(())
    }

    #[test]
    fn large_clump_with_outlier_fails() -> Result<()> {
        let mut temps = ClumpTemperatures::new();
        for _ in 0..1000 {
            temps.visit(&[1], &[-20.])?;
        }
        temps.visit(&[1], &[-3.4e38])?;
        assert!(temps.cloud_base(1).is_err());
        Ok(())
    }

    #[test]
    fn large_clump_uses_percentile() -> Result<()> {
        // 1000 pixels: R = 12.6, p = 0.133
        let mut temps = ClumpTemperatures::new();
        for i in 0..1000 {
            temps.visit(&[1], &[i as f64 / 10.])?;
        }
        let base = temps.cloud_base(1)?.unwrap();
        let radius = (1000. / (2. * PI)).sqrt();
        let p = (radius - 8.).powi(2) / radius.powi(2);
        assert!((base - p * 100.).abs() < 0.2, "{} vs {}", base, p * 100.);
        assert!(base > temps.min(1).unwrap());
        Ok(())
    }

    #[test]
    fn height_range() {
        let (lo, hi) = base_height_range(10., -20., -5.);
        assert!((lo - 26. / 9.8).abs() < 1e-12);
        assert_eq!(hi, 12.);

        let (lo, hi) = base_height_range(10., 8., 9.);
        assert_eq!(lo, 0.2);
        assert_eq!(hi, 5.);

        assert_eq!(top_height(-30., -20.), 0.);
        assert!((top_height(-33., -20.) - 2.).abs() < 1e-12);
    }

    #[test]
    fn populates_heights() -> Result<()> {
        let mut clumps = MemRaster::new((3, 2), 1, PixelType::UInt32);
        let mut temperature = MemRaster::new((3, 2), 1, PixelType::Float32);
        for (col, t) in [(0, -20.), (1, -18.), (2, -10.)].iter() {
            clumps.set(0, *col, 0, 1.);
            temperature.set(0, *col, 0, *t);
        }

        let mut table = MemAttributeTable::with_rows(2);
        populate_cloud_heights(&ImageCalc::new(), &clumps, &temperature, &mut table, 10.)?;
        assert_eq!(table.read_real_column(columns::CLOUD_BASE)?, vec![0., -20.]);
        assert_eq!(table.read_real_column(columns::MAX_T)?, vec![0., -10.]);
        let h_min = table.read_real_column(columns::H_BASE_MIN)?;
        assert!((h_min[1] - 26. / 9.8).abs() < 1e-12);
        assert_eq!(table.read_real_column(columns::H_BASE_MAX)?[1], 12.);

        let mut short = MemAttributeTable::with_rows(1);
        assert!(populate_cloud_heights(&ImageCalc::new(), &clumps, &temperature, &mut short, 10.)
            .is_err());
        Ok(())
    }
}

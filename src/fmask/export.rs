//! Export of clear-sky temperatures after the first pass,
//! and the temperature thresholds derived from them.

use anyhow::bail;
use serde_derive::Serialize;
use tracing::warn;

use super::pass1::index;
use crate::calc::BandVisitor;
use crate::columns::{ColumnSink, ColumnSource};
use crate::error::CalcError;
use crate::histogram::percentiles;
use crate::Result;

/// Layout of the export stack: thermal band, the 16 first
/// pass outputs, the validity mask.
pub mod stack {
    use super::index;

    pub const THERMAL: usize = 0;
    pub const PCP: usize = 1 + index::PCP;
    pub const LAND: usize = 1 + index::CLEAR_SKY_LAND;
    pub const WATER: usize = 1 + index::CLEAR_SKY_WATER;
    pub const VALID: usize = 1 + index::COUNT;

    pub const LEN: usize = VALID + 1;
}

/// Classes written to the export.
pub const CLASS_OTHER: f64 = 0.;
pub const CLASS_LAND: f64 = 1.;
pub const CLASS_WATER: f64 = 2.;

/// Visits the export stack, appending `[class,
/// temperature]` for every valid pixel and counting valid
/// and potential cloud pixels. Pixels that are neither
/// clear land nor clear water are written as
/// [`CLASS_OTHER`]; pixels with a non-finite temperature
/// are counted but not written.
pub struct Pass1Export<'s> {
    sink: &'s mut dyn ColumnSink,
    scale_factor: f64,
    valid: usize,
    pcp: usize,
}

impl<'s> Pass1Export<'s> {
    pub fn new(sink: &'s mut dyn ColumnSink, scale_factor: f64) -> Result<Self> {
        if sink.column_count() != 2 {
            bail!(CalcError::Mismatch {
                what: "export column count",
                found: sink.column_count(),
                expected: 2,
            });
        }
        Ok(Pass1Export {
            sink,
            scale_factor,
            valid: 0,
            pcp: 0,
        })
    }

    pub fn valid_count(&self) -> usize {
        self.valid
    }

    pub fn pcp_count(&self) -> usize {
        self.pcp
    }

    /// Fraction of valid pixels that are potential cloud.
    pub fn pcp_ratio(&self) -> f64 {
        if self.valid == 0 {
            0.
        } else {
            self.pcp as f64 / self.valid as f64
        }
    }
}

impl<'s> BandVisitor for Pass1Export<'s> {
    fn visit(&mut self, bands: &[f64]) -> Result<()> {
        if bands[stack::VALID] != 1. {
            return Ok(());
        }
        self.valid += 1;
        if bands[stack::PCP] == 1. {
            self.pcp += 1;
        }

        let temperature = bands[stack::THERMAL] / self.scale_factor;
        if !temperature.is_finite() {
            return Ok(());
        }
        let class = if bands[stack::LAND] == 1. {
            CLASS_LAND
        } else if bands[stack::WATER] == 1. {
            CLASS_WATER
        } else {
            CLASS_OTHER
        };
        self.sink.append(&[class, temperature])
    }
}

/// Clear-sky temperature percentiles used by the second
/// pass (degrees Celsius). The upper and lower thresholds
/// are the 82.5th and 17.5th percentiles, the midpoints of
/// the 82nd and 17th percentile bands.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ThermalThresholds {
    /// 82.5th percentile over clear land.
    pub land_upper: f64,
    /// 17.5th percentile over clear land.
    pub land_lower: f64,
    /// 82.5th percentile over clear water.
    pub water_upper: f64,
}

impl ThermalThresholds {
    pub const UPPER: f64 = 0.825;
    pub const LOWER: f64 = 0.175;
    pub const BIN_WIDTH: f64 = 0.1;
    /// Temperatures below absolute zero are no-data.
    pub const MIN_TEMPERATURE: f64 = -273.15;

    /// Compute from exported `[class, temperature]` rows.
    /// Non-finite and no-data temperatures are skipped.
    /// Fails if no land sample is left or the samples spread
    /// over too many histogram bins.
    pub fn from_samples(source: &dyn ColumnSource) -> Result<Self> {
        let rows = source.read_rows(0, source.row_count())?;
        let mut land = vec![];
        let mut water = vec![];
        let mut skipped = 0;
        for row in rows.outer_iter() {
            let (class, t) = (row[0], row[1]);
            if class != CLASS_LAND && class != CLASS_WATER {
                continue;
            }
            if !t.is_finite() || t < Self::MIN_TEMPERATURE {
                skipped += 1;
            } else if class == CLASS_LAND {
                land.push(t);
            } else {
                water.push(t);
            }
        }
        if skipped > 0 {
            warn!("skipped {} no-data temperature samples", skipped);
        }

        let land_ps = match percentiles(&land, Self::BIN_WIDTH, &[Self::UPPER, Self::LOWER])? {
            Some(ps) => ps,
            None => bail!(CalcError::config("no clear-sky land pixels")),
        };
        let water_upper = match percentiles(&water, Self::BIN_WIDTH, &[Self::UPPER])? {
            Some(ps) => ps[0],
            None => {
                warn!("no clear-sky water pixels; using the land threshold");
                land_ps[0]
            }
        };
        Ok(ThermalThresholds {
            land_upper: land_ps[0],
            land_lower: land_ps[1],
            water_upper,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::ImageCalc;
    use crate::columns::ColumnTable;
    use crate::fmask::pass1::tests::scene;
    use crate::fmask::{BandLayout, Pass1, Pass1Config, ValidMask};
    use crate::raster::{MemDriver, NewRaster, SelectBands};
    use std::path::Path;

    #[test]
    fn stack_positions() {
        assert_eq!(stack::PCP, 9);
        assert_eq!(stack::LAND, 10);
        assert_eq!(stack::WATER, 16);
        assert_eq!(stack::LEN, 18);
    }

    #[test]
    fn export_scene() -> Result<()> {
        let (image, saturation) = scene();
        let layout = BandLayout::for_band_count(9)?;
        let calc = ImageCalc::new();
        let driver = MemDriver;
        let out = |name: &'static str| NewRaster::new(&driver, Path::new(name), "MEM");

        let pass1 = calc.calc_to_new(
            &[&image, &saturation],
            &mut Pass1::new(layout, Pass1Config::default()),
            &out("pass1"),
        )?;
        let valid = calc.calc_to_new(&[&image], &mut ValidMask::new(layout), &out("valid"))?;
        let thermal = SelectBands::new(&image, vec![layout.thermal1])?;

        let mut table = ColumnTable::new(2)?;
        let mut export = Pass1Export::new(&mut table, 10000.)?;
        calc.calc_no_output(&[&thermal, &pass1, &valid], &mut export)?;

        // 4 vegetation, 4 bright, 4 water pixels.
        assert_eq!(export.valid_count(), 12);
        assert_eq!(export.pcp_count(), 4);
        assert!((export.pcp_ratio() - 1. / 3.).abs() < 1e-12);

        let rows: Vec<Vec<f64>> = table.rows().map(|r| r.to_vec()).collect();
        assert_eq!(rows.len(), 12);
        let count = |class: f64| rows.iter().filter(|r| r[0] == class).count();
        assert_eq!(count(CLASS_LAND), 4);
        assert_eq!(count(CLASS_WATER), 4);
        assert_eq!(count(CLASS_OTHER), 4);
        assert!(rows
            .iter()
            .filter(|r| r[0] != CLASS_OTHER)
            .all(|r| (r[0] == CLASS_LAND && r[1] == 20.) || (r[0] == CLASS_WATER && r[1] == 15.)));
        Ok(())
    }

    #[test]
    fn export_skips_non_finite_temperature() -> Result<()> {
        let mut table = ColumnTable::new(2)?;
        let mut export = Pass1Export::new(&mut table, 100.)?;
        let mut bands = [0.; stack::LEN];
        bands[stack::VALID] = 1.;
        bands[stack::LAND] = 1.;

        bands[stack::THERMAL] = f64::NAN;
        export.visit(&bands)?;
        bands[stack::THERMAL] = 2000.;
        export.visit(&bands)?;
        bands[stack::LAND] = 0.;
        export.visit(&bands)?;
        bands[stack::VALID] = 0.;
        export.visit(&bands)?;

        assert_eq!(export.valid_count(), 3);
        let rows: Vec<Vec<f64>> = table.rows().map(|r| r.to_vec()).collect();
        assert_eq!(rows, vec![vec![CLASS_LAND, 20.], vec![CLASS_OTHER, 20.]]);
        Ok(())
    }

    #[test]
    fn thresholds_from_samples() -> Result<()> {
        let mut table = ColumnTable::new(2)?;
        for t in 0..100 {
            table.append(&[CLASS_LAND, t as f64])?;
        }
        table.append(&[CLASS_WATER, 5.])?;
        table.append(&[0., 1000.])?;

        let th = ThermalThresholds::from_samples(&table)?;
        assert!((th.land_upper - 82.).abs() < 0.2, "{}", th.land_upper);
        assert!((th.land_lower - 17.).abs() < 0.2, "{}", th.land_lower);
        assert!((th.water_upper - 5.05).abs() < 1e-9);

        let empty = ColumnTable::new(2)?;
        assert!(ThermalThresholds::from_samples(&empty).is_err());
        Ok(())
    }

    #[test]
    fn thresholds_skip_nodata_outliers() -> Result<()> {
        let mut table = ColumnTable::new(2)?;
        for t in 0..10 {
            table.append(&[CLASS_LAND, t as f64])?;
        }
        table.append(&[CLASS_WATER, -3.4e34])?;
        table.append(&[CLASS_LAND, f64::NEG_INFINITY])?;
        table.append(&[CLASS_WATER, 4.])?;

        let th = ThermalThresholds::from_samples(&table)?;
        assert!((th.water_upper - 4.05).abs() < 1e-9);
        assert!((th.land_upper - 8.05).abs() < 1e-9, "{}", th.land_upper);

        // Plausible but far too wide to bin.
        table.append(&[CLASS_LAND, 1e30])?;
        let err = ThermalThresholds::from_samples(&table).unwrap_err();
        assert!(matches!(err.downcast_ref::<CalcError>(), Some(CalcError::Config(_))));
        Ok(())
    }
}

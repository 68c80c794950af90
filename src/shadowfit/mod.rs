//! Cloud shadow fitting.
//!
//! For every cloud clump, cast its pixels onto the ground
//! along the sun direction for a range of cloud base heights
//! and keep the height whose shadow best overlaps the
//! potential shadow mask. Outlying heights are then pulled
//! to the median and the final shadow mask is rendered.
//!
//! The clump attribute table must hold the `Histogram`,
//! extent, and `CloudBase` / `HBaseMin` / `HBaseMax` columns
//! (see [`populate_clump_extents`] and
//! [`populate_cloud_heights`]).

use anyhow::bail;
use tracing::{debug, info};

use crate::calc::{BandCalc, ImageCalc, LocatedBandVisitor, PixelLocation};
use crate::error::CalcError;
use crate::geometry::Envelope;
use crate::histogram::percentiles;
use crate::raster::{RasterSink, RasterSource};
use crate::table::{columns, AttributeTable};
use crate::Result;

mod canvas;
mod clumps;

use canvas::{ShadowCanvas, SunGeometry};
pub use clumps::{
    base_height_range, populate_clump_extents, populate_cloud_heights, top_height,
    ClumpExtents, ClumpTemperatures, DRY_LAPSE_RATE, MAX_BASE_HEIGHT, MIN_BASE_HEIGHT,
    WET_LAPSE_RATE,
};

/// What to do once a candidate height scores no overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchPolicy {
    /// Stop searching the clump at the first zero score
    /// after the first candidate. A zero score on the first
    /// candidate is kept as the running best and the search
    /// goes on.
    StopOnZeroOverlap,
    /// Try every candidate height.
    Exhaustive,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        SearchPolicy::StopOnZeroOverlap
    }
}

/// Progress of one clump through [`CloudShadowFit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClumpState {
    Unprocessed,
    HeightSearching,
    Fitted,
    Smoothed,
    Rendered,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowFitParams {
    /// Sun zenith angle, degrees.
    pub sun_zenith: f64,
    /// Sun azimuth angle, degrees clockwise from north.
    pub sun_azimuth: f64,
    /// Candidate height step, km.
    pub step: f64,
    pub policy: SearchPolicy,
}

impl ShadowFitParams {
    pub const DEFAULT_STEP: f64 = 0.25;

    pub fn new(sun_zenith: f64, sun_azimuth: f64) -> Self {
        ShadowFitParams {
            sun_zenith,
            sun_azimuth,
            step: Self::DEFAULT_STEP,
            policy: SearchPolicy::default(),
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn with_policy(mut self, policy: SearchPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Best base height found for a clump.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeightFit {
    /// Cloud base height, km.
    pub height: f64,
    /// Shadow pixels that fall on potential shadow.
    pub overlap_pixels: usize,
    /// Share of the shadow pixels that fall on potential
    /// shadow.
    pub overlap: f64,
}

/// A clump pixel: centre and height of the cloud top above
/// the base (km).
#[derive(Clone, Copy, Debug)]
struct Member {
    x: f64,
    y: f64,
    top: f64,
}

struct Members {
    clump: usize,
    cloud_base: f64,
    pixels: Vec<Member>,
}

impl LocatedBandVisitor for Members {
    fn visit(&mut self, bands: &[f64], loc: &PixelLocation) -> Result<()> {
        if clumps::clump_id(bands[0]) == Some(self.clump) {
            let (x, y) = loc.center();
            self.pixels.push(Member {
                x,
                y,
                top: top_height(bands[1], self.cloud_base),
            });
        }
        Ok(())
    }
}

struct CopyBand;

impl BandCalc for CopyBand {
    fn num_out_bands(&self) -> usize {
        1
    }

    fn calc(&mut self, bands: &[f64], out: &mut [f64]) -> Result<()> {
        out[0] = bands[0];
        Ok(())
    }
}

/// Per-clump extents read from the attribute table.
struct ClumpTable {
    counts: Vec<i64>,
    extents: Vec<Envelope>,
    cloud_base: Vec<f64>,
}

impl ClumpTable {
    fn read(table: &dyn AttributeTable) -> Result<Self> {
        let counts = table.read_int_column(columns::HISTOGRAM)?;
        let min_x = table.read_real_column(columns::MIN_X)?;
        let max_x = table.read_real_column(columns::MAX_X)?;
        let min_y = table.read_real_column(columns::MIN_Y)?;
        let max_y = table.read_real_column(columns::MAX_Y)?;
        let extents = (0..counts.len())
            .map(|i| Envelope::new((min_x[i], min_y[i]), (max_x[i], max_y[i])))
            .collect();
        Ok(ClumpTable {
            counts,
            extents,
            cloud_base: table.read_real_column(columns::CLOUD_BASE)?,
        })
    }
}

/// Replace the heights of clumps `1..` lying outside the
/// 25th to 75th percentile range by the median. Background
/// and clumps not flagged in `fitted` are set to zero.
pub fn edit_outliers(heights: &[f64], fitted: &[bool]) -> Result<Vec<f64>> {
    let values: Vec<f64> = heights
        .iter()
        .zip(fitted)
        .skip(1)
        .filter(|(_, f)| **f)
        .map(|(h, _)| *h)
        .collect();
    let ps = match percentiles(&values, clumps::BIN_WIDTH, &[0.25, 0.5, 0.75])? {
        Some(ps) => ps,
        None => return Ok(vec![0.; heights.len()]),
    };
    let (p25, median, p75) = (ps[0], ps[1], ps[2]);
    debug!("fitted heights: p25 {:.2}, median {:.2}, p75 {:.2}", p25, median, p75);

    Ok(heights
        .iter()
        .zip(fitted)
        .enumerate()
        .map(|(id, (h, f))| {
            if id == 0 || !*f {
                0.
            } else if *h < p25 || *h > p75 {
                median
            } else {
                *h
            }
        })
        .collect())
}

/// Fits cloud base heights against a potential shadow mask
/// and renders the resulting shadow mask. The mask is
/// rendered on the grid of the potential shadow raster.
pub struct CloudShadowFit<'a> {
    calc: &'a ImageCalc,
    clumps: &'a dyn RasterSource,
    temperature: &'a dyn RasterSource,
    potential: &'a dyn RasterSource,
    params: ShadowFitParams,
    sun: SunGeometry,
    states: Vec<ClumpState>,
}

impl<'a> CloudShadowFit<'a> {
    /// `clumps` holds the clump id of every pixel,
    /// `temperature` the brightness temperature (degrees
    /// Celsius) and `potential` the potential shadow flag.
    pub fn new(
        calc: &'a ImageCalc,
        clumps: &'a dyn RasterSource,
        temperature: &'a dyn RasterSource,
        potential: &'a dyn RasterSource,
        params: ShadowFitParams,
    ) -> Result<Self> {
        if !(params.step > 0.) {
            bail!(CalcError::config(format!(
                "height step must be positive, got {}",
                params.step
            )));
        }
        Ok(CloudShadowFit {
            calc,
            clumps,
            temperature,
            potential,
            params,
            sun: SunGeometry::new(params.sun_zenith, params.sun_azimuth),
            states: vec![],
        })
    }

    pub fn params(&self) -> &ShadowFitParams {
        &self.params
    }

    pub fn state(&self, clump: usize) -> ClumpState {
        self.states
            .get(clump)
            .copied()
            .unwrap_or(ClumpState::Unprocessed)
    }

    /// Fit, smooth and render into `output`.
    pub fn run(&mut self, table: &mut dyn AttributeTable, output: &mut dyn RasterSink) -> Result<()> {
        self.fit(table)?;
        self.smooth(table)?;
        self.render(table, output)
    }

    fn members(&self, clump: usize, extent: &Envelope, cloud_base: f64) -> Result<Vec<Member>> {
        let mut members = Members {
            clump,
            cloud_base,
            pixels: vec![],
        };
        self.calc
            .calc_within_envelope(&[self.clumps, self.temperature], extent, &mut members)?;
        Ok(members.pixels)
    }

    fn cast(&self, members: &[Member], base: f64, canvas: &mut ShadowCanvas) {
        for m in members {
            let (x, y) = self.sun.project(m.x, m.y, base + m.top);
            canvas.mark(x, y);
        }
    }

    /// Search the base heights `h_min, h_min + step, ..`
    /// up to `h_max`. An empty range yields `h_min` with no
    /// overlap.
    fn search(
        &self,
        members: &[Member],
        h_min: f64,
        h_max: f64,
        canvas: &mut ShadowCanvas,
    ) -> Result<HeightFit> {
        let mut best: Option<HeightFit> = None;
        let mut i = 0;
        loop {
            let height = h_min + i as f64 * self.params.step;
            if height > h_max + 1e-9 {
                break;
            }
            i += 1;

            self.cast(members, height, canvas);
            let (overlap_pixels, overlap) = canvas.overlap(self.calc, self.potential)?;
            canvas.reset();

            let fit = HeightFit {
                height,
                overlap_pixels,
                overlap,
            };
            if overlap == 0. {
                if best.is_none() {
                    best = Some(fit);
                } else if self.params.policy == SearchPolicy::StopOnZeroOverlap {
                    break;
                }
            } else if best.map_or(true, |b| overlap > b.overlap) {
                best = Some(fit);
            }
        }
        Ok(best.unwrap_or(HeightFit {
            height: h_min,
            overlap_pixels: 0,
            overlap: 0.,
        }))
    }

    /// Find the best base height of every non-empty clump
    /// and write the `FitBaseLine`, `NumPxlOverlap` and
    /// `FitOverlap` columns.
    pub fn fit(&mut self, table: &mut dyn AttributeTable) -> Result<()> {
        let clumps = ClumpTable::read(table)?;
        let h_min = table.read_real_column(columns::H_BASE_MIN)?;
        let h_max = table.read_real_column(columns::H_BASE_MAX)?;

        let rows = table.row_count();
        self.states = vec![ClumpState::Unprocessed; rows];
        let mut heights = vec![0.; rows];
        let mut pixels = vec![0i64; rows];
        let mut overlaps = vec![0.; rows];

        let mut canvas = ShadowCanvas::like(self.potential);
        for id in 1..rows {
            if clumps.counts[id] <= 0 {
                continue;
            }
            self.states[id] = ClumpState::HeightSearching;
            let members = self.members(id, &clumps.extents[id], clumps.cloud_base[id])?;
            let fit = self.search(&members, h_min[id], h_max[id], &mut canvas)?;
            debug!(
                "clump {}: base {:.2} km, overlap {:.3} ({} pixels)",
                id, fit.height, fit.overlap, fit.overlap_pixels
            );

            heights[id] = fit.height;
            pixels[id] = fit.overlap_pixels as i64;
            overlaps[id] = fit.overlap;
            self.states[id] = ClumpState::Fitted;
        }
        info!(
            "fitted {} clumps",
            self.states.iter().filter(|s| **s == ClumpState::Fitted).count()
        );

        table.write_real_column(columns::FIT_BASE_LINE, &heights)?;
        table.write_int_column(columns::NUM_PXL_OVERLAP, &pixels)?;
        table.write_real_column(columns::FIT_OVERLAP, &overlaps)?;
        Ok(())
    }

    /// Write `FitBaseLineEdit`: fitted heights with outliers
    /// replaced by the median.
    pub fn smooth(&mut self, table: &mut dyn AttributeTable) -> Result<()> {
        if self.states.len() != table.row_count() {
            bail!(CalcError::config("clump heights have not been fitted"));
        }
        let heights = table.read_real_column(columns::FIT_BASE_LINE)?;
        let fitted: Vec<bool> = self
            .states
            .iter()
            .map(|s| *s == ClumpState::Fitted)
            .collect();
        table.write_real_column(columns::FIT_BASE_LINE_EDIT, &edit_outliers(&heights, &fitted)?)?;

        for (s, f) in self.states.iter_mut().zip(fitted) {
            if f {
                *s = ClumpState::Smoothed;
            }
        }
        Ok(())
    }

    /// Cast every smoothed clump at its edited height and
    /// write the shadow mask into `output`, which must match
    /// the potential shadow raster.
    pub fn render(&mut self, table: &dyn AttributeTable, output: &mut dyn RasterSink) -> Result<()> {
        let clumps = ClumpTable::read(table)?;
        let heights = table.read_real_column(columns::FIT_BASE_LINE_EDIT)?;

        let mut canvas = ShadowCanvas::like(self.potential);
        for id in 1..self.states.len().min(clumps.counts.len()) {
            if self.states[id] != ClumpState::Smoothed {
                continue;
            }
            let members = self.members(id, &clumps.extents[id], clumps.cloud_base[id])?;
            self.cast(&members, heights[id], &mut canvas);
            self.states[id] = ClumpState::Rendered;
        }
        info!("rendered {} shadow pixels", canvas.marked_count());

        self.calc
            .calc_into_existing(&[canvas.raster()], &mut CopyBand, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeoTransform;
    use crate::raster::{MemRaster, PixelType};
    use crate::table::MemAttributeTable;

    // 20x20 pixels of 100m. With the sun at 45 degrees from
    // the south, a cloud at h km casts its shadow 10h pixels
    // north.
    fn grid(pixel_type: PixelType) -> MemRaster {
        MemRaster::new((20, 20), 1, pixel_type)
            .with_transform(GeoTransform::new(0., 100., 2000., -100.))
    }

    fn fill(raster: &mut MemRaster, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>, val: f64) {
        for row in rows {
            for col in cols.clone() {
                raster.set(0, col, row, val);
            }
        }
    }

    struct Scene {
        clumps: MemRaster,
        temperature: MemRaster,
        potential: MemRaster,
    }

    /// Clump 1 on rows 14..17, cols 5..8 at 20 degrees;
    /// potential shadow on `shadow_rows`.
    fn scene(shadow_rows: std::ops::Range<usize>) -> Scene {
        let mut clumps = grid(PixelType::UInt32);
        fill(&mut clumps, 14..17, 5..8, 1.);
        let mut temperature = grid(PixelType::Float32);
        fill(&mut temperature, 0..20, 0..20, 20.);
        let mut potential = grid(PixelType::Byte);
        fill(&mut potential, shadow_rows, 5..8, 1.);
        Scene {
            clumps,
            temperature,
            potential,
        }
    }

    fn table(scene: &Scene, h_min: f64, h_max: f64) -> Result<MemAttributeTable> {
        let mut table = populate_clump_extents(&ImageCalc::new(), &scene.clumps)?;
        let rows = table.row_count();
        let mut column = |name: &str, val: f64| {
            let mut values = vec![0.; rows];
            values[1..].iter_mut().for_each(|v| *v = val);
            table.write_real_column(name, &values)
        };
        column(columns::CLOUD_BASE, 20.)?;
        column(columns::H_BASE_MIN, h_min)?;
        column(columns::H_BASE_MAX, h_max)?;
        Ok(table)
    }

    fn fit(scene: &Scene, table: &mut MemAttributeTable, params: ShadowFitParams) -> Result<Vec<ClumpState>> {
        let calc = ImageCalc::new();
        let mut fit = CloudShadowFit::new(&calc, &scene.clumps, &scene.temperature, &scene.potential, params)?;
        fit.fit(table)?;
        Ok((0..table.row_count()).map(|i| fit.state(i)).collect())
    }

    #[test]
    fn finds_best_height() -> Result<()> {
        let scene = scene(4..7);
        let mut table = table(&scene, 0.8, 1.2)?;
        let states = fit(&scene, &mut table, ShadowFitParams::new(45., 180.).with_step(0.2))?;
        assert_eq!(states, vec![ClumpState::Unprocessed, ClumpState::Fitted]);

        let heights = table.read_real_column(columns::FIT_BASE_LINE)?;
        assert!((heights[1] - 1.).abs() < 1e-9);
        assert_eq!(table.read_int_column(columns::NUM_PXL_OVERLAP)?, vec![0, 9]);
        assert_eq!(table.read_real_column(columns::FIT_OVERLAP)?[1], 1.);
        Ok(())
    }

    #[test]
    fn search_policies() -> Result<()> {
        // Shadow rows 2..5 need 1.2 km; 0.6 km scores zero.
        let scene = scene(2..5);
        let params = ShadowFitParams::new(45., 180.).with_step(0.2);

        let mut table_stop = table(&scene, 0.6, 1.3)?;
        fit(&scene, &mut table_stop, params)?;
        assert!((table_stop.read_real_column(columns::FIT_BASE_LINE)?[1] - 0.6).abs() < 1e-9);
        assert_eq!(table_stop.read_real_column(columns::FIT_OVERLAP)?[1], 0.);

        let mut table_all = table(&scene, 0.6, 1.3)?;
        fit(&scene, &mut table_all, params.with_policy(SearchPolicy::Exhaustive))?;
        assert!((table_all.read_real_column(columns::FIT_BASE_LINE)?[1] - 1.2).abs() < 1e-9);
        assert_eq!(table_all.read_int_column(columns::NUM_PXL_OVERLAP)?[1], 9);
        Ok(())
    }

    #[test]
    fn zero_on_first_candidate_keeps_searching() -> Result<()> {
        // 0.8 km scores zero, 1.0 km overlaps a third and
        // 1.2 km fully.
        let scene = scene(2..5);
        let mut table = table(&scene, 0.8, 1.3)?;
        fit(&scene, &mut table, ShadowFitParams::new(45., 180.).with_step(0.2))?;
        assert!((table.read_real_column(columns::FIT_BASE_LINE)?[1] - 1.2).abs() < 1e-9);
        assert_eq!(table.read_int_column(columns::NUM_PXL_OVERLAP)?[1], 9);
        assert_eq!(table.read_real_column(columns::FIT_OVERLAP)?[1], 1.);
        Ok(())
    }

    #[test]
    fn empty_range_and_single_pixel() -> Result<()> {
        let mut scene = scene(4..7);
        scene.clumps.set(0, 15, 15, 2.);
        let mut table = table(&scene, 0.8, 1.2)?;

        let mut h_max = table.read_real_column(columns::H_BASE_MAX)?;
        h_max[1] = 0.5;
        table.write_real_column(columns::H_BASE_MAX, &h_max)?;
        fit(&scene, &mut table, ShadowFitParams::new(45., 180.).with_step(0.2))?;

        let heights = table.read_real_column(columns::FIT_BASE_LINE)?;
        assert_eq!(heights[1], 0.8);
        assert_eq!(table.read_int_column(columns::NUM_PXL_OVERLAP)?, vec![0, 0, 0]);
        // A one pixel shadow never scores.
        assert!((heights[2] - 0.8).abs() < 1e-9);
        assert_eq!(table.read_real_column(columns::FIT_OVERLAP)?[2], 0.);
        Ok(())
    }

    #[test]
    fn outliers_take_the_median() -> Result<()> {
        let heights = [0., 1.0, 1.05, 1.1, 1.2, 1.3, 4.0, 0.25, 9.];
        let fitted = [true, true, true, true, true, true, true, true, false];
        let edited = edit_outliers(&heights, &fitted)?;
        assert_eq!(edited, edit_outliers(&heights, &fitted)?);

        let values: Vec<f64> = heights[1..8].to_vec();
        let ps = percentiles(&values, 0.1, &[0.25, 0.5, 0.75])?.unwrap();
        assert_eq!(edited[0], 0.);
        assert_eq!(edited[8], 0.);
        for id in 1..8 {
            if heights[id] < ps[0] || heights[id] > ps[2] {
                assert_eq!(edited[id], ps[1]);
            } else {
                assert_eq!(edited[id], heights[id]);
            }
        }
        assert_eq!(edited[6], ps[1]);
        assert_eq!(edited[7], ps[1]);

        assert_eq!(edit_outliers(&[0., 2.], &[true, false])?, vec![0., 0.]);

        // A runaway height cannot be binned.
        assert!(edit_outliers(&[0., 1., 1e30], &[true, true, true]).is_err());
        Ok(())
    }

    #[test]
    fn renders_edited_heights() -> Result<()> {
        let scene = scene(4..7);
        let mut table = table(&scene, 0.8, 1.2)?;
        let calc = ImageCalc::new();
        let params = ShadowFitParams::new(45., 180.).with_step(0.2);
        let mut fit = CloudShadowFit::new(&calc, &scene.clumps, &scene.temperature, &scene.potential, params)?;

        let mut output = grid(PixelType::Byte);
        assert!(fit.smooth(&mut table).is_err());
        fit.fit(&mut table)?;
        fit.smooth(&mut table)?;
        assert_eq!(fit.state(1), ClumpState::Smoothed);

        table.write_real_column(columns::FIT_BASE_LINE_EDIT, &[0., 0.8])?;
        fit.render(&table, &mut output)?;
        assert_eq!(fit.state(1), ClumpState::Rendered);
        assert_eq!(fit.state(0), ClumpState::Unprocessed);

        assert_eq!(output.band(0).sum(), 9.);
        for row in 6..9 {
            for col in 5..8 {
                assert_eq!(output.get(0, col, row), 1.);
            }
        }
        Ok(())
    }

    #[test]
    fn rejects_bad_step() {
        let scene = scene(4..7);
        let calc = ImageCalc::new();
        let params = ShadowFitParams::new(45., 180.).with_step(0.);
        assert!(CloudShadowFit::new(&calc, &scene.clumps, &scene.temperature, &scene.potential, params).is_err());
    }
}

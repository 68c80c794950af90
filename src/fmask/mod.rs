//! Fmask-style cloud, shadow, snow and water detection as a
//! chain of per-pixel computations driven by [`ImageCalc`].
//!
//! 1. [`Pass1`] runs the spectral tests on a `[bands,
//!    saturation]` stack. [`ValidMask`] flags valid pixels.
//! 2. [`Pass1Export`] writes clear-sky temperatures, from
//!    which [`ThermalThresholds`] are computed.
//! 3. [`CloudProbability`] and [`CloudDecision`] produce the
//!    cloud mask ([`run_pass2`]), which [`MajorityFilter`]
//!    grows.
//! 4. [`PotentialShadow`] flags candidate shadow pixels for
//!    the shadow fit.
//!
//! Every pass derives its band positions from one
//! [`BandLayout`].

use anyhow::bail;
use tracing::info;

use crate::calc::{BandVisitor, ImageCalc};
use crate::columns::ColumnSink;
use crate::error::CalcError;
use crate::raster::{NewRaster, RasterDriver, RasterSource, SelectBands};
use crate::Result;

mod bands;
pub mod export;
mod filter;
pub mod pass1;
pub mod pass2;
mod shadow;

pub use bands::BandLayout;
pub use export::{Pass1Export, ThermalThresholds};
pub use filter::MajorityFilter;
pub use pass1::{Pass1, Pass1Config, SpectralTests, ValidMask, PASS1_BAND_NAMES};
pub use pass2::{
    CloudDecision, CloudProbability, ProbabilitySamples, ProbabilityThresholds, PASS2_BAND_NAMES,
};
pub use shadow::{PotentialShadow, ShadowBands};

#[inline]
pub(crate) fn flag(b: bool) -> f64 {
    if b {
        1.
    } else {
        0.
    }
}

/// Rasters and counts produced by [`run_pass1`].
pub struct Pass1Output<R> {
    pub pass1: R,
    pub valid: R,
    pub valid_count: usize,
    pub pcp_count: usize,
}

impl<R> Pass1Output<R> {
    pub fn pcp_ratio(&self) -> f64 {
        if self.valid_count == 0 {
            0.
        } else {
            self.pcp_count as f64 / self.valid_count as f64
        }
    }
}

/// Run the first pass on `image` and its `saturation`
/// flags, compute the validity mask and export clear-sky
/// temperatures to `export`.
pub fn run_pass1<D: RasterDriver>(
    calc: &ImageCalc,
    image: &dyn RasterSource,
    saturation: &dyn RasterSource,
    config: Pass1Config,
    pass1_output: &NewRaster<'_, D>,
    valid_output: &NewRaster<'_, D>,
    export: &mut dyn ColumnSink,
) -> Result<Pass1Output<D::Raster>> {
    let layout = BandLayout::for_band_count(image.band_count())?;
    if saturation.band_count() != layout.count {
        bail!(CalcError::Mismatch {
            what: "saturation band count",
            found: saturation.band_count(),
            expected: layout.count,
        });
    }

    info!("fmask pass 1 on {} bands", layout.count);
    let pass1 = calc.calc_to_new(
        &[image, saturation],
        &mut Pass1::new(layout, config),
        pass1_output,
    )?;
    let valid = calc.calc_to_new(&[image], &mut ValidMask::new(layout), valid_output)?;

    let thermal = SelectBands::new(image, vec![layout.thermal1])?;
    let mut exporter = Pass1Export::new(export, config.scale_factor)?;
    calc.calc_no_output(&[&thermal, &pass1, &valid], &mut exporter)?;
    let (valid_count, pcp_count) = (exporter.valid_count(), exporter.pcp_count());
    info!(
        "{} valid pixels, {} potential cloud ({:.1}%)",
        valid_count,
        pcp_count,
        100. * exporter.pcp_ratio()
    );

    Ok(Pass1Output {
        pass1,
        valid,
        valid_count,
        pcp_count,
    })
}

/// Rasters and thresholds produced by [`run_pass2`].
pub struct Pass2Output<R> {
    pub probabilities: R,
    pub cloud: R,
    pub thresholds: ProbabilityThresholds,
    pub cloud_count: usize,
}

/// Run the second pass: cloud probabilities over `[image,
/// saturation, pass1]`, their clear-sky thresholds and the
/// cloud decision. Probability bands are named after
/// [`PASS2_BAND_NAMES`] unless `probs_output` names them.
#[allow(clippy::too_many_arguments)]
pub fn run_pass2<D: RasterDriver>(
    calc: &ImageCalc,
    image: &dyn RasterSource,
    saturation: &dyn RasterSource,
    pass1: &dyn RasterSource,
    scale_factor: f64,
    thermal: &ThermalThresholds,
    probs_output: &NewRaster<'_, D>,
    cloud_output: &NewRaster<'_, D>,
) -> Result<Pass2Output<D::Raster>> {
    let layout = BandLayout::for_band_count(image.band_count())?;
    if saturation.band_count() != layout.count {
        bail!(CalcError::Mismatch {
            what: "saturation band count",
            found: saturation.band_count(),
            expected: layout.count,
        });
    }
    if pass1.band_count() != PASS1_BAND_NAMES.len() {
        bail!(CalcError::Mismatch {
            what: "pass 1 band count",
            found: pass1.band_count(),
            expected: PASS1_BAND_NAMES.len(),
        });
    }

    info!(
        "fmask pass 2: land {:.2}..{:.2}, water {:.2}",
        thermal.land_lower, thermal.land_upper, thermal.water_upper
    );
    let names: Vec<String> = PASS2_BAND_NAMES.iter().map(|n| n.to_string()).collect();
    let probs_output = NewRaster {
        band_names: probs_output.band_names.or(Some(names.as_slice())),
        ..*probs_output
    };
    let probabilities = calc.calc_to_new(
        &[image, saturation, pass1],
        &mut CloudProbability::new(layout, scale_factor, *thermal),
        &probs_output,
    )?;

    let mut samples = ProbabilitySamples::new();
    calc.calc_no_output(&[pass1, &probabilities], &mut samples)?;
    let thresholds = samples.thresholds()?;
    info!(
        "cloud probability thresholds: land {:.3}, water {:.3}",
        thresholds.land, thresholds.water
    );

    let mut decision = CloudDecision::new(layout, scale_factor, thresholds, thermal);
    let cloud = calc.calc_to_new(
        &[image, saturation, pass1, &probabilities],
        &mut decision,
        cloud_output,
    )?;
    let mut count = CloudCount(0);
    calc.calc_no_output(&[&cloud], &mut count)?;
    info!("{} cloud pixels", count.0);

    Ok(Pass2Output {
        probabilities,
        cloud,
        thresholds,
        cloud_count: count.0,
    })
}

struct CloudCount(usize);

impl BandVisitor for CloudCount {
    fn visit(&mut self, bands: &[f64]) -> Result<()> {
        if bands[0] == 1. {
            self.0 += 1;
        }
        Ok(())
    }
}

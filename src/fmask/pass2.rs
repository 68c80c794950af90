//! Second pass: cloud probabilities and the final cloud
//! decision.

use super::pass1::index as p1;
use super::{flag, BandLayout, ThermalThresholds};
use crate::calc::{BandCalc, BandVisitor};
use crate::histogram::percentiles;
use crate::Result;

/// Positions of the probability outputs.
pub mod index {
    pub const WATER_TEMP_PROB: usize = 0;
    pub const BRIGHTNESS_PROB: usize = 1;
    pub const WATER_CLOUD_PROB: usize = 2;
    pub const LAND_TEMP_PROB: usize = 3;
    pub const LAND_CLOUD_PROB: usize = 4;

    pub const COUNT: usize = 5;
}

pub const PASS2_BAND_NAMES: [&str; index::COUNT] = [
    "WaterTempProb",
    "BrightnessProb",
    "WaterCloudProb",
    "LandTempProb",
    "LandCloudProb",
];

/// Cloud probabilities over a `[bands, saturation, pass1]`
/// stack. Water pixels get the water probabilities, the
/// others the land probabilities.
#[derive(Clone, Debug)]
pub struct CloudProbability {
    layout: BandLayout,
    scale_factor: f64,
    thresholds: ThermalThresholds,
}

impl CloudProbability {
    pub fn new(layout: BandLayout, scale_factor: f64, thresholds: ThermalThresholds) -> Self {
        CloudProbability {
            layout,
            scale_factor,
            thresholds,
        }
    }

    /// Input bands expected per pixel.
    pub fn stack_len(&self) -> usize {
        self.layout.stack_len() + p1::COUNT
    }
}

impl BandCalc for CloudProbability {
    fn num_out_bands(&self) -> usize {
        index::COUNT
    }

    fn calc(&mut self, bands: &[f64], out: &mut [f64]) -> Result<()> {
        out.iter_mut().for_each(|v| *v = 0.);
        let l = &self.layout;
        if l.is_no_data(bands) {
            return Ok(());
        }

        let pass1 = &bands[l.stack_len()..];
        let thermal1 = bands[l.thermal1] / self.scale_factor;
        let th = &self.thresholds;

        if pass1[p1::WATER_TEST] == 1. {
            let swir1 = bands[l.swir1] / self.scale_factor;
            let temp = (th.water_upper - thermal1) / 4.;
            let brightness = swir1.min(0.11) / 0.11;
            out[index::WATER_TEMP_PROB] = temp;
            out[index::BRIGHTNESS_PROB] = brightness;
            out[index::WATER_CLOUD_PROB] = temp * brightness;
        } else {
            let temp = (th.land_upper + (4. - thermal1))
                / (th.land_upper + (4. - (th.land_lower - 4.)));
            out[index::LAND_TEMP_PROB] = temp;
            out[index::LAND_CLOUD_PROB] = pass1[p1::VAR_PROB] * temp;
        }
        Ok(())
    }
}

/// Upper probability thresholds of the cloud decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbabilityThresholds {
    pub land: f64,
    pub water: f64,
}

impl ProbabilityThresholds {
    /// Added to the 82.5th percentile of the clear-sky
    /// probabilities.
    pub const MARGIN: f64 = 0.2;
}

/// Collects the land cloud probability of clear land
/// pixels and the water cloud probability of clear water
/// pixels, over a `[pass1, probabilities]` stack.
#[derive(Clone, Debug, Default)]
pub struct ProbabilitySamples {
    land: Vec<f64>,
    water: Vec<f64>,
}

impl ProbabilitySamples {
    pub fn new() -> Self {
        Default::default()
    }

    /// 82.5th percentiles plus [`ProbabilityThresholds::MARGIN`].
    /// A class without samples gets a threshold of 1.
    pub fn thresholds(&self) -> Result<ProbabilityThresholds> {
        let upper = |vals: &[f64]| -> Result<f64> {
            Ok(percentiles(vals, 0.001, &[ThermalThresholds::UPPER])?
                .map_or(1., |ps| ps[0] + ProbabilityThresholds::MARGIN))
        };
        Ok(ProbabilityThresholds {
            land: upper(&self.land)?,
            water: upper(&self.water)?,
        })
    }
}

impl BandVisitor for ProbabilitySamples {
    fn visit(&mut self, bands: &[f64]) -> Result<()> {
        let probs = &bands[p1::COUNT..];
        if bands[p1::CLEAR_SKY_LAND] == 1. {
            self.land.push(probs[index::LAND_CLOUD_PROB]);
        } else if bands[p1::CLEAR_SKY_WATER] == 1. {
            self.water.push(probs[index::WATER_CLOUD_PROB]);
        }
        Ok(())
    }
}

/// Final cloud flag over a `[bands, saturation, pass1,
/// probabilities]` stack.
#[derive(Clone, Debug)]
pub struct CloudDecision {
    layout: BandLayout,
    scale_factor: f64,
    probability: ProbabilityThresholds,
    land_lower: f64,
}

impl CloudDecision {
    /// Below this many degrees under the clear land lower
    /// temperature a pixel is cloud regardless.
    pub const COLD_OFFSET: f64 = 35.;
    pub const CERTAIN: f64 = 0.99;

    pub fn new(
        layout: BandLayout,
        scale_factor: f64,
        probability: ProbabilityThresholds,
        thermal: &ThermalThresholds,
    ) -> Self {
        CloudDecision {
            layout,
            scale_factor,
            probability,
            land_lower: thermal.land_lower,
        }
    }

    pub fn is_cloud(&self, bands: &[f64]) -> bool {
        let l = &self.layout;
        if l.is_no_data(bands) {
            return false;
        }
        let pass1 = &bands[l.stack_len()..];
        let probs = &pass1[p1::COUNT..];

        let water = pass1[p1::WATER_TEST] == 1.;
        let pcp = pass1[p1::PCP] == 1.;
        let land_prob = probs[index::LAND_CLOUD_PROB];
        let thermal1 = bands[l.thermal1] / self.scale_factor;

        if water && pcp && probs[index::WATER_CLOUD_PROB] > self.probability.water {
            true
        } else if !water && pcp && land_prob > self.probability.land {
            true
        } else if !water && land_prob > Self::CERTAIN {
            true
        } else {
            thermal1 < self.land_lower - Self::COLD_OFFSET
        }
    }
}

impl BandCalc for CloudDecision {
    fn num_out_bands(&self) -> usize {
        1
    }

    fn calc(&mut self, bands: &[f64], out: &mut [f64]) -> Result<()> {
        out[0] = flag(self.is_cloud(bands));
        Ok(())
    }
}

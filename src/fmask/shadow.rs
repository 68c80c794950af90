use super::flag;
use crate::calc::BandCalc;
use crate::Result;

/// Bands compared by [`PotentialShadow`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowBands {
    /// Input `[candidate, nir, nir_filled, swir, swir_filled]`;
    /// both differences must exceed the threshold.
    NirSwir,
    /// Input `[candidate, band, band_filled]`.
    Single,
}

/// Potential cloud shadow: a candidate pixel whose
/// flood-filled band(s) exceed the original by more than
/// [`PotentialShadow::DIFF_THRESHOLD`] in reflectance.
#[derive(Clone, Copy, Debug)]
pub struct PotentialShadow {
    bands: ShadowBands,
    scale_factor: f64,
}

impl PotentialShadow {
    pub const DIFF_THRESHOLD: f64 = 0.02;

    pub fn new(bands: ShadowBands, scale_factor: f64) -> Self {
        PotentialShadow {
            bands,
            scale_factor,
        }
    }

    pub fn input_len(&self) -> usize {
        match self.bands {
            ShadowBands::NirSwir => 5,
            ShadowBands::Single => 3,
        }
    }

    fn darker(&self, original: f64, filled: f64) -> bool {
        (filled - original) / self.scale_factor > Self::DIFF_THRESHOLD
    }
}

impl BandCalc for PotentialShadow {
    fn num_out_bands(&self) -> usize {
        1
    }

    fn calc(&mut self, bands: &[f64], out: &mut [f64]) -> Result<()> {
        let shadow = bands[0] == 1.
            && match self.bands {
                ShadowBands::NirSwir => {
                    self.darker(bands[1], bands[2]) && self.darker(bands[3], bands[4])
                }
                ShadowBands::Single => self.darker(bands[1], bands[2]),
            };
        out[0] = flag(shadow);
        Ok(())
    }
}

use anyhow::bail;

use crate::error::CalcError;
use crate::Result;

/// Positions of the spectral bands in an input image of 7,
/// 8 or 9 bands:
///
/// | bands | order                                                       |
/// |-------|-------------------------------------------------------------|
/// | 7     | blue, green, red, nir, swir1, thermal1, swir2               |
/// | 8     | blue, green, red, nir, swir1, thermal1, thermal2, swir2     |
/// | 9     | coastal, blue, green, red, nir, swir1, swir2, thermal1, thermal2 |
///
/// Each pass reads the image followed by a saturation
/// image with the same band order, so the saturation flag
/// of band `i` is at `count + i`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandLayout {
    pub count: usize,
    pub coastal: Option<usize>,
    pub blue: usize,
    pub green: usize,
    pub red: usize,
    pub nir: usize,
    pub swir1: usize,
    pub swir2: usize,
    pub thermal1: usize,
    pub thermal2: Option<usize>,
}

impl BandLayout {
    pub fn for_band_count(count: usize) -> Result<Self> {
        Ok(match count {
            7 => BandLayout {
                count,
                coastal: None,
                blue: 0,
                green: 1,
                red: 2,
                nir: 3,
                swir1: 4,
                thermal1: 5,
                thermal2: None,
                swir2: 6,
            },
            8 => BandLayout {
                count,
                coastal: None,
                blue: 0,
                green: 1,
                red: 2,
                nir: 3,
                swir1: 4,
                thermal1: 5,
                thermal2: Some(6),
                swir2: 7,
            },
            9 => BandLayout {
                count,
                coastal: Some(0),
                blue: 1,
                green: 2,
                red: 3,
                nir: 4,
                swir1: 5,
                swir2: 6,
                thermal1: 7,
                thermal2: Some(8),
            },
            _ => bail!(CalcError::config(format!(
                "expected 7, 8 or 9 input bands, got {}",
                count
            ))),
        })
    }

    /// Index of the saturation flag of `band` in a
    /// `[bands, saturation]` stack.
    #[inline]
    pub fn saturation(&self, band: usize) -> usize {
        self.count + band
    }

    /// Length of a `[bands, saturation]` stack.
    #[inline]
    pub fn stack_len(&self) -> usize {
        2 * self.count
    }

    /// The reflective (non-thermal) bands.
    pub fn reflective(&self) -> Vec<usize> {
        let mut bands: Vec<usize> = self.coastal.into_iter().collect();
        bands.extend_from_slice(&[
            self.blue, self.green, self.red, self.nir, self.swir1, self.swir2,
        ]);
        bands
    }

    /// No-data pixels: every band is zero or, without a
    /// coastal band, the thermal band(s) are zero.
    pub fn is_no_data(&self, bands: &[f64]) -> bool {
        if bands[..self.count].iter().all(|v| *v == 0.) {
            return true;
        }
        if self.coastal.is_some() {
            return false;
        }
        bands[self.thermal1] == 0. && self.thermal2.map_or(true, |t| bands[t] == 0.)
    }

    /// True if any reflective band is flagged saturated.
    pub fn any_saturated(&self, stack: &[f64]) -> bool {
        self.reflective()
            .into_iter()
            .any(|b| stack[self.saturation(b)] == 1.)
    }
}

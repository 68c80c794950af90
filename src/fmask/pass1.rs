//! First pass: per-pixel spectral tests.

use super::{flag, BandLayout};
use crate::calc::BandCalc;
use crate::Result;

/// Positions of the first pass outputs.
pub mod index {
    pub const NDSI: usize = 0;
    pub const NDVI: usize = 1;
    pub const BASIC_TEST: usize = 2;
    pub const MEAN_VIS: usize = 3;
    pub const WHITENESS_TEST: usize = 4;
    pub const HOT_TEST: usize = 5;
    pub const NIR_SWIR_TEST: usize = 6;
    pub const WATER_TEST: usize = 7;
    pub const PCP: usize = 8;
    pub const CLEAR_SKY_LAND: usize = 9;
    pub const SNOW_TEST: usize = 10;
    pub const VAR_PROB: usize = 11;
    pub const MOD_NDVI: usize = 12;
    pub const MOD_NDSI: usize = 13;
    pub const WHITENESS: usize = 14;
    pub const CLEAR_SKY_WATER: usize = 15;

    pub const COUNT: usize = 16;
}

/// Band names of the first pass output, in order.
pub const PASS1_BAND_NAMES: [&str; index::COUNT] = [
    "NDSI",
    "NDVI",
    "BasicTest",
    "MeanVis",
    "WhitenessTest",
    "HOTTest",
    "NIRSWIRTest",
    "WaterTest",
    "PCP",
    "ClearSkyLand",
    "SnowTest",
    "VarProb",
    "ModNDVI",
    "ModNDSI",
    "Whiteness",
    "ClearSkyWater",
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pass1Config {
    /// Divisor turning stored values into reflectance
    /// (and thermal bands into degrees Celsius).
    pub scale_factor: f64,
    pub whiteness_threshold: f64,
}

impl Default for Pass1Config {
    fn default() -> Self {
        Pass1Config {
            scale_factor: 10000.,
            whiteness_threshold: 0.7,
        }
    }
}

impl Pass1Config {
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_whiteness_threshold(mut self, threshold: f64) -> Self {
        self.whiteness_threshold = threshold;
        self
    }
}

/// Outcome of the spectral tests on one pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpectralTests {
    pub ndsi: f64,
    pub ndvi: f64,
    pub basic: bool,
    pub mean_vis: f64,
    pub whiteness_test: bool,
    pub hot: bool,
    pub nir_swir: bool,
    pub water: bool,
    pub pcp: bool,
    pub clear_sky_land: bool,
    pub snow: bool,
    pub var_prob: f64,
    pub mod_ndvi: f64,
    pub mod_ndsi: f64,
    pub whiteness: f64,
    pub clear_sky_water: bool,
}

impl SpectralTests {
    pub fn write(&self, out: &mut [f64]) {
        out[index::NDSI] = self.ndsi;
        out[index::NDVI] = self.ndvi;
        out[index::BASIC_TEST] = flag(self.basic);
        out[index::MEAN_VIS] = self.mean_vis;
        out[index::WHITENESS_TEST] = flag(self.whiteness_test);
        out[index::HOT_TEST] = flag(self.hot);
        out[index::NIR_SWIR_TEST] = flag(self.nir_swir);
        out[index::WATER_TEST] = flag(self.water);
        out[index::PCP] = flag(self.pcp);
        out[index::CLEAR_SKY_LAND] = flag(self.clear_sky_land);
        out[index::SNOW_TEST] = flag(self.snow);
        out[index::VAR_PROB] = self.var_prob;
        out[index::MOD_NDVI] = self.mod_ndvi;
        out[index::MOD_NDSI] = self.mod_ndsi;
        out[index::WHITENESS] = self.whiteness;
        out[index::CLEAR_SKY_WATER] = flag(self.clear_sky_water);
    }
}

/// Pass 1 over a `[bands, saturation]` stack, producing
/// the 16 values of [`index`].
#[derive(Clone, Debug)]
pub struct Pass1 {
    layout: BandLayout,
    config: Pass1Config,
}

impl Pass1 {
    pub fn new(layout: BandLayout, config: Pass1Config) -> Self {
        Pass1 { layout, config }
    }

    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }

    /// Run the tests on one pixel; `None` for no-data.
    pub fn tests(&self, stack: &[f64]) -> Option<SpectralTests> {
        let l = &self.layout;
        if l.is_no_data(stack) {
            return None;
        }
        let scale = self.config.scale_factor;
        let band = |i: usize| stack[i] / scale;

        let blue = band(l.blue);
        let green = band(l.green);
        let red = band(l.red);
        let nir = band(l.nir);
        let swir1 = band(l.swir1);
        let swir2 = band(l.swir2);
        let thermal1 = band(l.thermal1);

        let ndsi = (green - swir1) / (green + swir1);
        let ndvi = (nir - red) / (nir + red);
        let basic = swir2 > 0.03 && thermal1 < 27. && ndvi < 0.8 && ndsi < 0.8;

        let mean_vis = (blue + green + red) / 3.;
        let mut whiteness = (blue - mean_vis).abs() / mean_vis
            + (green - mean_vis).abs() / mean_vis
            + (red - mean_vis).abs() / mean_vis;
        let mut whiteness_test = whiteness < self.config.whiteness_threshold;
        let hot = blue - 0.5 * red - 0.08 > 0.;
        let nir_swir = nir / swir1 > 0.75;
        let water = (ndvi < 0.01 && nir < 0.11) || (ndvi < 0.1 && nir < 0.05);
        let mut pcp = basic && whiteness_test && hot && nir_swir;

        // Saturated bright pixels fail the whiteness and
        // haze tests.
        if l.any_saturated(stack) && mean_vis > 0.45 {
            pcp = true;
            whiteness_test = true;
            whiteness = 0.;
        }

        let clear_sky_water = water && swir2 < 0.03;
        let clear_sky_land = !pcp && !water;

        let mod_ndsi = if stack[l.saturation(l.green)] == 1. {
            0.
        } else {
            ndsi
        };
        let mod_ndvi = if stack[l.saturation(l.red)] == 1. {
            0.
        } else {
            ndvi
        };
        let var_prob = 1. - mod_ndvi.abs().max(mod_ndsi.abs()).max(whiteness);
        let snow = ndsi > 0.15 && thermal1 < 3.8 && nir > 0.11 && green > 0.1;

        Some(SpectralTests {
            ndsi,
            ndvi,
            basic,
            mean_vis,
            whiteness_test,
            hot,
            nir_swir,
            water,
            pcp,
            clear_sky_land,
            snow,
            var_prob,
            mod_ndvi,
            mod_ndsi,
            whiteness,
            clear_sky_water,
        })
    }
}

impl BandCalc for Pass1 {
    fn num_out_bands(&self) -> usize {
        index::COUNT
    }

    fn calc(&mut self, bands: &[f64], out: &mut [f64]) -> Result<()> {
        match self.tests(bands) {
            Some(tests) => tests.write(out),
            None => out.iter_mut().for_each(|v| *v = 0.),
        }
        Ok(())
    }
}

/// Validity of each pixel of an image: 1 unless no-data.
#[derive(Clone, Debug)]
pub struct ValidMask {
    layout: BandLayout,
}

impl ValidMask {
    pub fn new(layout: BandLayout) -> Self {
        ValidMask { layout }
    }
}

impl BandCalc for ValidMask {
    fn num_out_bands(&self) -> usize {
        1
    }

    fn calc(&mut self, bands: &[f64], out: &mut [f64]) -> Result<()> {
        out[0] = flag(!self.layout.is_no_data(bands));
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::calc::ImageCalc;
    use crate::raster::{MemDriver, MemRaster, NewRaster, PixelType, RasterSource};
    use ndarray::Array2;
    use std::path::Path;

    fn assert_close(found: &[f64], expected: &[f64]) {
        assert_eq!(found.len(), expected.len());
        for (i, (a, b)) in found.iter().zip(expected).enumerate() {
            assert!((a - b).abs() < 1e-5, "output {}: {} != {}", i, a, b);
        }
    }

    fn pass1(count: usize) -> Pass1 {
        Pass1::new(
            BandLayout::for_band_count(count).unwrap(),
            Pass1Config::default(),
        )
    }

    #[test]
    fn no_data_gives_zeros() -> Result<()> {
        for count in &[7, 8, 9] {
            let mut calc = pass1(*count);
            let mut out = vec![-1.; index::COUNT];
            calc.calc(&vec![0.; 2 * count], &mut out)?;
            assert_eq!(out, vec![0.; index::COUNT], "{} bands", count);
        }

        // Zero thermal without a coastal band.
        let mut calc = pass1(8);
        let mut stack = vec![500.; 16];
        stack[5] = 0.;
        stack[6] = 0.;
        let mut out = vec![-1.; index::COUNT];
        calc.calc(&stack, &mut out)?;
        assert_eq!(out, vec![0.; index::COUNT]);
        Ok(())
    }

    #[test]
    fn saturation_overrides_whiteness() {
        let calc = pass1(7);
        // blue, green, red, nir, swir1, thermal1, swir2
        let mut stack = vec![9000., 2000., 3000., 2000., 1000., 300000., 500., 0., 0., 0., 0., 0., 0., 0.];
        let plain = calc.tests(&stack).unwrap();
        assert!(!plain.pcp && !plain.whiteness_test);

        stack[7 + 2] = 1.;
        let saturated = calc.tests(&stack).unwrap();
        assert!(saturated.pcp);
        assert!(saturated.whiteness_test);
        assert_eq!(saturated.whiteness, 0.);
        assert!(!saturated.clear_sky_land);
        assert_eq!(saturated.mod_ndvi, 0.);
        assert_eq!(saturated.mod_ndsi, plain.ndsi);
    }

    // 9 bands: coastal, blue, green, red, nir, swir1, swir2,
    // thermal1, thermal2. Reflectance scaled by 10000,
    // temperature in degrees by 10000 too.
    const VEGETATION: [f64; 9] = [300., 400., 800., 400., 4000., 2000., 1000., 200000., 200000.];
    const BRIGHT: [f64; 9] = [5000., 5000., 6000., 4000., 5500., 3000., 2000., 300000., 300000.];
    const WATER: [f64; 9] = [600., 500., 400., 300., 200., 100., 100., 150000., 150000.];

    #[rustfmt::skip]
    const VEGETATION_OUT: [f64; 16] = [
        -0.4285714, 0.8181818, 0., 0.0533333, 0., 0., 1., 0.,
        0., 1., 0., 0., 0.8181818, -0.4285714, 1., 0.,
    ];
    #[rustfmt::skip]
    const BRIGHT_OUT: [f64; 16] = [
        0.3333333, 0.1578947, 0., 0.5, 1., 1., 1., 0.,
        1., 0., 0., 0.8421053, 0.1578947, 0., 0., 0.,
    ];
    #[rustfmt::skip]
    const WATER_OUT: [f64; 16] = [
        0.6, -0.2, 0., 0.04, 1., 0., 1., 1.,
        0., 0., 0., 0.4, -0.2, 0.6, 0.5, 1.,
    ];

    /// A 4x4 scene cycling vegetation, bright saturated,
    /// no-data and water pixels along the diagonals. Returns
    /// the image and its saturation flags.
    pub fn scene() -> (MemRaster, MemRaster) {
        let kind = |r: usize, c: usize| (r + c) % 4;
        let image = (0..9)
            .map(|b| {
                Array2::from_shape_fn((4, 4), |(r, c)| match kind(r, c) {
                    0 => VEGETATION[b],
                    1 => BRIGHT[b],
                    2 => 0.,
                    _ => WATER[b],
                })
            })
            .collect();
        let saturation = (0..9)
            .map(|b| {
                Array2::from_shape_fn((4, 4), |(r, c)| {
                    if b == 2 && kind(r, c) == 1 {
                        1.
                    } else {
                        0.
                    }
                })
            })
            .collect();
        (
            MemRaster::from_bands(image, PixelType::Float32).unwrap(),
            MemRaster::from_bands(saturation, PixelType::Byte).unwrap(),
        )
    }

    #[test]
    fn scene_outputs() -> Result<()> {
        let (image, saturation) = scene();
        let names: Vec<String> = PASS1_BAND_NAMES.iter().map(|s| s.to_string()).collect();
        let driver = MemDriver;
        let out = ImageCalc::new().calc_to_new(
            &[&image, &saturation],
            &mut pass1(9),
            &NewRaster::new(&driver, Path::new("pass1"), "MEM").with_band_names(&names),
        )?;
        assert_eq!(out.band_count(), 16);
        assert_eq!(out.band_name(8), "PCP");

        let pixel = |c: usize, r: usize| -> Vec<f64> { (0..16).map(|b| out.get(b, c, r)).collect() };
        for r in 0..4 {
            for c in 0..4 {
                match (r + c) % 4 {
                    0 => assert_close(&pixel(c, r), &VEGETATION_OUT),
                    1 => assert_close(&pixel(c, r), &BRIGHT_OUT),
                    2 => assert_eq!(pixel(c, r), vec![0.; 16]),
                    _ => assert_close(&pixel(c, r), &WATER_OUT),
                }
            }
        }
        Ok(())
    }

    #[test]
    fn valid_mask() -> Result<()> {
        let (image, _) = scene();
        let driver = MemDriver;
        let mut calc = ValidMask::new(BandLayout::for_band_count(9)?);
        let mask = ImageCalc::new().calc_to_new(
            &[&image],
            &mut calc,
            &NewRaster::new(&driver, Path::new("valid"), "MEM"),
        )?;
        assert_eq!(mask.get(0, 0, 0), 1.);
        assert_eq!(mask.get(0, 2, 0), 0.);
        assert_eq!(mask.band(0).sum(), 12.);
        Ok(())
    }
}

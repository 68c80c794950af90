use crate::calc::{ImageCalc, LocatedBandVisitor, PixelLocation};
use crate::geometry::{BoundsExt, Envelope, GeoTransform, GRID_EPSILON};
use crate::raster::{MemRaster, PixelType, RasterSource};
use crate::Result;

/// Sun position used to cast cloud pixels onto the ground.
#[derive(Clone, Copy, Debug)]
pub(super) struct SunGeometry {
    tan_zenith: f64,
    sin_azimuth: f64,
    cos_azimuth: f64,
}

impl SunGeometry {
    /// Angles in degrees.
    pub fn new(zenith: f64, azimuth: f64) -> Self {
        let azimuth = azimuth.to_radians();
        SunGeometry {
            tan_zenith: zenith.to_radians().tan(),
            sin_azimuth: azimuth.sin(),
            cos_azimuth: azimuth.cos(),
        }
    }

    /// Ground position of the shadow of a point at `(x, y)`
    /// and `height` km.
    pub fn project(&self, x: f64, y: f64, height: f64) -> (f64, f64) {
        let d = height * 1000. * self.tan_zenith;
        (x - d * self.sin_azimuth, y - d * self.cos_azimuth)
    }
}

/// Scratch shadow raster on the grid of the potential
/// shadow mask. Remembers the pixels it marked so they can
/// be cleared without a full scan.
pub(super) struct ShadowCanvas {
    raster: MemRaster,
    transform: GeoTransform,
    marked: Vec<(usize, usize)>,
    extent: Option<Envelope>,
}

impl ShadowCanvas {
    pub fn like(grid: &dyn RasterSource) -> Self {
        let transform = grid.geo_transform();
        let raster = MemRaster::new(grid.dims(), 1, PixelType::Byte)
            .with_transform(transform)
            .with_projection(grid.projection())
            .with_block_height(grid.block_height());
        ShadowCanvas {
            raster,
            transform,
            marked: vec![],
            extent: None,
        }
    }

    /// Mark the pixel under `(x, y)`. Positions outside the
    /// raster are ignored.
    pub fn mark(&mut self, x: f64, y: f64) -> bool {
        let (width, height) = self.raster.dims();
        let (c, r) = self.transform.invert(x, y);
        if !(c >= 0. && r >= 0. && c < width as f64 && r < height as f64) {
            return false;
        }
        let (col, row) = (c.floor() as usize, r.floor() as usize);
        if self.raster.get(0, col, row) != 1. {
            self.raster.set(0, col, row, 1.);
            self.marked.push((col, row));

            let env = self.transform.pixel_envelope(col, row);
            self.extent = Some(match self.extent {
                Some(mut ext) => {
                    ext.expand_to_include(env.min().x, env.min().y);
                    ext.expand_to_include(env.max().x, env.max().y);
                    ext
                }
                None => env,
            });
        }
        true
    }

    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }

    pub fn raster(&self) -> &MemRaster {
        &self.raster
    }

    /// Unmark every marked pixel.
    pub fn reset(&mut self) {
        for (col, row) in self.marked.drain(..) {
            self.raster.set(0, col, row, 0.);
        }
        self.extent = None;
    }

    /// Pixels marked on the canvas that are also flagged in
    /// `potential`, and their share of the marked pixels.
    /// Zero when the marked extent is narrower or shorter
    /// than 2 pixels.
    pub fn overlap(&self, calc: &ImageCalc, potential: &dyn RasterSource) -> Result<(usize, f64)> {
        let extent = match &self.extent {
            Some(ext) => *ext,
            None => return Ok((0, 0.)),
        };
        let t = &self.transform;
        if extent.width() / t.pixel_width().abs() < 2. - GRID_EPSILON
            || extent.height() / t.pixel_height().abs() < 2. - GRID_EPSILON
        {
            return Ok((0, 0.));
        }

        let mut count = OverlapCount::default();
        calc.calc_within_envelope(&[&self.raster, potential], &extent, &mut count)?;
        if count.shadow == 0 {
            return Ok((0, 0.));
        }
        Ok((count.overlap, count.overlap as f64 / count.shadow as f64))
    }
}

#[derive(Default)]
struct OverlapCount {
    shadow: usize,
    overlap: usize,
}

impl LocatedBandVisitor for OverlapCount {
    fn visit(&mut self, bands: &[f64], _: &PixelLocation) -> Result<()> {
        if bands[0] == 1. {
            self.shadow += 1;
            if bands[1] == 1. {
                self.overlap += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> MemRaster {
        MemRaster::new((10, 10), 1, PixelType::Byte)
            .with_transform(GeoTransform::new(0., 100., 1000., -100.))
    }

    #[test]
    fn sun_projection() {
        let sun = SunGeometry::new(45., 180.);
        let (x, y) = sun.project(550., 450., 1.);
        assert!((x - 550.).abs() < 1e-9);
        assert!((y - 1450.).abs() < 1e-9);

        let (x, y) = SunGeometry::new(45., 90.).project(550., 450., 0.5);
        assert!((x - 50.).abs() < 1e-9);
        assert!((y - 450.).abs() < 1e-9);
    }

    #[test]
    fn marks_and_resets() -> Result<()> {
        let potential = grid();
        let mut canvas = ShadowCanvas::like(&potential);
        assert!(canvas.mark(150., 850.));
        assert!(canvas.mark(160., 840.));
        assert!(!canvas.mark(-10., 850.));
        assert!(!canvas.mark(150., 1010.));
        assert_eq!(canvas.marked_count(), 1);

        // One pixel is too small to score.
        assert_eq!(canvas.overlap(&ImageCalc::new(), &potential)?, (0, 0.));

        canvas.reset();
        assert_eq!(canvas.marked_count(), 0);
        assert_eq!(canvas.raster().band(0).sum(), 0.);
        Ok(())
    }

    #[test]
    fn overlap_ratio() -> Result<()> {
        let mut potential = grid();
        potential.set(0, 1, 1, 1.);
        potential.set(0, 3, 3, 1.);

        let mut canvas = ShadowCanvas::like(&potential);
        for (col, row) in &[(1, 1), (2, 1), (1, 2), (2, 2)] {
            let (x, y) = potential.geo_transform().pixel_center(*col, *row);
            canvas.mark(x, y);
        }
        let (pixels, ratio) = canvas.overlap(&ImageCalc::new(), &potential)?;
        assert_eq!(pixels, 1);
        assert_eq!(ratio, 0.25);
        Ok(())
    }
}

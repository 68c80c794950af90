//! Computations restricted to the pixels of a polygon.

use anyhow::bail;
use geo::{Area, BooleanOps, BoundingRect, Contains, Point, Polygon};

use super::engine::{create_output, Fill, Target};
use super::{BandCalc, ImageCalc};
use crate::align::resolve_overlap_within;
use crate::error::CalcError;
use crate::geometry::{BoundsExt, Envelope};
use crate::raster::{NewRaster, RasterDriver, RasterSink, RasterSource};
use crate::Result;

/// When a pixel counts as inside a polygon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelInPoly {
    /// The pixel centre lies in the polygon.
    Center,
    /// The pixel shares a positive area with the polygon.
    Overlap,
    /// The whole pixel lies in the polygon.
    Contained,
}

impl Default for PixelInPoly {
    fn default() -> Self {
        PixelInPoly::Center
    }
}

impl PixelInPoly {
    pub fn test(self, poly: &Polygon<f64>, pixel: &Envelope) -> bool {
        match self {
            PixelInPoly::Center => poly.contains(&Point::from(pixel.center())),
            PixelInPoly::Overlap => {
                let near = poly
                    .bounding_rect()
                    .map_or(false, |bbox| bbox.intersect(pixel).is_some());
                near && poly.intersection(&pixel.to_polygon()).unsigned_area() > 0.
            }
            PixelInPoly::Contained => poly.contains(&pixel.to_polygon()),
        }
    }
}

impl ImageCalc {
    /// Compute `calc` over the pixels of `envelope` that are
    /// in `poly`, into a new raster covering the envelope.
    /// Other pixels are set to `no_data`.
    #[allow(clippy::too_many_arguments)]
    pub fn calc_within_polygon_to_new<D: RasterDriver>(
        &self,
        sources: &[&dyn RasterSource],
        calc: &mut dyn BandCalc,
        output: &NewRaster<'_, D>,
        envelope: &Envelope,
        poly: &Polygon<f64>,
        no_data: f64,
        policy: PixelInPoly,
    ) -> Result<D::Raster> {
        let window = resolve_overlap_within(sources, envelope)?;
        let transform = window.transform();
        let bands = calc.num_out_bands();
        let mut raster = create_output(output, &window, sources, bands)?;

        let mut target = Target::new(&mut raster, bands);
        target.fill = Fill::Value(no_data as f32);
        self.block_loop(
            &[],
            sources,
            &window,
            Some(target),
            |_, floats, (col, row), out| {
                if policy.test(poly, &transform.pixel_envelope(col, row)) {
                    calc.calc(floats, out)
                } else {
                    Ok(())
                }
            },
        )?;
        Ok(raster)
    }

    /// Compute `calc` over the pixels of `envelope` that are
    /// in `poly`, writing into `output` at the matching
    /// position. `output` must share the pixel grid of the
    /// inputs; pixels outside the polygon keep their value.
    pub fn calc_within_polygon_into_existing(
        &self,
        sources: &[&dyn RasterSource],
        calc: &mut dyn BandCalc,
        output: &mut dyn RasterSink,
        envelope: &Envelope,
        poly: &Polygon<f64>,
        policy: PixelInPoly,
    ) -> Result<()> {
        let bands = calc.num_out_bands();
        if output.band_count() != bands {
            bail!(CalcError::Mismatch {
                what: "output band count",
                found: output.band_count(),
                expected: bands,
            });
        }

        let window = {
            let mut all = sources.to_vec();
            all.push(output.as_source());
            resolve_overlap_within(&all, envelope)?
        };
        let idx = sources.len();
        if !window.is_direct(idx) {
            bail!(CalcError::config("output is not on the pixel grid of the inputs"));
        }
        let transform = window.transform();

        let mut target = Target::new(output, bands);
        target.offset = window.offsets()[idx];
        target.fill = Fill::Existing;
        self.block_loop(
            &[],
            sources,
            &window,
            Some(target),
            |_, floats, (col, row), out| {
                if policy.test(poly, &transform.pixel_envelope(col, row)) {
                    calc.calc(floats, out)
                } else {
                    Ok(())
                }
            },
        )
    }
}

//! The shared block loop and the per-pixel modes.

use anyhow::{bail, Context};

use super::progress::Progress;
use super::{
    BandCalc, BandVisitor, ImageCalc, LocatedBandCalc, LocatedBandVisitor, LocatedMixedBandCalc,
    LocatedMixedBandVisitor, MixedBandCalc, MixedBandVisitor, PixelLocation,
};
use crate::align::{resolve_overlap, resolve_overlap_within, OverlapWindow};
use crate::chunking::BlockPlan;
use crate::error::CalcError;
use crate::geometry::{Envelope, RasterOffset};
use crate::raster::{NewRaster, OutputSpec, RasterDriver, RasterSink, RasterSource};
use crate::Result;

/// How the output slab is initialised before a block is
/// computed. Pixels the computation leaves untouched keep
/// this value.
#[derive(Clone, Copy, Debug)]
pub(super) enum Fill {
    Zero,
    Value(f32),
    /// Current contents of the output raster.
    Existing,
}

/// Where the per-pixel results are written.
pub(super) struct Target<'o> {
    pub sink: &'o mut dyn RasterSink,
    pub offset: RasterOffset,
    pub bands: usize,
    pub fill: Fill,
}

impl<'o> Target<'o> {
    pub fn new(sink: &'o mut dyn RasterSink, bands: usize) -> Self {
        Target {
            sink,
            offset: (0, 0),
            bands,
            fill: Fill::Zero,
        }
    }

    pub fn prepare(
        &mut self,
        slab: &mut [Vec<f32>],
        start: usize,
        rows: usize,
        width: usize,
    ) -> Result<()> {
        let len = width * rows;
        for (b, band) in slab.iter_mut().enumerate() {
            match self.fill {
                Fill::Zero => band[..len].iter_mut().for_each(|v| *v = 0.),
                Fill::Value(x) => band[..len].iter_mut().for_each(|v| *v = x),
                Fill::Existing => self.sink.read_f32(
                    b,
                    (self.offset.0, self.offset.1 + start as isize),
                    (width, rows),
                    &mut band[..len],
                )?,
            }
        }
        Ok(())
    }

    pub fn write(&mut self, slab: &[Vec<f32>], start: usize, rows: usize, width: usize) -> Result<()> {
        let len = width * rows;
        for (b, band) in slab.iter().enumerate() {
            self.sink
                .write_f32(
                    b,
                    (self.offset.0, self.offset.1 + start as isize),
                    (width, rows),
                    &band[..len],
                )
                .with_context(|| format!("writing output band {} at row {}", b + 1, start))?;
        }
        Ok(())
    }
}

/// Per-band row buffers of the current block, for every
/// input band. Integer inputs precede float inputs.
pub(super) struct RowBlock {
    pub ints: Vec<Vec<u32>>,
    pub floats: Vec<Vec<f32>>,
    scratch_u: Vec<u32>,
    scratch_f: Vec<f32>,
}

impl RowBlock {
    pub fn new(int_bands: usize, float_bands: usize, len: usize) -> Self {
        RowBlock {
            ints: vec![vec![0; len]; int_bands],
            floats: vec![vec![0.; len]; float_bands],
            scratch_u: vec![],
            scratch_f: vec![],
        }
    }

    /// Read rows `start..start + rows` of the window from
    /// every band of every source.
    pub fn load(
        &mut self,
        window: &OverlapWindow,
        int_sources: &[&dyn RasterSource],
        float_sources: &[&dyn RasterSource],
        start: usize,
        rows: usize,
    ) -> Result<()> {
        let mut k = 0;
        for (i, src) in int_sources.iter().enumerate() {
            for b in 0..src.band_count() {
                window.read_rows(
                    i,
                    start,
                    rows,
                    &mut self.ints[k],
                    &mut self.scratch_u,
                    |off, size, buf| src.read_u32(b, off, size, buf),
                )?;
                k += 1;
            }
        }

        let base = int_sources.len();
        let mut k = 0;
        for (i, src) in float_sources.iter().enumerate() {
            for b in 0..src.band_count() {
                window.read_rows(
                    base + i,
                    start,
                    rows,
                    &mut self.floats[k],
                    &mut self.scratch_f,
                    |off, size, buf| src.read_f32(b, off, size, buf),
                )?;
                k += 1;
            }
        }
        Ok(())
    }
}

pub(super) fn total_bands(sources: &[&dyn RasterSource]) -> usize {
    sources.iter().map(|s| s.band_count()).sum()
}

pub(super) fn chain_sources<'a>(
    int_sources: &[&'a dyn RasterSource],
    float_sources: &[&'a dyn RasterSource],
) -> Vec<&'a dyn RasterSource> {
    int_sources
        .iter()
        .chain(float_sources.iter())
        .copied()
        .collect()
}

/// Create the output raster of a computation, sized and
/// georeferenced as the window.
pub(super) fn create_output<D: RasterDriver>(
    output: &NewRaster<'_, D>,
    window: &OverlapWindow,
    sources: &[&dyn RasterSource],
    bands: usize,
) -> Result<D::Raster> {
    if bands == 0 {
        bail!(CalcError::config("computation declares no output bands"));
    }
    let spec = OutputSpec {
        path: output.path,
        format: output.format,
        dims: window.dims(),
        bands,
        pixel_type: output.pixel_type,
        transform: window.transform(),
        projection: sources.first().and_then(|s| s.projection()),
        band_names: output.band_names,
    };
    output
        .driver
        .create(&spec)
        .with_context(|| format!("creating output {}", output.path.display()))
}

/// An existing output must match the window exactly.
pub(super) fn check_existing(
    output: &dyn RasterSink,
    window: &OverlapWindow,
    bands: usize,
) -> Result<()> {
    let (width, height) = output.dims();
    if width != window.width() {
        bail!(CalcError::Mismatch {
            what: "output width",
            found: width,
            expected: window.width(),
        });
    }
    if height != window.height() {
        bail!(CalcError::Mismatch {
            what: "output height",
            found: height,
            expected: window.height(),
        });
    }
    if output.band_count() != bands {
        bail!(CalcError::Mismatch {
            what: "output band count",
            found: output.band_count(),
            expected: bands,
        });
    }
    Ok(())
}

impl ImageCalc {
    pub(super) fn plan_for(&self, window: &OverlapWindow, target: Option<&Target<'_>>) -> BlockPlan {
        let plan = BlockPlan::with_dims(window.width(), window.height());
        match self.block_height {
            Some(rows) => plan.with_block_height(rows),
            None => {
                let plan = plan.add_block_height(window.block_height());
                match target {
                    Some(t) => plan.add_block_height(t.sink.block_height()),
                    None => plan,
                }
            }
        }
    }

    /// The block loop shared by all per-pixel modes: read a
    /// block from every input band, call `pixel` for each
    /// pixel with its integer and float values, its `(col,
    /// row)` in the window and the output column, then write
    /// the output block.
    pub(super) fn block_loop<F>(
        &self,
        int_sources: &[&dyn RasterSource],
        float_sources: &[&dyn RasterSource],
        window: &OverlapWindow,
        mut target: Option<Target<'_>>,
        mut pixel: F,
    ) -> Result<()>
    where
        F: FnMut(&[i64], &[f64], (usize, usize), &mut [f64]) -> Result<()>,
    {
        let plan = self.plan_for(window, target.as_ref());
        let width = window.width();
        let slab_len = width * plan.block_height();

        let n_int = total_bands(int_sources);
        let n_float = total_bands(float_sources);
        let n_out = target.as_ref().map(|t| t.bands).unwrap_or(0);

        let mut block = RowBlock::new(n_int, n_float, slab_len);
        let mut slab = vec![vec![0f32; slab_len]; n_out];
        let mut ints = vec![0i64; n_int];
        let mut floats = vec![0f64; n_float];
        let mut out = vec![0f64; n_out];

        let mut progress = Progress::new(window.height());
        for (_, start, rows) in &plan {
            block.load(window, int_sources, float_sources, start, rows)?;
            if let Some(t) = target.as_mut() {
                t.prepare(&mut slab, start, rows, width)?;
            }

            for r in 0..rows {
                progress.row(start + r);
                for c in 0..width {
                    let idx = r * width + c;
                    for (v, band) in ints.iter_mut().zip(&block.ints) {
                        *v = band[idx] as i64;
                    }
                    for (v, band) in floats.iter_mut().zip(&block.floats) {
                        *v = band[idx] as f64;
                    }
                    for (v, band) in out.iter_mut().zip(&slab) {
                        *v = band[idx] as f64;
                    }

                    pixel(&ints, &floats, (c, start + r), &mut out)?;

                    for (band, v) in slab.iter_mut().zip(&out) {
                        band[idx] = *v as f32;
                    }
                }
            }

            if let Some(t) = target.as_mut() {
                t.write(&slab, start, rows, width)?;
            }
        }
        progress.finish();
        Ok(())
    }

    /// Compute `calc` over the overlap of `sources` into a
    /// new raster with `calc.num_out_bands()` bands.
    pub fn calc_to_new<D: RasterDriver>(
        &self,
        sources: &[&dyn RasterSource],
        calc: &mut dyn BandCalc,
        output: &NewRaster<'_, D>,
    ) -> Result<D::Raster> {
        let window = resolve_overlap(sources)?;
        let bands = calc.num_out_bands();
        let mut raster = create_output(output, &window, sources, bands)?;
        self.block_loop(
            &[],
            sources,
            &window,
            Some(Target::new(&mut raster, bands)),
            |_, floats, _, out| calc.calc(floats, out),
        )?;
        Ok(raster)
    }

    /// Compute `calc` into an existing raster whose size and
    /// band count must match the overlap and the
    /// computation.
    pub fn calc_into_existing(
        &self,
        sources: &[&dyn RasterSource],
        calc: &mut dyn BandCalc,
        output: &mut dyn RasterSink,
    ) -> Result<()> {
        let window = resolve_overlap(sources)?;
        let bands = calc.num_out_bands();
        check_existing(output, &window, bands)?;
        self.block_loop(
            &[],
            sources,
            &window,
            Some(Target::new(output, bands)),
            |_, floats, _, out| calc.calc(floats, out),
        )
    }

    /// Visit every pixel of the overlap without output.
    pub fn calc_no_output(
        &self,
        sources: &[&dyn RasterSource],
        visitor: &mut dyn BandVisitor,
    ) -> Result<()> {
        let window = resolve_overlap(sources)?;
        self.block_loop(&[], sources, &window, None, |_, floats, _, _| {
            visitor.visit(floats)
        })
    }

    /// As [`calc_to_new`](Self::calc_to_new), with the bands
    /// of `int_sources` read as integers.
    pub fn calc_mixed_to_new<D: RasterDriver>(
        &self,
        int_sources: &[&dyn RasterSource],
        float_sources: &[&dyn RasterSource],
        calc: &mut dyn MixedBandCalc,
        output: &NewRaster<'_, D>,
    ) -> Result<D::Raster> {
        let all = chain_sources(int_sources, float_sources);
        let window = resolve_overlap(&all)?;
        let bands = calc.num_out_bands();
        let mut raster = create_output(output, &window, &all, bands)?;
        self.block_loop(
            int_sources,
            float_sources,
            &window,
            Some(Target::new(&mut raster, bands)),
            |ints, floats, _, out| calc.calc(ints, floats, out),
        )?;
        Ok(raster)
    }

    pub fn calc_mixed_into_existing(
        &self,
        int_sources: &[&dyn RasterSource],
        float_sources: &[&dyn RasterSource],
        calc: &mut dyn MixedBandCalc,
        output: &mut dyn RasterSink,
    ) -> Result<()> {
        let all = chain_sources(int_sources, float_sources);
        let window = resolve_overlap(&all)?;
        let bands = calc.num_out_bands();
        check_existing(output, &window, bands)?;
        self.block_loop(
            int_sources,
            float_sources,
            &window,
            Some(Target::new(output, bands)),
            |ints, floats, _, out| calc.calc(ints, floats, out),
        )
    }

    pub fn calc_mixed_no_output(
        &self,
        int_sources: &[&dyn RasterSource],
        float_sources: &[&dyn RasterSource],
        visitor: &mut dyn MixedBandVisitor,
    ) -> Result<()> {
        let all = chain_sources(int_sources, float_sources);
        let window = resolve_overlap(&all)?;
        self.block_loop(int_sources, float_sources, &window, None, |ints, floats, _, _| {
            visitor.visit(ints, floats)
        })
    }

    /// As [`calc_to_new`](Self::calc_to_new), also passing
    /// each pixel's position and geographic footprint.
    pub fn calc_located_to_new<D: RasterDriver>(
        &self,
        sources: &[&dyn RasterSource],
        calc: &mut dyn LocatedBandCalc,
        output: &NewRaster<'_, D>,
    ) -> Result<D::Raster> {
        let window = resolve_overlap(sources)?;
        let transform = window.transform();
        let bands = calc.num_out_bands();
        let mut raster = create_output(output, &window, sources, bands)?;
        self.block_loop(
            &[],
            sources,
            &window,
            Some(Target::new(&mut raster, bands)),
            |_, floats, (col, row), out| {
                let loc = PixelLocation {
                    col,
                    row,
                    extent: transform.pixel_envelope(col, row),
                };
                calc.calc(floats, &loc, out)
            },
        )?;
        Ok(raster)
    }

    pub fn calc_located_into_existing(
        &self,
        sources: &[&dyn RasterSource],
        calc: &mut dyn LocatedBandCalc,
        output: &mut dyn RasterSink,
    ) -> Result<()> {
        let window = resolve_overlap(sources)?;
        let transform = window.transform();
        let bands = calc.num_out_bands();
        check_existing(output, &window, bands)?;
        self.block_loop(
            &[],
            sources,
            &window,
            Some(Target::new(output, bands)),
            |_, floats, (col, row), out| {
                let loc = PixelLocation {
                    col,
                    row,
                    extent: transform.pixel_envelope(col, row),
                };
                calc.calc(floats, &loc, out)
            },
        )
    }

    pub fn calc_located_no_output(
        &self,
        sources: &[&dyn RasterSource],
        visitor: &mut dyn LocatedBandVisitor,
    ) -> Result<()> {
        let window = resolve_overlap(sources)?;
        self.located_visit(sources, &window, visitor)
    }

    /// Mixed integer and float inputs, with the location of
    /// each pixel.
    pub fn calc_located_mixed_to_new<D: RasterDriver>(
        &self,
        int_sources: &[&dyn RasterSource],
        float_sources: &[&dyn RasterSource],
        calc: &mut dyn LocatedMixedBandCalc,
        output: &NewRaster<'_, D>,
    ) -> Result<D::Raster> {
        let all = chain_sources(int_sources, float_sources);
        let window = resolve_overlap(&all)?;
        let transform = window.transform();
        let bands = calc.num_out_bands();
        let mut raster = create_output(output, &window, &all, bands)?;
        self.block_loop(
            int_sources,
            float_sources,
            &window,
            Some(Target::new(&mut raster, bands)),
            |ints, floats, (col, row), out| {
                let loc = PixelLocation {
                    col,
                    row,
                    extent: transform.pixel_envelope(col, row),
                };
                calc.calc(ints, floats, &loc, out)
            },
        )?;
        Ok(raster)
    }

    pub fn calc_located_mixed_into_existing(
        &self,
        int_sources: &[&dyn RasterSource],
        float_sources: &[&dyn RasterSource],
        calc: &mut dyn LocatedMixedBandCalc,
        output: &mut dyn RasterSink,
    ) -> Result<()> {
        let all = chain_sources(int_sources, float_sources);
        let window = resolve_overlap(&all)?;
        let transform = window.transform();
        let bands = calc.num_out_bands();
        check_existing(output, &window, bands)?;
        self.block_loop(
            int_sources,
            float_sources,
            &window,
            Some(Target::new(output, bands)),
            |ints, floats, (col, row), out| {
                let loc = PixelLocation {
                    col,
                    row,
                    extent: transform.pixel_envelope(col, row),
                };
                calc.calc(ints, floats, &loc, out)
            },
        )
    }

    pub fn calc_located_mixed_no_output(
        &self,
        int_sources: &[&dyn RasterSource],
        float_sources: &[&dyn RasterSource],
        visitor: &mut dyn LocatedMixedBandVisitor,
    ) -> Result<()> {
        let all = chain_sources(int_sources, float_sources);
        let window = resolve_overlap(&all)?;
        let transform = window.transform();
        self.block_loop(int_sources, float_sources, &window, None, |ints, floats, (col, row), _| {
            let loc = PixelLocation {
                col,
                row,
                extent: transform.pixel_envelope(col, row),
            };
            visitor.visit(ints, floats, &loc)
        })
    }

    /// Visit the pixels of the overlap that fall within a
    /// geographic envelope. Locations are relative to the
    /// clipped window.
    pub fn calc_within_envelope(
        &self,
        sources: &[&dyn RasterSource],
        envelope: &Envelope,
        visitor: &mut dyn LocatedBandVisitor,
    ) -> Result<()> {
        let window = resolve_overlap_within(sources, envelope)?;
        self.located_visit(sources, &window, visitor)
    }

    fn located_visit(
        &self,
        sources: &[&dyn RasterSource],
        window: &OverlapWindow,
        visitor: &mut dyn LocatedBandVisitor,
    ) -> Result<()> {
        let transform = window.transform();
        self.block_loop(&[], sources, window, None, |_, floats, (col, row), _| {
            let loc = PixelLocation {
                col,
                row,
                extent: transform.pixel_envelope(col, row),
            };
            visitor.visit(floats, &loc)
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geometry::GeoTransform;
    use crate::raster::{MemDriver, MemRaster, PixelType};
    use geo::Rect;
    use ndarray::Array2;
    use rand::Rng;
    use std::path::Path;

    /// Band `b` holds `100 * b + row * width + col`.
    pub fn ramp(dims: (usize, usize), bands: usize) -> MemRaster {
        let (w, h) = dims;
        let arrays = (0..bands)
            .map(|b| Array2::from_shape_fn((h, w), |(r, c)| (100 * b + r * w + c) as f64))
            .collect();
        MemRaster::from_bands(arrays, PixelType::Float32).unwrap()
    }

    pub fn random(dims: (usize, usize), bands: usize) -> MemRaster {
        let mut rng = rand::thread_rng();
        let (w, h) = dims;
        let arrays = (0..bands)
            .map(|_| Array2::from_shape_fn((h, w), |_| rng.gen_range(0, 1000) as f64 / 8.))
            .collect();
        MemRaster::from_bands(arrays, PixelType::Float32).unwrap()
    }

    /// Outputs the sum of the bands and the product of the
    /// first two.
    struct SumProduct;
    impl BandCalc for SumProduct {
        fn num_out_bands(&self) -> usize {
            2
        }
        fn calc(&mut self, bands: &[f64], out: &mut [f64]) -> Result<()> {
            out[0] = bands.iter().sum();
            out[1] = bands[0] * bands[1];
            Ok(())
        }
    }

    #[derive(Default)]
    struct Count {
        pixels: usize,
        sum: f64,
    }
    impl BandVisitor for Count {
        fn visit(&mut self, bands: &[f64]) -> Result<()> {
            self.pixels += 1;
            self.sum += bands[0];
            Ok(())
        }
    }

    fn mem_output(driver: &MemDriver) -> NewRaster<'_, MemDriver> {
        NewRaster::new(driver, Path::new("out"), "MEM")
    }

    #[test]
    fn results_independent_of_block_height() -> Result<()> {
        let input = random((13, 17), 3);
        let driver = MemDriver;

        let reference = ImageCalc::new()
            .with_block_height(17)
            .calc_to_new(&[&input], &mut SumProduct, &mem_output(&driver))?;
        for rows in &[1, 4, 5, 16, 100] {
            let out = ImageCalc::new()
                .with_block_height(*rows)
                .calc_to_new(&[&input], &mut SumProduct, &mem_output(&driver))?;
            assert_eq!(out.band(0), reference.band(0), "block height {}", rows);
            assert_eq!(out.band(1), reference.band(1), "block height {}", rows);
        }

        let b = |r: usize, c: usize| input.get(0, c, r) + input.get(1, c, r) + input.get(2, c, r);
        assert_eq!(reference.get(0, 3, 7) as f32, b(7, 3) as f32);
        Ok(())
    }

    #[test]
    fn new_raster_is_georeferenced() -> Result<()> {
        let a = ramp((6, 5), 1)
            .with_transform(GeoTransform::new(100., 2., 50., -2.))
            .with_projection(Some("EPSG:32630".into()));
        let b = ramp((6, 5), 1).with_transform(GeoTransform::new(104., 2., 48., -2.));

        let names = vec!["sum".to_string(), "product".to_string()];
        let driver = MemDriver;
        let out = ImageCalc::new().calc_to_new(
            &[&a, &b],
            &mut SumProduct,
            &mem_output(&driver).with_band_names(&names),
        )?;

        assert_eq!(out.dims(), (4, 4));
        assert_eq!(out.geo_transform(), GeoTransform::new(104., 2., 48., -2.));
        assert_eq!(out.projection().as_deref(), Some("EPSG:32630"));
        assert_eq!(out.band_name(1), "product");

        // Output (0, 0) is a(2, 1) and b(0, 0)
        assert_eq!(out.get(0, 0, 0), a.get(0, 2, 1) + b.get(0, 0, 0));
        assert_eq!(out.get(1, 3, 3), a.get(0, 5, 4) * b.get(0, 3, 3));
        Ok(())
    }

    #[test]
    fn existing_output_is_validated() -> Result<()> {
        let input = ramp((4, 3), 2);

        let mut wrong_bands = MemRaster::new((4, 3), 1, PixelType::Float32);
        let err = ImageCalc::new()
            .calc_into_existing(&[&input], &mut SumProduct, &mut wrong_bands)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<CalcError>(),
            Some(&CalcError::Mismatch {
                what: "output band count",
                found: 1,
                expected: 2
            })
        );

        let mut wrong_size = MemRaster::new((4, 4), 2, PixelType::Float32);
        assert!(ImageCalc::new()
            .calc_into_existing(&[&input], &mut SumProduct, &mut wrong_size)
            .is_err());

        let mut output = MemRaster::new((4, 3), 2, PixelType::Float32);
        ImageCalc::new().calc_into_existing(&[&input], &mut SumProduct, &mut output)?;
        assert_eq!(output.get(0, 1, 2), input.get(0, 1, 2) + input.get(1, 1, 2));
        Ok(())
    }

    #[test]
    fn unknown_format_fails() {
        let input = ramp((2, 2), 2);
        let driver = MemDriver;
        let output = NewRaster::new(&driver, Path::new("out.xyz"), "NOPE");
        let err = ImageCalc::new()
            .calc_to_new(&[&input], &mut SumProduct, &output)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<CalcError>(),
            Some(&CalcError::UnknownFormat("NOPE".into()))
        );
    }

    #[test]
    fn visitor_sees_every_pixel() -> Result<()> {
        let input = ramp((5, 7), 1).with_block_height(3);
        let mut count = Count::default();
        ImageCalc::new().calc_no_output(&[&input], &mut count)?;
        assert_eq!(count.pixels, 35);
        assert_eq!(count.sum, (0..35).sum::<usize>() as f64);
        Ok(())
    }

    struct MixedSum;
    impl MixedBandCalc for MixedSum {
        fn num_out_bands(&self) -> usize {
            1
        }
        fn calc(&mut self, ints: &[i64], floats: &[f64], out: &mut [f64]) -> Result<()> {
            out[0] = ints[0] as f64 * 1000. + floats[0];
            Ok(())
        }
    }

    #[test]
    fn mixed_bands_are_split() -> Result<()> {
        let ids = MemRaster::from_bands(
            vec![Array2::from_shape_vec((2, 2), vec![1., 2., 3., 4.])?],
            PixelType::UInt32,
        )?;
        let vals = MemRaster::from_bands(
            vec![Array2::from_shape_vec((2, 2), vec![0.5, 0.25, 0.125, 0.])?],
            PixelType::Float32,
        )?;
        let driver = MemDriver;
        let out = ImageCalc::new().calc_mixed_to_new(
            &[&ids],
            &[&vals],
            &mut MixedSum,
            &mem_output(&driver),
        )?;
        assert_eq!(out.get(0, 0, 0), 1000.5);
        assert_eq!(out.get(0, 1, 0), 2000.25);
        assert_eq!(out.get(0, 0, 1), 3000.125);
        assert_eq!(out.get(0, 1, 1), 4000.);
        Ok(())
    }

    #[test]
    fn mixed_into_existing() -> Result<()> {
        let ids = ramp((5, 7), 1);
        let vals = random((5, 7), 1);
        let driver = MemDriver;
        let reference = ImageCalc::new().calc_mixed_to_new(&[&ids], &[&vals], &mut MixedSum, &mem_output(&driver))?;
        for rows in &[1, 3, 7] {
            let mut output = MemRaster::new((5, 7), 1, PixelType::Float32);
            ImageCalc::new()
                .with_block_height(*rows)
                .calc_mixed_into_existing(&[&ids], &[&vals], &mut MixedSum, &mut output)?;
            assert_eq!(output.band(0), reference.band(0), "block height {}", rows);
        }
        assert_eq!(reference.get(0, 2, 3), 17000. + vals.get(0, 2, 3));

        let mut short = MemRaster::new((5, 6), 1, PixelType::Float32);
        assert!(ImageCalc::new()
            .calc_mixed_into_existing(&[&ids], &[&vals], &mut MixedSum, &mut short)
            .is_err());
        Ok(())
    }

    /// Band value, then the west and north edges of the
    /// pixel footprint.
    struct Footprint;
    impl LocatedBandCalc for Footprint {
        fn num_out_bands(&self) -> usize {
            3
        }
        fn calc(&mut self, bands: &[f64], loc: &PixelLocation, out: &mut [f64]) -> Result<()> {
            out[0] = bands[0];
            out[1] = loc.extent.min().x;
            out[2] = loc.extent.max().y;
            Ok(())
        }
    }

    impl LocatedMixedBandCalc for Footprint {
        fn num_out_bands(&self) -> usize {
            3
        }
        fn calc(&mut self, ints: &[i64], floats: &[f64], loc: &PixelLocation, out: &mut [f64]) -> Result<()> {
            out[0] = ints[0] as f64 + floats[0];
            out[1] = loc.extent.min().x;
            out[2] = loc.extent.max().y;
            Ok(())
        }
    }

    /// 5x9 ramp of 10m pixels whose north-west corner is
    /// (10, 100).
    fn located_input() -> MemRaster {
        ramp((5, 9), 1).with_transform(GeoTransform::new(10., 10., 100., -10.))
    }

    fn check_footprints(out: &MemRaster, value: impl Fn(usize, usize) -> f64) {
        for row in 0..9 {
            for col in 0..5 {
                assert_eq!(out.get(0, col, row), value(col, row), "({}, {})", col, row);
                assert_eq!(out.get(1, col, row), 10. + 10. * col as f64);
                assert_eq!(out.get(2, col, row), 100. - 10. * row as f64);
            }
        }
    }

    #[test]
    fn located_modes() -> Result<()> {
        let input = located_input();
        let driver = MemDriver;
        for rows in &[1, 3, 7] {
            let calc = ImageCalc::new().with_block_height(*rows);
            let out = calc.calc_located_to_new(&[&input], &mut Footprint, &mem_output(&driver))?;
            check_footprints(&out, |c, r| (r * 5 + c) as f64);

            let mut existing = MemRaster::new((5, 9), 3, PixelType::Float32);
            calc.calc_located_into_existing(&[&input], &mut Footprint, &mut existing)?;
            check_footprints(&existing, |c, r| (r * 5 + c) as f64);
        }
        Ok(())
    }

    struct MixedCentres(Vec<(i64, f64, f64)>);
    impl LocatedMixedBandVisitor for MixedCentres {
        fn visit(&mut self, ints: &[i64], floats: &[f64], loc: &PixelLocation) -> Result<()> {
            assert_eq!(ints[0] as f64, floats[0]);
            let (x, y) = loc.center();
            self.0.push((ints[0], x, y));
            Ok(())
        }
    }

    #[test]
    fn located_mixed_modes() -> Result<()> {
        let input = located_input();
        let driver = MemDriver;
        for rows in &[1, 3, 7] {
            let calc = ImageCalc::new().with_block_height(*rows);

            let out = calc.calc_located_mixed_to_new(&[&input], &[&input], &mut Footprint, &mem_output(&driver))?;
            check_footprints(&out, |c, r| 2. * (r * 5 + c) as f64);

            let mut existing = MemRaster::new((5, 9), 3, PixelType::Float32);
            calc.calc_located_mixed_into_existing(&[&input], &[&input], &mut Footprint, &mut existing)?;
            check_footprints(&existing, |c, r| 2. * (r * 5 + c) as f64);

            let mut centres = MixedCentres(vec![]);
            calc.calc_located_mixed_no_output(&[&input], &[&input], &mut centres)?;
            assert_eq!(centres.0.len(), 45);
            assert_eq!(centres.0[0], (0, 15., 95.));
            assert_eq!(centres.0[44], (44, 55., 15.));
        }
        Ok(())
    }

    struct Centres(Vec<(usize, usize, f64, f64)>);
    impl LocatedBandVisitor for Centres {
        fn visit(&mut self, _: &[f64], loc: &PixelLocation) -> Result<()> {
            let (x, y) = loc.center();
            self.0.push((loc.col, loc.row, x, y));
            Ok(())
        }
    }

    #[test]
    fn located_pixels() -> Result<()> {
        let input = ramp((3, 2), 1).with_transform(GeoTransform::new(10., 10., 100., -10.));
        let mut centres = Centres(vec![]);
        ImageCalc::new().calc_located_no_output(&[&input], &mut centres)?;
        assert_eq!(centres.0.len(), 6);
        assert_eq!(centres.0[0], (0, 0, 15., 95.));
        assert_eq!(centres.0[5], (2, 1, 35., 85.));

        let mut clipped = Centres(vec![]);
        let env = Rect::new((20., 80.), (40., 90.));
        ImageCalc::new().calc_within_envelope(&[&input], &env, &mut clipped)?;
        assert_eq!(clipped.0, vec![(0, 0, 25., 85.), (1, 0, 35., 85.)]);
        Ok(())
    }
}

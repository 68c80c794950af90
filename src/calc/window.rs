//! Neighbourhood computations over a sliding three-group
//! row buffer.

use std::mem;

use anyhow::bail;

use super::engine::{check_existing, create_output, total_bands, Target};
use super::progress::Progress;
use super::{
    ImageCalc, LocatedWindowCalc, Neighbourhood, PixelLocation, WindowCalc, WindowVisitor,
};
use crate::align::{resolve_overlap, OverlapWindow};
use crate::chunking::mod_ceil;
use crate::error::CalcError;
use crate::raster::{NewRaster, RasterDriver, RasterSink, RasterSource};
use crate::Result;

/// Validate a neighbourhood size: it must be odd and at
/// least 3.
pub fn check_window_size(window_size: i64) -> Result<usize> {
    if window_size < 3 {
        bail!(CalcError::config(format!(
            "window size must be at least 3, got {}",
            window_size
        )));
    }
    if window_size % 2 == 0 {
        bail!(CalcError::config(format!(
            "window size must be odd, got {}",
            window_size
        )));
    }
    Ok(window_size as usize)
}

/// Three groups of rows (upper / main / lower) for every
/// band, so that the `window_size` square around any pixel
/// of the main group can be served from memory.
///
/// Each group holds `lines_per_group` rows: the block
/// height rounded up to cover at least a whole window.
/// Groups are read in order, top to bottom, each row
/// exactly once. The upper group is zero before the first
/// group; the lower group is zero past the last row.
pub struct SlidingWindowBuffer {
    width: usize,
    height: usize,
    lines: usize,
    window_size: usize,
    upper: Vec<Vec<f32>>,
    main: Vec<Vec<f32>>,
    lower: Vec<Vec<f32>>,
    next_group: usize,
    primed: bool,
}

impl SlidingWindowBuffer {
    pub fn new(
        bands: usize,
        dims: (usize, usize),
        window_size: i64,
        block_height: usize,
    ) -> Result<Self> {
        let window_size = check_window_size(window_size)?;
        let block_height = block_height.max(1);
        let lines = mod_ceil(window_size, block_height).max(block_height);
        let (width, height) = dims;
        let group = || vec![vec![0f32; width * lines]; bands];
        Ok(SlidingWindowBuffer {
            width,
            height,
            lines,
            window_size,
            upper: group(),
            main: group(),
            lower: group(),
            next_group: 0,
            primed: false,
        })
    }

    pub fn lines_per_group(&self) -> usize {
        self.lines
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn band_count(&self) -> usize {
        self.main.len()
    }

    fn load<F>(&mut self, start: usize, read: &mut F) -> Result<()>
    where
        F: FnMut(usize, usize, &mut [Vec<f32>]) -> Result<()>,
    {
        for band in &mut self.lower {
            band.iter_mut().for_each(|v| *v = 0.);
        }
        if start < self.height {
            let rows = self.lines.min(self.height - start);
            read(start, rows, &mut self.lower)?;
        }
        Ok(())
    }

    /// Move to the next group: lower becomes main, main
    /// becomes upper and the following group is read into
    /// lower. `read(start, rows, bands)` fills the first
    /// `rows` rows of each band buffer.
    ///
    /// Returns the first row and the row count of the new
    /// main group, or `None` once every row was served.
    pub fn advance<F>(&mut self, mut read: F) -> Result<Option<(usize, usize)>>
    where
        F: FnMut(usize, usize, &mut [Vec<f32>]) -> Result<()>,
    {
        if !self.primed {
            self.load(0, &mut read)?;
            self.primed = true;
        }

        let start = self.next_group;
        if start >= self.height {
            return Ok(None);
        }

        mem::swap(&mut self.upper, &mut self.main);
        mem::swap(&mut self.main, &mut self.lower);
        self.next_group = start + self.lines;
        self.load(self.next_group, &mut read)?;

        Ok(Some((start, self.lines.min(self.height - start))))
    }

    /// Copy the neighbourhood of the pixel at `row` (within
    /// the main group) and `col` into `cube`.
    pub fn fill(&self, row: usize, col: usize, cube: &mut Neighbourhood) {
        let mid = (self.window_size / 2) as isize;
        let lines = self.lines as isize;
        let width = self.width as isize;

        for (b, mut plane) in cube.outer_iter_mut().enumerate() {
            for dy in 0..self.window_size {
                let lr = row as isize + dy as isize - mid;
                let (group, r) = if lr < 0 {
                    (&self.upper[b], lines + lr)
                } else if lr >= lines {
                    (&self.lower[b], lr - lines)
                } else {
                    (&self.main[b], lr)
                };
                let base = r as usize * self.width;

                for dx in 0..self.window_size {
                    let x = col as isize + dx as isize - mid;
                    plane[(dy, dx)] = if x < 0 || x >= width {
                        0.
                    } else {
                        group[base + x as usize] as f64
                    };
                }
            }
        }
    }
}

fn read_group(
    window: &OverlapWindow,
    sources: &[&dyn RasterSource],
    start: usize,
    rows: usize,
    bands: &mut [Vec<f32>],
    scratch: &mut Vec<f32>,
) -> Result<()> {
    let mut k = 0;
    for (i, src) in sources.iter().enumerate() {
        for b in 0..src.band_count() {
            window.read_rows(i, start, rows, &mut bands[k], scratch, |off, size, buf| {
                src.read_f32(b, off, size, buf)
            })?;
            k += 1;
        }
    }
    Ok(())
}

impl ImageCalc {
    fn window_loop<F>(
        &self,
        sources: &[&dyn RasterSource],
        window_size: i64,
        window: &OverlapWindow,
        mut target: Option<Target<'_>>,
        mut cell: F,
    ) -> Result<()>
    where
        F: FnMut(&Neighbourhood, (usize, usize), &mut [f64]) -> Result<()>,
    {
        let plan = self.plan_for(window, target.as_ref());
        let bands = total_bands(sources);
        let width = window.width();

        let mut buffer =
            SlidingWindowBuffer::new(bands, window.dims(), window_size, plan.block_height())?;
        let ws = buffer.window_size();
        let n_out = target.as_ref().map(|t| t.bands).unwrap_or(0);

        let mut slab = vec![vec![0f32; width * buffer.lines_per_group()]; n_out];
        let mut cube = Neighbourhood::zeros((bands, ws, ws));
        let mut out = vec![0f64; n_out];
        let mut scratch = vec![];

        let mut progress = Progress::new(window.height());
        while let Some((start, rows)) = buffer.advance(|start, rows, bufs| {
            read_group(window, sources, start, rows, bufs, &mut scratch)
        })? {
            if let Some(t) = target.as_mut() {
                t.prepare(&mut slab, start, rows, width)?;
            }

            for r in 0..rows {
                progress.row(start + r);
                for c in 0..width {
                    let idx = r * width + c;
                    buffer.fill(r, c, &mut cube);
                    for (v, band) in out.iter_mut().zip(&slab) {
                        *v = band[idx] as f64;
                    }

                    cell(&cube, (c, start + r), &mut out)?;

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

    /// Compute `calc` on the `window_size` neighbourhood of
    /// every pixel into a new raster.
    pub fn calc_window_to_new<D: RasterDriver>(
        &self,
        sources: &[&dyn RasterSource],
        window_size: i64,
        calc: &mut dyn WindowCalc,
        output: &NewRaster<'_, D>,
    ) -> Result<D::Raster> {
        check_window_size(window_size)?;
        let window = resolve_overlap(sources)?;
        let bands = calc.num_out_bands();
        let mut raster = create_output(output, &window, sources, bands)?;
        self.window_loop(
            sources,
            window_size,
            &window,
            Some(Target::new(&mut raster, bands)),
            |cube, _, out| calc.calc(cube, out),
        )?;
        Ok(raster)
    }

    pub fn calc_window_into_existing(
        &self,
        sources: &[&dyn RasterSource],
        window_size: i64,
        calc: &mut dyn WindowCalc,
        output: &mut dyn RasterSink,
    ) -> Result<()> {
        check_window_size(window_size)?;
        let window = resolve_overlap(sources)?;
        let bands = calc.num_out_bands();
        check_existing(output, &window, bands)?;
        self.window_loop(
            sources,
            window_size,
            &window,
            Some(Target::new(output, bands)),
            |cube, _, out| calc.calc(cube, out),
        )
    }

    pub fn calc_window_no_output(
        &self,
        sources: &[&dyn RasterSource],
        window_size: i64,
        visitor: &mut dyn WindowVisitor,
    ) -> Result<()> {
        check_window_size(window_size)?;
        let window = resolve_overlap(sources)?;
        self.window_loop(sources, window_size, &window, None, |cube, _, _| {
            visitor.visit(cube)
        })
    }

    pub fn calc_window_located_to_new<D: RasterDriver>(
        &self,
        sources: &[&dyn RasterSource],
        window_size: i64,
        calc: &mut dyn LocatedWindowCalc,
        output: &NewRaster<'_, D>,
    ) -> Result<D::Raster> {
        check_window_size(window_size)?;
        let window = resolve_overlap(sources)?;
        let transform = window.transform();
        let bands = calc.num_out_bands();
        let mut raster = create_output(output, &window, sources, bands)?;
        self.window_loop(
            sources,
            window_size,
            &window,
            Some(Target::new(&mut raster, bands)),
            |cube, (col, row), out| {
                let loc = PixelLocation {
                    col,
                    row,
                    extent: transform.pixel_envelope(col, row),
                };
                calc.calc(cube, &loc, out)
            },
        )?;
        Ok(raster)
    }

    pub fn calc_window_located_into_existing(
        &self,
        sources: &[&dyn RasterSource],
        window_size: i64,
        calc: &mut dyn LocatedWindowCalc,
        output: &mut dyn RasterSink,
    ) -> Result<()> {
        check_window_size(window_size)?;
        let window = resolve_overlap(sources)?;
        let transform = window.transform();
        let bands = calc.num_out_bands();
        check_existing(output, &window, bands)?;
        self.window_loop(
            sources,
            window_size,
            &window,
            Some(Target::new(output, bands)),
            |cube, (col, row), out| {
                let loc = PixelLocation {
                    col,
                    row,
                    extent: transform.pixel_envelope(col, row),
                };
                calc.calc(cube, &loc, out)
            },
        )
    }
}

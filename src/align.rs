//! Align a set of rasters by their geo. transforms.
//!
//! This module resolves the common processing window of
//! several rasters:
//!
//! - Intersect the geographic extents of the inputs and
//! snap the result onto a pixel grid of the finest input
//! resolution: the [`OverlapWindow`].
//!
//! - For each input, compute the pixel offset at which its
//! data aligns with the window origin. Inputs with the
//! window resolution are read directly at that offset;
//! coarser inputs are sampled (nearest pixel centre) via an
//! affine transform between the two pixel grids.

use anyhow::*;
use geo::Rect;
use nalgebra::{Point2, Vector2, Vector3};

use crate::error::CalcError;
use crate::geometry::{
    BoundsExt, Envelope, GeoTransform, PixelTransform, RasterDims, RasterOffset, RasterWindow,
    GRID_EPSILON,
};
use crate::raster::RasterSource;

/// Source pixel window covering the window `win` of the
/// overlap grid, clipped to the source dimensions `dim`.
/// `t` maps overlap pixels to source pixels.
pub fn transform_window(win: RasterWindow, t: PixelTransform, dim: RasterDims) -> RasterWindow {
    let offset = win.0;
    let size = win.1;

    let t_lt = t.transform_point(&Point2::new(offset.0 as f64, offset.1 as f64));
    let t_rb = t.transform_point(&Point2::new(
        offset.0 as f64 + size.0 as f64,
        offset.1 as f64 + size.1 as f64,
    ));

    Rect::new((t_lt.x, t_lt.y), (t_rb.x, t_rb.y)).window_from_bounds(dim)
}

/// Compute affine transform to transfer from pixel
/// coordinates of the first grid to the second grid.
pub fn transform_between(gt_1: &GeoTransform, gt_2: &GeoTransform) -> Result<PixelTransform> {
    let transform_1 = gt_1.to_pixel_transform();
    let transform_2 = gt_2.to_pixel_transform();

    transform_2
        .try_inverse()
        .ok_or_else(|| anyhow!(CalcError::config("couldn't invert geo. transform")))
        .map(|inv| inv * transform_1)
}

/// Shift a pixel transform so it maps indices relative to
/// `off_1` in the first grid onto indices relative to
/// `off_2` in the second. Pass `off_1 + (0.5, 0.5)` to
/// land on pixel centres.
///
/// With `(X, Y) = t(x, y)` and `off_2 + (J, I) = t(off_1 +
/// (j, i))`, the shifted transform is `t(j, i) + t(off_1) -
/// off_2`.
pub fn chunk_transform(
    transform: &PixelTransform,
    off_1: Vector2<f64>,
    off_2: Vector2<f64>,
) -> PixelTransform {
    let residue = residue(transform, off_1, off_2);

    let mut transform = *transform;
    transform[(0, 2)] += residue.x;
    transform[(1, 2)] += residue.y;
    transform
}

fn residue(transform: &PixelTransform, off_1: Vector2<f64>, off_2: Vector2<f64>) -> Vector2<f64> {
    let off_1 = Vector3::new(off_1.x, off_1.y, 0.);
    let off_2 = Vector3::new(off_2.x, off_2.y, 0.);

    let result = transform * off_1 - off_2;
    Vector2::new(result.x, result.y)
}

/// `(row, col)` of a block to `(row, col)` in the source
/// chunk of dimensions `dim`, or `None` if it falls
/// outside.
pub fn index_transformer(
    chunk_t: PixelTransform,
    dim: RasterDims,
) -> impl Fn(RasterDims) -> Option<RasterDims> {
    let (cols, rows) = dim;

    move |(i, j)| {
        let pt = chunk_t.transform_point(&Point2::new(j as f64, i as f64));

        if pt.x < 0. || pt.y < 0. {
            return None;
        }
        let j_2 = pt.x.floor() as usize;
        let i_2 = pt.y.floor() as usize;

        if j_2 >= cols || i_2 >= rows {
            None
        } else {
            Some((i_2, j_2))
        }
    }
}

/// How one source is read into the window grid.
#[derive(Clone, Debug, PartialEq)]
enum Sampling {
    /// Same pixel grid: read at the offset.
    Direct,
    /// Different grid: window pixel -> source pixel.
    Resampled(PixelTransform),
}

/// The common pixel-aligned rectangle of a set of sources.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlapWindow {
    dims: RasterDims,
    transform: GeoTransform,
    offsets: Vec<RasterOffset>,
    sampling: Vec<Sampling>,
    source_dims: Vec<RasterDims>,
    block_height: usize,
}

/// Compute the overlap window of `sources`.
///
/// Fails with a configuration error if there are no
/// sources, if any source is rotated, or if they do not
/// overlap.
pub fn resolve_overlap(sources: &[&dyn RasterSource]) -> Result<OverlapWindow> {
    let (transform, dims) = overlap_grid(sources)?;
    OverlapWindow::align(sources, transform, dims)
}

/// Compute the overlap window of `sources`, clipped to a
/// geographic `envelope`. The window stays on the pixel
/// grid of [`resolve_overlap`].
pub fn resolve_overlap_within(
    sources: &[&dyn RasterSource],
    envelope: &Envelope,
) -> Result<OverlapWindow> {
    let (transform, dims) = overlap_grid(sources)?;

    // Envelope in pixel coordinates of the full window
    let (c0, r0) = transform.invert(envelope.min().x, envelope.min().y);
    let (c1, r1) = transform.invert(envelope.max().x, envelope.max().y);
    let (off, size) = Rect::new((c0, r0), (c1, r1)).window_from_bounds(dims);
    if size.0 == 0 || size.1 == 0 {
        bail!(CalcError::config("envelope does not overlap the input rasters"));
    }

    OverlapWindow::align(sources, transform.shifted(off), size)
}

fn overlap_grid(sources: &[&dyn RasterSource]) -> Result<(GeoTransform, RasterDims)> {
    let first = match sources.first() {
        Some(src) => src.geo_transform(),
        None => bail!(CalcError::config("no input rasters")),
    };

    let mut extent: Option<Envelope> = None;
    let mut pixel_w = f64::INFINITY;
    let mut pixel_h = f64::INFINITY;
    for (i, src) in sources.iter().enumerate() {
        let gt = src.geo_transform();
        if !gt.is_north_up() {
            bail!(CalcError::config(format!("input {} is rotated", i)));
        }
        pixel_w = pixel_w.min(gt.pixel_width().abs());
        pixel_h = pixel_h.min(gt.pixel_height().abs());

        let env = gt.extent(src.dims());
        extent = match extent {
            None => Some(env),
            Some(acc) => Some(
                acc.intersect(&env)
                    .ok_or_else(|| anyhow!(CalcError::config("input rasters do not overlap")))?,
            ),
        };
    }
    let extent = match extent {
        Some(e) => e,
        None => bail!(CalcError::config("no input rasters")),
    };

    let width = (extent.width() / pixel_w + GRID_EPSILON).floor() as usize;
    let height = (extent.height() / pixel_h + GRID_EPSILON).floor() as usize;
    if width == 0 || height == 0 {
        bail!(CalcError::config("overlap is smaller than a pixel"));
    }

    let north_up = first.pixel_height() < 0.;
    let (origin_y, pixel_h) = if north_up {
        (extent.max().y, -pixel_h)
    } else {
        (extent.min().y, pixel_h)
    };
    let transform = GeoTransform::new(extent.min().x, pixel_w, origin_y, pixel_h);
    Ok((transform, (width, height)))
}

fn aligned(val: f64) -> bool {
    (val - val.round()).abs() < GRID_EPSILON
}

impl OverlapWindow {
    /// Locate each source on a given window grid.
    fn align(
        sources: &[&dyn RasterSource],
        transform: GeoTransform,
        dims: RasterDims,
    ) -> Result<Self> {
        let mut offsets = Vec::with_capacity(sources.len());
        let mut sampling = Vec::with_capacity(sources.len());
        let mut source_dims = Vec::with_capacity(sources.len());
        let mut block_height = 1;

        for src in sources {
            let gt = src.geo_transform();
            let (x, y) = gt.invert(transform.origin_x(), transform.origin_y());
            let off = (
                (x + GRID_EPSILON).floor() as isize,
                (y + GRID_EPSILON).floor() as isize,
            );

            let same_grid = (gt.pixel_width() - transform.pixel_width()).abs()
                < GRID_EPSILON * transform.pixel_width().abs()
                && (gt.pixel_height() - transform.pixel_height()).abs()
                    < GRID_EPSILON * transform.pixel_height().abs()
                && aligned(x)
                && aligned(y);

            if same_grid {
                let (w, h) = src.dims();
                debug_assert!(
                    off.0 >= 0
                        && off.1 >= 0
                        && off.0 as usize + dims.0 <= w
                        && off.1 as usize + dims.1 <= h,
                    "source offset outside bounds"
                );
                sampling.push(Sampling::Direct);
            } else {
                sampling.push(Sampling::Resampled(transform_between(&transform, &gt)?));
            }
            offsets.push(off);
            source_dims.push(src.dims());
            block_height = block_height.max(src.block_height());
        }

        Ok(OverlapWindow {
            dims,
            transform,
            offsets,
            sampling,
            source_dims,
            block_height,
        })
    }

    /// `(width, height)` of the window.
    pub fn dims(&self) -> RasterDims {
        self.dims
    }
    pub fn width(&self) -> usize {
        self.dims.0
    }
    pub fn height(&self) -> usize {
        self.dims.1
    }

    /// Geo. transform of the window grid.
    pub fn transform(&self) -> GeoTransform {
        self.transform
    }

    /// Pixel offset of the window origin in each source.
    pub fn offsets(&self) -> &[RasterOffset] {
        &self.offsets
    }

    /// Largest native block height among the sources.
    pub fn block_height(&self) -> usize {
        self.block_height
    }

    /// True if source `idx` is read without resampling.
    pub fn is_direct(&self, idx: usize) -> bool {
        self.sampling[idx] == Sampling::Direct
    }

    /// Read `rows` rows starting at window row `start` of
    /// source `idx` into `out` (`width * rows` values).
    /// `read` performs the actual window read on the
    /// source; `scratch` is reused between calls for
    /// resampled sources.
    pub fn read_rows<T, F>(
        &self,
        idx: usize,
        start: usize,
        rows: usize,
        out: &mut [T],
        scratch: &mut Vec<T>,
        read: F,
    ) -> Result<()>
    where
        T: Copy + Default,
        F: Fn(RasterOffset, RasterDims, &mut [T]) -> Result<()>,
    {
        let width = self.dims.0;
        let off = self.offsets[idx];
        match &self.sampling[idx] {
            Sampling::Direct => read(
                (off.0, off.1 + start as isize),
                (width, rows),
                &mut out[..width * rows],
            ),
            Sampling::Resampled(t) => {
                let (src_off, src_size) = transform_window(
                    ((0, start as isize), (width, rows)),
                    *t,
                    self.source_dims[idx],
                );

                let len = src_size.0 * src_size.1;
                scratch.clear();
                scratch.resize(len, T::default());
                if len > 0 {
                    read(src_off, src_size, &mut scratch[..])?;
                }

                let chunk_t = chunk_transform(
                    t,
                    Vector2::new(0.5, start as f64 + 0.5),
                    Vector2::new(src_off.0 as f64, src_off.1 as f64),
                );
                let idx_t = index_transformer(chunk_t, src_size);
                for i in 0..rows {
                    for j in 0..width {
                        out[i * width + j] = match idx_t((i, j)) {
                            Some((i_2, j_2)) => scratch[i_2 * src_size.0 + j_2],
                            None => T::default(),
                        };
                    }
                }
                Ok(())
            }
        }
    }
}

//! Raster geometry: pixel windows, geo. transforms and
//! geographic envelopes.
//!
//! Pixel coordinates are `(col, row)` i.e. `(x, y)` with
//! the origin at the top-left corner of the raster. Arrays
//! are indexed `(row, col)` as usual with `ndarray`.

use geo::Rect;
use nalgebra::Matrix3;
use serde_derive::{Deserialize, Serialize};

/// Offset of a window in pixels: `(x, y)`.
pub type RasterOffset = (isize, isize);
/// Dimension of a raster or window: `(width, height)`.
pub type RasterDims = (usize, usize);
/// A window: offset and dimension.
pub type RasterWindow = (RasterOffset, RasterDims);

/// Homogeneous affine transform on 2D points. Maps pixel
/// coordinates to geographic coordinates, or pixel
/// coordinates of one raster to those of another.
pub type PixelTransform = Matrix3<f64>;

/// Axis-aligned geographic rectangle.
pub type Envelope = Rect<f64>;

/// Tolerance used when snapping geographic positions onto
/// a pixel grid.
pub const GRID_EPSILON: f64 = 1e-6;

/// Affine geo. transform in the GDAL order: origin-x,
/// pixel-width, row-rotation, origin-y, column-rotation,
/// pixel-height (usually negative).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// A north-up transform.
    pub fn new(origin_x: f64, pixel_width: f64, origin_y: f64, pixel_height: f64) -> Self {
        GeoTransform([origin_x, pixel_width, 0., origin_y, 0., pixel_height])
    }

    #[inline]
    pub fn origin_x(&self) -> f64 {
        self.0[0]
    }
    #[inline]
    pub fn origin_y(&self) -> f64 {
        self.0[3]
    }
    #[inline]
    pub fn pixel_width(&self) -> f64 {
        self.0[1]
    }
    #[inline]
    pub fn pixel_height(&self) -> f64 {
        self.0[5]
    }

    /// True if the rotation terms are zero.
    pub fn is_north_up(&self) -> bool {
        self.0[2] == 0. && self.0[4] == 0.
    }

    pub fn to_pixel_transform(&self) -> PixelTransform {
        transform_from_gdal(&self.0)
    }

    /// Geographic position of a (fractional) pixel
    /// coordinate.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let t = &self.0;
        (
            t[0] + col * t[1] + row * t[2],
            t[3] + col * t[4] + row * t[5],
        )
    }

    /// Fractional pixel coordinate of a geographic
    /// position. Only valid for north-up transforms.
    pub fn invert(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x()) / self.pixel_width(),
            (y - self.origin_y()) / self.pixel_height(),
        )
    }

    /// Geographic position of the centre of pixel
    /// `(col, row)`.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Geographic rectangle covered by pixel `(col, row)`.
    pub fn pixel_envelope(&self, col: usize, row: usize) -> Envelope {
        let tl = self.apply(col as f64, row as f64);
        let br = self.apply(col as f64 + 1., row as f64 + 1.);
        Rect::new(tl, br)
    }

    /// Geographic rectangle covered by a raster of the given
    /// dimensions.
    pub fn extent(&self, dims: RasterDims) -> Envelope {
        let tl = self.apply(0., 0.);
        let br = self.apply(dims.0 as f64, dims.1 as f64);
        Rect::new(tl, br)
    }

    /// Transform of the sub-raster starting at `off`.
    pub fn shifted(&self, off: RasterOffset) -> Self {
        let (x, y) = self.apply(off.0 as f64, off.1 as f64);
        let mut t = self.0;
        t[0] = x;
        t[3] = y;
        GeoTransform(t)
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(t: [f64; 6]) -> Self {
        GeoTransform(t)
    }
}

/// Convert a GDAL geo. transform into a homogeneous matrix
/// mapping `(x, y, 1)` pixel coordinates to geographic
/// coordinates.
pub fn transform_from_gdal(t: &[f64; 6]) -> PixelTransform {
    Matrix3::new(t[1], t[2], t[0], t[4], t[5], t[3], 0., 0., 1.)
}

/// Extensions on geographic or pixel-space rectangles.
pub trait BoundsExt {
    /// Smallest integer window containing `self`, truncated
    /// to a raster of dimension `dim`. `self` is expected
    /// in pixel coordinates.
    fn window_from_bounds(&self, dim: RasterDims) -> RasterWindow;

    /// Grow to include the point `(x, y)`.
    fn expand_to_include(&mut self, x: f64, y: f64);

    /// Common part of two rectangles, if it has a non-zero
    /// area.
    fn intersect(&self, other: &Self) -> Option<Self>
    where
        Self: Sized;
}

impl BoundsExt for Rect<f64> {
    fn window_from_bounds(&self, dim: RasterDims) -> RasterWindow {
        let (cols, rows) = (dim.0 as f64, dim.1 as f64);
        let min = self.min();
        let max = self.max();

        let x_min = (min.x + GRID_EPSILON).floor().max(0.).min(cols);
        let y_min = (min.y + GRID_EPSILON).floor().max(0.).min(rows);
        let x_max = (max.x - GRID_EPSILON).ceil().max(x_min).min(cols);
        let y_max = (max.y - GRID_EPSILON).ceil().max(y_min).min(rows);

        (
            (x_min as isize, y_min as isize),
            ((x_max - x_min) as usize, (y_max - y_min) as usize),
        )
    }

    fn expand_to_include(&mut self, x: f64, y: f64) {
        let min = self.min();
        let max = self.max();
        *self = Rect::new(
            (min.x.min(x), min.y.min(y)),
            (max.x.max(x), max.y.max(y)),
        );
    }

    fn intersect(&self, other: &Self) -> Option<Self> {
        let min_x = self.min().x.max(other.min().x);
        let min_y = self.min().y.max(other.min().y);
        let max_x = self.max().x.min(other.max().x);
        let max_y = self.max().y.min(other.max().y);
        if min_x >= max_x || min_y >= max_y {
            None
        } else {
            Some(Rect::new((min_x, min_y), (max_x, max_y)))
        }
    }
}

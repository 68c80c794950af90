//! Raster access abstractions used by the engine.
//!
//! The engine only needs a handful of capabilities from a
//! raster: its size, band types, geo. transform, a block
//! height hint and window reads / writes. These are
//! expressed by [`RasterSource`] and [`RasterSink`];
//! creating new rasters is the job of a [`RasterDriver`].
//!
//! Two implementations are provided: [`MemRaster`] (always
//! available) and `GdalRaster` (with the `gdal` feature).
//! Band indices are 0-based throughout.

use std::path::Path;

use serde_derive::Serialize;

use crate::geometry::{GeoTransform, RasterDims, RasterOffset};
use crate::Result;

mod mem;
pub use mem::{MemDriver, MemRaster};
mod select;
pub use select::SelectBands;

/// How the engine interprets a band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BandKind {
    Float,
    Integer,
}

/// Storage type of a band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PixelType {
    Byte,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl PixelType {
    pub fn kind(self) -> BandKind {
        match self {
            PixelType::Float32 | PixelType::Float64 => BandKind::Float,
            _ => BandKind::Integer,
        }
    }

    /// Convert a value to what the band can store: integer
    /// types round to the nearest value and saturate.
    pub fn coerce(self, val: f64) -> f64 {
        let clamp = |lo: f64, hi: f64| {
            if val.is_nan() {
                0.
            } else {
                val.round().max(lo).min(hi)
            }
        };
        match self {
            PixelType::Byte => clamp(0., u8::MAX as f64),
            PixelType::UInt16 => clamp(0., u16::MAX as f64),
            PixelType::Int16 => clamp(i16::MIN as f64, i16::MAX as f64),
            PixelType::UInt32 => clamp(0., u32::MAX as f64),
            PixelType::Int32 => clamp(i32::MIN as f64, i32::MAX as f64),
            PixelType::Float32 => val as f32 as f64,
            PixelType::Float64 => val,
        }
    }
}

/// Read access to a multi-band raster.
pub trait RasterSource {
    /// `(width, height)` in pixels.
    fn dims(&self) -> RasterDims;

    fn band_count(&self) -> usize;

    fn pixel_type(&self, band: usize) -> Result<PixelType>;

    fn geo_transform(&self) -> GeoTransform;

    fn projection(&self) -> Option<String> {
        None
    }

    /// Suggested number of rows per read.
    fn block_height(&self) -> usize {
        1
    }

    /// Read a window of `band` as 32-bit floats into `out`
    /// (row-major, `size.0 * size.1` values).
    fn read_f32(
        &self,
        band: usize,
        off: RasterOffset,
        size: RasterDims,
        out: &mut [f32],
    ) -> Result<()>;

    /// Read a window of `band` as 32-bit unsigned integers.
    fn read_u32(
        &self,
        band: usize,
        off: RasterOffset,
        size: RasterDims,
        out: &mut [u32],
    ) -> Result<()>;
}

/// Write access to a raster.
pub trait RasterSink: RasterSource {
    /// View as a source (for alignment and reads).
    fn as_source(&self) -> &dyn RasterSource;

    /// Write a window of `band` from `data` (row-major).
    fn write_f32(
        &mut self,
        band: usize,
        off: RasterOffset,
        size: RasterDims,
        data: &[f32],
    ) -> Result<()>;

    fn set_band_name(&mut self, _band: usize, _name: &str) -> Result<()> {
        Ok(())
    }
}

/// Everything needed to create an output raster.
#[derive(Clone, Debug)]
pub struct OutputSpec<'a> {
    pub path: &'a Path,
    /// Driver short name, eg. `GTiff` or `MEM`.
    pub format: &'a str,
    pub dims: RasterDims,
    pub bands: usize,
    pub pixel_type: PixelType,
    pub transform: GeoTransform,
    pub projection: Option<String>,
    pub band_names: Option<&'a [String]>,
}

/// Creates output rasters.
pub trait RasterDriver {
    type Raster: RasterSink;

    fn create(&self, spec: &OutputSpec<'_>) -> Result<Self::Raster>;
}

/// Where a computation writes: either a new raster made
/// by a driver, or an existing raster.
pub struct NewRaster<'a, D: RasterDriver> {
    pub driver: &'a D,
    pub path: &'a Path,
    pub format: &'a str,
    pub pixel_type: PixelType,
    pub band_names: Option<&'a [String]>,
}

impl<'a, D: RasterDriver> NewRaster<'a, D> {
    pub fn new(driver: &'a D, path: &'a Path, format: &'a str) -> Self {
        NewRaster {
            driver,
            path,
            format,
            pixel_type: PixelType::Float32,
            band_names: None,
        }
    }

    pub fn with_pixel_type(mut self, pixel_type: PixelType) -> Self {
        self.pixel_type = pixel_type;
        self
    }

    pub fn with_band_names(mut self, names: &'a [String]) -> Self {
        self.band_names = Some(names);
        self
    }
}

//! Tiled computation over co-registered rasters.
//!
//! [`ImageCalc`] resolves the overlap of its inputs, streams
//! them in row blocks and hands every pixel to a
//! user-supplied computation. Computations implement one of
//! the traits below; each trait is one call shape:
//!
//! | trait                  | input                  | output |
//! |------------------------|------------------------|--------|
//! | [`BandCalc`]           | float bands            | yes    |
//! | [`BandVisitor`]        | float bands            | no     |
//! | [`MixedBandCalc`]      | integer + float bands  | yes    |
//! | [`MixedBandVisitor`]   | integer + float bands  | no     |
//! | [`LocatedBandCalc`]    | float bands + location | yes    |
//! | [`LocatedBandVisitor`] | float bands + location | no     |
//! | [`LocatedMixedBandCalc`]    | mixed + location  | yes    |
//! | [`LocatedMixedBandVisitor`] | mixed + location  | no     |
//! | [`WindowCalc`]         | neighbourhood          | yes    |
//! | [`LocatedWindowCalc`]  | neighbourhood + loc.   | yes    |
//! | [`WindowVisitor`]      | neighbourhood          | no     |
//!
//! A computation is driven from a single thread: the
//! engine calls it for every pixel, top-to-bottom and
//! left-to-right. Implementations may keep accumulators in
//! `&mut self`; anything that splits the loop across
//! threads must give each worker its own instance and merge
//! them afterwards.

use ndarray::Array3;

use crate::geometry::Envelope;
use crate::Result;

mod border;
mod engine;
mod polygon;
mod progress;
mod window;

pub use polygon::PixelInPoly;
pub use window::{check_window_size, SlidingWindowBuffer};

/// A pixel neighbourhood: `[band][row][col]`, with
/// `window_size` rows and columns. Cells outside the image
/// read as zero.
pub type Neighbourhood = Array3<f64>;

/// Position of the current pixel within the processing
/// window, and its geographic footprint.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelLocation {
    pub col: usize,
    pub row: usize,
    pub extent: Envelope,
}

impl PixelLocation {
    /// Geographic centre of the pixel.
    pub fn center(&self) -> (f64, f64) {
        let c = self.extent.center();
        (c.x, c.y)
    }
}

/// Per-pixel computation on float bands producing
/// `num_out_bands` values.
pub trait BandCalc {
    fn num_out_bands(&self) -> usize;
    fn calc(&mut self, bands: &[f64], out: &mut [f64]) -> Result<()>;
}

/// Per-pixel accumulation on float bands.
pub trait BandVisitor {
    fn visit(&mut self, bands: &[f64]) -> Result<()>;
}

/// Per-pixel computation on integer and float bands. The
/// integer inputs precede the float inputs.
pub trait MixedBandCalc {
    fn num_out_bands(&self) -> usize;
    fn calc(&mut self, ints: &[i64], floats: &[f64], out: &mut [f64]) -> Result<()>;
}

pub trait MixedBandVisitor {
    fn visit(&mut self, ints: &[i64], floats: &[f64]) -> Result<()>;
}

/// Per-pixel computation that also needs to know where the
/// pixel is.
pub trait LocatedBandCalc {
    fn num_out_bands(&self) -> usize;
    fn calc(&mut self, bands: &[f64], loc: &PixelLocation, out: &mut [f64]) -> Result<()>;
}

pub trait LocatedBandVisitor {
    fn visit(&mut self, bands: &[f64], loc: &PixelLocation) -> Result<()>;
}

/// Mixed integer and float bands, plus the pixel location.
pub trait LocatedMixedBandCalc {
    fn num_out_bands(&self) -> usize;
    fn calc(&mut self, ints: &[i64], floats: &[f64], loc: &PixelLocation, out: &mut [f64]) -> Result<()>;
}

pub trait LocatedMixedBandVisitor {
    fn visit(&mut self, ints: &[i64], floats: &[f64], loc: &PixelLocation) -> Result<()>;
}

/// Computation on the square neighbourhood of each pixel.
pub trait WindowCalc {
    fn num_out_bands(&self) -> usize;
    fn calc(&mut self, window: &Neighbourhood, out: &mut [f64]) -> Result<()>;
}

pub trait LocatedWindowCalc {
    fn num_out_bands(&self) -> usize;
    fn calc(&mut self, window: &Neighbourhood, loc: &PixelLocation, out: &mut [f64]) -> Result<()>;
}

pub trait WindowVisitor {
    fn visit(&mut self, window: &Neighbourhood) -> Result<()>;
}

/// The engine. Holds only tuning parameters; every call
/// owns its buffers and releases them on return, whether
/// it succeeds or not.
#[derive(Clone, Debug, Default)]
pub struct ImageCalc {
    block_height: Option<usize>,
}

impl ImageCalc {
    pub fn new() -> Self {
        Default::default()
    }

    /// Override the number of rows read per block. By
    /// default the larger of the inputs' and the output's
    /// native block heights is used.
    pub fn with_block_height(mut self, rows: usize) -> Self {
        self.block_height = Some(rows.max(1));
        self
    }

    pub fn block_height(&self) -> Option<usize> {
        self.block_height
    }
}

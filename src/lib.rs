//! Tiled computation over co-registered rasters, and an
//! Fmask-style cloud and cloud shadow pipeline built on it.
//!
//! - [`calc`]: the engine. Resolves the overlap of its
//!   inputs and streams them in row blocks through per-pixel
//!   or neighbourhood computations.
//! - [`raster`]: the raster source / sink traits with an
//!   in-memory implementation, and GDAL datasets (feature
//!   `gdal`) in [`reader`].
//! - [`fmask`]: the cloud mask passes.
//! - [`shadowfit`]: cloud base height fitting and the cloud
//!   shadow mask.

pub mod align;
pub mod calc;
pub mod chunking;
pub mod columns;
pub mod error;
pub mod fmask;
pub mod geometry;
pub mod histogram;
pub mod prelude;
pub mod raster;
#[cfg(feature = "gdal")]
pub mod reader;
pub mod shadowfit;
pub mod stats;
pub mod table;

pub use error::CalcError;

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

use anyhow::bail;

use super::{PixelType, RasterSource};
use crate::error::CalcError;
use crate::geometry::{GeoTransform, RasterDims, RasterOffset};
use crate::Result;

/// A view exposing a subset of the bands of another
/// source, in the given order.
pub struct SelectBands<'a> {
    source: &'a dyn RasterSource,
    bands: Vec<usize>,
}

impl<'a> SelectBands<'a> {
    pub fn new(source: &'a dyn RasterSource, bands: Vec<usize>) -> Result<Self> {
        if bands.is_empty() {
            bail!(CalcError::config("no bands selected"));
        }
        if let Some(b) = bands.iter().find(|b| **b >= source.band_count()) {
            bail!(CalcError::config(format!(
                "band {} selected from a raster of {} bands",
                b,
                source.band_count()
            )));
        }
        Ok(SelectBands { source, bands })
    }

    fn band(&self, band: usize) -> Result<usize> {
        match self.bands.get(band) {
            Some(b) => Ok(*b),
            None => bail!(CalcError::io(format!("band {} out of range", band))),
        }
    }
}

impl<'a> RasterSource for SelectBands<'a> {
    fn dims(&self) -> RasterDims {
        self.source.dims()
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn pixel_type(&self, band: usize) -> Result<PixelType> {
        self.source.pixel_type(self.band(band)?)
    }

    fn geo_transform(&self) -> GeoTransform {
        self.source.geo_transform()
    }

    fn projection(&self) -> Option<String> {
        self.source.projection()
    }

    fn block_height(&self) -> usize {
        self.source.block_height()
    }

    fn read_f32(
        &self,
        band: usize,
        off: RasterOffset,
        size: RasterDims,
        out: &mut [f32],
    ) -> Result<()> {
        self.source.read_f32(self.band(band)?, off, size, out)
    }

    fn read_u32(
        &self,
        band: usize,
        off: RasterOffset,
        size: RasterDims,
        out: &mut [u32],
    ) -> Result<()> {
        self.source.read_u32(self.band(band)?, off, size, out)
    }
}

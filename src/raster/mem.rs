//! In-memory rasters.

use anyhow::bail;
use ndarray::{s, Array2};

use super::{OutputSpec, PixelType, RasterDriver, RasterSink, RasterSource};
use crate::error::CalcError;
use crate::geometry::{GeoTransform, RasterDims, RasterOffset};
use crate::Result;

/// A raster held in memory: one `(rows, cols)` array per
/// band. Values are stored as `f64` and coerced to the
/// band's [`PixelType`] on write.
#[derive(Clone, Debug)]
pub struct MemRaster {
    bands: Vec<Array2<f64>>,
    pixel_types: Vec<PixelType>,
    names: Vec<String>,
    transform: GeoTransform,
    projection: Option<String>,
    block_height: usize,
}

impl MemRaster {
    /// A zero-filled raster with unit pixels at the origin.
    pub fn new(dims: RasterDims, bands: usize, pixel_type: PixelType) -> Self {
        let (width, height) = dims;
        MemRaster {
            bands: (0..bands).map(|_| Array2::zeros((height, width))).collect(),
            pixel_types: vec![pixel_type; bands],
            names: (1..=bands).map(|i| format!("Band {}", i)).collect(),
            transform: GeoTransform::new(0., 1., height as f64, -1.),
            projection: None,
            block_height: 1,
        }
    }

    /// Build from per-band arrays of identical shape.
    pub fn from_bands(bands: Vec<Array2<f64>>, pixel_type: PixelType) -> Result<Self> {
        let first = match bands.first() {
            Some(b) => b.dim(),
            None => bail!(CalcError::config("raster needs at least one band")),
        };
        if bands.iter().any(|b| b.dim() != first) {
            bail!(CalcError::config("bands differ in shape"));
        }
        let mut raster = MemRaster::new((first.1, first.0), bands.len(), pixel_type);
        for (dst, src) in raster.bands.iter_mut().zip(bands) {
            *dst = src.mapv(|v| pixel_type.coerce(v));
        }
        Ok(raster)
    }

    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_projection(mut self, projection: Option<String>) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_block_height(mut self, block_height: usize) -> Self {
        self.block_height = block_height.max(1);
        self
    }

    pub fn with_pixel_type(mut self, band: usize, pixel_type: PixelType) -> Self {
        self.pixel_types[band] = pixel_type;
        self.bands[band].mapv_inplace(|v| pixel_type.coerce(v));
        self
    }

    pub fn band(&self, band: usize) -> &Array2<f64> {
        &self.bands[band]
    }

    pub fn band_name(&self, band: usize) -> &str {
        &self.names[band]
    }

    #[inline]
    pub fn get(&self, band: usize, col: usize, row: usize) -> f64 {
        self.bands[band][(row, col)]
    }

    #[inline]
    pub fn set(&mut self, band: usize, col: usize, row: usize, val: f64) {
        let pixel_type = self.pixel_types[band];
        self.bands[band][(row, col)] = pixel_type.coerce(val);
    }

    /// Reset every band to zero.
    pub fn clear(&mut self) {
        for band in &mut self.bands {
            band.fill(0.);
        }
    }

    fn check_window(&self, band: usize, off: RasterOffset, size: RasterDims, len: usize) -> Result<()> {
        let (width, height) = self.dims();
        if band >= self.bands.len() {
            bail!(CalcError::io(format!("band {} out of range", band)));
        }
        if off.0 < 0
            || off.1 < 0
            || off.0 as usize + size.0 > width
            || off.1 as usize + size.1 > height
        {
            bail!(CalcError::io(format!(
                "window @ ({},{}) of dimension ({}x{}) outside raster ({}x{})",
                off.0, off.1, size.0, size.1, width, height
            )));
        }
        if len < size.0 * size.1 {
            bail!(CalcError::io("buffer too small for window"));
        }
        Ok(())
    }

    fn read_with<T, F: Fn(f64) -> T>(
        &self,
        band: usize,
        off: RasterOffset,
        size: RasterDims,
        out: &mut [T],
        conv: F,
    ) -> Result<()> {
        self.check_window(band, off, size, out.len())?;
        let (x, y) = (off.0 as usize, off.1 as usize);
        let view = self.bands[band].slice(s![y..y + size.1, x..x + size.0]);
        for (dst, src) in out.iter_mut().zip(view.iter()) {
            *dst = conv(*src);
        }
        Ok(())
    }
}

impl RasterSource for MemRaster {
    fn dims(&self) -> RasterDims {
        let (rows, cols) = self.bands[0].dim();
        (cols, rows)
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn pixel_type(&self, band: usize) -> Result<PixelType> {
        self.pixel_types
            .get(band)
            .copied()
            .ok_or_else(|| CalcError::io(format!("band {} out of range", band)).into())
    }

    fn geo_transform(&self) -> GeoTransform {
        self.transform
    }

    fn projection(&self) -> Option<String> {
        self.projection.clone()
    }

    fn block_height(&self) -> usize {
        self.block_height
    }

    fn read_f32(
        &self,
        band: usize,
        off: RasterOffset,
        size: RasterDims,
        out: &mut [f32],
    ) -> Result<()> {
        self.read_with(band, off, size, out, |v| v as f32)
    }

    fn read_u32(
        &self,
        band: usize,
        off: RasterOffset,
        size: RasterDims,
        out: &mut [u32],
    ) -> Result<()> {
        self.read_with(band, off, size, out, |v| PixelType::UInt32.coerce(v) as u32)
    }
}

impl RasterSink for MemRaster {
    fn as_source(&self) -> &dyn RasterSource {
        self
    }

    fn write_f32(
        &mut self,
        band: usize,
        off: RasterOffset,
        size: RasterDims,
        data: &[f32],
    ) -> Result<()> {
        self.check_window(band, off, size, data.len())?;
        let pixel_type = self.pixel_types[band];
        let (x, y) = (off.0 as usize, off.1 as usize);
        let mut view = self.bands[band].slice_mut(s![y..y + size.1, x..x + size.0]);
        for (dst, src) in view.iter_mut().zip(data.iter()) {
            *dst = pixel_type.coerce(*src as f64);
        }
        Ok(())
    }

    fn set_band_name(&mut self, band: usize, name: &str) -> Result<()> {
        match self.names.get_mut(band) {
            Some(n) => {
                *n = name.to_string();
                Ok(())
            }
            None => bail!(CalcError::io(format!("band {} out of range", band))),
        }
    }
}

/// Driver for [`MemRaster`]; accepts the format name
/// `MEM` and ignores the path.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemDriver;

impl RasterDriver for MemDriver {
    type Raster = MemRaster;

    fn create(&self, spec: &OutputSpec<'_>) -> Result<MemRaster> {
        if !spec.format.eq_ignore_ascii_case("MEM") {
            bail!(CalcError::UnknownFormat(spec.format.to_string()));
        }
        if spec.bands == 0 || spec.dims.0 == 0 || spec.dims.1 == 0 {
            bail!(CalcError::io(format!(
                "cannot create {}x{} raster with {} bands",
                spec.dims.0, spec.dims.1, spec.bands
            )));
        }
        let mut raster = MemRaster::new(spec.dims, spec.bands, spec.pixel_type)
            .with_transform(spec.transform)
            .with_projection(spec.projection.clone());
        if let Some(names) = spec.band_names {
            for (i, name) in names.iter().enumerate().take(spec.bands) {
                raster.set_band_name(i, name)?;
            }
        }
        Ok(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn read_write_window() -> Result<()> {
        let mut raster = MemRaster::new((4, 3), 1, PixelType::Float32);
        raster.write_f32(0, (1, 1), (2, 2), &[1., 2., 3., 4.])?;
        assert_eq!(raster.get(0, 1, 1), 1.);
        assert_eq!(raster.get(0, 2, 2), 4.);

        let mut out = vec![0f32; 3];
        raster.read_f32(0, (0, 1), (3, 1), &mut out)?;
        assert_eq!(out, vec![0., 1., 2.]);

        assert!(raster.read_f32(0, (3, 0), (2, 1), &mut out).is_err());
        Ok(())
    }

    #[test]
    fn integer_bands_coerce() -> Result<()> {
        let mut raster = MemRaster::new((2, 1), 1, PixelType::Byte);
        raster.write_f32(0, (0, 0), (2, 1), &[2.6, 300.])?;
        assert_eq!(raster.get(0, 0, 0), 3.);
        assert_eq!(raster.get(0, 1, 0), 255.);

        let mut out = vec![0u32; 2];
        raster.read_u32(0, (0, 0), (2, 1), &mut out)?;
        assert_eq!(out, vec![3, 255]);
        Ok(())
    }

    #[test]
    fn driver_checks_format() {
        let spec = OutputSpec {
            path: Path::new("unused"),
            format: "GTiff",
            dims: (2, 2),
            bands: 1,
            pixel_type: PixelType::Float32,
            transform: GeoTransform::new(0., 1., 0., -1.),
            projection: None,
            band_names: None,
        };
        let err = MemDriver.create(&spec).unwrap_err();
        assert_eq!(
            err.downcast_ref::<CalcError>(),
            Some(&CalcError::UnknownFormat("GTiff".into()))
        );

        let raster = MemDriver
            .create(&OutputSpec {
                format: "MEM",
                ..spec
            })
            .unwrap();
        assert_eq!(raster.dims(), (2, 2));
    }
}

//! GDAL backed rasters.

use std::path::{Path, PathBuf};

use anyhow::{format_err, Context};
use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags, Metadata};

use crate::error::CalcError;
use crate::geometry::{GeoTransform, RasterDims, RasterOffset};
use crate::raster::{OutputSpec, PixelType, RasterDriver, RasterSink, RasterSource};
use crate::Result;

/// A GDAL dataset accessed through [`RasterSource`] /
/// [`RasterSink`]. The dataset is flushed and closed when
/// this value is dropped.
pub struct GdalRaster {
    ds: Dataset,
    path: PathBuf,
}

impl GdalRaster {
    /// Open a dataset read-only.
    pub fn open(path: &Path) -> Result<Self> {
        let ds = Dataset::open(path)
            .map_err(|e| CalcError::io(format!("opening {}: {}", path.display(), e)))?;
        Ok(GdalRaster {
            ds,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing dataset for writing, e.g. as the
    /// target of the `*_into_existing` modes.
    pub fn open_update(path: &Path) -> Result<Self> {
        let ds = Dataset::open_ex(
            path,
            DatasetOptions {
                open_flags: GdalOpenFlags::GDAL_OF_UPDATE,
                ..Default::default()
            },
        )
        .map_err(|e| CalcError::io(format!("editing {}: {}", path.display(), e)))?;
        Ok(GdalRaster {
            ds,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_into<T: GdalType + Copy>(
        &self,
        band: usize,
        off: RasterOffset,
        size: RasterDims,
        out: &mut [T],
    ) -> Result<()> {
        let rb = self
            .ds
            .rasterband(band as isize + 1)
            .with_context(|| format!("unable to open rasterband {}", band + 1))?;
        let len = size.0 * size.1;
        rb.read_into_slice(off, size, size, &mut out[..len], None)
            .with_context(|| {
                format_err!(
                    "reading window @ ({},{}) of dimension ({}x{}) from {}",
                    off.0,
                    off.1,
                    size.0,
                    size.1,
                    self.path.display()
                )
            })?;
        Ok(())
    }
}

impl RasterSource for GdalRaster {
    fn dims(&self) -> RasterDims {
        self.ds.raster_size()
    }

    fn band_count(&self) -> usize {
        self.ds.raster_count() as usize
    }

    fn pixel_type(&self, band: usize) -> Result<PixelType> {
        let rb = self.ds.rasterband(band as isize + 1)?;
        Ok(match rb.band_type() {
            GdalDataType::UInt8 => PixelType::Byte,
            GdalDataType::UInt16 => PixelType::UInt16,
            GdalDataType::Int16 => PixelType::Int16,
            GdalDataType::UInt32 => PixelType::UInt32,
            GdalDataType::Int32 => PixelType::Int32,
            GdalDataType::Float32 => PixelType::Float32,
            _ => PixelType::Float64,
        })
    }

    fn geo_transform(&self) -> GeoTransform {
        self.ds
            .geo_transform()
            .map(GeoTransform)
            .unwrap_or_else(|_| GeoTransform::new(0., 1., 0., 1.))
    }

    fn projection(&self) -> Option<String> {
        let proj = self.ds.projection();
        if proj.is_empty() {
            None
        } else {
            Some(proj)
        }
    }

    fn block_height(&self) -> usize {
        self.ds
            .rasterband(1)
            .map(|b| b.block_size().1)
            .unwrap_or(1)
            .max(1)
    }

    fn read_f32(
        &self,
        band: usize,
        off: RasterOffset,
        size: RasterDims,
        out: &mut [f32],
    ) -> Result<()> {
        self.read_into(band, off, size, out)
    }

    fn read_u32(
        &self,
        band: usize,
        off: RasterOffset,
        size: RasterDims,
        out: &mut [u32],
    ) -> Result<()> {
        self.read_into(band, off, size, out)
    }
}

impl RasterSink for GdalRaster {
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
        let mut rb = self.ds.rasterband(band as isize + 1)?;
        let len = size.0 * size.1;
        rb.write(off, size, &Buffer::new(size, data[..len].to_vec()))
            .with_context(|| {
                format_err!(
                    "writing window @ ({},{}) of dimension ({}x{}) to {}",
                    off.0,
                    off.1,
                    size.0,
                    size.1,
                    self.path.display()
                )
            })?;
        Ok(())
    }

    fn set_band_name(&mut self, band: usize, name: &str) -> Result<()> {
        let mut rb = self.ds.rasterband(band as isize + 1)?;
        rb.set_description(name)?;
        Ok(())
    }
}

/// Creates [`GdalRaster`] outputs with the GDAL driver
/// named by [`OutputSpec::format`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GdalDriver;

impl RasterDriver for GdalDriver {
    type Raster = GdalRaster;

    fn create(&self, spec: &OutputSpec<'_>) -> Result<GdalRaster> {
        let driver = DriverManager::get_driver_by_name(spec.format)
            .map_err(|_| CalcError::UnknownFormat(spec.format.to_string()))?;

        let (w, h, n) = (spec.dims.0 as isize, spec.dims.1 as isize, spec.bands as isize);
        let created = match spec.pixel_type {
            PixelType::Byte => driver.create_with_band_type::<u8, _>(spec.path, w, h, n),
            PixelType::UInt16 => driver.create_with_band_type::<u16, _>(spec.path, w, h, n),
            PixelType::Int16 => driver.create_with_band_type::<i16, _>(spec.path, w, h, n),
            PixelType::UInt32 => driver.create_with_band_type::<u32, _>(spec.path, w, h, n),
            PixelType::Int32 => driver.create_with_band_type::<i32, _>(spec.path, w, h, n),
            PixelType::Float32 => driver.create_with_band_type::<f32, _>(spec.path, w, h, n),
            PixelType::Float64 => driver.create_with_band_type::<f64, _>(spec.path, w, h, n),
        };
        let mut ds = created.map_err(|e| {
            CalcError::io(format!("creating dataset {}: {}", spec.path.display(), e))
        })?;

        ds.set_geo_transform(&spec.transform.0)?;
        if let Some(proj) = &spec.projection {
            ds.set_projection(proj)?;
        }

        let mut raster = GdalRaster {
            ds,
            path: spec.path.to_path_buf(),
        };
        if let Some(names) = spec.band_names {
            for (i, name) in names.iter().enumerate().take(spec.bands) {
                raster.set_band_name(i, name)?;
            }
        }
        Ok(raster)
    }
}

//! Utilities to open inputs, describe outputs and write
//! results.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;

use rastercalc::calc::ImageCalc;
use rastercalc::raster::{NewRaster, PixelType};
use rastercalc::reader::{GdalDriver, GdalRaster};
use rastercalc::Result;
use serde::Serialize;

pub const DEFAULT_DRIVER: &str = "GTIFF";

pub fn read_raster(path: &Path) -> Result<GdalRaster> {
    GdalRaster::open(path)
}

/// Existing raster opened for writing.
pub fn edit_raster(path: &Path) -> Result<GdalRaster> {
    GdalRaster::open_update(path)
}

/// Path and GDAL driver of an output raster.
pub struct OutputArgs {
    pub path: PathBuf,
    pub driver: String,
}

impl OutputArgs {
    pub fn new<P: Into<PathBuf>>(path: P, driver: &str) -> Self {
        OutputArgs {
            path: path.into(),
            driver: driver.to_string(),
        }
    }

    pub fn raster<'a>(&'a self, driver: &'a GdalDriver, pixel_type: PixelType) -> NewRaster<'a, GdalDriver> {
        NewRaster::new(driver, &self.path, &self.driver).with_pixel_type(pixel_type)
    }
}

/// Engine with an optional fixed block height.
pub fn calc_engine(block_height: Option<usize>) -> ImageCalc {
    match block_height {
        Some(rows) => ImageCalc::new().with_block_height(rows),
        None => ImageCalc::new(),
    }
}

pub fn write_json<T: Serialize>(path: &Path, json: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let buf = std::io::BufWriter::with_capacity(0x100000, file);
    serde_json::to_writer(buf, json).with_context(|| format!("writing {}", path.display()))
}

pub fn print_json<T: Serialize>(json: &T) -> Result<()> {
    let writer = std::io::BufWriter::new(std::io::stdout());
    Ok(serde_json::to_writer(writer, json)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn output_args() {
        let driver = GdalDriver;
        let args = OutputArgs::new("mask.tif", DEFAULT_DRIVER);
        let out = args.raster(&driver, PixelType::Byte);
        assert_eq!(out.path, Path::new("mask.tif"));
        assert_eq!(out.format, "GTIFF");
        assert_eq!(out.pixel_type, PixelType::Byte);
    }

    #[test]
    fn filter_into_edited_raster() -> Result<()> {
        use rastercalc::fmask::MajorityFilter;
        use rastercalc::raster::{MemRaster, RasterSource};

        let tmp_dir = TempDir::new("raster_tools_test")?;
        let args = OutputArgs::new(tmp_dir.path().join("mask.tif"), DEFAULT_DRIVER);
        let driver = GdalDriver;
        let calc = calc_engine(Some(2));

        let mut mask = MemRaster::new((4, 4), 1, PixelType::Byte);
        for row in 0..4 {
            for col in 0..4 {
                mask.set(0, col, row, 1.);
            }
        }
        let created = calc.calc_window_to_new(&[&mask], 3, &mut MajorityFilter::new(), &args.raster(&driver, PixelType::Byte))?;
        drop(created);

        let clear = MemRaster::new((4, 4), 1, PixelType::Byte);
        let mut edited = edit_raster(&args.path)?;
        calc.calc_window_into_existing(&[&clear], 3, &mut MajorityFilter::new(), &mut edited)?;
        drop(edited);

        let read = read_raster(&args.path)?;
        let mut out = vec![1f32; 16];
        read.read_f32(0, (0, 0), (4, 4), &mut out)?;
        assert_eq!(out, vec![0f32; 16]);
        Ok(())
    }

    #[test]
    fn json_round_trip() -> Result<()> {
        let tmp_dir = TempDir::new("raster_tools_test")?;
        let path = tmp_dir.path().join("stats.json");
        write_json(&path, &vec![1.5, 2.])?;

        let read: Vec<f64> = serde_json::from_reader(File::open(&path)?)?;
        assert_eq!(read, vec![1.5, 2.]);
        Ok(())
    }
}

//! Visit the outermost pixels of a raster.

use super::{BandVisitor, ImageCalc, MixedBandVisitor};
use crate::geometry::{RasterDims, RasterOffset};
use crate::raster::RasterSource;
use crate::Result;

/// Read the top row, bottom row, left column and right
/// column in turn, calling `visit` with the band values of
/// each pixel. Corner pixels are visited twice.
fn sweep<T, R, V>(raster: &dyn RasterSource, read: R, mut visit: V) -> Result<()>
where
    T: Copy + Default,
    R: Fn(usize, RasterOffset, RasterDims, &mut [T]) -> Result<()>,
    V: FnMut(&[T]) -> Result<()>,
{
    let (width, height) = raster.dims();
    let strips = [
        ((0, 0), (width, 1)),
        ((0, height as isize - 1), (width, 1)),
        ((0, 0), (1, height)),
        ((width as isize - 1, 0), (1, height)),
    ];

    let mut bufs: Vec<Vec<T>> = vec![vec![]; raster.band_count()];
    let mut pixel = vec![T::default(); raster.band_count()];
    for (off, size) in strips.iter() {
        let len = size.0 * size.1;
        for (b, buf) in bufs.iter_mut().enumerate() {
            buf.clear();
            buf.resize(len, T::default());
            read(b, *off, *size, buf)?;
        }
        for i in 0..len {
            for (v, buf) in pixel.iter_mut().zip(&bufs) {
                *v = buf[i];
            }
            visit(&pixel)?;
        }
    }
    Ok(())
}

impl ImageCalc {
    /// Visit the border pixels of `raster` with their float
    /// band values.
    pub fn calc_border_pixels(
        &self,
        raster: &dyn RasterSource,
        visitor: &mut dyn BandVisitor,
    ) -> Result<()> {
        let mut vals = vec![0f64; raster.band_count()];
        sweep(
            raster,
            |b, off, size, buf| raster.read_f32(b, off, size, buf),
            |pixel: &[f32]| {
                for (v, p) in vals.iter_mut().zip(pixel) {
                    *v = *p as f64;
                }
                visitor.visit(&vals)
            },
        )
    }

    /// Visit the border pixels of `raster` with their
    /// integer band values (no float bands are passed).
    pub fn calc_border_pixels_int(
        &self,
        raster: &dyn RasterSource,
        visitor: &mut dyn MixedBandVisitor,
    ) -> Result<()> {
        let mut vals = vec![0i64; raster.band_count()];
        sweep(
            raster,
            |b, off, size, buf| raster.read_u32(b, off, size, buf),
            |pixel: &[u32]| {
                for (v, p) in vals.iter_mut().zip(pixel) {
                    *v = *p as i64;
                }
                visitor.visit(&vals, &[])
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::engine::tests::ramp;
    use crate::raster::PixelType;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Seen(BTreeMap<i64, usize>);
    impl BandVisitor for Seen {
        fn visit(&mut self, bands: &[f64]) -> Result<()> {
            *self.0.entry(bands[0] as i64).or_insert(0) += 1;
            Ok(())
        }
    }
    impl MixedBandVisitor for Seen {
        fn visit(&mut self, ints: &[i64], floats: &[f64]) -> Result<()> {
            assert!(floats.is_empty());
            *self.0.entry(ints[1]).or_insert(0) += 1;
            Ok(())
        }
    }

    #[test]
    fn border_of_4x3() -> Result<()> {
        let input = ramp((4, 3), 1);
        let mut seen = Seen::default();
        ImageCalc::new().calc_border_pixels(&input, &mut seen)?;

        assert_eq!(seen.0.values().sum::<usize>(), 14);
        // 0 1 2 3 / 4 5 6 7 / 8 9 10 11
        assert!(!seen.0.contains_key(&5) && !seen.0.contains_key(&6));
        for corner in &[0, 3, 8, 11] {
            assert_eq!(seen.0[corner], 2);
        }
        assert_eq!(seen.0[&1], 1);
        assert_eq!(seen.0[&4], 1);
        Ok(())
    }

    #[test]
    fn border_as_integers() -> Result<()> {
        let input = ramp((3, 3), 2).with_pixel_type(1, PixelType::UInt16);
        let mut seen = Seen::default();
        ImageCalc::new().calc_border_pixels_int(&input, &mut seen)?;
        assert_eq!(seen.0.values().sum::<usize>(), 12);
        // Second band is 100 + index.
        assert!(!seen.0.contains_key(&104));
        assert_eq!(seen.0[&100], 2);
        Ok(())
    }
}

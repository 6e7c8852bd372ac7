use image::{Rgba, RgbaImage};
use thiserror::Error;

pub const RED: usize = 0;
pub const GREEN: usize = 1;
pub const BLUE: usize = 2;
pub const ALPHA: usize = 3;

/// Samples per pixel in the interleaved RGBA layout.
pub const CHANNELS: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RasterError {
    #[error("sample buffer holds {actual} bytes, {width}x{height} RGBA needs {expected}")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Row-major RGBA8 raster, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl RasterBuffer {
    /// Fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            samples: vec![0; sample_len(width, height)],
        }
    }

    pub fn from_samples(width: u32, height: u32, samples: Vec<u8>) -> Result<Self, RasterError> {
        let expected = sample_len(width, height);
        if samples.len() != expected {
            return Err(RasterError::LengthMismatch {
                width,
                height,
                expected,
                actual: samples.len(),
            });
        }

        Ok(Self {
            width,
            height,
            samples,
        })
    }

    pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        let mut buffer = Self::new(width, height);
        for px in buffer.samples.chunks_exact_mut(CHANNELS) {
            px.copy_from_slice(&color.0);
        }
        buffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [u8] {
        &mut self.samples
    }

    /// Flat index of the red sample of pixel (x, y).
    #[inline]
    pub fn pixel_index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if !self.in_bounds(x as i64, y as i64) {
            return None;
        }
        let idx = self.pixel_index(x, y);
        let mut px = [0; CHANNELS];
        px.copy_from_slice(&self.samples[idx..idx + CHANNELS]);
        Some(Rgba(px))
    }

    /// Writes a pixel, ignoring coordinates outside the buffer.
    pub fn put_pixel(&mut self, x: u32, y: u32, value: Rgba<u8>) {
        if self.in_bounds(x as i64, y as i64) {
            let idx = self.pixel_index(x, y);
            self.samples[idx..idx + CHANNELS].copy_from_slice(&value.0);
        }
    }

    /// Iterates `(x, y, pixel)` in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32, Rgba<u8>)> + '_ {
        let width = self.width.max(1);
        self.samples
            .chunks_exact(CHANNELS)
            .enumerate()
            .map(move |(i, px)| {
                let i = i as u32;
                (i % width, i / width, Rgba([px[0], px[1], px[2], px[3]]))
            })
    }

    pub fn into_image(self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.samples)
            .expect("RasterBuffer holds exactly width * height * 4 samples")
    }
}

impl From<RgbaImage> for RasterBuffer {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let mut samples = image.into_raw();
        samples.truncate(sample_len(width, height));
        Self {
            width,
            height,
            samples,
        }
    }
}

fn sample_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * CHANNELS
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn new_buffer_is_transparent() {
        let buffer = RasterBuffer::new(3, 2);
        assert_eq!(buffer.samples().len(), 24);
        assert!(buffer.samples().iter().all(|s| *s == 0));
    }

    #[test]
    fn rejects_mismatched_length() {
        let err = RasterBuffer::from_samples(2, 2, vec![0; 15]).unwrap_err();
        assert_eq!(
            err,
            RasterError::LengthMismatch {
                width: 2,
                height: 2,
                expected: 16,
                actual: 15
            }
        );
    }

    #[test]
    fn pixel_index_is_row_major() {
        let buffer = RasterBuffer::new(5, 4);
        assert_eq!(buffer.pixel_index(0, 0), 0);
        assert_eq!(buffer.pixel_index(1, 0), 4);
        assert_eq!(buffer.pixel_index(0, 1), 20);
        assert_eq!(buffer.pixel_index(4, 3), 76);
    }

    #[test]
    fn put_pixel_outside_is_ignored() {
        let mut buffer = RasterBuffer::new(2, 2);
        buffer.put_pixel(2, 0, Rgba([1, 2, 3, 4]));
        buffer.put_pixel(1, 1, Rgba([9, 8, 7, 6]));
        assert_eq!(buffer.pixel(1, 1), Some(Rgba([9, 8, 7, 6])));
        assert_eq!(buffer.pixel(2, 0), None);
        assert!(buffer.samples()[..12].iter().all(|s| *s == 0));
    }

    #[test]
    fn image_conversion_keeps_layout() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(1, 0, Rgba([10, 20, 30, 40]));

        let buffer = RasterBuffer::from(image.clone());
        assert_eq!(buffer.dimensions(), (2, 1));
        assert_eq!(buffer.samples(), &[0, 0, 0, 0, 10, 20, 30, 40]);
        assert_eq!(buffer.into_image(), image);
    }

    #[test]
    fn into_image_keeps_dimensions() {
        let image = RasterBuffer::filled(3, 2, Rgba([5, 6, 7, 8])).into_image();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 1), &Rgba([5, 6, 7, 8]));

        let empty = RasterBuffer::new(0, 4).into_image();
        assert_eq!(empty.dimensions(), (0, 4));
    }

    #[test]
    fn pixels_walks_rows() {
        let mut buffer = RasterBuffer::new(2, 2);
        buffer.put_pixel(0, 1, Rgba([1, 1, 1, 1]));
        let coords: Vec<_> = buffer.pixels().map(|(x, y, _)| (x, y)).collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
        assert_eq!(buffer.pixels().nth(2).map(|p| p.2), Some(Rgba([1, 1, 1, 1])));
    }
}

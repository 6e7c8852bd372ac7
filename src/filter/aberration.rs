use log::trace;
use rayon::prelude::*;

use super::Filter;
use crate::raster::{RasterBuffer, ALPHA, BLUE, CHANNELS, GREEN, RED};

/// Zero-argument value source, evaluated once per `apply`.
pub type Producer<T> = Box<dyn FnMut() -> T + Send>;

const COLORS: [usize; 3] = [RED, GREEN, BLUE];

/// Each color write carries a third of the source alpha. The staging buffer
/// counts alpha in thirds so three writes restore the full value exactly.
const ALPHA_PARTS: u32 = 3;

/// One past the widest possible raster. Any larger shift misses every pixel,
/// and clamping to it keeps coordinate sums inside `i64`.
const MAX_SHIFT: i64 = u32::MAX as i64 + 1;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Offset {
    pub x: f32,
    pub y: f32,
}

impl Offset {
    pub const ZERO: Offset = Offset { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Whole-pixel displacement for this offset scaled by `magnitude`,
    /// truncated toward zero and clamped to `±MAX_SHIFT`. Non-finite products
    /// don't move the channel.
    fn displacement(self, magnitude: f32) -> (i64, i64) {
        fn axis(v: f32) -> i64 {
            if v.is_finite() {
                (v.trunc() as i64).clamp(-MAX_SHIFT, MAX_SHIFT)
            } else {
                0
            }
        }

        (axis(self.x * magnitude), axis(self.y * magnitude))
    }
}

/// Shifts the red, green and blue channels by independent offsets, leaving
/// colored fringes around edges.
///
/// The displacement `offset * magnitude` is truncated toward zero before it
/// is added to the source coordinate, so targets round toward the source
/// pixel: x=2 with a shift of -1.5 lands on 1, not 0.
pub struct ChromaticAberration {
    magnitude: Producer<f32>,
    red: Producer<Offset>,
    green: Producer<Offset>,
    blue: Producer<Offset>,
    parallel: bool,
}

impl ChromaticAberration {
    pub fn new(
        magnitude: Producer<f32>,
        red: Producer<Offset>,
        green: Producer<Offset>,
        blue: Producer<Offset>,
    ) -> Self {
        Self {
            magnitude,
            red,
            green,
            blue,
            parallel: false,
        }
    }

    pub fn fixed(magnitude: f32, red: Offset, green: Offset, blue: Offset) -> Self {
        Self::new(
            Box::new(move || magnitude),
            Box::new(move || red),
            Box::new(move || green),
            Box::new(move || blue),
        )
    }

    /// Evaluate rows on the rayon pool instead of the calling thread.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

impl Filter for ChromaticAberration {
    fn apply(&mut self, buffer: &mut RasterBuffer) {
        let magnitude = (self.magnitude)();
        let offsets = [(self.red)(), (self.green)(), (self.blue)()];
        let shifts = offsets.map(|offset| offset.displacement(magnitude));

        trace!(
            "aberration: magnitude {magnitude}, offsets {offsets:?}, shifts {shifts:?} on {}x{}",
            buffer.width(),
            buffer.height()
        );

        let staging = if self.parallel {
            gather_rows(buffer, &shifts)
        } else {
            scatter(buffer, &shifts)
        };

        commit(buffer, &staging);
    }
}

/// Pushes every source sample to its displaced target.
fn scatter(buffer: &RasterBuffer, shifts: &[(i64, i64); 3]) -> Vec<u32> {
    let samples = buffer.samples();
    let mut staging = vec![0u32; samples.len()];

    for y in 0..buffer.height() {
        for x in 0..buffer.width() {
            let idx = buffer.pixel_index(x, y);
            let alpha = samples[idx + ALPHA] as u32;

            for (&color, &(dx, dy)) in COLORS.iter().zip(shifts) {
                let (tx, ty) = (x as i64 + dx, y as i64 + dy);
                if !buffer.in_bounds(tx, ty) {
                    continue;
                }

                let target = buffer.pixel_index(tx as u32, ty as u32);
                staging[target + color] += samples[idx + color] as u32;
                staging[target + ALPHA] += alpha;
            }
        }
    }

    staging
}

/// Pulls each target row from its source rows. Every channel shift is a plain
/// translation, so each row is written by exactly one task.
fn gather_rows(buffer: &RasterBuffer, shifts: &[(i64, i64); 3]) -> Vec<u32> {
    let samples = buffer.samples();
    let mut staging = vec![0u32; samples.len()];
    let width = buffer.width() as usize;
    let row_len = width * CHANNELS;
    if row_len == 0 {
        return staging;
    }

    staging
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(ty, row)| {
            for tx in 0..width {
                let target = tx * CHANNELS;
                for (&color, &(dx, dy)) in COLORS.iter().zip(shifts) {
                    let (sx, sy) = (tx as i64 - dx, ty as i64 - dy);
                    if !buffer.in_bounds(sx, sy) {
                        continue;
                    }

                    let source = buffer.pixel_index(sx as u32, sy as u32);
                    row[target + color] += samples[source + color] as u32;
                    row[target + ALPHA] += samples[source + ALPHA] as u32;
                }
            }
        });

    staging
}

/// Replaces the buffer with the staged sums, saturating at 255.
fn commit(buffer: &mut RasterBuffer, staging: &[u32]) {
    for (i, (dst, &sum)) in buffer.samples_mut().iter_mut().zip(staging).enumerate() {
        let value = if i % CHANNELS == ALPHA {
            sum / ALPHA_PARTS
        } else {
            sum
        };
        *dst = value.min(u8::MAX as u32) as u8;
    }
}

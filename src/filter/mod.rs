mod aberration;

pub use aberration::{ChromaticAberration, Offset, Producer};

use crate::raster::RasterBuffer;

/// A transform applied in place to one frame.
///
/// Implementations keep the buffer's dimensions and never touch samples
/// outside `[0, width) x [0, height)`.
pub trait Filter {
    fn apply(&mut self, buffer: &mut RasterBuffer);
}

/// Filters applied in insertion order, each seeing the previous one's output.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter + Send>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F: Filter + Send + 'static>(&mut self, filter: F) {
        self.filters.push(Box::new(filter));
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn apply(&mut self, buffer: &mut RasterBuffer) {
        for filter in self.filters.iter_mut() {
            filter.apply(buffer);
        }
    }

    /// Runs the chain over a copy of `source` and returns the filtered frame.
    pub fn render_frame(&mut self, source: &RasterBuffer) -> RasterBuffer {
        let mut buffer = source.clone();
        self.apply(&mut buffer);
        buffer
    }
}

//! Chromatic aberration for RGBA rasters: a small filter contract, an ordered
//! filter chain and the channel displacement filter itself, plus the bitmap
//! text renderer used to build source frames.

pub mod filter;
pub mod raster;
pub mod text;

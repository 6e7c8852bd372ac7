use std::io::{stdout, Write};

use anyhow::{anyhow, Context, Result};
use ffmpeg_sidecar::{command::FfmpegCommand, event::FfmpegEvent};
use log::{debug, info};

use chromaflut::{raster::RasterBuffer, text};

/// A source frame and the time in seconds it is due after playback start.
pub struct SourceFrame {
    pub timestamp: f32,
    pub buffer: RasterBuffer,
}

/// Decodes every frame of an image or video file to RGBA through ffmpeg.
pub fn decode_file(file: &str) -> Result<Vec<SourceFrame>> {
    let mut decoder = FfmpegCommand::new()
        .hide_banner()
        .input(file)
        .args("-f rawvideo -pix_fmt rgba -".split(' '))
        .spawn()
        .context("Failed to spawn ffmpeg")?;

    let mut frames = Vec::new();
    for event in decoder.iter().context("Failed to read ffmpeg output")? {
        match event {
            FfmpegEvent::OutputFrame(frame) => {
                print!("\rLoading frame {}...", frame.frame_num);
                stdout().flush()?;

                let buffer = RasterBuffer::from_samples(frame.width, frame.height, frame.data)
                    .with_context(|| format!("ffmpeg returned a malformed frame {}", frame.frame_num))?;
                frames.push(SourceFrame {
                    timestamp: frame.timestamp,
                    buffer,
                });
            }
            FfmpegEvent::Log(_level, log) => debug!("[ffmpeg] {log}"),
            _ => (),
        }
    }

    if frames.is_empty() {
        return Err(anyhow!("ffmpeg decoded no frames from {file}"));
    }

    println!("\rLoading {} frames... success", frames.len());
    info!("Decoded {} frames from {file}", frames.len());

    Ok(frames)
}

/// Largest width or height of a rendered text frame.
pub const MAX_TEXT_SIDE: u32 = 1 << 14;

/// One still frame with `text` painted on a transparent background. The
/// margin leaves room for the shifted channels.
pub fn text_frame(text: &str, scale: u32, color: image::Rgba<u8>, margin: u32) -> Result<SourceFrame> {
    let (width, height) = text::measure(text, scale, margin)
        .filter(|&(w, h)| w <= MAX_TEXT_SIDE && h <= MAX_TEXT_SIDE)
        .ok_or_else(|| {
            anyhow!(
                "{text:?} at scale {scale} with margin {margin} exceeds {MAX_TEXT_SIDE}px per side"
            )
        })?;
    debug!("Text frame is {width}x{height}");

    let buffer = text::render_text(text, scale, margin, color)
        .ok_or_else(|| anyhow!("Text frame size overflowed"))?;
    info!(
        "Rendered {text:?} at scale {scale} into {}x{}",
        buffer.width(),
        buffer.height()
    );

    Ok(SourceFrame {
        timestamp: 0.0,
        buffer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use test_log::test;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    #[test]
    fn text_frame_has_margin() {
        let frame = text_frame("HI", 2, WHITE, 4).unwrap();
        assert_eq!(frame.timestamp, 0.0);
        assert_eq!(frame.buffer.dimensions(), (14 + 8, 10 + 8));
    }

    #[test]
    fn oversized_text_frame_is_an_error() {
        assert!(text_frame("HI", 2, WHITE, u32::MAX).is_err());
        assert!(text_frame("HI", 2, WHITE, MAX_TEXT_SIDE).is_err());
        assert!(text_frame("HI", u32::MAX, WHITE, 0).is_err());
    }
}

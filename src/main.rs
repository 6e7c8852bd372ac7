mod conn;
mod source;

use std::{f32::consts::TAU, path::PathBuf, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use image::Rgba;
use log::{debug, info};
use tokio::{
    io::{stdout, AsyncWriteExt},
    sync::mpsc,
    time::{interval, Instant},
};

use chromaflut::filter::{ChromaticAberration, FilterChain, Offset, Producer};

use crate::{
    conn::{fetch_canvas_size, ConnectionBundle, Stats},
    source::SourceFrame,
};

/// Frame rate for still sources when no target fps is given.
const STILL_FPS: u32 = 30;

async fn start_display(threads: usize) -> Result<mpsc::UnboundedSender<Stats>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Stats>();

    tokio::spawn(async move {
        let mut errors = 0;
        let mut frames = 0u64;

        while let Some(stats) = rx.recv().await {
            errors += stats.errors;
            frames += 1;

            let line = format!("\rThreads: {threads}  |  Frames: {frames}  |  Errors: {errors}");
            if stdout().write_all(line.as_bytes()).await.is_err() || stdout().flush().await.is_err() {
                break;
            }
        }
    });

    Ok(tx)
}

fn parse_offset(value: &str) -> Result<Offset, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got {value:?}"))?;
    let x = x.trim().parse().map_err(|e| format!("bad x in {value:?}: {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad y in {value:?}: {e}"))?;
    Ok(Offset::new(x, y))
}

fn parse_color(value: &str) -> Result<Rgba<u8>, String> {
    if value.len() != 8 || !value.is_ascii() {
        return Err(format!("expected RRGGBBAA but got {value:?}"));
    }

    let mut buf = [0; 4];
    for (i, channel) in buf.iter_mut().enumerate() {
        let idx = i * 2;
        *channel = u8::from_str_radix(&value[idx..(idx + 2)], 16).map_err(|e| e.to_string())?;
    }
    Ok(Rgba(buf))
}

#[derive(Parser)]
struct Args {
    /// The servers address
    #[arg(
        short = 's',
        long,
        value_name = "ADDRESS",
        default_value = "wall.c3pixelflut.de"
    )]
    server: String,

    /// The servers port
    #[arg(short = 'p', long, default_value_t = 1337)]
    port: u16,

    /// The amount of threads (concurrent connections) that should be used
    #[arg(short = 't', long, value_name = "NUM", default_value_t = 12)]
    threads: usize,

    /// Image or video to use as source instead of rendered text
    #[arg(short = 'f', long)]
    file: Option<String>,

    /// Text to render when no file is given
    #[arg(long, default_value = "TEST")]
    text: String,

    /// Pixel size of one font cell
    #[arg(long, value_name = "PX", default_value_t = 8)]
    scale: u32,

    /// Text color as <rrggbbaa>
    #[arg(long, value_name = "RRGGBBAA", default_value = "ffffffff", value_parser = parse_color)]
    color: Rgba<u8>,

    /// The targeted animation and video fps
    #[arg(long, value_name = "FPS")]
    target_fps: Option<u32>,

    /// Offset of the image on the x axis
    #[arg(short = 'x', value_name = "PX")]
    offset_x: Option<u32>,

    /// Offset of the image on the y axis
    #[arg(short = 'y', value_name = "PX")]
    offset_y: Option<u32>,

    /// Aberration magnitude the channel offsets are scaled by
    #[arg(short = 'm', long, default_value_t = 8.0, allow_negative_numbers = true)]
    magnitude: f32,

    /// Red channel offset as <x,y>
    #[arg(long, value_name = "X,Y", default_value = "-1,0", value_parser = parse_offset, allow_hyphen_values = true)]
    red: Offset,

    /// Green channel offset as <x,y>
    #[arg(long, value_name = "X,Y", default_value = "0,-1", value_parser = parse_offset, allow_hyphen_values = true)]
    green: Offset,

    /// Blue channel offset as <x,y>
    #[arg(long, value_name = "X,Y", default_value = "0,0", value_parser = parse_offset, allow_hyphen_values = true)]
    blue: Offset,

    /// Swings the magnitude between -m and m over <SECONDS>
    #[arg(long, value_name = "SECONDS")]
    wobble: Option<f32>,

    /// Filters rows in parallel
    #[arg(long)]
    parallel: bool,

    /// Writes one filtered frame to <PATH> as PNG and exits
    #[arg(long, value_name = "PATH")]
    preview: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: String,
    pub threads: usize,
    pub canvas_size: (u32, u32),
    pub origin: (u32, u32),
}

fn build_chain(args: &Args) -> FilterChain {
    let magnitude = args.magnitude;
    let magnitude_producer: Producer<f32> = match args.wobble {
        Some(period) if period > 0.0 => {
            let start = Instant::now();
            Box::new(move || magnitude * (start.elapsed().as_secs_f32() * TAU / period).sin())
        }
        _ => Box::new(move || magnitude),
    };

    let (red, green, blue) = (args.red, args.green, args.blue);
    let mut chain = FilterChain::new();
    chain.push(
        ChromaticAberration::new(
            magnitude_producer,
            Box::new(move || red),
            Box::new(move || green),
            Box::new(move || blue),
        )
        .with_parallel(args.parallel),
    );
    chain
}

/// Widest displacement any channel can reach, used as text margin.
fn max_shift(args: &Args) -> Result<u32> {
    let shift = [args.red, args.green, args.blue]
        .iter()
        .map(|o| o.x.abs().max(o.y.abs()) * args.magnitude.abs())
        .fold(0.0f32, f32::max)
        .ceil();

    if !shift.is_finite() || shift > source::MAX_TEXT_SIDE as f32 {
        return Err(anyhow!(
            "Magnitude {} shifts channels by {shift}px, more than {}px",
            args.magnitude,
            source::MAX_TEXT_SIDE
        ));
    }

    Ok(shift as u32)
}

fn load_frames(args: &Args) -> Result<Vec<SourceFrame>> {
    match &args.file {
        Some(file) => source::decode_file(file),
        None => Ok(vec![source::text_frame(
            &args.text,
            args.scale,
            args.color,
            max_shift(args)?,
        )?]),
    }
}

/// Checks that a `width`x`height` source placed at `origin` fits the canvas.
fn check_fits(origin: (u32, u32), size: (u32, u32), canvas: (u32, u32)) -> Result<()> {
    let right = origin.0.checked_add(size.0);
    let bottom = origin.1.checked_add(size.1);
    match (right, bottom) {
        (Some(right), Some(bottom)) if right <= canvas.0 && bottom <= canvas.1 => Ok(()),
        _ => Err(anyhow!(
            "{}x{} source at {origin:?} does not fit the {}x{} canvas",
            size.0,
            size.1,
            canvas.0,
            canvas.1
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let frames = load_frames(&args)?;
    let mut chain = build_chain(&args);
    info!(
        "Chain of {} filter(s): magnitude {}, red {:?}, green {:?}, blue {:?}",
        chain.len(),
        args.magnitude,
        args.red,
        args.green,
        args.blue
    );

    if let Some(path) = &args.preview {
        let frame = chain.render_frame(&frames[0].buffer);
        frame
            .into_image()
            .save(path)
            .with_context(|| format!("Failed to write preview to {}", path.display()))?;
        info!("Wrote preview to {}", path.display());
        return Ok(());
    }

    let server = format!("{server}:{port}", server = args.server, port = args.port);
    let canvas_size = fetch_canvas_size(&server).await?;
    info!("Canvas on {server} is {}x{}", canvas_size.0, canvas_size.1);

    let config = Config {
        server,
        threads: args.threads.max(1),
        canvas_size,
        origin: (args.offset_x.unwrap_or_default(), args.offset_y.unwrap_or_default()),
    };

    let (width, height) = frames[0].buffer.dimensions();
    check_fits(config.origin, (width, height), config.canvas_size)?;

    let display_tx = start_display(config.threads).await?;
    let connection = ConnectionBundle::new(config.clone(), display_tx).await?;

    println!(
        "Starting to flood {width}x{height} source on {}x{} canvas [{}]",
        canvas_size.0, canvas_size.1, config.server
    );

    let fps = args
        .target_fps
        .or_else(|| (frames.len() == 1).then_some(STILL_FPS));
    let mut interval = fps.map(|fps| interval(Duration::from_secs_f64(1.0 / fps.max(1) as f64)));

    loop {
        let timer = Instant::now();

        for frame in frames.iter() {
            if let Some(interval) = &mut interval {
                interval.tick().await;
            } else {
                let duration = Duration::from_secs_f32(frame.timestamp).saturating_sub(timer.elapsed());
                tokio::time::sleep(duration).await;
            }

            let filtered = chain.render_frame(&frame.buffer);
            debug!("Filtered frame at {:.3}s", frame.timestamp);
            connection.update_frame(filtered)?;
        }
    }
}

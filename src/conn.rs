use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use image::Rgba;
use log::{debug, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::{mpsc, oneshot},
    task::JoinSet,
};

use chromaflut::raster::RasterBuffer;

use crate::Config;

type FrameJob = (Arc<RasterBuffer>, oneshot::Sender<usize>);

/// Asks the server for its canvas size.
pub async fn fetch_canvas_size(server: &str) -> Result<(u32, u32)> {
    let (mut rx, mut tx) = TcpStream::connect(server)
        .await
        .with_context(|| format!("Failed to connect to {server}"))?
        .into_split();

    let mut answer = String::new();
    tx.write_all(b"SIZE\n").await?;
    loop {
        let mut byte = [0];
        if rx.read(&mut byte).await? != 1 {
            return Err(anyhow!("Server returned early EOF on SIZE command"));
        }

        if !byte[0].is_ascii() {
            return Err(anyhow!("Server returned non ascii answer on SIZE command"));
        }

        if byte[0] == b'\n' {
            break;
        }

        answer.push(byte[0] as char);
    }

    parse_size(&answer)
}

fn parse_size(answer: &str) -> Result<(u32, u32)> {
    let parts: Vec<&str> = answer.trim().split(' ').skip(1).collect();
    if parts.len() != 2 {
        return Err(anyhow!("Server returned invalid answer for SIZE command: {answer:?}"));
    }

    let x = parts[0].parse()?;
    let y = parts[1].parse()?;

    Ok((x, y))
}

/// Pixelflut command for one pixel, composited onto black. The canvas has no
/// alpha, so transparent pixels paint black and erase old fringes.
pub fn pixel_command(x: u32, y: u32, value: Rgba<u8>) -> String {
    let [r, g, b, a] = value.0;
    let over_black = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
    format!(
        "PX {x} {y} {r:02x}{g:02x}{b:02x}\n",
        r = over_black(r),
        g = over_black(g),
        b = over_black(b)
    )
}

async fn connection(
    server: String,
    origin: (u32, u32),
    conn_id: usize,
    num_conns: usize,
) -> Result<mpsc::UnboundedSender<FrameJob>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<FrameJob>();
    let mut tcp_tx = TcpStream::connect(&server)
        .await
        .with_context(|| format!("Connection {conn_id} failed to reach {server}"))?
        .into_split()
        .1;
    debug!("Connection {conn_id}/{num_conns} open");

    tokio::spawn(async move {
        while let Some((frame, done)) = rx.recv().await {
            let mut errors = 0;

            for (i, (x, y, px)) in frame.pixels().enumerate() {
                if i % num_conns != conn_id {
                    continue;
                }

                let command = pixel_command(origin.0 + x, origin.1 + y, px);
                while let Err(e) = tcp_tx.write_all(command.as_bytes()).await {
                    debug!("Connection {conn_id} write failed: {e}");
                    errors += 1;
                    match TcpStream::connect(&server).await {
                        Ok(stream) => tcp_tx = stream.into_split().1,
                        Err(e) => {
                            warn!("Connection {conn_id} lost: {e}");
                            let _ = done.send(errors);
                            return;
                        }
                    }
                }
            }

            if done.send(errors).is_err() {
                break;
            }
        }
    });

    Ok(tx)
}

pub struct ConnectionBundle {
    tx: mpsc::UnboundedSender<Job>,
}

pub enum Job {
    UpdateFrame { frame: RasterBuffer },
}

#[derive(Default, Debug)]
pub struct Stats {
    pub errors: usize,
}

impl ConnectionBundle {
    pub async fn new(config: Config, stats_tx: mpsc::UnboundedSender<Stats>) -> Result<Self> {
        let (mpsc_tx, mut mpsc_rx) = mpsc::unbounded_channel();

        let mut connections = Vec::with_capacity(config.threads);
        for i in 0..config.threads {
            connections.push(connection(config.server.clone(), config.origin, i, config.threads).await?);
        }
        info!("Opened {} connections to {}", connections.len(), config.server);

        tokio::spawn(async move {
            let mut frame: Option<Arc<RasterBuffer>> = None;

            loop {
                if !mpsc_rx.is_empty() || frame.is_none() {
                    match mpsc_rx.recv().await {
                        Some(Job::UpdateFrame { frame: new_frame }) => {
                            frame = Some(Arc::new(new_frame));
                        }
                        None => break,
                    }
                }

                if let Some(frame) = &frame {
                    if let Err(e) = draw(&connections, frame, &stats_tx).await {
                        warn!("Stopped drawing: {e}");
                        break;
                    }
                }
            }
        });

        Ok(Self { tx: mpsc_tx })
    }

    pub fn update_frame(&self, frame: RasterBuffer) -> Result<()> {
        self.tx
            .send(Job::UpdateFrame { frame })
            .map_err(|_| anyhow!("Connection bundle has shut down"))
    }
}

async fn draw(
    connections: &[mpsc::UnboundedSender<FrameJob>],
    frame: &Arc<RasterBuffer>,
    stats_tx: &mpsc::UnboundedSender<Stats>,
) -> Result<()> {
    let mut set = JoinSet::new();
    for conn in connections.iter() {
        let (tx, rx) = oneshot::channel();
        conn.send((frame.clone(), tx))
            .map_err(|_| anyhow!("Connection task has exited"))?;
        set.spawn(rx);
    }

    let mut stats = Stats::default();
    while let Some(res) = set.join_next().await {
        stats.errors += res??;
    }
    stats_tx.send(stats).map_err(|e| anyhow!("{e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn parses_size_answer() {
        assert_eq!(parse_size("SIZE 1920 1080").unwrap(), (1920, 1080));
        assert_eq!(parse_size("SIZE 800 600\r").unwrap(), (800, 600));
        assert!(parse_size("SIZE 800").is_err());
        assert!(parse_size("SIZE a b").is_err());
    }

    #[test]
    fn opaque_pixel_is_sent_verbatim() {
        assert_eq!(
            pixel_command(3, 7, Rgba([0xc8, 0x64, 0x32, 0xff])),
            "PX 3 7 c86432\n"
        );
    }

    #[test]
    fn transparent_pixels_paint_black() {
        assert_eq!(pixel_command(0, 0, Rgba([255, 255, 255, 0])), "PX 0 0 000000\n");
        assert_eq!(pixel_command(1, 2, Rgba([255, 0, 100, 170])), "PX 1 2 aa0043\n");
    }
}

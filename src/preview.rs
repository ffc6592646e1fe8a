//! Inline photo rendering through the Kitty graphics protocol.
//!
//! Photos are downloaded on a worker thread, converted to PNG and split into
//! base64 transmit chunks. The UI sends the chunks once, then re-places the
//! image after each redraw while the overlay stays open. Terminals without
//! the protocol get the photo URL instead.

use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::env;
use std::hash::{Hash, Hasher};
use std::io::{self, Cursor, Read, Write};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use crossterm::terminal::window_size;
use image::{GenericImageView, ImageFormat};

const KITTY_CHUNK_SIZE: usize = 4096;
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

pub const FORCE_KITTY_ENV: &str = "WALL_FORCE_KITTY";
pub const DISABLE_KITTY_ENV: &str = "WALL_DISABLE_KITTY";

#[derive(Debug, Clone)]
pub struct KittyImage {
    pub id: u32,
    pub cols: u16,
    pub rows: u16,
    transmit_chunks: Vec<String>,
    transmitted: bool,
    wrap_tmux: bool,
}

impl KittyImage {
    pub fn ensure_transmitted<W: Write>(&mut self, writer: &mut W) -> io::Result<()> {
        if self.transmitted {
            return Ok(());
        }
        for chunk in &self.transmit_chunks {
            writer.write_all(chunk.as_bytes())?;
        }
        writer.flush()?;
        self.transmitted = true;
        Ok(())
    }

    /// Places the image at the cursor without moving it. Placement id 1 makes
    /// repeated placements replace each other.
    pub fn placement_sequence(&self) -> String {
        let base = format!(
            "\x1b_Ga=p,q=2,C=1,i={},p=1,c={},r={};\x1b\\",
            self.id, self.cols, self.rows
        );
        wrap(base, self.wrap_tmux)
    }

    pub fn delete_sequence(&self) -> String {
        wrap(format!("\x1b_Ga=d,d=I,q=2,i={};\x1b\\", self.id), self.wrap_tmux)
    }
}

fn wrap(sequence: String, wrap_tmux: bool) -> String {
    if wrap_tmux {
        format!("\x1bPtmux;\x1b{sequence}\x1b\\")
    } else {
        sequence
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellMetrics {
    pub width: f64,
    pub height: f64,
}

fn terminal_cell_metrics() -> CellMetrics {
    static METRICS: OnceLock<CellMetrics> = OnceLock::new();
    *METRICS.get_or_init(|| {
        window_size().ok().map_or(
            CellMetrics {
                width: 8.0,
                height: 16.0,
            },
            |size| {
                let columns = f64::from(size.columns.max(1));
                let rows = f64::from(size.rows.max(1));
                let width = if size.width > 0 {
                    f64::from(size.width) / columns
                } else {
                    8.0
                };
                let height = if size.height > 0 {
                    f64::from(size.height) / rows
                } else {
                    16.0
                };
                CellMetrics { width, height }
            },
        )
    })
}

/// Cell box for a `width`x`height` pixel image, never larger than its native
/// size and scaled down to fit `max_cols`x`max_rows` with the aspect kept.
pub fn fit_cells(
    width: u32,
    height: u32,
    max_cols: u16,
    max_rows: u16,
    metrics: CellMetrics,
) -> (u16, u16) {
    let native_cols = (f64::from(width.max(1)) / metrics.width.max(1.0)).ceil();
    let native_rows = (f64::from(height.max(1)) / metrics.height.max(1.0)).ceil();
    let scale = (f64::from(max_cols.max(1)) / native_cols)
        .min(f64::from(max_rows.max(1)) / native_rows)
        .min(1.0);
    let cols = (native_cols * scale).round().clamp(1.0, f64::from(max_cols.max(1)));
    let rows = (native_rows * scale).round().clamp(1.0, f64::from(max_rows.max(1)));
    (cols as u16, rows as u16)
}

pub fn image_id(url: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    // Id 0 is reserved by the protocol.
    ((hasher.finish() & 0xFFFF_FFFF) as u32).max(1)
}

/// Whether `url` can be downloaded; in-memory objects cannot.
pub fn is_fetchable(url: &str) -> bool {
    url::Url::parse(url).is_ok_and(|parsed| matches!(parsed.scheme(), "http" | "https"))
}

fn env_truthy(key: &str) -> bool {
    env::var(key)
        .map(|value| matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes" | "YES"))
        .unwrap_or(false)
}

fn env_present(key: &str) -> bool {
    env::var(key).map(|v| !v.is_empty()).unwrap_or(false)
}

fn running_inside_tmux() -> bool {
    env_present("TMUX")
        || env_present("TMUX_PANE")
        || env::var("TERM")
            .map(|term| term.to_ascii_lowercase().contains("tmux"))
            .unwrap_or(false)
}

pub fn is_kitty_terminal() -> bool {
    if env_truthy(DISABLE_KITTY_ENV) {
        return false;
    }
    if env_truthy(FORCE_KITTY_ENV) {
        return true;
    }
    if running_inside_tmux() {
        return false;
    }
    if env_present("KITTY_WINDOW_ID") || env_present("WEZTERM_PANE") {
        return true;
    }
    if env::var("TERM_PROGRAM")
        .map(|term| term.to_lowercase().contains("wezterm"))
        .unwrap_or(false)
    {
        return true;
    }
    env::var("TERM")
        .map(|term| {
            let lower = term.to_lowercase();
            lower.contains("kitty") || lower.contains("wezterm")
        })
        .unwrap_or(false)
}

pub fn fetch_image_bytes(url: &str, user_agent: &str) -> Result<Vec<u8>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(user_agent)
        .build()
        .context("create photo client")?;
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("request photo {url}"))?;
    if !response.status().is_success() {
        bail!("photo request returned status {}", response.status());
    }
    let mut reader = response;
    let mut bytes = Vec::with_capacity(256 * 1024);
    reader
        .read_to_end(&mut bytes)
        .with_context(|| format!("read photo body {url}"))?;
    Ok(bytes)
}

fn encode_png<'a>(bytes: &'a [u8], decoded: &image::DynamicImage) -> Result<Cow<'a, [u8]>> {
    if matches!(image::guess_format(bytes), Ok(ImageFormat::Png)) {
        return Ok(Cow::Borrowed(bytes));
    }
    let mut png = Vec::new();
    decoded
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("encode photo as png")?;
    Ok(Cow::Owned(png))
}

/// Builds the transmit chunks for `bytes`, sized to fit the given cell box.
pub fn transmit(bytes: &[u8], id: u32, max_cols: u16, max_rows: u16) -> Result<KittyImage> {
    if bytes.is_empty() {
        bail!("photo had no bytes");
    }
    let decoded = image::load_from_memory(bytes).context("decode photo")?;
    let (width, height) = decoded.dimensions();
    let (cols, rows) = fit_cells(width, height, max_cols, max_rows, terminal_cell_metrics());
    let png = encode_png(bytes, &decoded)?;
    Ok(chunked(&png, id, cols, rows, env_present("TMUX")))
}

fn chunked(png: &[u8], id: u32, cols: u16, rows: u16, wrap_tmux: bool) -> KittyImage {
    let encoded = general_purpose::STANDARD.encode(png);
    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < encoded.len() {
        let end = usize::min(offset + KITTY_CHUNK_SIZE, encoded.len());
        let more = u8::from(end < encoded.len());
        let header = if offset == 0 {
            format!("\x1b_Ga=t,q=2,i={id},f=100,m={more};")
        } else {
            format!("\x1b_Gm={more};")
        };
        chunks.push(wrap(
            format!("{header}{}\x1b\\", &encoded[offset..end]),
            wrap_tmux,
        ));
        offset = end;
    }
    KittyImage {
        id,
        cols,
        rows,
        transmit_chunks: chunks,
        transmitted: false,
        wrap_tmux,
    }
}

/// Downloads and prepares a photo for the overlay.
pub fn load(url: &str, user_agent: &str, max_cols: u16, max_rows: u16) -> Result<KittyImage> {
    if !is_fetchable(url) {
        bail!("photo is not stored at a downloadable URL");
    }
    let bytes = fetch_image_bytes(url, user_agent)?;
    transmit(&bytes, image_id(url), max_cols, max_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const METRICS: CellMetrics = CellMetrics {
        width: 10.0,
        height: 20.0,
    };

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 10, 10]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn small_images_keep_native_size() {
        assert_eq!(fit_cells(100, 100, 80, 40, METRICS), (10, 5));
    }

    #[test]
    fn large_images_shrink_with_aspect() {
        // 400x100 cells natively; width is the binding limit.
        assert_eq!(fit_cells(4000, 2000, 80, 40, METRICS), (80, 20));
        assert_eq!(fit_cells(1000, 8000, 80, 40, METRICS), (10, 40));
    }

    #[test]
    fn chunks_split_payload_and_flag_continuation() {
        let png = vec![7u8; KITTY_CHUNK_SIZE];
        let image = chunked(&png, 42, 3, 2, false);
        assert!(image.transmit_chunks.len() > 1);
        assert!(image.transmit_chunks[0].starts_with("\x1b_Ga=t,q=2,i=42,f=100,m=1;"));
        assert!(image.transmit_chunks.last().unwrap().starts_with("\x1b_Gm=0;"));
        let payload: String = image
            .transmit_chunks
            .iter()
            .map(|chunk| {
                let body = &chunk[chunk.find(';').unwrap() + 1..];
                body.trim_end_matches("\x1b\\").to_string()
            })
            .collect();
        assert_eq!(general_purpose::STANDARD.decode(payload).unwrap(), png);
    }

    #[test]
    fn transmit_is_written_once() {
        let mut image = transmit(&png_bytes(4, 4), 9, 10, 10).unwrap();
        let mut out = Vec::new();
        image.ensure_transmitted(&mut out).unwrap();
        let first = out.len();
        assert!(first > 0);
        image.ensure_transmitted(&mut out).unwrap();
        assert_eq!(out.len(), first);
        assert!(image.placement_sequence().contains("i=9,p=1"));
    }

    #[test]
    fn tmux_wraps_sequences() {
        let image = chunked(&[1, 2, 3], 5, 1, 1, true);
        assert!(image.delete_sequence().starts_with("\x1bPtmux;\x1b\x1b_Ga=d"));
        assert!(image.transmit_chunks[0].starts_with("\x1bPtmux;"));
    }

    #[test]
    fn only_http_urls_are_fetched() {
        assert!(is_fetchable("https://x.supabase.co/storage/v1/object/public/post-images/a.png"));
        assert!(!is_fetchable("memory://post-images/a.png"));
        assert!(load("memory://post-images/a.png", "test", 10, 10).is_err());
    }

    #[test]
    fn image_ids_are_stable_and_nonzero() {
        assert_eq!(image_id("a"), image_id("a"));
        assert_ne!(image_id("a"), 0);
    }

    #[test]
    fn garbage_bytes_fail_to_transmit() {
        assert!(transmit(b"not a photo", 1, 10, 10).is_err());
    }
}

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use crate::error::{Result, WallError};

pub const DEFAULT_MAX_DIMENSION: u32 = 1920;
pub const DEFAULT_SOFT_LIMIT_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

const MIN_JPEG_QUALITY: u8 = 40;
const JPEG_QUALITY_STEP: u8 = 15;
const KEY_SUFFIX_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct CompressOptions {
    pub max_dimension: u32,
    pub soft_limit_bytes: u64,
    pub jpeg_quality: u8,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            soft_limit_bytes: DEFAULT_SOFT_LIMIT_BYTES,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// An image picked by the user, not yet compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl SelectedImage {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|err| {
            WallError::ImageProcessing(format!("read {}: {err}", path.display()))
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        Ok(Self { file_name, bytes })
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub content_type: String,
    pub extension: String,
    /// Still above the soft ceiling after compression. Advisory only.
    pub over_soft_limit: bool,
}

/// Shrinks `image` so neither side exceeds `max_dimension` and, for JPEG,
/// lowers quality until the soft size ceiling is met or the quality floor is
/// reached. Images already within bounds are passed through untouched.
pub fn compress(image: &SelectedImage, opts: &CompressOptions) -> Result<CompressedImage> {
    let format = image::guess_format(&image.bytes)
        .map_err(|_| WallError::ImageProcessing(format!("{}: unrecognised image", image.file_name)))?;
    let decoded = image::load_from_memory_with_format(&image.bytes, format)?;
    let (orig_w, orig_h) = decoded.dimensions();
    let extension = extension_for(&image.file_name, format);
    let content_type = detect_mime(&image.bytes);
    let soft_limit = opts.soft_limit_bytes;
    let max_dimension = opts.max_dimension.max(1);

    let fits = orig_w <= max_dimension && orig_h <= max_dimension;
    if fits && image.bytes.len() as u64 <= soft_limit {
        debug!(width = orig_w, height = orig_h, "image within limits, uploading as-is");
        return Ok(CompressedImage {
            bytes: image.bytes.clone(),
            width: orig_w,
            height: orig_h,
            content_type,
            extension,
            over_soft_limit: false,
        });
    }

    let resized = if fits {
        decoded
    } else {
        decoded.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    };
    let (width, height) = resized.dimensions();

    let mut bytes = match format {
        ImageFormat::Jpeg => encode_jpeg_within(&resized, opts.jpeg_quality, soft_limit)?,
        other => encode_as(&resized, other)?,
    };
    if fits && bytes.len() >= image.bytes.len() {
        bytes = image.bytes.clone();
    }

    let over_soft_limit = bytes.len() as u64 > soft_limit;
    debug!(
        original_width = orig_w,
        original_height = orig_h,
        width,
        height,
        size = bytes.len(),
        over_soft_limit,
        "image compressed"
    );

    Ok(CompressedImage {
        bytes,
        width,
        height,
        content_type,
        extension,
        over_soft_limit,
    })
}

fn encode_jpeg_within(img: &DynamicImage, start_quality: u8, soft_limit: u64) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut quality = start_quality.clamp(1, 100);
    loop {
        let mut buf = Vec::new();
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
        if buf.len() as u64 <= soft_limit || quality <= MIN_JPEG_QUALITY {
            return Ok(buf);
        }
        quality = quality
            .saturating_sub(JPEG_QUALITY_STEP)
            .max(MIN_JPEG_QUALITY);
    }
}

fn encode_as(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    let mut buf = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut buf), format)?;
    Ok(buf)
}

/// Keeps the original file extension; falls back to the decoded format's.
pub fn extension_for(file_name: &str, format: ImageFormat) -> String {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .filter(|ext| !ext.is_empty())
        .or_else(|| format.extensions_str().first().map(|ext| ext.to_string()))
        .unwrap_or_else(|| "bin".to_string())
}

/// `<unix millis>-<random suffix>.<extension>`
pub fn object_key(extension: &str, now: DateTime<Utc>) -> String {
    object_key_with_rng(extension, now, &mut rand::thread_rng())
}

pub fn object_key_with_rng<R: Rng>(extension: &str, now: DateTime<Utc>, rng: &mut R) -> String {
    let suffix: String = rng
        .sample_iter(&Alphanumeric)
        .take(KEY_SUFFIX_LEN)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    format!("{}-{}.{}", now.timestamp_millis(), suffix, extension)
}

pub fn detect_mime(bytes: &[u8]) -> String {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg".into(),
        Ok(ImageFormat::Png) => "image/png".into(),
        Ok(ImageFormat::Gif) => "image/gif".into(),
        Ok(ImageFormat::WebP) => "image/webp".into(),
        _ => {
            let mut buffer = [0u8; 512];
            let mut cursor = Cursor::new(bytes);
            let read = cursor.read(&mut buffer).unwrap_or(0);
            tree_magic_mini::from_u8(&buffer[..read]).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::{Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 200) as u8, (y % 200) as u8, 90]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 90))
            .unwrap();
        buf
    }

    #[test]
    fn small_image_passes_through() {
        let bytes = png_bytes(32, 16);
        let selected = SelectedImage::new("tiny.PNG", bytes.clone());
        let out = compress(&selected, &CompressOptions::default()).unwrap();
        assert_eq!(out.bytes, bytes);
        assert_eq!((out.width, out.height), (32, 16));
        assert_eq!(out.extension, "png");
        assert_eq!(out.content_type, "image/png");
        assert!(!out.over_soft_limit);
    }

    #[test]
    fn large_image_is_scaled_to_max_dimension() {
        let selected = SelectedImage::new("wide.jpg", jpeg_bytes(400, 100));
        let opts = CompressOptions {
            max_dimension: 200,
            ..CompressOptions::default()
        };
        let out = compress(&selected, &opts).unwrap();
        assert_eq!((out.width, out.height), (200, 50));
        assert_eq!(out.content_type, "image/jpeg");
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (200, 50));
    }

    #[test]
    fn tiny_soft_limit_still_produces_output_with_warning() {
        let selected = SelectedImage::new("photo.jpeg", jpeg_bytes(120, 120));
        let opts = CompressOptions {
            max_dimension: 64,
            soft_limit_bytes: 16,
            jpeg_quality: 85,
        };
        let out = compress(&selected, &opts).unwrap();
        assert!(out.over_soft_limit);
        assert!(!out.bytes.is_empty());
        assert_eq!(out.extension, "jpeg");
    }

    #[test]
    fn garbage_is_an_image_processing_error() {
        let selected = SelectedImage::new("notes.txt", b"definitely not pixels".to_vec());
        let err = compress(&selected, &CompressOptions::default()).unwrap_err();
        assert!(matches!(err, WallError::ImageProcessing(_)));
    }

    #[test]
    fn object_key_keeps_extension_and_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 3, 7, 0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let key = object_key_with_rng("png", now, &mut rng);
        let (stamp, rest) = key.split_once('-').unwrap();
        assert_eq!(stamp, now.timestamp_millis().to_string());
        let (suffix, ext) = rest.split_once('.').unwrap();
        assert_eq!(suffix.len(), KEY_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_eq!(ext, "png");
        assert_ne!(object_key("png", now), object_key("png", now));
    }

    #[test]
    fn extension_falls_back_to_format() {
        assert_eq!(extension_for("camera", ImageFormat::Jpeg), "jpg");
        assert_eq!(extension_for("a.WebP", ImageFormat::WebP), "WebP");
    }

    #[test]
    fn uppercase_extension_is_kept_in_object_key() {
        let selected = SelectedImage::new("photo.JPG", jpeg_bytes(8, 8));
        let out = compress(&selected, &CompressOptions::default()).unwrap();
        assert_eq!(out.extension, "JPG");
        assert_eq!(out.content_type, "image/jpeg");
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 3, 7, 0).unwrap();
        assert!(object_key(&out.extension, now).ends_with(".JPG"));
    }
}

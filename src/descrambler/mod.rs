//! Reassembly of band-scrambled comic pages.
//!
//! Some sources split each page into horizontal bands and store them in
//! reverse order. The number of bands depends on the episode id, a per-source
//! threshold and the page's base file name.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use md5::{Digest, Md5};
use std::io::{Cursor, Write};
use std::ops::Range;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Episodes below this id always use ten bands.
const FIXED_SEGMENTATION_LIMIT: u64 = 268850;
/// Episodes above this id derive the band count modulo 8 instead of 10.
const MOD_EIGHT_THRESHOLD: u64 = 421926;
const FIXED_SEGMENTATION: u32 = 10;
const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Error)]
pub enum DescrambleError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Number of horizontal bands a page was split into. Values of 0 or 1 mean
/// the page is stored as-is.
pub fn segmentation_count(episode_id: u64, scramble_threshold_id: u64, image_base_name: &str) -> u32 {
    if episode_id < scramble_threshold_id {
        return 0;
    }
    if episode_id < FIXED_SEGMENTATION_LIMIT {
        return FIXED_SEGMENTATION;
    }

    let digest = Md5::digest(format!("{}{}", episode_id, image_base_name).as_bytes());
    let hex = format!("{:x}", digest);
    let last = hex.bytes().last().map(u32::from).unwrap_or(0);
    let remainder = if episode_id > MOD_EIGHT_THRESHOLD {
        last % 8
    } else {
        last % 10
    };
    remainder * 2 + 2
}

/// Base name used as hash salt for a page URL: the last path segment without
/// its query, minus its final five characters, cut at the first dot.
pub fn image_base_name(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or(url);
    let file_name = match without_query.rfind('/') {
        Some(idx) if idx + 1 < without_query.len() => &without_query[idx + 1..],
        _ => return String::new(),
    };

    let cut = file_name.len().saturating_sub(5);
    let trimmed = if file_name.len() > 5 && file_name.is_char_boundary(cut) {
        &file_name[..cut]
    } else {
        file_name
    };

    match trimmed.find('.') {
        Some(dot) => trimmed[..dot].to_string(),
        None => trimmed.to_string(),
    }
}

/// A contiguous run of rows copied from `source` to the rows starting at
/// `target_start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandMove {
    pub source: Range<u32>,
    pub target_start: u32,
}

/// Row permutation for an image of a given height split into `n` bands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandPlan {
    pub moves: Vec<BandMove>,
}

impl BandPlan {
    /// Plan that restores a scrambled page: bands of `height / n` rows, the
    /// last one absorbing the remainder, written in reverse order.
    pub fn descramble(height: u32, n: u32) -> Self {
        if n <= 1 || height == 0 {
            return BandPlan {
                moves: vec![BandMove {
                    source: 0..height,
                    target_start: 0,
                }],
            };
        }

        let band_height = height / n;
        let remainder = height % n;
        let mut moves = Vec::with_capacity(n as usize);
        let mut target = 0;
        for band in (0..n).rev() {
            let start = band * band_height;
            let mut end = start + band_height;
            if band == n - 1 {
                end += remainder;
            }
            moves.push(BandMove {
                source: start..end,
                target_start: target,
            });
            target += end - start;
        }
        BandPlan { moves }
    }

    /// The permutation that undoes this one.
    pub fn inverse(&self) -> Self {
        BandPlan {
            moves: self
                .moves
                .iter()
                .map(|m| BandMove {
                    source: m.target_start..m.target_start + (m.source.end - m.source.start),
                    target_start: m.source.start,
                })
                .collect(),
        }
    }

    pub fn apply(&self, img: &RgbaImage) -> RgbaImage {
        let (width, height) = img.dimensions();
        let mut out = RgbaImage::new(width, height);
        for m in &self.moves {
            for (offset, src_y) in m.source.clone().enumerate() {
                let dst_y = m.target_start + offset as u32;
                if src_y >= height || dst_y >= height {
                    continue;
                }
                for x in 0..width {
                    out.put_pixel(x, dst_y, *img.get_pixel(x, src_y));
                }
            }
        }
        out
    }
}

/// Restores a scrambled page held in memory. Returns the input unchanged
/// when the page was not scrambled.
pub fn descramble_bytes(
    bytes: &[u8],
    episode_id: u64,
    scramble_threshold_id: u64,
    image_base_name: &str,
) -> Result<Vec<u8>, DescrambleError> {
    let n = segmentation_count(episode_id, scramble_threshold_id, image_base_name);
    if n <= 1 {
        return Ok(bytes.to_vec());
    }
    transform_bytes(bytes, |height| BandPlan::descramble(height, n))
}

/// Applies the scrambling a source would have applied. Inverse of
/// [`descramble_bytes`] for the same parameters.
pub fn scramble_bytes(
    bytes: &[u8],
    episode_id: u64,
    scramble_threshold_id: u64,
    image_base_name: &str,
) -> Result<Vec<u8>, DescrambleError> {
    let n = segmentation_count(episode_id, scramble_threshold_id, image_base_name);
    if n <= 1 {
        return Ok(bytes.to_vec());
    }
    transform_bytes(bytes, |height| BandPlan::descramble(height, n).inverse())
}

fn transform_bytes(
    bytes: &[u8],
    plan_for_height: impl FnOnce(u32) -> BandPlan,
) -> Result<Vec<u8>, DescrambleError> {
    let format = image::guess_format(bytes).map_err(DescrambleError::Decode)?;
    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(DescrambleError::Decode)?
        .to_rgba8();
    let plan = plan_for_height(img.height());
    debug!(
        "Reordering {}x{} {:?} image in {} bands",
        img.width(),
        img.height(),
        format,
        plan.moves.len()
    );
    encode(&plan.apply(&img), format)
}

fn encode(img: &RgbaImage, format: ImageFormat) -> Result<Vec<u8>, DescrambleError> {
    let mut out = Cursor::new(Vec::new());
    match format {
        ImageFormat::Png | ImageFormat::WebP => img
            .write_to(&mut out, format)
            .map_err(DescrambleError::Encode)?,
        // JPEG, and the fallback for formats without an encoder here
        _ => {
            let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            rgb.write_with_encoder(encoder)
                .map_err(DescrambleError::Encode)?;
        }
    }
    Ok(out.into_inner())
}

/// Restores a scrambled page in place. The result is written to a sibling
/// temporary file and renamed over `path`, so a failure leaves the original
/// untouched. Returns whether the file was rewritten.
pub fn descramble_file(
    path: &Path,
    episode_id: u64,
    scramble_threshold_id: u64,
    image_base_name: &str,
) -> Result<bool, DescrambleError> {
    if segmentation_count(episode_id, scramble_threshold_id, image_base_name) <= 1 {
        return Ok(false);
    }

    let original = std::fs::read(path)?;
    let restored = descramble_bytes(&original, episode_id, scramble_threshold_id, image_base_name)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&restored)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| DescrambleError::Io(e.error))?;
    Ok(true)
}

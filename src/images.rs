//! Profile image cache.
//!
//! One image per member keyed by external ID; an existing file is the
//! cache-hit signal. Downloads are validated, resized to a max dimension and
//! re-encoded as lossy WebP before the atomic write. Every failure here is
//! best-effort: log a warning and leave the member without an image.

use std::time::Duration;

use anyhow::{Context, Result};
use image::GenericImageView;
use once_cell::sync::Lazy;
use url::Url;

use crate::config::ImageConfig;
use crate::storage::{BackendLocal, StorageManager};

/// Subdirectory of the data dir holding cached profile images
pub const IMAGES_DIR: &str = "member_images";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

static HTTP: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .expect("cannot build http client")
});

pub struct ImageCache {
    store: BackendLocal,
    max_dimension: u32,
    quality: u8,
}

impl ImageCache {
    pub fn new(base_path: &str, config: &ImageConfig) -> Result<Self> {
        let store = BackendLocal::new(&format!("{base_path}/{IMAGES_DIR}"))
            .context("cannot create image cache directory")?;

        Ok(Self {
            store,
            max_dimension: config.max_dimension,
            quality: config.quality,
        })
    }

    pub fn file_name(member_id: &str) -> String {
        format!("{member_id}.webp")
    }

    /// Download and cache the image for a member, returning the relative path
    /// for the record, or `None` when anything goes wrong.
    ///
    /// The exists-then-write sequence is racy under concurrent sync workers;
    /// the worst case is a duplicate write of identical bytes.
    pub fn fetch(&self, member_id: &str, image_url: &str) -> Option<String> {
        let name = Self::file_name(member_id);
        let rel_path = format!("{IMAGES_DIR}/{name}");

        if self.store.exists(&name) {
            log::debug!("image already cached for member {member_id}");
            return Some(rel_path);
        }

        if Url::parse(image_url).is_err() {
            log::warn!("invalid image url for member {member_id}: {image_url}");
            return None;
        }

        let bytes = match download(image_url) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("failed to download image for member {member_id}: {err}");
                return None;
            }
        };

        let compressed = match compress_image(&bytes, self.max_dimension, self.quality) {
            Ok(data) => data,
            Err(err) => {
                log::warn!("failed to process image for member {member_id}: {err}");
                return None;
            }
        };

        if let Err(err) = self.store.write(&name, &compressed) {
            log::warn!("failed to store image for member {member_id}: {err}");
            return None;
        }

        Some(rel_path)
    }
}

fn download(url: &str) -> Result<Vec<u8>> {
    let resp = HTTP.get(url).send()?;
    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("image host returned {status}");
    }
    Ok(resp.bytes()?.to_vec())
}

/// Check if data starts with WebP magic bytes (RIFF....WEBP)
pub fn is_webp(data: &[u8]) -> bool {
    data.len() >= 12 && data[0..4] == *b"RIFF" && data[8..12] == *b"WEBP"
}

/// Decode an image, resize to fit `max_dimension` and encode as lossy WebP.
pub fn compress_image(data: &[u8], max_dimension: u32, quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(data).context("Failed to decode image")?;

    let (orig_w, orig_h) = img.dimensions();

    // keep aspect ratio
    let (new_w, new_h, was_resized) = if orig_w > max_dimension || orig_h > max_dimension {
        let scale = (max_dimension as f64) / (orig_w.max(orig_h) as f64);
        let new_w = ((orig_w as f64) * scale).round() as u32;
        let new_h = ((orig_h as f64) * scale).round() as u32;
        (new_w.max(1), new_h.max(1), true)
    } else {
        (orig_w, orig_h, false)
    };

    let processed = if was_resized {
        img.resize(new_w, new_h, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };

    let rgba = processed.to_rgba8();
    let (width, height) = rgba.dimensions();

    let encoder = webp::Encoder::from_rgba(&rgba, width, height);
    let webp_data = encoder.encode(quality as f32);

    Ok(webp_data.to_vec())
}

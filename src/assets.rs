use crate::error::{FolioError, Result};
use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tiny_skia::Pixmap;

const MAX_REMOTE_BYTES: u64 = 10 * 1024 * 1024;

/// What export does when the company logo cannot be loaded or decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoFailurePolicy {
    /// Fail the whole export.
    #[default]
    Abort,
    /// Drop the logo and keep going.
    Omit,
}

/// A decoded, premultiplied RGBA image ready to be drawn by the rasterizer.
#[derive(Clone, Debug)]
pub struct ImageAsset {
    pub pixmap: Pixmap,
}

impl ImageAsset {
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }
}

/// Images resolved for one render, keyed by their source reference.
#[derive(Clone, Default)]
pub struct AssetStore {
    images: HashMap<String, ImageAsset>,
}

impl AssetStore {
    pub fn insert(&mut self, source: impl Into<String>, image: ImageAsset) {
        self.images.insert(source.into(), image);
    }

    pub fn image(&self, source: &str) -> Option<&ImageAsset> {
        self.images.get(source)
    }
}

#[derive(Debug, Clone)]
pub struct AssetLoader {
    timeout: Duration,
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl AssetLoader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Loads and decodes an image from a `data:` URI, an `http(s)` URL or a
    /// filesystem path (optionally `file://`-prefixed).
    pub fn load_image(&self, source: &str) -> Result<ImageAsset> {
        let (bytes, mime) = self.fetch(source)?;
        let pixmap = decode_image_to_pixmap(&bytes, mime.as_deref())
            .map_err(|reason| FolioError::asset(source, reason))?;
        log::debug!(
            "loaded image '{}' ({}x{})",
            truncate_source(source),
            pixmap.width(),
            pixmap.height()
        );
        Ok(ImageAsset { pixmap })
    }

    fn fetch(&self, source: &str) -> Result<(Vec<u8>, Option<String>)> {
        if source.starts_with("data:") {
            let (mime, data) = parse_data_uri(source)
                .ok_or_else(|| FolioError::asset(truncate_source(source), "malformed data URI"))?;
            return Ok((data, Some(mime)));
        }
        if source.starts_with("http://") || source.starts_with("https://") {
            return self.fetch_remote(source).map(|bytes| (bytes, None));
        }
        let path = Path::new(source.strip_prefix("file://").unwrap_or(source));
        let bytes = std::fs::read(path).map_err(|err| FolioError::asset(source, err))?;
        Ok((bytes, None))
    }

    fn fetch_remote(&self, url: &str) -> Result<Vec<u8>> {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build();
        let agent = ureq::Agent::new_with_config(config);
        let mut response = agent
            .get(url)
            .call()
            .map_err(|err| FolioError::asset(url, err))?;
        response
            .body_mut()
            .with_config()
            .limit(MAX_REMOTE_BYTES)
            .read_to_vec()
            .map_err(|err| FolioError::asset(url, err))
    }
}

fn decode_image_to_pixmap(data: &[u8], mime: Option<&str>) -> std::result::Result<Pixmap, String> {
    let format = match mime {
        Some(mime) if mime.contains("png") => Some(image::ImageFormat::Png),
        Some(mime) if mime.contains("jpeg") || mime.contains("jpg") => {
            Some(image::ImageFormat::Jpeg)
        }
        _ => image::guess_format(data).ok(),
    };
    let decoded = match format {
        Some(fmt) => image::load_from_memory_with_format(data, fmt),
        None => image::load_from_memory(data),
    }
    .map_err(|err| format!("cannot decode image: {err}"))?;

    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap =
        Pixmap::new(width, height).ok_or_else(|| format!("unsupported image size {width}x{height}"))?;
    for (src, dst) in rgba
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let a = src[3];
        dst[0] = premul_u8(src[0], a);
        dst[1] = premul_u8(src[1], a);
        dst[2] = premul_u8(src[2], a);
        dst[3] = a;
    }
    Ok(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let (header, payload) = uri.strip_prefix("data:")?.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

fn truncate_source(source: &str) -> String {
    const MAX: usize = 64;
    if source.chars().count() <= MAX {
        return source.to_string();
    }
    let head: String = source.chars().take(MAX).collect();
    format!("{head}…")
}

use crate::error::{FolioError, Result};
use crate::types::Size;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tiny_skia::Pixmap;

/// Counts surfaces currently alive for one engine.
#[derive(Debug, Clone, Default)]
pub struct SurfaceTracker {
    live: Arc<AtomicUsize>,
}

impl SurfaceTracker {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// The off-screen bitmap a page is rasterized into. One surface is owned by
/// exactly one render call and reused for its pages in order; it is released
/// when dropped, whichever way the render ends.
pub struct OffscreenSurface {
    pixmap: Pixmap,
    dpi: u32,
    supersample: u32,
    tracker: SurfaceTracker,
}

impl OffscreenSurface {
    /// Allocates a white surface for pages of `page_size`. Drawing happens at
    /// `dpi * supersample`; [`capture`](Self::capture) box-filters back down to
    /// `dpi`.
    pub fn acquire(
        page_size: Size,
        dpi: u32,
        supersample: u32,
        tracker: &SurfaceTracker,
    ) -> Result<Self> {
        if dpi == 0 {
            return Err(FolioError::InvalidConfiguration(
                "dpi must be > 0".to_string(),
            ));
        }
        if supersample == 0 {
            return Err(FolioError::InvalidConfiguration(
                "supersample must be > 0".to_string(),
            ));
        }
        let (width, height) = page_size.to_px(dpi);
        let pixmap = Pixmap::new(width * supersample, height * supersample).ok_or_else(|| {
            FolioError::InvalidConfiguration(format!(
                "invalid raster size {width}x{height} at {dpi} DPI"
            ))
        })?;
        let live = tracker.live.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("acquired {width}x{height}@{supersample}x off-screen surface ({live} live)");
        let mut surface = Self {
            pixmap,
            dpi,
            supersample,
            tracker: tracker.clone(),
        };
        surface.clear();
        Ok(surface)
    }

    pub fn clear(&mut self) {
        self.pixmap
            .fill(tiny_skia::Color::from_rgba8(255, 255, 255, 255));
    }

    /// Output width in pixels, after downsampling.
    pub fn width(&self) -> u32 {
        self.pixmap.width() / self.supersample
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height() / self.supersample
    }

    /// Page points to surface pixels.
    pub fn transform(&self) -> tiny_skia::Transform {
        let scale = (self.dpi * self.supersample) as f32 / 72.0;
        tiny_skia::Transform::from_scale(scale, scale)
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    /// Copies the current contents out as an opaque RGB bitmap at the output
    /// resolution.
    pub fn capture(&self) -> PageBitmap {
        let (width, height) = (self.width(), self.height());
        let ss = self.supersample as usize;
        let stride = self.pixmap.width() as usize;
        let pixels = self.pixmap.pixels();
        let samples = (ss * ss) as u32;
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height as usize {
            for x in 0..width as usize {
                let mut sum = [0u32; 3];
                for sy in 0..ss {
                    let row = (y * ss + sy) * stride;
                    for sx in 0..ss {
                        let c = pixels[row + x * ss + sx].demultiply();
                        sum[0] += c.red() as u32;
                        sum[1] += c.green() as u32;
                        sum[2] += c.blue() as u32;
                    }
                }
                rgb.extend(sum.iter().map(|v| ((v + samples / 2) / samples) as u8));
            }
        }
        PageBitmap { width, height, rgb }
    }
}

impl Drop for OffscreenSurface {
    fn drop(&mut self) {
        let live = self.tracker.live.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        log::debug!("released off-screen surface ({live} live)");
    }
}

/// A captured page raster, 8-bit RGB, row-major, no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBitmap {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl PageBitmap {
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let image = image::RgbImage::from_raw(self.width, self.height, self.rgb.clone())
            .ok_or_else(|| FolioError::Raster("bitmap buffer size mismatch".to_string()))?;
        let mut bytes = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|err| FolioError::Raster(format!("png encode failed: {err}")))?;
        Ok(bytes)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        Some([self.rgb[idx], self.rgb[idx + 1], self.rgb[idx + 2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_is_released_on_drop() {
        let tracker = SurfaceTracker::default();
        {
            let surface = OffscreenSurface::acquire(Size::a4(), 24, 2, &tracker).unwrap();
            assert_eq!(tracker.live(), 1);
            assert_eq!(surface.width(), Size::a4().width.to_px(24));
            assert_eq!(surface.pixmap().width(), surface.width() * 2);
        }
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn zero_dpi_is_rejected_without_leaking() {
        let tracker = SurfaceTracker::default();
        assert!(OffscreenSurface::acquire(Size::a4(), 0, 1, &tracker).is_err());
        assert!(OffscreenSurface::acquire(Size::a4(), 96, 0, &tracker).is_err());
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn fresh_surface_captures_white() {
        let tracker = SurfaceTracker::default();
        let surface =
            OffscreenSurface::acquire(Size::from_mm(10.0, 10.0), 72, 2, &tracker).unwrap();
        let bitmap = surface.capture();
        assert_eq!(bitmap.rgb.len(), (bitmap.width * bitmap.height * 3) as usize);
        assert_eq!(bitmap.pixel(0, 0), Some([255, 255, 255]));
        assert_eq!(bitmap.pixel(bitmap.width, 0), None);
    }

    #[test]
    fn capture_averages_supersampled_pixels() {
        let tracker = SurfaceTracker::default();
        let mut surface =
            OffscreenSurface::acquire(Size::from_mm(5.0, 5.0), 72, 2, &tracker).unwrap();
        // Blacken the left half of the top-left output pixel only.
        let stride = surface.pixmap().width() as usize;
        let data = surface.pixmap_mut().data_mut();
        for row in 0..2 {
            let idx = row * stride * 4;
            data[idx..idx + 3].copy_from_slice(&[0, 0, 0]);
        }
        let bitmap = surface.capture();
        assert_eq!(bitmap.pixel(0, 0), Some([128, 128, 128]));
        assert_eq!(bitmap.pixel(1, 0), Some([255, 255, 255]));
        let png = bitmap.to_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}

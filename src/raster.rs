use crate::assets::AssetStore;
use crate::canvas::{Command, PageCommands};
use crate::error::{FolioError, Result};
use crate::font::FontSet;
use crate::surface::OffscreenSurface;
use crate::types::{Color, Pt};
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use tiny_skia::{
    FillRule, FilterQuality, LineCap, Paint, Path, PathBuilder, PixmapPaint, Rect, Stroke,
    Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

struct RasterState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    font_name: String,
    font_size: Pt,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            font_name: crate::font::REGULAR.to_string(),
            font_size: Pt::from_f32(12.0),
        }
    }
}

/// Draws one page's commands onto `surface`, clearing it first.
///
/// Text is skipped when `fonts` has no glyph source; an image whose resource
/// is not in `assets` fails the page.
pub fn rasterize(
    page: &PageCommands,
    surface: &mut OffscreenSurface,
    fonts: &FontSet,
    assets: &AssetStore,
) -> Result<()> {
    surface.clear();
    let transform = surface.transform();
    let pixmap = surface.pixmap_mut();

    let mut state = RasterState::default();
    let mut path_builder = PathBuilder::new();
    let mut has_path = false;

    for cmd in &page.commands {
        match cmd {
            Command::Meta { .. } => {}
            Command::SetFillColor(color) => state.fill_color = *color,
            Command::SetStrokeColor(color) => state.stroke_color = *color,
            Command::SetLineWidth(width) => state.line_width = *width,
            Command::SetFontName(name) => state.font_name = name.clone(),
            Command::SetFontSize(size) => state.font_size = *size,
            Command::MoveTo { x, y } => {
                path_builder.move_to(x.to_f32(), y.to_f32());
                has_path = true;
            }
            Command::LineTo { x, y } => {
                path_builder.line_to(x.to_f32(), y.to_f32());
                has_path = true;
            }
            Command::Stroke => {
                if let Some(path) = take_path(&mut path_builder, &mut has_path) {
                    let paint = fill_paint(state.stroke_color);
                    let stroke = build_stroke(&state);
                    pixmap.stroke_path(&path, &paint, &stroke, transform, None);
                }
            }
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                if let Some(rect) =
                    Rect::from_xywh(x.to_f32(), y.to_f32(), width.to_f32(), height.to_f32())
                {
                    let paint = fill_paint(state.fill_color);
                    pixmap.fill_rect(rect, &paint, transform, None);
                }
            }
            Command::DrawString { x, y, text } => {
                let Some(program) = fonts.program(&state.font_name) else {
                    continue;
                };
                let baseline = *y + fonts.ascent(&state.font_name, state.font_size);
                let Ok(face) = ttf_parser::Face::parse(&program.data, 0) else {
                    continue;
                };
                let glyphs = layout_text_glyphs(
                    &program.data,
                    text,
                    state.font_size.to_f32(),
                    x.to_f32(),
                    baseline.to_f32(),
                );
                let paint = fill_paint(state.fill_color);
                for glyph in glyphs {
                    let mut builder =
                        GlyphPathBuilder::new(glyph.origin_x, glyph.origin_y, glyph.scale);
                    if face
                        .outline_glyph(GlyphId(glyph.glyph_id), &mut builder)
                        .is_none()
                    {
                        continue;
                    }
                    if let Some(path) = builder.finish() {
                        pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);
                    }
                }
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                let image = assets.image(resource_id).ok_or_else(|| {
                    FolioError::Raster(format!("image resource '{resource_id}' is not loaded"))
                })?;
                let (box_w, box_h) = (width.to_f32(), height.to_f32());
                let (img_w, img_h) = (image.width() as f32, image.height() as f32);
                if box_w <= 0.0 || box_h <= 0.0 || img_w <= 0.0 || img_h <= 0.0 {
                    continue;
                }
                // Contain, anchored to the top-right corner of the box.
                let scale = (box_w / img_w).min(box_h / img_h);
                let draw_x = x.to_f32() + box_w - img_w * scale;
                let draw_y = y.to_f32();
                let image_transform =
                    transform.pre_concat(Transform::from_row(scale, 0.0, 0.0, scale, draw_x, draw_y));
                let paint = PixmapPaint {
                    quality: FilterQuality::Bilinear,
                    ..PixmapPaint::default()
                };
                pixmap.draw_pixmap(0, 0, image.pixmap.as_ref(), &paint, image_transform, None);
            }
        }
    }
    Ok(())
}

struct GlyphPlacement {
    glyph_id: u16,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

fn layout_text_glyphs(
    font_data: &[u8],
    text: &str,
    font_size: f32,
    baseline_x: f32,
    baseline_y: f32,
) -> Vec<GlyphPlacement> {
    let Some(face) = HbFace::from_slice(font_data, 0) else {
        return layout_text_glyphs_unshaped(font_data, text, font_size, baseline_x, baseline_y);
    };
    let hb_units = face.units_per_em().max(1) as f32;
    let scale = font_size / hb_units;
    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();
    if infos.is_empty() || infos.len() != positions.len() {
        return layout_text_glyphs_unshaped(font_data, text, font_size, baseline_x, baseline_y);
    }

    let mut out = Vec::with_capacity(infos.len());
    let mut pen_x = 0.0f32;
    for (info, pos) in infos.iter().zip(positions.iter()) {
        let advance = (pos.x_advance as f32 / hb_units) * font_size;
        let gid = info.glyph_id as u16;
        if gid != 0 {
            out.push(GlyphPlacement {
                glyph_id: gid,
                origin_x: baseline_x + pen_x + (pos.x_offset as f32 / hb_units) * font_size,
                // Shaper offsets are y-up; the page is y-down.
                origin_y: baseline_y - (pos.y_offset as f32 / hb_units) * font_size,
                scale,
            });
        }
        pen_x += advance;
    }
    out
}

fn layout_text_glyphs_unshaped(
    font_data: &[u8],
    text: &str,
    font_size: f32,
    baseline_x: f32,
    baseline_y: f32,
) -> Vec<GlyphPlacement> {
    let Ok(face) = ttf_parser::Face::parse(font_data, 0) else {
        return Vec::new();
    };
    let units_per_em = face.units_per_em().max(1) as f32;
    let scale = font_size / units_per_em;

    let mut out = Vec::new();
    let mut pen_x = 0.0f32;
    for ch in text.chars() {
        let gid = face.glyph_index(ch).map(|id| id.0).unwrap_or(0);
        if gid == 0 {
            pen_x += font_size * 0.5;
            continue;
        }
        out.push(GlyphPlacement {
            glyph_id: gid,
            origin_x: baseline_x + pen_x,
            origin_y: baseline_y,
            scale,
        });
        let advance_units = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0) as f32;
        let mut adv = (advance_units / units_per_em) * font_size;
        if adv <= 0.0 {
            adv = font_size * 0.5;
        }
        pen_x += adv;
    }
    out
}

fn detect_direction(text: &str) -> HbDirection {
    let rtl = text.chars().any(|ch| {
        matches!(
            ch as u32,
            0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF | 0x1EE00..=0x1EEFF
        )
    });
    if rtl {
        HbDirection::RightToLeft
    } else {
        HbDirection::LeftToRight
    }
}

/// Emits glyph outlines in page space. Font units are y-up, so y is negated
/// around the baseline.
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn take_path(path_builder: &mut PathBuilder, has_path: &mut bool) -> Option<Path> {
    if !*has_path {
        return None;
    }
    *has_path = false;
    let builder = std::mem::replace(path_builder, PathBuilder::new());
    builder.finish()
}

fn build_stroke(state: &RasterState) -> Stroke {
    Stroke {
        width: state.line_width.to_f32().max(0.0),
        line_cap: LineCap::Butt,
        ..Stroke::default()
    }
}

fn fill_paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color));
    paint.anti_alias = true;
    paint
}

fn to_sk_color(color: Color) -> tiny_skia::Color {
    let [r, g, b, a] = color.to_rgba8();
    tiny_skia::Color::from_rgba8(r, g, b, a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetLoader;
    use crate::canvas::Canvas;
    use crate::surface::SurfaceTracker;
    use crate::types::Size;

    fn small_page() -> Size {
        Size {
            width: Pt::from_i32(72),
            height: Pt::from_i32(72),
        }
    }

    fn surface(tracker: &SurfaceTracker) -> OffscreenSurface {
        OffscreenSurface::acquire(small_page(), 72, 1, tracker).unwrap()
    }

    #[test]
    fn filled_rect_lands_in_top_left_space() {
        let mut canvas = Canvas::new();
        canvas.set_fill_color(Color::BLACK);
        canvas.draw_rect(Pt::ZERO, Pt::ZERO, Pt::from_i32(10), Pt::from_i32(10));
        let page = canvas.finish();

        let tracker = SurfaceTracker::default();
        let mut target = surface(&tracker);
        rasterize(&page, &mut target, &FontSet::metrics_only(), &AssetStore::default()).unwrap();
        let bitmap = target.capture();
        assert_eq!(bitmap.pixel(5, 5), Some([0, 0, 0]));
        assert_eq!(bitmap.pixel(5, 60), Some([255, 255, 255]));
    }

    #[test]
    fn stroked_line_is_drawn() {
        let mut canvas = Canvas::new();
        canvas.set_line_width(Pt::from_i32(4));
        canvas.line(Pt::ZERO, Pt::from_i32(36), Pt::from_i32(72), Pt::from_i32(36));
        let page = canvas.finish();

        let tracker = SurfaceTracker::default();
        let mut target = surface(&tracker);
        rasterize(&page, &mut target, &FontSet::metrics_only(), &AssetStore::default()).unwrap();
        let bitmap = target.capture();
        assert_eq!(bitmap.pixel(36, 36), Some([0, 0, 0]));
        assert_eq!(bitmap.pixel(36, 10), Some([255, 255, 255]));
    }

    #[test]
    fn image_is_contained_in_its_box() {
        let uri = crate::assets::tests::png_data_uri(4, 2, [255, 0, 0, 255]);
        let mut assets = AssetStore::default();
        assets.insert("logo", AssetLoader::default().load_image(&uri).unwrap());

        let mut canvas = Canvas::new();
        canvas.draw_image(Pt::ZERO, Pt::ZERO, Pt::from_i32(40), Pt::from_i32(40), "logo");
        let page = canvas.finish();

        let tracker = SurfaceTracker::default();
        let mut target = surface(&tracker);
        rasterize(&page, &mut target, &FontSet::metrics_only(), &assets).unwrap();
        let bitmap = target.capture();
        // 4x2 scaled into 40x40 keeps its aspect: 40x20 at the top.
        assert_eq!(bitmap.pixel(20, 10), Some([255, 0, 0]));
        assert_eq!(bitmap.pixel(20, 30), Some([255, 255, 255]));
    }

    #[test]
    fn missing_image_resource_fails_the_page() {
        let mut canvas = Canvas::new();
        canvas.draw_image(Pt::ZERO, Pt::ZERO, Pt::from_i32(10), Pt::from_i32(10), "nope");
        let page = canvas.finish();

        let tracker = SurfaceTracker::default();
        let mut target = surface(&tracker);
        let err = rasterize(&page, &mut target, &FontSet::metrics_only(), &AssetStore::default())
            .unwrap_err();
        assert!(matches!(err, FolioError::Raster(_)));
    }

    #[test]
    fn text_without_fonts_leaves_the_page_blank() {
        let mut canvas = Canvas::new();
        canvas.draw_string(Pt::from_i32(2), Pt::from_i32(2), "Invoice");
        let page = canvas.finish();

        let tracker = SurfaceTracker::default();
        let mut target = surface(&tracker);
        rasterize(&page, &mut target, &FontSet::metrics_only(), &AssetStore::default()).unwrap();
        let bitmap = target.capture();
        assert!(bitmap.rgb.iter().all(|v| *v == 255));
    }
}

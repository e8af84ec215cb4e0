use crate::canvas::{Canvas, PageCommands};
use crate::error::{FolioError, Result};
use crate::font::{BOLD, FontSet, REGULAR};
use crate::layout::{PageLayout, TABLE_COLUMNS};
use crate::types::{Color, Margins, Pt, Rect, Size};

pub const META_BLOCK_KEY: &str = "folio.block";

const LINE_SPACING: f32 = 1.25;
const CELL_PAD: f32 = 4.0;
const LOGO_MAX_WIDTH: f32 = 140.0;
const LOGO_MAX_HEIGHT: f32 = 48.0;
const BLOCK_GAP: f32 = 14.0;

// Text scales tried in order until the page content fits above the bottom margin.
const TEXT_SCALES: [f32; 6] = [1.0, 0.9, 0.8, 0.7, 0.6, 0.5];

// Fraction of the content width per column, in TABLE_COLUMNS order.
const COLUMN_WEIGHTS: [f32; 5] = [0.40, 0.12, 0.12, 0.18, 0.18];

/// Physical page the layout tree is painted onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub size: Size,
    pub margins: Margins,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            size: Size::a4(),
            margins: Margins::all(40.0),
        }
    }
}

#[derive(Clone, Copy)]
struct TextStyle {
    font: &'static str,
    size: f32,
    color: Color,
}

const COMPANY_NAME: TextStyle = TextStyle {
    font: BOLD,
    size: 16.0,
    color: Color::BLACK,
};
const SMALL: TextStyle = TextStyle {
    font: REGULAR,
    size: 9.0,
    color: Color::MUTED,
};
const BODY: TextStyle = TextStyle {
    font: REGULAR,
    size: 10.0,
    color: Color::BLACK,
};
const BODY_BOLD: TextStyle = TextStyle {
    font: BOLD,
    size: 10.0,
    color: Color::BLACK,
};
const TITLE: TextStyle = TextStyle {
    font: BOLD,
    size: 20.0,
    color: Color::BLACK,
};
const SUBTITLE: TextStyle = TextStyle {
    font: REGULAR,
    size: 12.0,
    color: Color::BLACK,
};
const TABLE_HEAD: TextStyle = TextStyle {
    font: BOLD,
    size: 9.0,
    color: Color::BLACK,
};
const NOTE: TextStyle = TextStyle {
    font: REGULAR,
    size: 8.0,
    color: Color::MUTED,
};
const TOTAL: TextStyle = TextStyle {
    font: BOLD,
    size: 13.0,
    color: Color::BLACK,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Paints one laid-out page. The same painter feeds the preview raster and
/// the export raster.
#[derive(Clone, Copy)]
pub struct Painter<'a> {
    fonts: &'a FontSet,
    geometry: PageGeometry,
    scale: f32,
}

impl<'a> Painter<'a> {
    pub fn new(fonts: &'a FontSet, geometry: PageGeometry) -> Self {
        Self {
            fonts,
            geometry,
            scale: 1.0,
        }
    }

    /// Paints the page at the largest text scale whose content ends above the
    /// bottom margin. Text is shrunk, never cut; content that does not fit even
    /// at the smallest scale is a [`FolioError::PageOverflow`].
    pub fn paint(&self, layout: &PageLayout) -> Result<PageCommands> {
        let limit = self.geometry.margins.content_box(self.geometry.size).bottom();
        let mut end = limit;
        for scale in TEXT_SCALES {
            let painter = Painter { scale, ..*self };
            let (commands, bottom) = painter.paint_scaled(layout);
            if bottom <= limit {
                if scale < 1.0 {
                    log::debug!("page {} text scaled to {scale} to fit", layout.page_number);
                }
                return Ok(commands);
            }
            end = bottom;
        }
        Err(FolioError::PageOverflow {
            page: layout.page_number,
            overflow_pt: (end - limit).to_f32(),
        })
    }

    /// Paints at `self.scale` and returns where the content ends.
    fn paint_scaled(&self, layout: &PageLayout) -> (PageCommands, Pt) {
        let mut canvas = Canvas::new();
        let content = self.geometry.margins.content_box(self.geometry.size);
        let mut cursor = content.y;

        cursor = self.paint_header(&mut canvas, layout, content, cursor);

        if let Some(title) = &layout.title {
            canvas.meta(META_BLOCK_KEY, "title");
            cursor = self.text_line(
                &mut canvas,
                TITLE,
                content.x,
                cursor,
                &format!("{} {}", title.label, title.number),
            );
            cursor = self.paragraph(&mut canvas, SUBTITLE, content.x, cursor, content.width, &title.title);
            if let Some(description) = &title.description {
                cursor = self.paragraph(&mut canvas, SMALL, content.x, cursor, content.width, description);
            }
            cursor += Pt::from_f32(BLOCK_GAP);
        }

        if layout.customer.is_some() || layout.metadata.is_some() {
            let half = content.width / 2;
            let mut left = cursor;
            let mut right = cursor;
            if let Some(customer) = &layout.customer {
                canvas.meta(META_BLOCK_KEY, "customer");
                left = self.text_line(&mut canvas, SMALL, content.x, left, "Bill to");
                left = self.paragraph(&mut canvas, BODY_BOLD, content.x, left, half, &customer.name_line);
                for line in customer.address_lines.iter().chain(&customer.contact_lines) {
                    left = self.paragraph(&mut canvas, BODY, content.x, left, half, line);
                }
            }
            if let Some(metadata) = &layout.metadata {
                canvas.meta(META_BLOCK_KEY, "metadata");
                let right_edge = content.right();
                for (label, value) in metadata.fields() {
                    let value_width = self.width(BODY, &value);
                    let value_x = right_edge - value_width;
                    self.draw(&mut canvas, BODY, value_x, right, &value);
                    let label_text = format!("{label}:");
                    let label_x = value_x - Pt::from_f32(8.0) - self.width(SMALL, &label_text);
                    self.draw(&mut canvas, SMALL, label_x, right, &label_text);
                    right += self.line_height(BODY);
                }
            }
            cursor = left.max(right) + Pt::from_f32(BLOCK_GAP);
        }

        cursor = self.paint_table(&mut canvas, layout, content, cursor);

        if let Some(notice) = layout.continuation {
            canvas.meta(META_BLOCK_KEY, "continuation");
            cursor += Pt::from_f32(6.0);
            cursor = self.aligned_line(&mut canvas, SMALL, content, cursor, notice, Align::Right);
        }

        if let Some(totals) = &layout.totals {
            canvas.meta(META_BLOCK_KEY, "totals");
            cursor += Pt::from_f32(10.0);
            let label_right = content.right() - content.width / 4;
            for (label, value, style) in [
                ("Subtotal", totals.subtotal.as_str(), BODY),
                (totals.vat_label.as_str(), totals.vat_amount.as_str(), BODY),
            ] {
                self.draw(&mut canvas, style, label_right - self.width(style, label), cursor, label);
                self.draw(&mut canvas, style, content.right() - self.width(style, value), cursor, value);
                cursor += self.line_height(style);
            }
            canvas.set_stroke_color(Color::BLACK);
            canvas.set_line_width(Pt::from_f32(0.8));
            canvas.line(label_right - Pt::from_f32(60.0), cursor, content.right(), cursor);
            cursor += Pt::from_f32(4.0);
            self.draw(&mut canvas, TOTAL, label_right - self.width(TOTAL, "Total"), cursor, "Total");
            self.draw(
                &mut canvas,
                TOTAL,
                content.right() - self.width(TOTAL, &totals.total),
                cursor,
                &totals.total,
            );
            cursor += self.line_height(TOTAL);
        }

        if let Some(footer) = &layout.footer {
            canvas.meta(META_BLOCK_KEY, "footer");
            let lines = self.wrap(SMALL, footer, content.width);
            let height = self.line_height(SMALL) * lines.len() as i32;
            let top = (content.bottom() - height).max(cursor + Pt::from_f32(BLOCK_GAP));
            let mut y = top;
            for line in lines {
                self.draw(&mut canvas, SMALL, content.x, y, &line);
                y += self.line_height(SMALL);
            }
            cursor = y;
        }

        (canvas.finish(), cursor)
    }

    fn paint_header(&self, canvas: &mut Canvas, layout: &PageLayout, content: Rect, top: Pt) -> Pt {
        canvas.meta(META_BLOCK_KEY, "header");
        let header = &layout.header;
        let mut left = top;
        if let Some(name) = &header.company_name {
            left = self.text_line(canvas, COMPANY_NAME, content.x, left, name);
        }
        for line in &header.company_lines {
            left = self.text_line(canvas, SMALL, content.x, left, line);
        }

        let mut right = top;
        if let Some(logo) = &header.logo {
            let width = Pt::from_f32(LOGO_MAX_WIDTH);
            let height = Pt::from_f32(LOGO_MAX_HEIGHT);
            canvas.draw_image(content.right() - width, right, width, height, logo.clone());
            right += height + Pt::from_f32(4.0);
        }
        right = self.aligned_line(canvas, SMALL, content, right, &header.page_label, Align::Right);

        let bottom = left.max(right) + Pt::from_f32(6.0);
        canvas.set_stroke_color(Color::RULE);
        canvas.set_line_width(Pt::from_f32(0.75));
        canvas.line(content.x, bottom, content.right(), bottom);
        bottom + Pt::from_f32(BLOCK_GAP)
    }

    fn paint_table(&self, canvas: &mut Canvas, layout: &PageLayout, content: Rect, top: Pt) -> Pt {
        canvas.meta(META_BLOCK_KEY, "table");
        let columns = column_rects(content);
        let pad = Pt::from_f32(CELL_PAD);
        let mut cursor = top;

        if layout.table.show_header {
            let height = self.line_height(TABLE_HEAD) + pad * 2;
            canvas.set_fill_color(Color::HEADER_FILL);
            canvas.draw_rect(content.x, cursor, content.width, height);
            for (idx, (x, width)) in columns.iter().enumerate() {
                let text = TABLE_COLUMNS[idx];
                let x = cell_x(self.width(TABLE_HEAD, text), *x, *width, column_align(idx));
                self.draw(canvas, TABLE_HEAD, x, cursor + pad, text);
            }
            cursor += height;
            self.rule(canvas, content, cursor, Color::BLACK);
        }

        for row in &layout.table.rows {
            let (desc_x, desc_width) = columns[0];
            let desc_lines = self.wrap(BODY, &row.description, desc_width - pad * 2);
            let mut y = cursor + pad;
            for line in &desc_lines {
                self.draw(canvas, BODY, desc_x + pad, y, line);
                y += self.line_height(BODY);
            }
            if let Some(note) = &row.note {
                self.draw(canvas, NOTE, desc_x + pad, y, note);
                y += self.line_height(NOTE);
            }
            for (idx, text) in row.cells().iter().enumerate().skip(1) {
                let (x, width) = columns[idx];
                let x = cell_x(self.width(BODY, text), x, width, column_align(idx));
                self.draw(canvas, BODY, x, cursor + pad, text);
            }
            cursor = y + pad;
            self.rule(canvas, content, cursor, Color::RULE);
        }
        cursor
    }

    fn rule(&self, canvas: &mut Canvas, content: Rect, y: Pt, color: Color) {
        canvas.set_stroke_color(color);
        canvas.set_line_width(Pt::from_f32(0.5));
        canvas.line(content.x, y, content.right(), y);
    }

    fn font_size(&self, style: TextStyle) -> Pt {
        Pt::from_f32(style.size * self.scale)
    }

    fn line_height(&self, style: TextStyle) -> Pt {
        Pt::from_f32(style.size * self.scale * LINE_SPACING)
    }

    fn width(&self, style: TextStyle, text: &str) -> Pt {
        self.fonts.measure(style.font, self.font_size(style), text)
    }

    fn draw(&self, canvas: &mut Canvas, style: TextStyle, x: Pt, y: Pt, text: &str) {
        canvas.set_fill_color(style.color);
        canvas.set_font(style.font, self.font_size(style));
        canvas.draw_string(x, y, text);
    }

    fn text_line(&self, canvas: &mut Canvas, style: TextStyle, x: Pt, y: Pt, text: &str) -> Pt {
        self.draw(canvas, style, x, y, text);
        y + self.line_height(style)
    }

    fn aligned_line(
        &self,
        canvas: &mut Canvas,
        style: TextStyle,
        content: Rect,
        y: Pt,
        text: &str,
        align: Align,
    ) -> Pt {
        let x = cell_x(self.width(style, text), content.x, content.width, align);
        self.text_line(canvas, style, x, y, text)
    }

    fn paragraph(
        &self,
        canvas: &mut Canvas,
        style: TextStyle,
        x: Pt,
        mut y: Pt,
        max_width: Pt,
        text: &str,
    ) -> Pt {
        for line in self.wrap(style, text, max_width) {
            y = self.text_line(canvas, style, x, y, &line);
        }
        y
    }

    /// Greedy word wrap. Words wider than `max_width` are broken between
    /// characters; nothing is ever truncated.
    fn wrap(&self, style: TextStyle, text: &str, max_width: Pt) -> Vec<String> {
        let mut lines = Vec::new();
        for paragraph in text.split('\n') {
            let mut current = String::new();
            for word in paragraph.split_whitespace() {
                let candidate = if current.is_empty() {
                    word.to_string()
                } else {
                    format!("{current} {word}")
                };
                if self.width(style, &candidate) <= max_width {
                    current = candidate;
                    continue;
                }
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                if self.width(style, word) <= max_width {
                    current = word.to_string();
                    continue;
                }
                for ch in word.chars() {
                    let mut next = current.clone();
                    next.push(ch);
                    if !current.is_empty() && self.width(style, &next) > max_width {
                        lines.push(std::mem::take(&mut current));
                        current.push(ch);
                    } else {
                        current = next;
                    }
                }
            }
            lines.push(current);
        }
        while lines.len() > 1 && lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines
    }
}

fn column_rects(content: Rect) -> [(Pt, Pt); 5] {
    let mut out = [(Pt::ZERO, Pt::ZERO); 5];
    let mut x = content.x;
    for (idx, weight) in COLUMN_WEIGHTS.iter().enumerate() {
        let width = if idx + 1 == COLUMN_WEIGHTS.len() {
            content.right() - x
        } else {
            content.width * *weight
        };
        out[idx] = (x, width);
        x += width;
    }
    out
}

fn column_align(idx: usize) -> Align {
    match idx {
        0 | 2 => Align::Left,
        _ => Align::Right,
    }
}

fn cell_x(text_width: Pt, x: Pt, width: Pt, align: Align) -> Pt {
    let pad = Pt::from_f32(CELL_PAD);
    match align {
        Align::Left => x + pad,
        Align::Right => (x + width - pad - text_width).max(x + pad),
    }
}

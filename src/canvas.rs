use crate::types::{Color, Pt};

/// One recorded drawing operation. Coordinates are page points with the
/// origin at the top-left corner and y growing downwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Non-rendered metadata describing which layout block the following
    // commands belong to. Ignored by the rasterizer.
    Meta {
        key: String,
        value: String,
    },
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    SetFontName(String),
    SetFontSize(Pt),
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    Stroke,
    /// `y` is the top of the text line; the rasterizer derives the baseline.
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    DrawRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageCommands {
    pub commands: Vec<Command>,
}

impl PageCommands {
    pub fn strings(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|cmd| match cmd {
            Command::DrawString { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn image_ids(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|cmd| match cmd {
            Command::DrawImage { resource_id, .. } => Some(resource_id.as_str()),
            _ => None,
        })
    }

    pub fn meta_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.commands.iter().filter_map(move |cmd| match cmd {
            Command::Meta { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    font_size: Pt,
    font_name: String,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            font_size: Pt::from_f32(12.0),
            font_name: crate::font::REGULAR.to_string(),
        }
    }
}

/// Records drawing commands for a single page. State setters that would not
/// change the current graphics state are dropped.
#[derive(Default)]
pub struct Canvas {
    commands: Vec<Command>,
    current_state: GraphicsState,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.commands.push(Command::Meta {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = width.max(Pt::ZERO);
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_font(&mut self, name: &str, size: Pt) {
        if self.current_state.font_name != name {
            self.current_state.font_name = name.to_string();
            self.commands.push(Command::SetFontName(name.to_string()));
        }
        if self.current_state.font_size != size {
            self.current_state.font_size = size;
            self.commands.push(Command::SetFontSize(size));
        }
    }

    pub fn line(&mut self, x0: Pt, y0: Pt, x1: Pt, y1: Pt) {
        self.commands.push(Command::MoveTo { x: x0, y: y0 });
        self.commands.push(Command::LineTo { x: x1, y: y1 });
        self.commands.push(Command::Stroke);
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.commands.push(Command::DrawString { x, y, text });
    }

    pub fn draw_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.commands.push(Command::DrawRect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn draw_image(
        &mut self,
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: impl Into<String>,
    ) {
        self.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.into(),
        });
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn finish(self) -> PageCommands {
        PageCommands {
            commands: self.commands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redundant_state_changes_are_not_recorded() {
        let mut canvas = Canvas::new();
        canvas.set_fill_color(Color::BLACK);
        canvas.set_font(crate::font::REGULAR, Pt::from_f32(12.0));
        assert_eq!(canvas.command_count(), 0);
        canvas.set_fill_color(Color::MUTED);
        canvas.set_fill_color(Color::MUTED);
        assert_eq!(canvas.command_count(), 1);
    }

    #[test]
    fn line_records_a_stroked_path() {
        let mut canvas = Canvas::new();
        canvas.line(Pt::ZERO, Pt::from_i32(10), Pt::from_i32(100), Pt::from_i32(10));
        let page = canvas.finish();
        assert_eq!(
            page.commands,
            vec![
                Command::MoveTo {
                    x: Pt::ZERO,
                    y: Pt::from_i32(10)
                },
                Command::LineTo {
                    x: Pt::from_i32(100),
                    y: Pt::from_i32(10)
                },
                Command::Stroke,
            ]
        );
    }

    #[test]
    fn empty_strings_are_skipped() {
        let mut canvas = Canvas::new();
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "");
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "Total");
        let page = canvas.finish();
        assert_eq!(page.strings().collect::<Vec<_>>(), vec!["Total"]);
    }
}

use crate::error::{FolioError, Result};
use crate::types::Pt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const REGULAR: &str = "Helvetica";
pub const BOLD: &str = "Helvetica-Bold";

// Used when no font program could be resolved. Close to the mean Helvetica
// advance so wrapping stays plausible.
const FALLBACK_ADVANCE_EM: f32 = 0.55;
const MAX_SEARCH_DEPTH: usize = 4;

const REGULAR_CANDIDATES: &[&str] = &[
    "LiberationSans-Regular.ttf",
    "DejaVuSans.ttf",
    "Arial.ttf",
    "arial.ttf",
    "Helvetica.ttf",
    "NotoSans-Regular.ttf",
    "FreeSans.ttf",
];

const BOLD_CANDIDATES: &[&str] = &[
    "LiberationSans-Bold.ttf",
    "DejaVuSans-Bold.ttf",
    "Arial Bold.ttf",
    "arialbd.ttf",
    "Helvetica-Bold.ttf",
    "NotoSans-Bold.ttf",
    "FreeSansBold.ttf",
];

#[derive(Clone)]
pub struct FontProgram {
    pub name: String,
    pub data: Arc<Vec<u8>>,
    pub path: Option<PathBuf>,
}

impl std::fmt::Debug for FontProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontProgram")
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .field("path", &self.path)
            .finish()
    }
}

impl FontProgram {
    fn from_bytes(name: &str, data: Vec<u8>, path: Option<PathBuf>) -> Option<Self> {
        ttf_parser::Face::parse(&data, 0).ok()?;
        Some(Self {
            name: name.to_string(),
            data: Arc::new(data),
            path,
        })
    }
}

/// The regular and bold programs every page is set in. Either may be absent,
/// in which case measurement falls back to a fixed advance and the rasterizer
/// skips glyph drawing.
#[derive(Debug, Clone, Default)]
pub struct FontSet {
    regular: Option<FontProgram>,
    bold: Option<FontProgram>,
}

impl FontSet {
    /// A set with no font programs. Layout still works; text is not drawn.
    pub fn metrics_only() -> Self {
        Self::default()
    }

    /// Loads `font_path` when given (an unreadable file is an error), otherwise
    /// searches `extra_dirs` and then the platform font directories.
    pub fn resolve(font_path: Option<&Path>, extra_dirs: &[PathBuf]) -> Result<Self> {
        if let Some(path) = font_path {
            let bytes = std::fs::read(path).map_err(|err| {
                FolioError::Font(format!("cannot read font {}: {err}", path.display()))
            })?;
            let program = FontProgram::from_bytes(REGULAR, bytes, Some(path.to_path_buf()))
                .ok_or_else(|| {
                    FolioError::Font(format!("{} is not a TrueType/OpenType font", path.display()))
                })?;
            let bold = FontProgram {
                name: BOLD.to_string(),
                ..program.clone()
            };
            return Ok(Self {
                regular: Some(program),
                bold: Some(bold),
            });
        }

        let mut dirs: Vec<PathBuf> = extra_dirs.to_vec();
        dirs.extend(system_font_dirs());
        let regular = find_font(REGULAR, REGULAR_CANDIDATES, &dirs);
        let bold = find_font(BOLD, BOLD_CANDIDATES, &dirs).or_else(|| {
            regular.as_ref().map(|program| FontProgram {
                name: BOLD.to_string(),
                ..program.clone()
            })
        });
        match &regular {
            Some(program) => log::debug!("resolved text font {:?}", program.path),
            None => log::warn!("no system font found; text will be measured but not rasterized"),
        }
        Ok(Self { regular, bold })
    }

    pub fn program(&self, name: &str) -> Option<&FontProgram> {
        if name == BOLD {
            self.bold.as_ref().or(self.regular.as_ref())
        } else {
            self.regular.as_ref()
        }
    }

    pub fn has_glyph_source(&self) -> bool {
        self.regular.is_some()
    }

    pub fn measure(&self, name: &str, size: Pt, text: &str) -> Pt {
        let size_f = size.to_f32();
        let Some(face) = self
            .program(name)
            .and_then(|program| ttf_parser::Face::parse(&program.data, 0).ok())
        else {
            return Pt::from_f32(size_f * FALLBACK_ADVANCE_EM * text.chars().count() as f32);
        };
        let units_per_em = face.units_per_em().max(1) as f32;
        let mut total = 0.0f32;
        for ch in text.chars() {
            let advance = face
                .glyph_index(ch)
                .and_then(|gid| face.glyph_hor_advance(gid))
                .map(|units| units as f32 / units_per_em)
                .filter(|em| *em > 0.0)
                .unwrap_or(FALLBACK_ADVANCE_EM);
            total += advance * size_f;
        }
        Pt::from_f32(total)
    }

    /// Distance from the top of a text line to its baseline.
    pub fn ascent(&self, name: &str, size: Pt) -> Pt {
        let ratio = self
            .program(name)
            .and_then(|program| ttf_parser::Face::parse(&program.data, 0).ok())
            .map(|face| face.ascender() as f32 / face.units_per_em().max(1) as f32)
            .filter(|r| *r > 0.0 && *r < 2.0)
            .unwrap_or(0.8);
        size * ratio
    }
}

fn find_font(name: &str, candidates: &[&str], dirs: &[PathBuf]) -> Option<FontProgram> {
    for dir in dirs {
        for candidate in candidates {
            if let Some(path) = find_file(dir, candidate, 0) {
                let Ok(bytes) = std::fs::read(&path) else {
                    continue;
                };
                if let Some(program) = FontProgram::from_bytes(name, bytes, Some(path)) {
                    return Some(program);
                }
            }
        }
    }
    None
}

fn find_file(dir: &Path, file_name: &str, depth: usize) -> Option<PathBuf> {
    let direct = dir.join(file_name);
    if direct.is_file() {
        return Some(direct);
    }
    if depth >= MAX_SEARCH_DEPTH {
        return None;
    }
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort();
    subdirs
        .iter()
        .find_map(|sub| find_file(sub, file_name, depth + 1))
}

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(&home).join(".fonts"));
            dirs.push(PathBuf::from(home).join(".local/share/fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    if let Ok(extra) = std::env::var("FOLIO_FONT_DIR") {
        for path in std::env::split_paths(&extra) {
            if !path.as_os_str().is_empty() {
                dirs.push(path);
            }
        }
    }

    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_only_set_uses_fixed_advance() {
        let fonts = FontSet::metrics_only();
        let width = fonts.measure(REGULAR, Pt::from_f32(10.0), "abcd");
        assert_eq!(width.to_milli_i64(), 22_000);
        assert!(!fonts.has_glyph_source());
    }

    #[test]
    fn configured_font_path_must_exist() {
        let err = FontSet::resolve(Some(Path::new("/definitely/not/here.ttf")), &[]).unwrap_err();
        assert!(matches!(err, FolioError::Font(_)));
    }

    #[test]
    fn configured_font_path_must_be_a_font() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        let err = FontSet::resolve(Some(&path), &[]).unwrap_err();
        assert!(err.to_string().contains("not a TrueType"));
    }

    #[test]
    fn file_search_descends_into_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("truetype").join("demo");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("Demo.ttf"), b"x").unwrap();
        let found = find_file(dir.path(), "Demo.ttf", 0).unwrap();
        assert_eq!(found, nested.join("Demo.ttf"));
        assert!(find_file(dir.path(), "Missing.ttf", 0).is_none());
    }
}

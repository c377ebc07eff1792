use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use fontdue::Font;
use tracing::debug;

pub const BUNDLED_FONT_DIR_REL: &str = "assets/fonts";

const SYSTEM_FONT_DIRS: [&str; 5] = [
    "/usr/share/fonts",
    "/usr/local/share/fonts",
    "/Library/Fonts",
    "/System/Library/Fonts",
    "C:\\Windows\\Fonts",
];
const FONT_EXTENSIONS: [&str; 2] = ["ttf", "otf"];
const MAX_SCAN_DEPTH: usize = 4;

/// Directories searched for a font family, most specific first.
pub fn font_search_dirs(project_root: &Path) -> Vec<PathBuf> {
    let mut dirs = vec![project_root.join(BUNDLED_FONT_DIR_REL)];
    if let Some(home) = std::env::var_os("HOME") {
        dirs.push(PathBuf::from(&home).join(".fonts"));
        dirs.push(PathBuf::from(home).join(".local/share/fonts"));
    }
    dirs.extend(SYSTEM_FONT_DIRS.iter().map(PathBuf::from));
    dirs
}

/// Resolves a family name such as `"Inter"` to a font file.
///
/// Matching ignores case, spaces, dashes and underscores. An exact stem
/// match (`Inter.ttf`) wins over a regular-weight file (`Inter-Regular.ttf`),
/// which wins over any other file starting with the family name.
pub fn resolve_font_family(family: &str, search_dirs: &[PathBuf]) -> Option<PathBuf> {
    let wanted = normalize_name(family);
    if wanted.is_empty() {
        return None;
    }

    let mut best: Option<(u8, PathBuf)> = None;
    for dir in search_dirs {
        let mut candidates = Vec::new();
        collect_font_files(dir, 0, &mut candidates);
        candidates.sort();

        for path in candidates {
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let stem = normalize_name(stem);
            let rank = if stem == wanted {
                0
            } else if stem == format!("{wanted}regular") {
                1
            } else if stem.starts_with(&wanted) {
                2
            } else {
                continue;
            };
            if best.as_ref().map_or(true, |(best_rank, _)| rank < *best_rank) {
                best = Some((rank, path));
            }
        }
        if matches!(best, Some((0, _))) {
            break;
        }
    }

    let resolved = best.map(|(_, path)| path);
    debug!(family, resolved = ?resolved, "font family lookup");
    resolved
}

pub fn load_font(path: &Path) -> Result<Font> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read font file {}", path.display()))?;
    Font::from_bytes(bytes, fontdue::FontSettings::default())
        .map_err(|error| anyhow!("failed to parse font {}: {error}", path.display()))
}

/// Drops characters the font has no glyph for, keeping line breaks.
pub fn supported_text(font: &Font, text: &str) -> String {
    text.chars()
        .filter(|ch| matches!(ch, '\n' | ' ') || font.lookup_glyph_index(*ch) != 0)
        .collect()
}

fn collect_font_files(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            collect_font_files(&path, depth + 1, out);
        } else if is_font_file(&path) {
            out.push(path);
        }
    }
}

fn is_font_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FONT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn normalize_name(raw: &str) -> String {
    raw.chars()
        .filter(|ch| !matches!(ch, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

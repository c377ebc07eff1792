use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

pub const TIME_SEPARATOR: &str = "-->";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LyricLine {
    pub id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

impl LyricLine {
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time <= self.end_time
    }

    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }
}

/// Parses a timestamped subtitle document into lyric lines.
///
/// Malformed blocks are skipped individually; a document with no usable
/// block yields an empty vector, which callers report as unparseable.
pub fn parse_subtitles(document: &str) -> Vec<LyricLine> {
    let trimmed = document.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut lines = Vec::new();
    for (block_index, block) in block_separator().split(trimmed).enumerate() {
        match parse_block(block, block_index) {
            Some(line) => lines.push(line),
            None => debug!(block_index, "skipping malformed subtitle block"),
        }
    }
    lines
}

fn parse_block(block: &str, block_index: usize) -> Option<LyricLine> {
    let rows = block.lines().collect::<Vec<_>>();
    if rows.len() < 2 {
        return None;
    }

    let (time_row, text_start) = if rows[0].contains(TIME_SEPARATOR) {
        (rows[0], 1)
    } else {
        (rows[1], 2)
    };
    let (start_time, end_time) = parse_time_range(time_row)?;
    if end_time < start_time {
        return None;
    }

    let text = rows
        .get(text_start..)
        .map(|text_rows| text_rows.join("\n"))
        .unwrap_or_default();

    Some(LyricLine {
        id: format!("line-{block_index}"),
        start_time,
        end_time,
        text,
    })
}

/// Parses `HH:MM:SS,mmm --> HH:MM:SS,mmm` (a period is accepted in place of
/// the comma) into start and end seconds.
pub fn parse_time_range(raw: &str) -> Option<(f64, f64)> {
    let capture = time_range().captures(raw)?;
    let field = |idx: usize| -> Option<f64> { capture.get(idx)?.as_str().parse::<f64>().ok() };

    let start = field(1)? * 3600.0 + field(2)? * 60.0 + field(3)? + field(4)? / 1000.0;
    let end = field(5)? * 3600.0 + field(6)? * 60.0 + field(7)? + field(8)? / 1000.0;
    Some((start, end))
}

/// Formats seconds back into the `HH:MM:SS,mmm` subtitle notation.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let secs = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{hours:02}:{minutes:02}:{secs:02},{millis:03}")
}

fn block_separator() -> &'static Regex {
    static BLOCK_RE: OnceLock<Regex> = OnceLock::new();
    BLOCK_RE.get_or_init(|| {
        Regex::new(r"\r?\n[ \t]*\r?\n").expect("block separator regex should compile")
    })
}

fn time_range() -> &'static Regex {
    static TIME_RANGE_RE: OnceLock<Regex> = OnceLock::new();
    TIME_RANGE_RE.get_or_init(|| {
        Regex::new(
            r"(\d{2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2})[,.](\d{3})",
        )
        .expect("time range regex should compile")
    })
}

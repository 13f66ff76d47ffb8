//! Output file naming for recordings.
//!
//! Recording names are rendered from a user template and then sanitized so the
//! result is a valid filename on Windows, Linux and macOS. Creator display
//! names routinely contain emoji and punctuation, so the sanitizer keeps any
//! valid Unicode and only replaces what the filesystem rejects.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Characters that are invalid in Windows filenames
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Default recording filename template.
pub const DEFAULT_LIVESTREAM_TEMPLATE: &str = "{creator}_{date}_{time}_{stream_id}_v{version}";

/// Directory (under the creator folder) that holds recordings.
pub const LIVESTREAM_DIR: &str = "Livestreams";

/// Container extension used for raw captures.
pub const CAPTURE_EXTENSION: &str = "ts";

/// Values substituted into a filename template.
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub creator: &'a str,
    pub creator_id: &'a str,
    pub stream_id: &'a str,
    pub version: &'a str,
    pub started_at: DateTime<Local>,
}

/// Render a template, replacing the known `{placeholder}` tokens.
///
/// Unknown placeholders are left untouched so a typo shows up in the output
/// name instead of silently disappearing.
pub fn render_template(template: &str, ctx: &TemplateContext<'_>) -> String {
    template
        .replace("{creator}", ctx.creator)
        .replace("{creator_id}", ctx.creator_id)
        .replace("{stream_id}", ctx.stream_id)
        .replace("{version}", ctx.version)
        .replace("{date}", &ctx.started_at.format("%Y%m%d").to_string())
        .replace("{time}", &ctx.started_at.format("%H%M%S").to_string())
}

/// Paths derived from one rendered recording name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingPaths {
    /// Raw capture written by the capture process.
    pub capture: PathBuf,
    /// Chat log written alongside the capture.
    pub chat: PathBuf,
}

impl RecordingPaths {
    /// Build `{root}/{creator}/Livestreams/{name}.ts` and its siblings.
    pub fn resolve(root: &Path, template: &str, ctx: &TemplateContext<'_>) -> Self {
        let stem = sanitize_filename(&render_template(template, ctx));
        let dir = root
            .join(sanitize_filename(ctx.creator))
            .join(LIVESTREAM_DIR);

        Self {
            capture: dir.join(format!("{stem}.{CAPTURE_EXTENSION}")),
            chat: dir.join(format!("{stem}_chat.json")),
        }
    }
}

/// `{stem}.{ext}` next to `path`.
pub fn with_extension(path: &Path, ext: &str) -> PathBuf {
    path.with_extension(ext)
}

/// `{stem}{suffix}` next to `path`, where `suffix` includes its own extension.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{suffix}"))
}

/// Sanitize a string for use in filenames across all platforms.
///
/// Control characters and Windows-invalid characters become `_` (runs are
/// collapsed), leading/trailing spaces and dots are trimmed, reserved device
/// names get a `_` prefix, and an empty result becomes `unnamed`.
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    let is_reserved = WINDOWS_RESERVED_NAMES
        .iter()
        .any(|reserved| upper == *reserved || upper.starts_with(&format!("{reserved}.")));
    if is_reserved {
        return format!("_{trimmed}");
    }

    trimmed.to_string()
}

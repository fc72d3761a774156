//! Output filename rules.
//!
//! Three names matter in a conversion:
//!
//! 1. the **proposed base name** shown right after a file is picked
//!    ([`propose_output_name`]),
//! 2. the **download filename** the result is saved under
//!    ([`download_filename`]),
//! 3. an optional **server-provided name** from `Content-Disposition`
//!    ([`content_disposition_filename`]).

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest base name [`propose_output_name`] produces, in characters.
pub const MAX_BASE_NAME_LEN: usize = 80;

/// Base name used when nothing usable remains after sanitising.
pub const FALLBACK_BASE_NAME: &str = "audio";

static RE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^.]+$").unwrap());

static RE_UNSAFE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_\-.]+").unwrap());

static RE_DISPOSITION_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)filename="?([^";]+)"?"#).unwrap());

/// Strip the last extension, replace runs of unsafe characters with `_`,
/// and cap the length.
///
/// ```rust
/// use tomp3::naming::propose_output_name;
///
/// assert_eq!(propose_output_name("My Song (live).flac"), "My_Song_live_");
/// assert_eq!(propose_output_name(".mp4"), "audio");
/// ```
pub fn propose_output_name(original: &str) -> String {
    let stem = RE_EXTENSION.replace(original, "");
    let stem = if stem.is_empty() {
        FALLBACK_BASE_NAME
    } else {
        stem.as_ref()
    };
    let safe = RE_UNSAFE_RUN.replace_all(stem, "_");
    // Safe text is ASCII-only, so char and byte counts agree.
    safe.chars().take(MAX_BASE_NAME_LEN).collect()
}

/// Sanitise a user-edited base name before it is sent anywhere.
///
/// Unlike [`propose_output_name`] the extension is kept (the user typed it);
/// an empty result falls back to [`FALLBACK_BASE_NAME`].
pub fn sanitize_base_name(name: &str) -> String {
    let trimmed = name.trim();
    let safe: String = RE_UNSAFE_RUN
        .replace_all(trimmed, "_")
        .chars()
        .take(MAX_BASE_NAME_LEN)
        .collect();
    if safe.is_empty() {
        FALLBACK_BASE_NAME.to_string()
    } else {
        safe
    }
}

/// The filename a result is saved under: path separators and drive colons
/// removed, base capped at [`MAX_BASE_NAME_LEN`] characters, and a `.mp3`
/// extension guaranteed.
pub fn download_filename(name: &str) -> String {
    let flat: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':'))
        .collect();
    let flat = flat.trim();
    let (base, ext) = match flat.len().checked_sub(4) {
        Some(i) if flat.is_char_boundary(i) && flat[i..].eq_ignore_ascii_case(".mp3") => {
            flat.split_at(i)
        }
        _ => (flat, ".mp3"),
    };
    let base: String = base.chars().take(MAX_BASE_NAME_LEN).collect();
    if base.is_empty() {
        return format!("{FALLBACK_BASE_NAME}{ext}");
    }
    format!("{base}{ext}")
}

/// Extract `filename="…"` from a `Content-Disposition` header value.
pub fn content_disposition_filename(header: &str) -> Option<String> {
    RE_DISPOSITION_FILENAME
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

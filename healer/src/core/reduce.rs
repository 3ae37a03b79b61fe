//! Log reduction: concatenate a log bundle into one bounded text blob.

use crate::core::types::LogBundle;

pub const DEFAULT_MAX_LOG_CHARS: usize = 100_000;

/// Concatenate bundle entries in lexical path order, each under a path header.
///
/// Undecodable bytes are replaced. Output longer than `max_chars` keeps only the
/// trailing `max_chars` characters, where the newest output lives.
pub fn reduce_logs(bundle: &LogBundle, max_chars: usize) -> String {
    let mut entries: Vec<_> = bundle.entries.iter().collect();
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let parts: Vec<String> = entries
        .iter()
        .map(|entry| {
            format!(
                "--- {} ---\n{}\n",
                entry.path,
                String::from_utf8_lossy(&entry.bytes)
            )
        })
        .collect();

    keep_tail_chars(parts.join("\n"), max_chars)
}

fn keep_tail_chars(text: String, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let skip = total - max_chars;
    match text.char_indices().nth(skip) {
        Some((offset, _)) => text[offset..].to_string(),
        None => String::new(),
    }
}

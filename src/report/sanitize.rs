//! Filename sanitization for artifact paths.

/// Longest sanitized name we will embed in an artifact filename.
const MAX_LEN: usize = 100;

const PLACEHOLDER: char = '_';

fn is_illegal(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control() || c.is_whitespace()
}

/// Make a runner- or user-supplied name safe to embed in a file path.
///
/// Illegal characters become `_`, runs of `_` collapse to one, leading and
/// trailing `_` are trimmed, an empty result falls back to "test", and the
/// output is capped at 100 characters. Idempotent: sanitizing an already
/// sanitized name returns it unchanged.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len().min(MAX_LEN));
    let mut last_was_placeholder = false;

    for c in name.chars() {
        if is_illegal(c) || c == PLACEHOLDER {
            if !last_was_placeholder {
                out.push(PLACEHOLDER);
                last_was_placeholder = true;
            }
        } else {
            out.push(c);
            last_was_placeholder = false;
        }
    }

    let trimmed = out.trim_matches(PLACEHOLDER);
    if trimmed.is_empty() {
        return "test".to_string();
    }

    let capped: String = trimmed.chars().take(MAX_LEN).collect();
    capped.trim_end_matches(PLACEHOLDER).to_string()
}

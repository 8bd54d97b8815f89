//! Input text normalization shared by every input path.

/// Drops characters outside letters, digits, underscore, whitespace and
/// basic punctuation (`. , ! ?`), then collapses whitespace runs to a
/// single space and trims the ends.
pub fn clean(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() {
                pending_space = true;
            }
            continue;
        }
        if !is_allowed(ch) {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

fn is_allowed(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || matches!(ch, '.' | ',' | '!' | '?')
}

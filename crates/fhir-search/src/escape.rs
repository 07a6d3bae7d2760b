//! Search value escaping.
//!
//! Values may escape the separator characters with a backslash:
//! `\,` (OR separator), `\$` (composite separator), `\|` (token separator)
//! and `\\` (a literal backslash).

/// Splits on `sep`, skipping separators preceded by a backslash.
///
/// The pieces keep their escapes; call [`unescape`] on leaf text.
pub(crate) fn split_unescaped(input: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if c == sep {
            out.push(&input[start..i]);
            start = i + c.len_utf8();
        }
    }
    out.push(&input[start..]);
    out
}

/// True if `input` contains `sep` outside an escape.
pub(crate) fn contains_unescaped(input: &str, sep: char) -> bool {
    split_unescaped(input, sep).len() > 1
}

/// Resolves `\,` `\$` `\|` `\\`. Any other backslash is kept as written.
pub(crate) fn unescape(input: &str) -> String {
    if !input.contains('\\') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, '\\' | ',' | '$' | '|') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Inverse of [`unescape`].
pub(crate) fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | ',' | '$' | '|') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

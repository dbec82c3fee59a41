/// Longest prefix of `s` that fits in `max_bytes` without splitting a UTF-8
/// character.
///
/// ```
/// use yapdap::utils::string_utils::truncate_safe;
///
/// assert_eq!(truncate_safe("Olá 🌍", 5), "Olá ");
/// ```
pub fn truncate_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Like [`truncate_safe`], appending `suffix` when anything was cut.
pub fn truncate_with_suffix(s: &str, max_bytes: usize, suffix: &str) -> String {
    let truncated = truncate_safe(s, max_bytes);
    if truncated.len() < s.len() {
        format!("{}{}", truncated, suffix)
    } else {
        truncated.to_string()
    }
}

/// Shared utility functions

/// Safely truncate a string at a UTF-8 boundary
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if max_bytes >= s.len() {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// One-line preview of a message body for terminal listings.
pub fn preview_line(text: &str, max_bytes: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    let truncated = safe_truncate(first_line, max_bytes);
    if truncated.len() < first_line.len() || text.lines().nth(1).is_some() {
        format!("{truncated}...")
    } else {
        truncated.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate_ascii() {
        assert_eq!(safe_truncate("hello", 3), "hel");
        assert_eq!(safe_truncate("hello", 10), "hello");
        assert_eq!(safe_truncate("hello", 5), "hello");
    }

    #[test]
    fn test_safe_truncate_utf8() {
        // Multi-byte character straddling the cut point
        let s = "héllo";
        assert_eq!(safe_truncate(s, 2), "h");
    }

    #[test]
    fn test_preview_line() {
        assert_eq!(preview_line("short", 40), "short");
        assert_eq!(preview_line("first\nsecond", 40), "first...");
        assert_eq!(preview_line("a very long line here", 10), "a very lon...");
    }
}

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {:?}", path))?;
    }
    Ok(())
}

/// Find the largest char boundary in `s` that is <= `max_bytes`.
/// Safe for slicing: `&s[..find_char_boundary(s, max_bytes)]` never panics.
pub fn find_char_boundary(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    let mut boundary = max_bytes;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    boundary
}

/// Shorten `s` to at most `max_bytes`, marking the cut with `...`.
pub fn preview(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    format!("{}...", &s[..find_char_boundary(s, max_bytes)])
}

/// Split `key=value` words into pairs. Words without `=` are skipped.
/// Values may be quoted with double quotes to include spaces.
pub fn parse_key_values(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let Some(eq) = rest[..word_end].find('=') else {
            rest = rest[word_end..].trim_start();
            continue;
        };
        let key = rest[..eq].to_string();
        let after = &rest[eq + 1..];

        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(close) => (quoted[..close].to_string(), &quoted[close + 1..]),
                None => (quoted.to_string(), ""),
            }
        } else {
            let end = after.find(char::is_whitespace).unwrap_or(after.len());
            (after[..end].to_string(), &after[end..])
        };

        pairs.push((key, value));
        rest = remaining.trim_start();
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_dir_creates_new() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a").join("b");
        assert!(ensure_dir(&target).is_ok());
        assert!(target.is_dir());
        // Existing directory is fine too.
        assert!(ensure_dir(&target).is_ok());
    }

    #[test]
    fn test_find_char_boundary_multibyte() {
        let s = "Héllo wörld"; // é is 2 bytes
        assert_eq!(find_char_boundary(s, 2), 1);
        assert_eq!(find_char_boundary(s, 3), 3);
        assert_eq!(find_char_boundary(s, 100), s.len());
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("Hi 👋 there", 4), "Hi ...");
    }

    #[test]
    fn test_parse_key_values() {
        let pairs = parse_key_values(r#"host=mc.local port=25575 password="two words" stray"#);
        assert_eq!(
            pairs,
            vec![
                ("host".to_string(), "mc.local".to_string()),
                ("port".to_string(), "25575".to_string()),
                ("password".to_string(), "two words".to_string()),
            ]
        );
        assert!(parse_key_values("   ").is_empty());
    }
}

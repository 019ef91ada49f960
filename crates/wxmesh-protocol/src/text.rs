//! Byte-budget text segmentation.
//!
//! Mesh frames are limited in bytes, not characters. Both operations only
//! ever cut on UTF-8 character boundaries.

/// Longest prefix of `text` that fits `max_bytes` without splitting a character.
fn fit_prefix(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Byte offset of the last whitespace character in `text`, if it is not
/// the very first character.
fn last_word_break(text: &str) -> Option<usize> {
    text.char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .last()
        .filter(|&i| i > 0)
}

/// Byte offset just past the last sentence terminator (`.`, `?`, `!`) that
/// is followed by whitespace.
fn last_sentence_break(text: &str) -> Option<usize> {
    let mut prev = None;
    let mut found = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() && matches!(prev, Some('.' | '?' | '!')) {
            found = Some(i);
        }
        prev = Some(c);
    }
    found
}

/// Shorten `text` to at most `max_bytes`.
///
/// Text that already fits is returned unchanged. Otherwise the text is cut
/// at the budget and backed off to the last whitespace so no word is left
/// half-written; if there is no whitespace to back off to, the result is
/// empty.
pub fn truncate(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let cut = fit_prefix(text, max_bytes);
    match last_word_break(cut) {
        Some(end) => cut[..end].to_string(),
        None => String::new(),
    }
}

/// Split `text` into trimmed pieces of at most `max_bytes` each.
///
/// Each piece is the largest prefix that fits, cut after a sentence
/// terminator when one is available, else at the last whitespace, else
/// hard at the budget. Whitespace at the split points is dropped; every
/// other character appears exactly once, in order.
///
/// A single character wider than `max_bytes` is emitted on its own.
pub fn chunk(text: &str, max_bytes: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    if max_bytes == 0 {
        return chunks;
    }

    let mut remaining = text.trim();
    while !remaining.is_empty() {
        if remaining.len() <= max_bytes {
            chunks.push(remaining.to_string());
            break;
        }

        let mut candidate = fit_prefix(remaining, max_bytes);
        if candidate.is_empty() {
            let width = remaining.chars().next().map_or(1, char::len_utf8);
            candidate = &remaining[..width];
        }

        let split = last_sentence_break(candidate).or_else(|| last_word_break(candidate));
        let piece = match split {
            Some(end) => &remaining[..end],
            None => candidate,
        };

        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        remaining = remaining[piece.len()..].trim();
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_fits_unchanged() {
        assert_eq!(truncate("short alert", 155), "short alert");
        assert_eq!(truncate("", 10), "");
    }

    #[test]
    fn test_truncate_backs_off_to_word() {
        assert_eq!(truncate("hello brave new world", 13), "hello brave");
        assert_eq!(truncate("hello brave new world", 12), "hello brave");
    }

    #[test]
    fn test_truncate_no_whitespace_is_empty() {
        assert_eq!(truncate("supercalifragilistic", 5), "");
        assert_eq!(truncate(" leading", 4), "");
    }

    #[test]
    fn test_truncate_never_splits_multibyte() {
        // "ž" is two bytes; the cut at 6 falls inside the second one.
        let out = truncate("aa žž bb", 6);
        assert_eq!(out, "aa");
        let out = truncate("☢️ Bratislava (12km North) 80 CPM", 10);
        assert!(out.len() <= 10);
        assert!(std::str::from_utf8(out.as_bytes()).is_ok());
    }

    #[test]
    fn test_chunk_prefers_sentence_boundary() {
        let text = "First one. Second sentence is longer";
        assert_eq!(
            chunk(text, 30),
            vec!["First one.".to_string(), "Second sentence is longer".to_string()]
        );
    }

    #[test]
    fn test_chunk_falls_back_to_whitespace() {
        let text = "alpha beta gamma delta";
        assert_eq!(
            chunk(text, 11),
            vec!["alpha beta".to_string(), "gamma delta".to_string()]
        );
    }

    #[test]
    fn test_chunk_hard_cut_without_whitespace() {
        assert_eq!(
            chunk("abcdefghij", 4),
            vec!["abcd".to_string(), "efgh".to_string(), "ij".to_string()]
        );
    }

    #[test]
    fn test_chunk_fits_in_one() {
        assert_eq!(chunk("  one chunk  ", 130), vec!["one chunk".to_string()]);
        assert!(chunk("   ", 10).is_empty());
        assert!(chunk("anything", 0).is_empty());
    }

    #[test]
    fn test_chunk_multiline_forecast() {
        let text = "BA ☀️\n🌡️ ▲24°C ▼12°C\n🌬️ 15 km/h (30 km/h)\n🌅 05:12  🌇 20:41";
        let chunks = chunk(text, 40);
        assert!(chunks.iter().all(|c| c.len() <= 40));
        let joined: String = chunks.concat().split_whitespace().collect();
        let expected: String = text.split_whitespace().collect();
        assert_eq!(joined, expected);
    }

    #[test]
    fn test_chunk_wide_char_over_tiny_budget() {
        assert_eq!(chunk("žž", 1), vec!["ž".to_string(), "ž".to_string()]);
    }
}

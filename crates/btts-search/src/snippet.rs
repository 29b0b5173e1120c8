//! Snippet extraction for search hits.
//!
//! Short messages are returned verbatim. Long messages are cut to a window
//! around the first match of the query (or of one of its tokens), with
//! `...` marking the sides that are not flush with the original text.

/// Messages up to this many characters are returned unchanged.
pub const SNIPPET_MAX_CHARS: usize = 200;

/// Upper bound on the byte length of a windowed snippet, markers included.
pub const SNIPPET_MAX_BYTES: usize = 205;

/// Placeholder for blank messages.
pub const EMPTY_MESSAGE: &str = "[Empty Message]";

const ELLIPSIS: &str = "...";
const LEFT_CONTEXT: usize = 50;
const RIGHT_CONTEXT: usize = 150;
const MIN_TOKEN_CHARS: usize = 2;
/// A UTF-8 sequence is at most 4 bytes
const MAX_BOUNDARY_SCAN: usize = 4;

/// Build the display snippet of `message` for `query`.
pub fn snippet(message: &str, query: &str) -> String {
    if message.trim().is_empty() {
        return EMPTY_MESSAGE.to_string();
    }
    if message.chars().count() <= SNIPPET_MAX_CHARS {
        return message.to_string();
    }

    match locate(message, query) {
        Some(found) => window_around(message, found),
        None => leading_excerpt(message),
    }
}

/// Byte range of the full query, else of the earliest token of 2+ chars.
fn locate(message: &str, query: &str) -> Option<(usize, usize)> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    if let Some(found) = find_match(message, query) {
        return Some(found);
    }
    query
        .split_whitespace()
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .filter_map(|token| find_match(message, token))
        .min()
}

/// Case-insensitive substring search returning a byte offset into `haystack`.
pub fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    find_match(haystack, needle).map(|(start, _)| start)
}

/// Byte range in `haystack` of the first case-insensitive match of `needle`.
///
/// Compares lowercase expansions char by char so offsets stay valid even
/// when lowercasing changes byte lengths.
fn find_match(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();

    haystack
        .char_indices()
        .map(|(i, _)| i)
        .find_map(|start| matched_len(&haystack[start..], &needle).map(|len| (start, start + len)))
}

/// Byte length of the prefix of `text` whose lowercase form starts with `needle`.
fn matched_len(text: &str, needle: &[char]) -> Option<usize> {
    let mut expected = needle.iter().peekable();
    for (i, c) in text.char_indices() {
        for lower in c.to_lowercase() {
            match expected.next() {
                Some(want) if *want == lower => {}
                _ => return None,
            }
        }
        if expected.peek().is_none() {
            return Some(i + c.len_utf8());
        }
    }
    None
}

/// Window of context around the match `[pos, match_end)`.
///
/// The match itself always survives: the right context gives way first,
/// then the left, and only a match longer than the budget overflows it.
fn window_around(message: &str, (pos, match_end): (usize, usize)) -> String {
    let mut start = floor_boundary(message, pos.saturating_sub(LEFT_CONTEXT));
    let right = (pos + RIGHT_CONTEXT).max(match_end).min(message.len());
    let mut end = ceil_boundary(message, right);

    while snippet_len(message, start, end) > SNIPPET_MAX_BYTES {
        if end > match_end {
            end = previous_boundary(message, end).max(match_end);
        } else if start < pos {
            start = next_boundary(message, start).min(pos);
        } else {
            break;
        }
    }

    let prefix = if start > 0 { ELLIPSIS } else { "" };
    let suffix = if end < message.len() { ELLIPSIS } else { "" };
    format!("{}{}{}", prefix, &message[start..end], suffix)
}

/// Byte length of `message[start..end]` plus its `...` markers.
fn snippet_len(message: &str, start: usize, end: usize) -> usize {
    let prefix = if start > 0 { ELLIPSIS.len() } else { 0 };
    let suffix = if end < message.len() { ELLIPSIS.len() } else { 0 };
    prefix + (end - start) + suffix
}

/// First `SNIPPET_MAX_CHARS` characters cut back to the last whitespace.
fn leading_excerpt(message: &str) -> String {
    let cut = message
        .char_indices()
        .nth(SNIPPET_MAX_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(message.len());
    let head = &message[..cut];
    let head = match head.rfind(char::is_whitespace) {
        Some(ws) if ws > 0 => head[..ws].trim_end(),
        _ => head,
    };
    format!("{}{}", head, ELLIPSIS)
}

/// Move `idx` back to a char boundary, scanning at most 4 bytes.
fn floor_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    for _ in 0..MAX_BOUNDARY_SCAN {
        if s.is_char_boundary(i) {
            return i;
        }
        i -= 1;
    }
    i
}

/// Move `idx` forward to a char boundary, scanning at most 4 bytes.
fn ceil_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    for _ in 0..MAX_BOUNDARY_SCAN {
        if s.is_char_boundary(i) {
            return i;
        }
        i += 1;
    }
    i
}

fn previous_boundary(s: &str, idx: usize) -> usize {
    floor_boundary(s, idx.saturating_sub(1))
}

fn next_boundary(s: &str, idx: usize) -> usize {
    ceil_boundary(s, idx + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filler(len: usize) -> String {
        "lorem ipsum dolor sit amet "
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    #[test]
    fn test_empty_message() {
        assert_eq!(snippet("", "x"), EMPTY_MESSAGE);
        assert_eq!(snippet("   \n", "x"), EMPTY_MESSAGE);
    }

    #[test]
    fn test_short_message_verbatim() {
        let msg = filler(200);
        assert_eq!(snippet(&msg, "needle"), msg);
        assert_eq!(snippet("hello", ""), "hello");
    }

    #[test]
    fn test_window_around_query() {
        let mut msg = filler(300);
        msg.push_str("needle");
        msg.push_str(&filler(194));
        assert_eq!(msg.len(), 500);

        let snip = snippet(&msg, "needle");
        assert!(snip.starts_with("..."));
        assert!(snip.ends_with("..."));
        assert!(snip.contains("needle"));
        assert!(snip.len() <= SNIPPET_MAX_BYTES);
    }

    #[test]
    fn test_case_insensitive_match() {
        let mut msg = filler(400);
        msg.push_str("NeedLe");
        msg.push_str(&filler(100));
        let snip = snippet(&msg, "needle");
        assert!(snip.contains("NeedLe"));
    }

    #[test]
    fn test_token_fallback() {
        let mut msg = filler(350);
        msg.push_str("haystack");
        msg.push_str(&filler(100));
        // Full query absent, token "haystack" present; "x" is too short
        let snip = snippet(&msg, "x haystack missing");
        assert!(snip.contains("haystack"));
    }

    #[test]
    fn test_no_match_leading_excerpt() {
        let msg = filler(400);
        let snip = snippet(&msg, "absent");
        assert!(snip.ends_with("..."));
        assert!(msg.starts_with(snip.trim_end_matches("...")));
        assert!(snip.chars().count() <= SNIPPET_MAX_CHARS + 3);
        // cut at a token boundary
        let body = snip.trim_end_matches("...");
        let next = &msg[body.len()..];
        assert!(next.starts_with(char::is_whitespace));
    }

    #[test]
    fn test_match_near_start_is_flush() {
        let mut msg = String::from("needle ");
        msg.push_str(&filler(400));
        let snip = snippet(&msg, "needle");
        assert!(snip.starts_with("needle"));
        assert!(snip.ends_with("..."));
    }

    #[test]
    fn test_match_near_end_is_flush() {
        let mut msg = filler(400);
        msg.push_str(" needle");
        let snip = snippet(&msg, "needle");
        assert!(snip.starts_with("..."));
        assert!(snip.ends_with("needle"));
        assert!(snip.len() <= SNIPPET_MAX_BYTES);
    }

    #[test]
    fn test_multibyte_boundaries() {
        // 3-byte chars everywhere so byte offsets land mid-char
        let mut msg: String = "日本語のテキスト".chars().cycle().take(150).collect();
        msg.push_str("needle");
        msg.extend("日本語のテキスト".chars().cycle().take(150));

        let snip = snippet(&msg, "needle");
        assert!(snip.contains("needle"));
        assert!(std::str::from_utf8(snip.as_bytes()).is_ok());
        assert!(snip.len() <= SNIPPET_MAX_BYTES);
    }

    #[test]
    fn test_long_query_is_kept_whole() {
        let query = "z".repeat(170);
        let mut msg = filler(300);
        msg.push_str(&query);
        msg.push_str(&filler(300));

        let snip = snippet(&msg, &query);
        assert!(snip.contains(&query));
        assert!(snip.starts_with("..."));
        assert!(snip.ends_with("..."));
        assert!(snip.len() <= SNIPPET_MAX_BYTES);
    }

    #[test]
    fn test_match_longer_than_budget_overflows() {
        let query = "q".repeat(250);
        let mut msg = filler(100);
        msg.push_str(&query);
        msg.push_str(&filler(100));

        let snip = snippet(&msg, &query);
        assert_eq!(snip, format!("...{}...", query));
    }

    #[test]
    fn test_find_match_spans_multibyte() {
        assert_eq!(find_match("xx ÄÖ yy", "äö"), Some((3, 7)));
        assert_eq!(find_match("abc", "bc"), Some((1, 3)));
        assert_eq!(find_match("abc", "bd"), None);
    }

    #[test]
    fn test_find_case_insensitive_offsets() {
        assert_eq!(find_case_insensitive("Hello World", "world"), Some(6));
        assert_eq!(find_case_insensitive("ÄÖÜ abc", "abc"), Some(7));
        assert_eq!(find_case_insensitive("abc", ""), None);
        assert_eq!(find_case_insensitive("abc", "abcd"), None);
    }
}

//! Splits oversized responses into ordered, protocol-sized message chunks.

/// Placeholder sent when a response has no visible content.
pub const EMPTY_PLACEHOLDER: &str = "*(empty response)*";

/// Split `text` into ordered chunks of at most `max` bytes.
///
/// Concatenating the chunks reproduces `text` exactly. Splits prefer a
/// paragraph break at or before `max` when one starts past 30% of the
/// window, then a line break past 20%, then a hard cut at `max` snapped
/// back to a char boundary. Whitespace-only input yields a single
/// placeholder chunk rather than nothing.
///
/// `max` must be at least 4 bytes so a hard cut can always make progress
/// past any single character.
pub fn split_chunks(text: &str, max: usize) -> Vec<String> {
    debug_assert!(max >= 4);

    if text.trim().is_empty() {
        return vec![EMPTY_PLACEHOLDER.to_owned()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max {
            chunks.push(remaining.to_owned());
            break;
        }

        let at = split_point(remaining, max);
        let (head, tail) = remaining.split_at(at);
        chunks.push(head.to_owned());
        remaining = tail;
    }

    chunks
}

fn split_point(text: &str, max: usize) -> usize {
    let window_end = floor_char_boundary(text, max);
    let window = &text[..window_end];

    if let Some(idx) = window.rfind("\n\n") {
        if idx > max * 3 / 10 {
            return idx + 2;
        }
    }

    if let Some(idx) = window.rfind('\n') {
        if idx > max / 5 {
            return idx + 1;
        }
    }

    window_end
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_is_one_chunk() {
        assert_eq!(split_chunks("hello", 100), vec!["hello".to_owned()]);
    }

    #[test]
    fn empty_input_yields_placeholder() {
        assert_eq!(split_chunks("", 100), vec![EMPTY_PLACEHOLDER.to_owned()]);
        assert_eq!(split_chunks("  \n \t ", 100), vec![EMPTY_PLACEHOLDER.to_owned()]);
    }

    #[test]
    fn concatenation_reproduces_input() {
        let text = "para one\n\npara two is a bit longer\n\nshort\nlines\nhere\n".repeat(40);
        for max in [50, 128, 1950] {
            let chunks = split_chunks(&text, max);
            assert_eq!(chunks.concat(), text);
            for c in &chunks {
                assert!(c.len() <= max, "chunk of {} exceeds {max}", c.len());
                assert!(!c.is_empty());
            }
        }
    }

    #[test]
    fn hard_cut_without_boundaries() {
        let max = 64;
        let text = "x".repeat(3 * max);
        let chunks = split_chunks(&text, max);
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert_eq!(c.len(), max);
        }
    }

    #[test]
    fn prefers_paragraph_break() {
        let max = 100;
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(80));
        let chunks = split_chunks(&text, max);
        assert_eq!(chunks[0], format!("{}\n\n", "a".repeat(60)));
        assert_eq!(chunks[1], "b".repeat(80));
    }

    #[test]
    fn falls_back_to_line_break() {
        let max = 100;
        let text = format!("{}\n{}", "a".repeat(60), "b".repeat(80));
        let chunks = split_chunks(&text, max);
        assert_eq!(chunks[0], format!("{}\n", "a".repeat(60)));
        assert_eq!(chunks[1], "b".repeat(80));
    }

    #[test]
    fn early_boundary_is_ignored() {
        // A paragraph break inside the first 30% does not win over a hard cut.
        let max = 100;
        let text = format!("{}\n\n{}", "a".repeat(10), "b".repeat(200));
        let chunks = split_chunks(&text, max);
        assert_eq!(chunks[0].len(), max);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn multi_byte_text_is_not_torn() {
        let text = "é".repeat(100); // 2 bytes each
        let chunks = split_chunks(&text, 25);
        assert_eq!(chunks.concat(), text);
        for c in &chunks {
            assert!(c.len() <= 25);
            assert!(std::str::from_utf8(c.as_bytes()).is_ok());
        }
    }
}

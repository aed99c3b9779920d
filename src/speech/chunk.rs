//! Sentence-aware text chunking for synthesis requests.
//!
//! Chunks are contiguous slices of the input: concatenating them in order
//! yields the original text byte for byte.

const TERMINATORS: [char; 6] = ['.', '!', '?', '。', '！', '？'];
const CLOSERS: [char; 8] = ['"', '\'', ')', ']', '”', '’', '»', '」'];

/// Split `text` into sentences, each keeping its terminator, any closing
/// quotes and the whitespace that follows it.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !TERMINATORS.contains(&c) {
            continue;
        }

        // "?!", "..." and closing quotes belong to the same sentence
        while let Some(&(_, next)) = chars.peek() {
            if TERMINATORS.contains(&next) || CLOSERS.contains(&next) {
                chars.next();
            } else {
                break;
            }
        }

        // An ASCII terminator glued to the next word ("3.14") is not a boundary;
        // CJK punctuation is never followed by a space.
        match chars.peek() {
            Some(&(_, next)) if c.is_ascii() && !next.is_whitespace() => continue,
            _ => {}
        }

        while let Some(&(_, next)) = chars.peek() {
            if next.is_whitespace() {
                chars.next();
            } else {
                break;
            }
        }

        let end = chars.peek().map(|&(i, _)| i).unwrap_or(text.len());
        sentences.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

/// Split `text` into chunks of at most `limit` characters, preferring
/// sentence boundaries.
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.chars().count() <= limit {
        return if text.is_empty() { Vec::new() } else { vec![text.to_string()] };
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in split_sentences(text) {
        let sentence_len = sentence.chars().count();

        if current_len + sentence_len <= limit {
            current.push_str(sentence);
            current_len += sentence_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if sentence_len <= limit {
            current.push_str(sentence);
            current_len = sentence_len;
        } else {
            let mut pieces = split_long(sentence, limit);
            // The tail can still share a chunk with the following sentences
            if let Some(tail) = pieces.pop() {
                chunks.extend(pieces);
                current_len = tail.chars().count();
                current = tail;
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Break one oversized sentence at the last whitespace within the limit, or
/// on a character boundary when there is none.
fn split_long(sentence: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = sentence;

    while rest.chars().count() > limit {
        let window_end = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..window_end];

        let cut = window
            .char_indices()
            .filter(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .last()
            .filter(|&i| i > 0)
            .unwrap_or(window_end);

        pieces.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }

    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_story() -> String {
        let sentences = [
            "Ngày xưa, có một cô bé sống ở làng bên sông. ",
            "Cô thích nấu ăn cho cả nhà! ",
            "Bạn có biết món nào cô nấu ngon nhất không? ",
            "\"Đó là phở,\" bà nói. ",
            "Mỗi sáng, mùi quế và hồi lan khắp xóm…\n\n",
        ];
        sentences.iter().cycle().take(120).copied().collect()
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        assert_eq!(chunk_text("Xin chào.", 2000), vec!["Xin chào.".to_string()]);
        assert!(chunk_text("", 2000).is_empty());
    }

    #[test]
    fn test_chunks_reassemble_exactly() {
        let story = sample_story();
        for limit in [50, 137, 500, 2000] {
            let chunks = chunk_text(&story, limit);
            assert_eq!(chunks.concat(), story, "limit {}", limit);
            assert!(chunks.iter().all(|c| c.chars().count() <= limit), "limit {}", limit);
        }
    }

    #[test]
    fn test_chunks_end_on_sentence_boundaries() {
        let story = sample_story();
        let chunks = chunk_text(&story, 200);
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            let trimmed = chunk.trim_end();
            assert!(
                trimmed.ends_with(['.', '!', '?', '"']),
                "chunk ends mid-sentence: {:?}",
                chunk
            );
        }
    }

    #[test]
    fn test_sentence_split_keeps_terminators_and_quotes() {
        let sentences = split_sentences("Really?! \"Yes.\" Pi is 3.14 today. 好。再见");
        assert_eq!(sentences, vec!["Really?! ", "\"Yes.\" ", "Pi is 3.14 today. ", "好。", "再见"]);
    }

    #[test]
    fn test_oversized_sentence_splits_on_whitespace() {
        let sentence = "word ".repeat(30);
        let chunks = chunk_text(&sentence, 12);
        assert_eq!(chunks.concat(), sentence);
        assert!(chunks.iter().all(|c| c.chars().count() <= 12));
        assert!(chunks[..chunks.len() - 1].iter().all(|c| c.ends_with(' ')));
    }

    #[test]
    fn test_unbroken_text_hard_splits_on_char_boundary() {
        let text = "\u{1eaf}".repeat(25);
        let chunks = chunk_text(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }
}

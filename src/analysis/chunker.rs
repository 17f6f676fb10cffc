//! Boundary-aware document chunking.
//!
//! Chunks are cut at the strongest boundary available inside the size window:
//! paragraph, then line, then sentence, then word. A hard character cut only
//! happens when a single word is longer than `max_chars`. Consecutive chunks
//! share up to `overlap` characters, snapped forward to the start of a word.
//!
//! Chunking is lazy and restartable: `Chunks` is a cheap description of the
//! split and every call to `iter()` replays it from the beginning.

use super::config::AnalysisConfig;
use super::error::AnalysisError;
use super::types::{Chunk, Document};

/// Separator groups in order of preference.
const BOUNDARY_LEVELS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? ", "; "]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chars: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(max_chars: usize, overlap: usize) -> Result<Self, AnalysisError> {
        if max_chars == 0 {
            return Err(AnalysisError::configuration("max_chars must be greater than 0"));
        }
        if overlap >= max_chars {
            return Err(AnalysisError::configuration(format!(
                "overlap ({}) must be smaller than max_chars ({})",
                overlap, max_chars
            )));
        }
        Ok(Self { max_chars, overlap })
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Self::new(config.max_chars, config.overlap)
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn chunk<'a>(&self, document: &'a Document) -> Chunks<'a> {
        self.chunk_text(document.text())
    }

    pub fn chunk_text<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            chunker: *self,
        }
    }
}

/// Splits `document` into chunks of at most `max_chars` characters.
pub fn chunk(
    document: &Document,
    max_chars: usize,
    overlap: usize,
) -> Result<Chunks<'_>, AnalysisError> {
    Ok(Chunker::new(max_chars, overlap)?.chunk(document))
}

/// A replayable chunk sequence over one text.
#[derive(Debug, Clone, Copy)]
pub struct Chunks<'a> {
    text: &'a str,
    chunker: Chunker,
}

impl<'a> Chunks<'a> {
    pub fn iter(&self) -> ChunkIter<'a> {
        ChunkIter {
            text: self.text,
            chunker: self.chunker,
            next_start: 0,
            index: 0,
            done: self.text.is_empty(),
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }
}

impl<'a> IntoIterator for Chunks<'a> {
    type Item = Chunk;
    type IntoIter = ChunkIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &Chunks<'a> {
    type Item = Chunk;
    type IntoIter = ChunkIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct ChunkIter<'a> {
    text: &'a str,
    chunker: Chunker,
    next_start: usize,
    index: usize,
    done: bool,
}

impl Iterator for ChunkIter<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let text = self.text;
        let start = self.next_start;
        let limit = advance_chars(text, start, self.chunker.max_chars);
        let end = if limit >= text.len() {
            text.len()
        } else {
            find_break(text, start, limit, self.chunker.max_chars)
        };

        let chunk = Chunk {
            index: self.index,
            start,
            end,
            text: text[start..end].to_string(),
        };
        self.index += 1;

        if end >= text.len() {
            self.done = true;
        } else {
            self.next_start = next_start(text, start, end, self.chunker.overlap);
        }

        Some(chunk)
    }
}

impl std::iter::FusedIterator for ChunkIter<'_> {}

/// Picks the end of a chunk starting at `start` whose window ends at `limit`.
fn find_break(text: &str, start: usize, limit: usize, max_chars: usize) -> usize {
    let window = &text[start..limit];
    let min_fill = advance_chars(text, start, max_chars / 2);

    for separators in BOUNDARY_LEVELS {
        let candidate = separators
            .iter()
            .filter_map(|sep| window.rfind(sep).map(|pos| start + pos + sep.len()))
            .max();
        if let Some(pos) = candidate {
            if pos >= min_fill && pos > start {
                return pos;
            }
        }
    }

    // the window already ends on a word boundary
    if text[limit..].starts_with(char::is_whitespace) {
        return limit;
    }

    if let Some((pos, ws)) = window
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
    {
        return start + pos + ws.len_utf8();
    }

    // a single word longer than max_chars
    limit
}

/// Start of the chunk after `[start, end)`, reaching back by `overlap` characters.
fn next_start(text: &str, start: usize, end: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return end;
    }

    let reach = retreat_chars(text, end, overlap);
    match snap_to_word_start(text, reach, end) {
        Some(pos) if pos > start => pos,
        _ => end,
    }
}

fn snap_to_word_start(text: &str, from: usize, end: usize) -> Option<usize> {
    let mut prev_ws = text[..from]
        .chars()
        .next_back()
        .map_or(true, char::is_whitespace);

    for (offset, c) in text[from..end].char_indices() {
        let is_ws = c.is_whitespace();
        if prev_ws && !is_ws {
            return Some(from + offset);
        }
        prev_ws = is_ws;
    }
    None
}

/// Byte position `n` characters after `from`, capped at the end of `text`.
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(offset, _)| from + offset)
        .unwrap_or(text.len())
}

/// Byte position `n` characters before `to`, floored at zero.
fn retreat_chars(text: &str, to: usize, n: usize) -> usize {
    if n == 0 {
        return to;
    }
    text[..to]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(offset, _)| offset)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::DocumentMetadata;

    fn doc(text: &str) -> Document {
        Document::new("test", text, DocumentMetadata::default())
    }

    fn reconstruct(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        let mut prev_end = 0;
        for chunk in chunks {
            assert!(chunk.start <= prev_end, "gap before chunk {}", chunk.index);
            out.push_str(&chunk.text[prev_end - chunk.start..]);
            prev_end = chunk.end;
        }
        out
    }

    fn assert_well_formed(text: &str, chunker: Chunker) {
        let chunks: Vec<Chunk> = chunker.chunk_text(text).iter().collect();
        let mut last_start = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(chunk.start < chunk.end);
            assert!(chunk.end <= text.len());
            assert!(chunk.start >= last_start);
            assert_eq!(&text[chunk.start..chunk.end], chunk.text);
            assert!(chunk.text.chars().count() <= chunker.max_chars());
            last_start = chunk.start;
        }
        for pair in chunks.windows(2) {
            let shared = &text[pair[1].start..pair[0].end];
            assert!(shared.chars().count() <= chunker.overlap());
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let document = doc("");
        let chunks = chunk(&document, 100, 10).unwrap();
        assert_eq!(chunks.iter().count(), 0);
    }

    #[test]
    fn invalid_parameters_are_configuration_errors() {
        assert!(matches!(
            Chunker::new(0, 0),
            Err(AnalysisError::Configuration(_))
        ));
        assert!(matches!(
            Chunker::new(50, 50),
            Err(AnalysisError::Configuration(_))
        ));
        assert!(Chunker::new(50, 49).is_ok());
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let document = doc("Fees are disclosed in Schedule A.");
        let chunks: Vec<Chunk> = chunk(&document, 100, 20).unwrap().iter().collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, document.len());
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let first = "Our advisory fee is 1% of assets under management per year.";
        let second = "Investments may lose principal and are not insured.";
        let text = format!("{}\n\n{}", first, second);
        let chunker = Chunker::new(80, 0).unwrap();
        let chunks: Vec<Chunk> = chunker.chunk_text(&text).iter().collect();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, format!("{}\n\n", first));
        assert_eq!(chunks[1].text, second);
    }

    #[test]
    fn falls_back_to_sentence_then_word_boundaries() {
        let text = "Past performance does not guarantee future results. \
                    Diversification does not ensure a profit or protect against loss in \
                    declining markets under any circumstances whatsoever.";
        let chunker = Chunker::new(60, 0).unwrap();
        let chunks: Vec<Chunk> = chunker.chunk_text(text).iter().collect();

        assert_eq!(
            chunks[0].text,
            "Past performance does not guarantee future results. "
        );
        for chunk in &chunks {
            if chunk.end < text.len() {
                let before = text[..chunk.end].chars().next_back().unwrap();
                let after = text[chunk.end..].chars().next().unwrap();
                assert!(
                    before.is_whitespace() || after.is_whitespace(),
                    "chunk {} cut mid-word",
                    chunk.index
                );
            }
        }
        assert_well_formed(text, chunker);
    }

    #[test]
    fn hard_cuts_only_oversized_words() {
        let text = "x".repeat(50);
        let chunker = Chunker::new(20, 0).unwrap();
        let lengths: Vec<usize> = chunker
            .chunk_text(&text)
            .iter()
            .map(|c| c.text.len())
            .collect();
        assert_eq!(lengths, vec![20, 20, 10]);
    }

    #[test]
    fn consecutive_chunks_overlap_on_word_starts() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunker = Chunker::new(20, 8).unwrap();
        let chunks: Vec<Chunk> = chunker.chunk_text(text).iter().collect();

        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            assert!(pair[1].start < pair[0].end, "expected overlap");
            let prev = text[..pair[1].start].chars().next_back().unwrap();
            assert!(prev.is_whitespace());
        }
        assert_well_formed(text, chunker);
    }

    #[test]
    fn reconstruction_holds_across_inputs() {
        let samples = [
            "Short.",
            "A sentence. Another sentence! A question? Yes; a clause.\nNew line here.\n\nParagraph.",
            "Rendite garantiert – Anleger können ihr Kapital verlieren. Frühere Wertentwicklung ist kein Indikator.",
            "  leading whitespace and trailing whitespace   ",
            "word ".repeat(300).as_str(),
        ]
        .map(str::to_string);

        for text in &samples {
            for (max_chars, overlap) in [(10, 0), (25, 5), (40, 39), (200, 50)] {
                assert_well_formed(text, Chunker::new(max_chars, overlap).unwrap());
            }
        }
    }

    #[test]
    fn iteration_is_restartable_and_deterministic() {
        let document = doc(&"Act now. Limited time offer on our fund. ".repeat(20));
        let chunks = chunk(&document, 64, 16).unwrap();

        let first: Vec<Chunk> = chunks.iter().collect();
        let second: Vec<Chunk> = (&chunks).into_iter().collect();
        assert_eq!(first, second);

        let mut iter = chunks.iter();
        iter.next();
        let resumed: Vec<Chunk> = iter.clone().collect();
        let continued: Vec<Chunk> = iter.collect();
        assert_eq!(resumed, continued);
        assert_eq!(resumed, first[1..].to_vec());
    }
}

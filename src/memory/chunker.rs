//! Deterministic text chunking for the knowledge base.
//!
//! Pure text transformation - no embedding calls. Splitting prefers
//! paragraph boundaries, then sentence boundaries, and only windows raw
//! text (with overlap) when a single sentence exceeds the chunk size.
//! Character counts are grapheme-aware so windows never split a cluster.

use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// Default target chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between windows of an oversized sentence.
pub const DEFAULT_OVERLAP: usize = 100;

/// Sentence boundary: terminal punctuation followed by whitespace.
static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").unwrap_or_else(|_| unreachable!()));

/// Character length of a string (grapheme clusters).
fn char_len(text: &str) -> usize {
    text.graphemes(true).count()
}

/// Splits text into chunks of at most `chunk_size` characters with
/// `overlap`-character overlap for windowed oversized sentences.
///
/// Guarantees `chunks.len() >= 1` for non-empty input and that the
/// concatenation of chunks recovers the input up to paragraph/sentence
/// boundary whitespace.
#[must_use]
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }

    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .collect();

    let largest = paragraphs.iter().map(|p| char_len(p)).max().unwrap_or(0);
    if largest <= chunk_size && !paragraphs.is_empty() {
        return combine_units(&paragraphs, chunk_size, "\n\n");
    }

    // Oversized paragraphs: fall back to sentence-level assembly.
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if char_len(&sentence) > chunk_size {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(window_text(&sentence, chunk_size, overlap));
        } else if current.is_empty() {
            current = sentence;
        } else if char_len(&current) + char_len(&sentence) + 1 <= chunk_size {
            current.push(' ');
            current.push_str(&sentence);
        } else {
            chunks.push(std::mem::take(&mut current));
            current = sentence;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(text.to_string());
    }
    chunks
}

/// Chunks with the default size and overlap.
#[must_use]
pub fn chunk_text_default(text: &str) -> Vec<String> {
    chunk_text(text, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP)
}

/// Greedily combines units (paragraphs) into chunks up to `chunk_size`,
/// joining with `sep`.
fn combine_units(units: &[&str], chunk_size: usize, sep: &str) -> Vec<String> {
    let sep_len = char_len(sep);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for unit in units {
        if current.is_empty() {
            current = (*unit).to_string();
        } else if char_len(&current) + char_len(unit) + sep_len <= chunk_size {
            current.push_str(sep);
            current.push_str(unit);
        } else {
            chunks.push(std::mem::take(&mut current));
            current = (*unit).to_string();
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Splits on sentence-terminal punctuation followed by whitespace,
/// keeping the punctuation with the sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        // Terminal punctuation is a single ASCII byte.
        let end = boundary.start() + 1;
        if end > start {
            sentences.push(text[start..end].to_string());
        }
        start = boundary.end();
    }
    if start < text.len() {
        sentences.push(text[start..].to_string());
    }
    sentences
}

/// Windows raw text into `chunk_size`-character pieces stepping by
/// `chunk_size - overlap`, on grapheme boundaries.
fn window_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let boundaries: Vec<usize> = text.grapheme_indices(true).map(|(i, _)| i).collect();
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut i = 0;
    while i < boundaries.len() {
        let end = i + chunk_size;
        let byte_start = boundaries[i];
        let byte_end = if end >= boundaries.len() {
            text.len()
        } else {
            boundaries[end]
        };
        chunks.push(text[byte_start..byte_end].to_string());
        if end >= boundaries.len() {
            break;
        }
        i += step;
    }
    chunks
}

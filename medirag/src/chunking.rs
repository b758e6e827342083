//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! cuts text at the coarsest available boundary (paragraph, line, word, then
//! raw character) while keeping every chunk within the configured size.
//! Consecutive chunks of a document overlap by exactly `chunk_overlap`
//! characters, so the tail of one chunk is repeated at the head of the next.
//!
//! All lengths are counted in `char`s, never bytes.

use crate::document::{Chunk, Document, META_CHUNK_INDEX};

/// Separators tried in order, coarsest first. When none fits, the text is cut
/// at a raw character boundary.
pub const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the ingestion pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no non-whitespace text.
    /// Each returned chunk has an empty embedding vector.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text hierarchically: paragraphs → lines → words → characters.
///
/// For each chunk the splitter looks at the next `chunk_size` characters and
/// cuts after the last paragraph separator (`\n\n`) in that window. If there
/// is none, it falls back to the last newline, then the last space, and
/// finally cuts at exactly `chunk_size` characters. The next chunk starts
/// `chunk_overlap` characters before the cut.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`, so re-chunking
/// the same document always yields the same IDs. Each chunk inherits the
/// parent document's metadata plus `chunk_index`, `start_char` and `end_char`.
///
/// # Example
///
/// ```rust,ignore
/// use medirag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(800, 120);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of characters shared by consecutive chunks
    ///
    /// An overlap that is not smaller than the chunk size is clamped to
    /// `chunk_size - 1`; configuration validation rejects such values earlier.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into chunk strings without building [`Chunk`]s.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let offsets = char_offsets(text);
        chunk_spans(text, &offsets, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .map(|(start, end)| text[offsets[start]..offsets[end]].to_string())
            .collect()
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.is_blank() {
            return Vec::new();
        }

        let text = &document.text;
        let offsets = char_offsets(text);

        chunk_spans(text, &offsets, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| {
                let mut metadata = document.metadata.clone();
                metadata.insert(META_CHUNK_INDEX.to_string(), i.to_string());
                metadata.insert("start_char".to_string(), start.to_string());
                metadata.insert("end_char".to_string(), end.to_string());
                Chunk {
                    id: format!("{}_{i}", document.id),
                    text: text[offsets[start]..offsets[end]].to_string(),
                    embedding: Vec::new(),
                    metadata,
                    document_id: document.id.clone(),
                }
            })
            .collect()
    }
}

/// Split every document with a [`RecursiveChunker`], preserving document order.
pub fn split_documents(documents: &[Document], chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let chunker = RecursiveChunker::new(chunk_size, chunk_overlap);
    documents.iter().flat_map(|document| chunker.chunk(document)).collect()
}

/// Byte offset of every char boundary, including the end of the text.
fn char_offsets(text: &str) -> Vec<usize> {
    text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect()
}

/// Compute `[start, end)` char spans for each chunk.
///
/// Requires `chunk_overlap < chunk_size`. Every span is at most `chunk_size`
/// chars and each span starts exactly `chunk_overlap` chars before the
/// previous one ends.
fn chunk_spans(
    text: &str,
    offsets: &[usize],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<(usize, usize)> {
    let total = offsets.len() - 1;
    if total == 0 {
        return Vec::new();
    }

    let mut spans = Vec::new();
    let mut start = 0;

    loop {
        if total - start <= chunk_size {
            spans.push((start, total));
            break;
        }

        let limit = start + chunk_size;
        // The cut must land past the overlap, otherwise the next chunk would
        // not advance.
        let min_cut = start + chunk_overlap + 1;
        let end = find_break(text, offsets, start, limit, min_cut).unwrap_or(limit);

        spans.push((start, end));
        start = end - chunk_overlap;
    }

    spans
}

/// Find the char position just after the last occurrence of the coarsest
/// separator inside `[start, limit)` such that the cut is at least `min_cut`.
fn find_break(
    text: &str,
    offsets: &[usize],
    start: usize,
    limit: usize,
    min_cut: usize,
) -> Option<usize> {
    let window_start = offsets[start];
    let window = &text[window_start..offsets[limit]];

    for separator in SEPARATORS {
        let Some(pos) = window.rfind(separator) else {
            continue;
        };
        // Separators are ASCII, so their byte length equals their char length.
        let Ok(char_pos) = offsets.binary_search(&(window_start + pos)) else {
            continue;
        };
        let cut = char_pos + separator.len();
        if cut >= min_cut {
            return Some(cut);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str, size: usize, overlap: usize) -> Vec<String> {
        RecursiveChunker::new(size, overlap).split_text(text)
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        assert_eq!(split("aaaa\n\nbbbb\n\ncccc", 10, 0), vec!["aaaa\n\n", "bbbb\n\ncccc"]);
    }

    #[test]
    fn falls_back_to_line_boundaries() {
        assert_eq!(split("aaaa\nbbbb\ncccc", 10, 0), vec!["aaaa\nbbbb\n", "cccc"]);
    }

    #[test]
    fn falls_back_to_spaces_with_overlap() {
        assert_eq!(split("one two three four", 10, 2), vec!["one two ", "o three ", "e four"]);
    }

    #[test]
    fn cuts_raw_characters_when_no_separator_fits() {
        assert_eq!(split("abcdefghijklmnop", 5, 1), vec!["abcde", "efghi", "ijklm", "mnop"]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(12);
        let chunks = split(&text, 5, 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
        assert_eq!(chunks[0], "ééééé");
        assert_eq!(chunks.len(), 4);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let text = "Fever means body temperature above 38°C.";
        assert_eq!(split(text, 40, 5), vec![text]);
    }

    #[test]
    fn blank_documents_produce_no_chunks() {
        let chunker = RecursiveChunker::new(100, 10);
        assert!(chunker.chunk(&Document::new("empty", "")).is_empty());
        assert!(chunker.chunk(&Document::new("blank", "  \n\n \t")).is_empty());
    }

    #[test]
    fn chunks_carry_ids_and_metadata() {
        let document = Document::new("notes.md", "alpha beta gamma delta epsilon")
            .with_metadata("file_type", "md");
        let chunks = RecursiveChunker::new(12, 3).chunk(&document);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, format!("notes.md_{i}"));
            assert_eq!(chunk.document_id, "notes.md");
            assert_eq!(chunk.metadata["chunk_index"], i.to_string());
            assert_eq!(chunk.metadata["file_type"], "md");
            assert!(chunk.embedding.is_empty());
        }
        assert_eq!(chunks[0].metadata["start_char"], "0");
    }

    #[test]
    fn oversized_overlap_is_clamped() {
        let chunker = RecursiveChunker::new(4, 10);
        assert_eq!(chunker.chunk_overlap(), 3);
        let chunks = chunker.split_text("abcdefgh");
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
    }

    #[test]
    fn split_documents_keeps_document_order() {
        let docs = vec![Document::new("a", "first document"), Document::new("b", "second")];
        let chunks = split_documents(&docs, 100, 10);
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a_0", "b_0"]);
    }
}

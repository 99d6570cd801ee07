//! Overlapping sliding-window text chunker.
//!
//! Splits each [`Document`]'s content into [`Chunk`]s of at most
//! `window_size` characters. Consecutive chunks of the same document share
//! exactly `overlap` characters, so dropping the first `overlap` characters
//! of every chunk after the first and concatenating reconstructs the
//! original content.
//!
//! # Algorithm
//!
//! 1. Content no longer than the window becomes a single chunk.
//! 2. Otherwise a window is opened at `start` and its end is chosen as the
//!    latest natural boundary in `[start + min_len, start + window_size]`,
//!    trying paragraph breaks (`\n\n`), line breaks, sentence ends (`". "`),
//!    then spaces. With no boundary the window is cut hard.
//! 3. The next window starts at `end - overlap`.
//! 4. The final window runs to the end of the content and may be shorter.
//!
//! Lengths and offsets are counted in Unicode scalar values, never bytes.
//!
//! # Example
//!
//! ```rust
//! use docchat_core::chunk::Chunker;
//! use docchat_core::models::Document;
//!
//! let chunker = Chunker::new(1000, 200).unwrap();
//! let doc = Document::new("Hello world.").with_metadata("source", "a.pdf");
//! let chunks = chunker.split(&[doc]);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "Hello world.");
//! ```

use std::collections::HashMap;
use std::ops::Range;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Chunk, Document};

pub const DEFAULT_WINDOW_SIZE: usize = 1000;
pub const DEFAULT_OVERLAP: usize = 200;

/// Boundaries tried in order of preference when closing a window.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Splits documents into overlapping fixed-size windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    window_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl Chunker {
    /// Create a chunker. Requires `window_size > 0` and `overlap < window_size`.
    pub fn new(window_size: usize, overlap: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(Error::FatalConfig(
                "chunking.window_size must be > 0".to_string(),
            ));
        }
        if overlap >= window_size {
            return Err(Error::FatalConfig(format!(
                "chunking.overlap ({}) must be smaller than chunking.window_size ({})",
                overlap, window_size
            )));
        }
        Ok(Self {
            window_size,
            overlap,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split every document into chunks, in input order.
    ///
    /// Each chunk's metadata is a copy of its document's metadata plus
    /// `chunk_index`, `char_start` and `char_end`. Blank documents yield
    /// no chunks.
    pub fn split(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut ordinals: HashMap<&str, usize> = HashMap::new();
        let mut chunks = Vec::new();

        for doc in documents {
            let source = doc.source().unwrap_or("");
            let ordinal = ordinals.entry(source).or_insert(0);
            let doc_ordinal = *ordinal;
            *ordinal += 1;

            if doc.content.trim().is_empty() {
                continue;
            }

            let chars: Vec<char> = doc.content.chars().collect();
            for (index, span) in self.windows(&chars).into_iter().enumerate() {
                let mut metadata = doc.metadata.clone();
                metadata.insert("chunk_index".to_string(), index.into());
                metadata.insert("char_start".to_string(), span.start.into());
                metadata.insert("char_end".to_string(), span.end.into());

                chunks.push(Chunk {
                    id: chunk_id(source, doc_ordinal, index),
                    text: chars[span].iter().collect(),
                    metadata,
                });
            }
        }

        chunks
    }

    /// Compute the character spans of every window over `chars`.
    pub fn windows(&self, chars: &[char]) -> Vec<Range<usize>> {
        let len = chars.len();
        if len == 0 {
            return Vec::new();
        }

        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            let hard_end = (start + self.window_size).min(len);
            if hard_end == len {
                spans.push(start..len);
                break;
            }
            let end = self.break_point(chars, start, hard_end);
            spans.push(start..end);
            start = end - self.overlap;
        }
        spans
    }

    /// Latest natural boundary in `[start + min_len, hard_end]`, or `hard_end`.
    ///
    /// The lower bound keeps every window longer than the overlap, so each
    /// step makes progress.
    fn break_point(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let min_end = start + (self.overlap + 1).max(self.window_size / 2);
        if min_end >= hard_end {
            return hard_end;
        }
        for sep in SEPARATORS {
            let sep: Vec<char> = sep.chars().collect();
            for end in (min_end..=hard_end).rev() {
                if end >= sep.len() && chars[end - sep.len()..end] == sep[..] {
                    return end;
                }
            }
        }
        hard_end
    }
}

/// Deterministic chunk id from the blob key, the document's position among
/// that key's documents, and the chunk's position within the document.
fn chunk_id(source: &str, doc_ordinal: usize, chunk_index: usize) -> String {
    let name = format!("docchat:{}#{}#{}", source, doc_ordinal, chunk_index);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// Convenience wrapper: split with the default 1000/200 window.
pub fn split_documents(documents: &[Document]) -> Vec<Chunk> {
    Chunker::default().split(documents)
}

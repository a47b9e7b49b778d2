//! Index build: load the source document into pages and split the pages into
//! overlapping chunks.
//!
//! Splitting is recursive on a separator ladder (paragraph, line, word,
//! character). Sizes are measured in characters.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::types::{Corpus, DocumentChunk, SourcePage};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1000, chunk_overlap: 200 }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(Error::InvalidConfig(format!("chunk_overlap ({chunk_overlap}) must be smaller than a non-zero chunk_size ({chunk_size})")).into());
        }
        Ok(Self { chunk_size, chunk_overlap })
    }
}

#[derive(Default)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
}

impl DataProcessor {
    pub fn new(chunking_config: ChunkingConfig) -> Self { Self { chunking_config } }

    pub fn chunking_config(&self) -> ChunkingConfig { self.chunking_config }

    /// Load `source` and split it into a read-only corpus.
    pub fn build(&self, source: &Path) -> Result<Corpus> {
        let pages = load_pages(source)?;
        let chunks = self.chunk_pages(&pages);
        if chunks.is_empty() {
            warn!("No text could be extracted from {}", source.display());
        }
        info!("Built corpus from {}: {} pages, {} chunks", source.display(), pages.len(), chunks.len());
        Ok(Corpus::new(pages, chunks))
    }

    /// Split every page, numbering chunks globally in page order.
    pub fn chunk_pages(&self, pages: &[SourcePage]) -> Vec<DocumentChunk> {
        let mut chunks = Vec::new();
        for page in pages {
            let doc_id = doc_id(&page.source);
            for (offset, content) in self.split_with_offsets(&page.text) {
                let chunk_index = chunks.len();
                chunks.push(DocumentChunk { id: format!("{doc_id}:{chunk_index}"), source: page.source.clone(), page: page.page, offset, chunk_index, parent_id: None, content });
            }
        }
        debug!("Chunked {} pages into {} chunks", pages.len(), chunks.len());
        chunks
    }

    /// Split `text` into chunks of at most `chunk_size` characters.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with_offsets(text).into_iter().map(|(_, chunk)| chunk).collect()
    }

    /// Like [`Self::split_text`], paired with each chunk's byte offset in
    /// `text`. Every chunk is the exact slice `text[offset..offset + len]`.
    pub fn split_with_offsets(&self, text: &str) -> Vec<(usize, String)> {
        split_recursive(text, (0, text), &SEPARATORS, &self.chunking_config)
            .into_iter()
            .map(|(offset, chunk)| (offset, chunk.to_string()))
            .collect()
    }
}

/// Document id used as the chunk id prefix: the source file stem.
pub fn doc_id(source: &str) -> String {
    Path::new(source).file_stem().map_or_else(|| "doc".to_string(), |s| s.to_string_lossy().to_string())
}

/// A byte offset into the page and the text starting there.
type Span<'a> = (usize, &'a str);

fn char_len(s: &str) -> usize { s.chars().count() }

fn span_end((start, text): Span<'_>) -> usize { start + text.len() }

fn split_recursive<'a>(page: &'a str, span: Span<'a>, separators: &[&str], cfg: &ChunkingConfig) -> Vec<Span<'a>> {
    let (base, text) = span;
    // Pick the first separator present in the text; "" always matches.
    let (idx, separator) = separators
        .iter()
        .enumerate()
        .find(|(_, s)| s.is_empty() || text.contains(**s))
        .map_or((separators.len(), ""), |(i, s)| (i, *s));
    let remaining = separators.get(idx + 1..).unwrap_or(&[]);

    let pieces: Vec<Span<'a>> = if separator.is_empty() {
        text.char_indices().map(|(i, c)| (base + i, &text[i..i + c.len_utf8()])).collect()
    } else {
        let mut pos = 0;
        let mut pieces = Vec::new();
        for part in text.split(separator) {
            if !part.is_empty() { pieces.push((base + pos, part)); }
            pos += part.len() + separator.len();
        }
        pieces
    };

    let mut out = Vec::new();
    let mut fitting: Vec<Span<'a>> = Vec::new();
    for piece in pieces {
        if char_len(piece.1) < cfg.chunk_size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            out.extend(merge_pieces(page, &fitting, cfg));
            fitting.clear();
        }
        if remaining.is_empty() {
            out.extend(trimmed(piece));
        } else {
            out.extend(split_recursive(page, piece, remaining, cfg));
        }
    }
    if !fitting.is_empty() {
        out.extend(merge_pieces(page, &fitting, cfg));
    }
    out
}

/// Greedily pack consecutive pieces into page slices of at most `chunk_size`
/// characters, carrying up to `chunk_overlap` characters of trailing pieces
/// into the next chunk.
fn merge_pieces<'a>(page: &'a str, pieces: &[Span<'a>], cfg: &ChunkingConfig) -> Vec<Span<'a>> {
    let width = |window: &VecDeque<Span<'a>>, end: usize| window.front().map_or(0, |&(start, _)| char_len(&page[start..end]));
    let mut docs = Vec::new();
    let mut window: VecDeque<Span<'a>> = VecDeque::new();

    for &piece in pieces {
        let piece_end = span_end(piece);
        if let Some(&last) = window.back() {
            if width(&window, piece_end) > cfg.chunk_size {
                docs.extend(window_slice(page, &window));
                let window_end = span_end(last);
                while !window.is_empty() && (width(&window, window_end) > cfg.chunk_overlap || width(&window, piece_end) > cfg.chunk_size) {
                    window.pop_front();
                }
            }
        }
        window.push_back(piece);
    }
    docs.extend(window_slice(page, &window));
    docs
}

fn window_slice<'a>(page: &'a str, window: &VecDeque<Span<'a>>) -> Option<Span<'a>> {
    let (&(start, _), &last) = (window.front()?, window.back()?);
    trimmed((start, &page[start..span_end(last)]))
}

/// Trim surrounding whitespace, keeping the offset on the first kept byte.
fn trimmed((start, text): Span<'_>) -> Option<Span<'_>> {
    let lead = text.len() - text.trim_start().len();
    let kept = text.trim();
    (!kept.is_empty()).then_some((start + lead, kept))
}

/// Load a source document as pages: PDFs page by page, anything else as text
/// with form feeds as page breaks.
pub fn load_pages(source: &Path) -> Result<Vec<SourcePage>> {
    let is_pdf = source.extension().and_then(|s| s.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if is_pdf { load_pdf_pages(source) } else { load_text_pages(source) }
}

fn load_text_pages(source: &Path) -> Result<Vec<SourcePage>> {
    let content = match fs::read_to_string(source) {
        Ok(content) => content,
        Err(_) => String::from_utf8_lossy(&fs::read(source).with_context(|| format!("Failed to read {}", source.display()))?).to_string(),
    };
    let name = source.to_string_lossy().to_string();
    Ok(content
        .split('\u{c}')
        .enumerate()
        .map(|(i, text)| SourcePage { source: name.clone(), page: i as u32 + 1, text: text.to_string() })
        .filter(|p| !p.text.trim().is_empty())
        .collect())
}

fn load_pdf_pages(source: &Path) -> Result<Vec<SourcePage>> {
    let doc = lopdf::Document::load(source).with_context(|| format!("Failed to load PDF {}", source.display()))?;
    let name = source.to_string_lossy().to_string();
    let mut pages = Vec::new();
    // get_pages is keyed by 1-based page number, already in order.
    for page_num in doc.get_pages().into_keys() {
        match doc.extract_text(&[page_num]) {
            Ok(text) if !text.trim().is_empty() => pages.push(SourcePage { source: name.clone(), page: page_num, text }),
            Ok(_) => debug!("Page {} of {} has no text layer", page_num, source.display()),
            Err(e) => warn!("Failed to extract text from page {} of {}: {}", page_num, source.display(), e),
        }
    }
    info!("Loaded {} pages from {}", pages.len(), source.display());
    Ok(pages)
}

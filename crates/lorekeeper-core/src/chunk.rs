//! Overlapping passage chunker.
//!
//! Splits document text into [`Chunk`]s whose new content never exceeds
//! `max_chars` bytes. Each chunk after the first also carries up to
//! `overlap_chars` bytes of the preceding text so a passage keeps its
//! leading context.
//!
//! # Algorithm
//!
//! 1. Split the text into paragraphs (runs of non-blank lines).
//! 2. Paragraphs longer than `max_chars` are split into sentences
//!    (`.`, `!`, `?` followed by whitespace, or a line break).
//! 3. Sentences still longer than `max_chars` are hard-split at the last
//!    whitespace before the limit, or at the limit itself, always on a
//!    UTF-8 character boundary.
//! 4. Units are packed greedily: a chunk grows until adding the next unit
//!    would push its new content past `max_chars`.
//! 5. A chunk's start is then pulled back by `overlap_chars` and snapped
//!    forward to the next word start.
//!
//! Chunk text is always the exact slice `text[start..end]`, so offsets
//! point back into the source. Empty and whitespace-only documents
//! produce no chunks.
//!
//! Chunk IDs are UUID v5 over the source path, ordinal, and file
//! fingerprint: re-chunking unchanged content yields the same IDs, and
//! any content change yields fresh ones.

use std::ops::Range;

use uuid::Uuid;

use crate::models::{embedding_input, fingerprint, Chunk};
use crate::progression::ProgressionTag;

/// Split `text` into byte ranges per the module-level algorithm.
pub fn split_spans(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<Range<usize>> {
    let max = max_chars.max(1);
    let overlap = overlap_chars.min(max - 1);

    let mut units = Vec::new();
    for para in paragraphs(text) {
        if para.len() <= max {
            units.push(para);
            continue;
        }
        for sentence in sentences(text, para) {
            if sentence.len() <= max {
                units.push(sentence);
            } else {
                units.extend(hard_split(text, sentence, max));
            }
        }
    }

    let mut spans: Vec<Range<usize>> = Vec::new();
    let mut i = 0;
    while i < units.len() {
        let new_start = units[i].start;
        let mut end = units[i].end;
        let mut j = i + 1;
        while j < units.len() && units[j].end - new_start <= max {
            end = units[j].end;
            j += 1;
        }
        let start = match spans.last() {
            Some(prev) if overlap > 0 => overlap_start(text, prev.start, new_start, overlap),
            _ => new_start,
        };
        spans.push(start..end);
        i = j;
    }
    spans
}

/// Build chunks for one file.
pub fn chunk_document(
    source_path: &str,
    file_fingerprint: &str,
    text: &str,
    tag: &ProgressionTag,
    max_chars: usize,
    overlap_chars: usize,
) -> Vec<Chunk> {
    let headings = headings(text);
    split_spans(text, max_chars, overlap_chars)
        .into_iter()
        .enumerate()
        .map(|(ordinal, span)| {
            let chunk_text = &text[span.clone()];
            let section = headings
                .iter()
                .take_while(|(offset, _)| *offset <= span.start)
                .last()
                .map(|(_, title)| title.clone());
            Chunk {
                id: chunk_id(source_path, ordinal, file_fingerprint),
                source_path: source_path.to_string(),
                ordinal,
                text: chunk_text.to_string(),
                start: span.start,
                end: span.end,
                section,
                hash: fingerprint(embedding_input(tag, source_path, chunk_text).as_bytes()),
                tag: tag.clone(),
            }
        })
        .collect()
}

/// Deterministic chunk ID.
pub fn chunk_id(source_path: &str, ordinal: usize, file_fingerprint: &str) -> String {
    let name = format!("{}\u{1f}{}\u{1f}{}", source_path, ordinal, file_fingerprint);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

fn trim_range(text: &str, range: Range<usize>) -> Option<Range<usize>> {
    let slice = &text[range.clone()];
    let lead = slice.len() - slice.trim_start().len();
    let trail = slice.len() - slice.trim_end().len();
    if lead + trail >= slice.len() {
        return None;
    }
    Some(range.start + lead..range.end - trail)
}

fn paragraphs(text: &str) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut para_start: Option<usize> = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            if let Some(start) = para_start.take() {
                out.extend(trim_range(text, start..offset));
            }
        } else if para_start.is_none() {
            para_start = Some(offset);
        }
        offset += line.len();
    }
    if let Some(start) = para_start {
        out.extend(trim_range(text, start..text.len()));
    }
    out
}

fn sentences(text: &str, para: Range<usize>) -> Vec<Range<usize>> {
    let slice = &text[para.clone()];
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = slice.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => Some(i + 1),
            '.' | '!' | '?' => match chars.peek() {
                Some((_, next)) if next.is_whitespace() => Some(i + 1),
                _ => None,
            },
            _ => None,
        };
        if let Some(cut) = boundary {
            out.extend(trim_range(text, para.start + start..para.start + cut));
            start = cut;
        }
    }
    out.extend(trim_range(text, para.start + start..para.end));
    out
}

fn hard_split(text: &str, range: Range<usize>, max: usize) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut pos = range.start;
    while pos < range.end {
        let mut cut = floor_char_boundary(text, (pos + max).min(range.end));
        if cut < range.end {
            if let Some(ws) = text[pos..cut].rfind(char::is_whitespace) {
                if ws > 0 {
                    cut = pos + ws;
                }
            }
        }
        if cut <= pos {
            cut = ceil_char_boundary(text, pos + 1);
        }
        out.extend(trim_range(text, pos..cut));
        pos = cut;
        while pos < range.end {
            match text[pos..].chars().next() {
                Some(c) if c.is_whitespace() => pos += c.len_utf8(),
                _ => break,
            }
        }
    }
    out
}

fn overlap_start(text: &str, prev_start: usize, new_start: usize, overlap: usize) -> usize {
    let floor = new_start.saturating_sub(overlap).max(prev_start);
    let mut pos = ceil_char_boundary(text, floor);
    let mid_word = text[..pos]
        .chars()
        .next_back()
        .is_some_and(|c| !c.is_whitespace());
    if mid_word && pos > prev_start {
        while let Some(c) = text[pos..].chars().next() {
            if c.is_whitespace() || pos >= new_start {
                break;
            }
            pos += c.len_utf8();
        }
    }
    while let Some(c) = text[pos..].chars().next() {
        if !c.is_whitespace() || pos >= new_start {
            break;
        }
        pos += c.len_utf8();
    }
    pos.min(new_start)
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// `(byte offset, title)` of every ATX heading line.
fn headings(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix('#') {
            let title = rest.trim_start_matches('#');
            if title.starts_with(' ') || title.trim().is_empty() {
                let title = title.trim();
                if !title.is_empty() {
                    out.push((offset, title.to_string()));
                }
            }
        }
        offset += line.len();
    }
    out
}

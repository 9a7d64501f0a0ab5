use std::ops::Range;

use crate::chunk::Chunk;

pub struct ChunkerConfig {
    /// Upper bound on chunk length in bytes. Only a single indivisible
    /// token can exceed it.
    pub max_len: usize,
    /// Bytes shared between consecutive chunks, aligned to a separator
    /// boundary.
    pub overlap: usize,
    /// Prioritized separators; the empty string is the character-level
    /// fallback and should come last.
    pub separators: Vec<String>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_len: 1000,
            overlap: 200,
            separators: ["\n\n", "\n", ".", "!", "?", ",", " ", ""]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Splits normalized text into overlapping segments using a prioritized
/// separator list. Every chunk is a verbatim slice of the input, so the
/// chunks (ignoring overlap) reconstruct the input's content.
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn chunk_text(&self, doc_id: &str, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        self.split_range(text, 0..text.len(), &self.config.separators)
            .into_iter()
            .map(|range| &text[range])
            .filter(|slice| !slice.trim().is_empty())
            .map(|slice| Chunk::new(doc_id, slice.to_string()))
            .collect()
    }

    fn split_range(&self, text: &str, range: Range<usize>, seps: &[String]) -> Vec<Range<usize>> {
        if range.len() <= self.config.max_len || seps.is_empty() {
            // When the separator list is exhausted the range is an
            // indivisible token and is emitted as-is.
            return vec![range];
        }

        let sep = &seps[0];
        let rest = &seps[1..];
        let segments = if sep.is_empty() {
            self.char_segments(text, range)
        } else {
            separator_segments(text, range, sep)
        };

        // Reduce every segment to at most max_len, falling through to the
        // lower-priority separators where one segment is still too large.
        let mut atoms = Vec::new();
        for segment in segments {
            if segment.len() > self.config.max_len {
                atoms.extend(self.split_range(text, segment, rest));
            } else {
                atoms.push(segment);
            }
        }

        self.merge_atoms(atoms)
    }

    /// Greedily pack contiguous atoms into chunks of at most max_len,
    /// re-starting each new chunk at the latest atom boundary that fits
    /// inside the configured overlap.
    fn merge_atoms(&self, atoms: Vec<Range<usize>>) -> Vec<Range<usize>> {
        let mut chunks = Vec::new();
        let Some(first) = atoms.first() else {
            return chunks;
        };

        let mut start = first.start;
        let mut end = first.end;
        let mut boundaries = vec![first.start];

        for atom in atoms.iter().skip(1) {
            if atom.end - start <= self.config.max_len {
                end = end.max(atom.end);
                boundaries.push(atom.start);
                continue;
            }

            chunks.push(start..end);

            let carried = boundaries
                .iter()
                .rev()
                .find(|&&b| {
                    b > start
                        && end - b <= self.config.overlap
                        && atom.end - b <= self.config.max_len
                })
                .copied();

            start = carried.unwrap_or(atom.start);
            end = atom.end;
            boundaries = if start < atom.start {
                vec![start, atom.start]
            } else {
                vec![atom.start]
            };
        }

        chunks.push(start..end);
        chunks
    }

    /// Character-level fallback: fixed-size pieces cut on char boundaries.
    fn char_segments(&self, text: &str, range: Range<usize>) -> Vec<Range<usize>> {
        let slice = &text[range.clone()];
        let mut segments = Vec::new();
        let mut seg_start = range.start;

        for (offset, _) in slice.char_indices() {
            let abs = range.start + offset;
            if abs - seg_start >= self.config.max_len {
                segments.push(seg_start..abs);
                seg_start = abs;
            }
        }
        if seg_start < range.end {
            segments.push(seg_start..range.end);
        }
        segments
    }
}

/// Split a range on a separator, each segment keeping its trailing
/// separator so the segments cover the range exactly.
fn separator_segments(text: &str, range: Range<usize>, sep: &str) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let mut segments = Vec::new();
    let mut seg_start = range.start;

    for (pos, matched) in slice.match_indices(sep) {
        let seg_end = range.start + pos + matched.len();
        segments.push(seg_start..seg_end);
        seg_start = seg_end;
    }
    if seg_start < range.end {
        segments.push(seg_start..range.end);
    }
    segments
}

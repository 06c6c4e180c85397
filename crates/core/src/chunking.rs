use crate::error::IngestError;
use crate::models::{Chunk, ChunkingConfig};

/// Splits cleaned document text into overlapping fixed-size chunks.
///
/// Boundary policy: each chunk is at most `max_chars` long, and when a
/// natural break (paragraph, sentence, line, word) exists within
/// `boundary_lookback` characters before the hard limit, the cut moves
/// there instead of landing mid-word. Each chunk after the first
/// starts exactly `overlap_chars` before the end of its predecessor,
/// so no semantic unit spanning a cut point is invisible to every
/// chunk. Chunking is pure: identical input and configuration always
/// produce identical boundaries.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        if config.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        if config.overlap_chars >= config.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max chunk size {}",
                config.overlap_chars, config.max_chars
            )));
        }
        Ok(Self { config })
    }

    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        if chars.iter().all(|c| c.is_whitespace()) {
            return Vec::new();
        }

        let max = self.config.max_chars;
        let overlap = self.config.overlap_chars;
        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut index = 0usize;

        loop {
            let hard_end = (start + max).min(chars.len());
            let end = if hard_end == chars.len() {
                hard_end
            } else {
                self.soft_boundary(&chars, start, hard_end).unwrap_or(hard_end)
            };

            chunks.push(Chunk {
                document_id: document_id.to_string(),
                index,
                start,
                end,
                text: chars[start..end].iter().collect(),
            });

            if end == chars.len() {
                break;
            }
            start = end - overlap;
            index += 1;
        }

        chunks
    }

    /// Look back from the hard limit for the latest natural break.
    /// Paragraph breaks win over sentence ends, sentence ends over
    /// newlines, newlines over plain spaces. Returns the cut position
    /// (exclusive end), or `None` when no acceptable break exists —
    /// a break is acceptable only if the resulting chunk still meets
    /// `min_chars` and still makes progress past the overlap.
    fn soft_boundary(&self, chars: &[char], start: usize, hard_end: usize) -> Option<usize> {
        let window_start = hard_end
            .saturating_sub(self.config.boundary_lookback)
            .max(start + 1);
        let floor = (start + self.config.min_chars).max(start + self.config.overlap_chars + 1);

        let mut best: Option<(u8, usize)> = None;
        for pos in window_start..hard_end {
            let rank = break_rank(chars, pos);
            let Some(rank) = rank else { continue };
            let cut = pos + 1;
            if cut < floor || cut > hard_end {
                continue;
            }
            // Prefer the stronger break; on equal strength, the later
            // position.
            if best.map_or(true, |(r, p)| rank > r || (rank == r && cut > p)) {
                best = Some((rank, cut));
            }
        }

        best.map(|(_, cut)| cut)
    }
}

/// Break strength at position `pos` (cutting after `chars[pos]`).
fn break_rank(chars: &[char], pos: usize) -> Option<u8> {
    let c = chars[pos];
    if c == '\n' {
        if pos + 1 < chars.len() && chars[pos + 1] == '\n' {
            return Some(3); // paragraph break
        }
        return Some(2);
    }
    if matches!(c, '.' | '!' | '?') && chars.get(pos + 1).is_some_and(|n| n.is_whitespace()) {
        return Some(2);
    }
    if c == ' ' {
        return Some(1);
    }
    None
}

/// Strip the overlap off every chunk after the first and concatenate.
/// Inverse of [`Chunker::chunk`] for any configuration; used by tests
/// to prove no text is lost or duplicated.
pub fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(&chunk.text);
        } else {
            out.extend(chunk.text.chars().skip(overlap));
        }
    }
    out
}

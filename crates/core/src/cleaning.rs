use crate::error::IngestError;
use regex::Regex;

/// Normalizes extracted text while protecting short but semantically
/// important fragments. The defining asymmetry of this stage:
/// length-based pruning with a content-based override, so a footnote
/// marker or a bare numeric value survives even below the minimum
/// block length, while whitespace-only or symbol-only blocks of the
/// same length are dropped.
pub struct TextCleaner {
    min_block_chars: usize,
    footnote: Regex,
    numeric: Regex,
    caption: Regex,
    list_item: Regex,
    table_border: Regex,
    space_before_punct: Regex,
}

impl TextCleaner {
    pub fn new(min_block_chars: usize) -> Result<Self, IngestError> {
        Ok(Self {
            min_block_chars,
            // [1], (1), superscript digits, or a short symbol marker
            // (*, †, ...) that carries note text; a bare symbol run is
            // not a footnote.
            footnote: Regex::new(
                r"^\s*(\[\d+\]|\(\d+\)|[¹²³⁴⁵⁶⁷⁸⁹⁰]+|[*†‡§¶#]{1,3}\s*\w)",
            )?,
            // Plain numbers, currency amounts, and percentages.
            numeric: Regex::new(r"^\s*[$€£¥]?\s*\d[\d,]*(\.\d+)?\s*%?\s*$")?,
            caption: Regex::new(r"(?i)^\s*(figure|fig\.|table|chart|exhibit)\s*\d")?,
            list_item: Regex::new(r"^\s*([•●○■□▪▫*-]\s+|\d+[.)]\s+)")?,
            // Ruled lines left behind by table extraction.
            table_border: Regex::new(r"^[|+\-=_.─│┼┤├ ]+$")?,
            space_before_punct: Regex::new(r"\s+([,.;:!?])")?,
        })
    }

    /// Clean one page's linear text: strip control characters, collapse
    /// runs of whitespace within lines, drop table rules and worthless
    /// short lines, fix spacing before punctuation, and collapse excess
    /// blank lines.
    pub fn clean(&self, text: &str) -> String {
        let mut lines = Vec::new();
        for raw in text.lines() {
            let line = collapse_whitespace(raw);
            if line.is_empty() {
                lines.push(String::new());
                continue;
            }
            if self.table_border.is_match(&line) {
                continue;
            }
            let line = self.space_before_punct.replace_all(&line, "$1").into_owned();
            if line.chars().count() < self.min_block_chars && !self.preserves(&line) {
                continue;
            }
            lines.push(line);
        }

        collapse_blank_runs(&lines)
    }

    /// A short block earns preservation by content: footnote markers,
    /// numeric values, caption leads, and list items.
    pub fn preserves(&self, line: &str) -> bool {
        // Symbol-only noise never qualifies.
        if !line.chars().any(|c| c.is_alphanumeric()) {
            return false;
        }

        self.footnote.is_match(line)
            || self.numeric.is_match(line)
            || self.caption.is_match(line)
            || self.list_item.is_match(line)
    }
}

/// Collapse inner whitespace and strip control characters from a line.
fn collapse_whitespace(line: &str) -> String {
    line.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join lines while limiting blank runs to a single separator.
fn collapse_blank_runs(lines: &[String]) -> String {
    let mut out = String::new();
    let mut pending_blank = false;
    for line in lines {
        if line.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if pending_blank {
            out.push_str("\n\n");
            pending_blank = false;
        } else if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }
    out
}

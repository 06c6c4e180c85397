use std::collections::HashMap;
use tracing::debug;

/// Removes headers and footers: lines that recur at the same band
/// position (top or bottom of page) across a configured fraction of
/// the document's pages. Runs once per document, after all pages are
/// extracted and reordered.
#[derive(Debug, Clone, Copy)]
pub struct BoilerplateFilter {
    /// How many lines at each end of a page belong to the band.
    pub band_lines: usize,
    /// Minimum fraction of pages a banded line must appear on to be
    /// treated as boilerplate.
    pub min_fraction: f64,
}

impl Default for BoilerplateFilter {
    fn default() -> Self {
        Self {
            band_lines: 3,
            min_fraction: 0.5,
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Band {
    Top,
    Bottom,
}

impl BoilerplateFilter {
    /// Filter all pages of one document. Documents with a single page
    /// have nothing to compare against and pass through unchanged.
    pub fn filter(&self, pages: &[String]) -> Vec<String> {
        if pages.len() < 2 {
            return pages.to_vec();
        }

        let top_counts = self.band_counts(pages, Band::Top);
        let bottom_counts = self.band_counts(pages, Band::Bottom);

        // A line qualifies when it appears on at least the configured
        // fraction of pages, and on no fewer than two pages outright.
        let threshold =
            ((pages.len() as f64 * self.min_fraction).ceil() as usize).max(2);

        let top_repeats: Vec<&String> = top_counts
            .iter()
            .filter(|(_, &count)| count >= threshold)
            .map(|(line, _)| line)
            .collect();
        let bottom_repeats: Vec<&String> = bottom_counts
            .iter()
            .filter(|(_, &count)| count >= threshold)
            .map(|(line, _)| line)
            .collect();

        if !top_repeats.is_empty() || !bottom_repeats.is_empty() {
            debug!(
                headers = top_repeats.len(),
                footers = bottom_repeats.len(),
                "removing repeating boilerplate lines"
            );
        }

        pages
            .iter()
            .map(|page| self.filter_page(page, &top_repeats, &bottom_repeats))
            .collect()
    }

    fn band_counts(&self, pages: &[String], band: Band) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for page in pages {
            let mut seen_on_page = Vec::new();
            for line in self.band_lines_of(page, band) {
                let key = normalize_line(line);
                if key.is_empty() || seen_on_page.contains(&key) {
                    continue;
                }
                seen_on_page.push(key.clone());
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        counts
    }

    fn band_lines_of<'a>(&self, page: &'a str, band: Band) -> Vec<&'a str> {
        let lines: Vec<&str> = page.lines().collect();
        let n = self.band_lines.min(lines.len());
        match band {
            Band::Top => lines[..n].to_vec(),
            Band::Bottom => lines[lines.len() - n..].to_vec(),
        }
    }

    fn filter_page(&self, page: &str, top: &[&String], bottom: &[&String]) -> String {
        let lines: Vec<&str> = page.lines().collect();
        let top_band = self.band_lines.min(lines.len());
        let bottom_band_start = lines.len().saturating_sub(self.band_lines);

        let kept: Vec<&str> = lines
            .iter()
            .enumerate()
            .filter(|(i, line)| {
                let key = normalize_line(line);
                if *i < top_band && top.iter().any(|repeat| **repeat == key) {
                    return false;
                }
                if *i >= bottom_band_start && bottom.iter().any(|repeat| **repeat == key) {
                    return false;
                }
                true
            })
            .map(|(_, line)| *line)
            .collect();

        kept.join("\n")
    }
}

/// Light normalization so "Page 3" and "Page 17" count as the same
/// footer: collapse whitespace, lowercase, and substitute digit runs.
fn normalize_line(line: &str) -> String {
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(collapsed.len());
    let mut in_digits = false;
    for c in collapsed.chars() {
        if c.is_ascii_digit() {
            if !in_digits {
                out.push('#');
                in_digits = true;
            }
        } else {
            in_digits = false;
            out.extend(c.to_lowercase());
        }
    }
    out
}

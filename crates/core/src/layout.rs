use crate::extractor::TextSpan;
use tracing::debug;

/// Reorders positioned spans into natural reading order, detecting
/// multi-column pages first. Must run before boilerplate filtering and
/// cleaning, since reordering changes which lines sit at the top or
/// bottom of a page.
#[derive(Debug, Clone, Copy)]
pub struct LayoutAnalyzer {
    /// Maximum horizontal distance between span start positions that
    /// still counts as the same column.
    pub column_gap: f32,
    /// A cluster must hold at least this fraction of spans to count as
    /// a column rather than positional noise.
    pub min_column_fraction: f64,
    /// Vertical tolerance when grouping spans into one line.
    pub line_tolerance: f32,
}

impl Default for LayoutAnalyzer {
    fn default() -> Self {
        Self {
            column_gap: 50.0,
            min_column_fraction: 0.1,
            line_tolerance: 3.0,
        }
    }
}

impl LayoutAnalyzer {
    /// Linearize a page's spans. Multi-column pages are read column by
    /// column, left to right; single-column pages pass through in
    /// top-down order.
    pub fn linearize(&self, spans: &[TextSpan]) -> String {
        if spans.is_empty() {
            return String::new();
        }

        let columns = self.detect_columns(spans);
        if columns.len() <= 1 {
            return self.column_text(spans.iter().collect());
        }

        debug!(columns = columns.len(), "multi-column page, reordering");
        let mut parts = Vec::new();
        for (start, end) in &columns {
            let members: Vec<&TextSpan> = spans
                .iter()
                .filter(|span| span.x >= *start && span.x < *end)
                .collect();
            let text = self.column_text(members);
            if !text.trim().is_empty() {
                parts.push(text);
            }
        }
        parts.join("\n\n")
    }

    /// Cluster span start x-positions. Two or more sufficiently large
    /// clusters separated by more than `column_gap` mean the page is
    /// laid out in columns. Returns the half-open x-range of each
    /// column, left to right.
    fn detect_columns(&self, spans: &[TextSpan]) -> Vec<(f32, f32)> {
        // Too few spans to tell columns from noise.
        if spans.len() < 10 {
            return Vec::new();
        }

        let mut xs: Vec<f32> = spans.iter().map(|span| span.x).collect();
        xs.sort_by(f32::total_cmp);

        let mut clusters: Vec<Vec<f32>> = Vec::new();
        let mut current = vec![xs[0]];
        for &x in &xs[1..] {
            let center = current.iter().sum::<f32>() / current.len() as f32;
            if x - center <= self.column_gap {
                current.push(x);
            } else {
                clusters.push(std::mem::replace(&mut current, vec![x]));
            }
        }
        clusters.push(current);

        let min_size =
            ((spans.len() as f64 * self.min_column_fraction).ceil() as usize).max(3);
        let starts: Vec<f32> = clusters
            .iter()
            .filter(|cluster| cluster.len() >= min_size)
            .map(|cluster| cluster.iter().copied().fold(f32::INFINITY, f32::min))
            .collect();

        if starts.len() <= 1 {
            return Vec::new();
        }

        starts
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(f32::INFINITY);
                (start, end)
            })
            .collect()
    }

    /// Sort one column's spans by descending y (PDF user space grows
    /// upward), then left to right, and join them with line grouping.
    fn column_text(&self, mut members: Vec<&TextSpan>) -> String {
        members.sort_by(|a, b| b.y.total_cmp(&a.y).then_with(|| a.x.total_cmp(&b.x)));

        let mut lines: Vec<String> = Vec::new();
        let mut last_y: Option<f32> = None;
        for span in members {
            let same_line = last_y.is_some_and(|y| (y - span.y).abs() <= self.line_tolerance);
            if same_line {
                if let Some(line) = lines.last_mut() {
                    if !line.is_empty() {
                        line.push(' ');
                    }
                    line.push_str(span.text.trim());
                }
            } else {
                lines.push(span.text.trim().to_string());
                last_y = Some(span.y);
            }
        }

        lines.join("\n")
    }
}

use crate::record::Evidence;

/// Number of evidence items shown before "show more"
pub const DEFAULT_PREVIEW_COUNT: usize = 5;

/// Display band for a relevance score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            ConfidenceBand::High
        } else if score >= 0.7 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::High => "high",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::Low => "low",
        }
    }
}

/// Score as a rounded percentage, e.g. `0.953` → `"95%"`
pub fn format_score(score: f64) -> String {
    format!("{}%", (score * 100.0).round() as i64)
}

/// Scores worth a "strong match" marker in the evidence list
pub fn strong_match(score: f64) -> bool {
    score >= 0.8
}

/// Fragment-addressed link into the hosted platform document
pub fn page_url(document_url: &str, page: u32) -> String {
    format!("{}#page={}", document_url, page)
}

impl Evidence {
    pub fn band(&self) -> ConfidenceBand {
        ConfidenceBand::from_score(self.score)
    }

    pub fn score_label(&self) -> String {
        format!("{} match", format_score(self.score))
    }
}

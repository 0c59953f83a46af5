//! Wire types for the query service's NDJSON stream.
//!
//! Every line of a `/query-stream` response is one JSON object tagged by a
//! `status` field. Records are decoded leniently: unknown statuses and missing
//! optional fields never fail the parse, they just produce a record the
//! session treats as a no-op.

use serde::{Deserialize, Serialize};

/// Request body for the streaming query endpoint
#[derive(Debug, Serialize)]
pub struct QueryRequest {
    pub text: String,
}

/// One retrieved passage from the platform document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireEvidence")]
pub struct Evidence {
    pub text: String,
    pub score: f64,
    pub page: u32,
}

// The backend sometimes forwards retriever fields as-is (`page_num`,
// `similarity`) next to or instead of the frontend names.
#[derive(Deserialize)]
struct WireEvidence {
    #[serde(default)]
    text: String,
    score: Option<f64>,
    similarity: Option<f64>,
    page: Option<u32>,
    page_num: Option<u32>,
}

impl From<WireEvidence> for Evidence {
    fn from(wire: WireEvidence) -> Self {
        Self {
            text: wire.text,
            score: wire.score.or(wire.similarity).unwrap_or(0.0),
            page: wire.page.or(wire.page_num).filter(|p| *p > 0).unwrap_or(1),
        }
    }
}

/// Final analysis produced by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub response: String,
}

/// Backend phase label carried by `processing` and `partial` records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingStep {
    Retrieval,
    DocumentsReady,
    Analysis,
    Other(String),
}

impl ProcessingStep {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "retrieval" => ProcessingStep::Retrieval,
            "documents_ready" => ProcessingStep::DocumentsReady,
            "analysis" => ProcessingStep::Analysis,
            other => ProcessingStep::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProcessingStep::Retrieval => "retrieval",
            ProcessingStep::DocumentsReady => "documents_ready",
            ProcessingStep::Analysis => "analysis",
            ProcessingStep::Other(s) => s,
        }
    }

    /// Human readable status line for the results view
    pub fn label(&self) -> String {
        match self {
            ProcessingStep::Retrieval => "Retrieving relevant documents".to_string(),
            ProcessingStep::DocumentsReady => "Documents ready".to_string(),
            ProcessingStep::Analysis => "Analyzing platform evidence".to_string(),
            ProcessingStep::Other(s) => s.replace('_', " "),
        }
    }
}

/// One decoded line of the response stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRecord {
    Processing {
        step: Option<ProcessingStep>,
    },
    Partial {
        step: Option<ProcessingStep>,
        similar_documents: Option<Vec<Evidence>>,
    },
    Complete {
        analysis: Option<Analysis>,
    },
    Error {
        message: Option<String>,
    },
    Unknown {
        status: String,
    },
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    status: String,
    step: Option<String>,
    similar_documents: Option<Vec<Evidence>>,
    analysis: Option<Analysis>,
    message: Option<String>,
}

impl StreamRecord {
    /// Parse one NDJSON line
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let raw: RawRecord = serde_json::from_str(line)?;
        let step = raw.step.as_deref().map(ProcessingStep::from_wire);

        Ok(match raw.status.as_str() {
            "processing" => StreamRecord::Processing { step },
            "partial" => StreamRecord::Partial {
                step,
                similar_documents: raw.similar_documents,
            },
            "complete" => StreamRecord::Complete {
                analysis: raw.analysis,
            },
            "error" => StreamRecord::Error {
                message: raw.message,
            },
            _ => StreamRecord::Unknown { status: raw.status },
        })
    }

    pub fn status(&self) -> &str {
        match self {
            StreamRecord::Processing { .. } => "processing",
            StreamRecord::Partial { .. } => "partial",
            StreamRecord::Complete { .. } => "complete",
            StreamRecord::Error { .. } => "error",
            StreamRecord::Unknown { status } => status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_processing_ignores_padding() {
        let line = r#"{"status":"processing","step":"retrieval","padding":"      "}"#;
        let record = StreamRecord::parse(line).unwrap();
        assert_eq!(
            record,
            StreamRecord::Processing {
                step: Some(ProcessingStep::Retrieval)
            }
        );
    }

    #[test]
    fn test_parse_partial_with_documents() {
        let line = r#"{"status":"partial","step":"documents_ready","similar_documents":[{"text":"a","score":0.95,"page":3}]}"#;
        match StreamRecord::parse(line).unwrap() {
            StreamRecord::Partial {
                step,
                similar_documents: Some(docs),
            } => {
                assert_eq!(step, Some(ProcessingStep::DocumentsReady));
                assert_eq!(docs.len(), 1);
                assert_eq!(docs[0].page, 3);
                assert!((docs[0].score - 0.95).abs() < 1e-9);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_evidence_falls_back_to_retriever_fields() {
        let doc: Evidence =
            serde_json::from_str(r#"{"text":"t","similarity":0.42,"page_num":7}"#).unwrap();
        assert_eq!(doc.page, 7);
        assert!((doc.score - 0.42).abs() < 1e-9);

        let both: Evidence = serde_json::from_str(
            r#"{"text":"t","score":0.9,"similarity":0.1,"page":2,"page_num":9}"#,
        )
        .unwrap();
        assert_eq!(both.page, 2);
        assert!((both.score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_evidence_missing_page_defaults_to_first() {
        let doc: Evidence = serde_json::from_str(r#"{"text":"t","score":0.5}"#).unwrap();
        assert_eq!(doc.page, 1);
    }

    #[test]
    fn test_unknown_and_missing_status() {
        assert_eq!(
            StreamRecord::parse(r#"{"status":"heartbeat"}"#).unwrap(),
            StreamRecord::Unknown {
                status: "heartbeat".to_string()
            }
        );
        assert_eq!(
            StreamRecord::parse(r#"{"step":"analysis"}"#).unwrap().status(),
            ""
        );
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(StreamRecord::parse("not json").is_err());
        assert!(StreamRecord::parse("[1, 2]").is_err());
    }

    #[test]
    fn test_step_labels() {
        assert_eq!(ProcessingStep::from_wire("analysis"), ProcessingStep::Analysis);
        assert_eq!(
            ProcessingStep::from_wire("re_ranking").label(),
            "re ranking"
        );
        assert_eq!(ProcessingStep::Retrieval.as_str(), "retrieval");
    }
}

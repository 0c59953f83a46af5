use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the query service
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network response was not ok: {status}")]
    Status { status: StatusCode, body: String },

    #[error("Malformed stream record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message() {
        let err = QueryError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Network response was not ok: 500 Internal Server Error"
        );
        assert!(matches!(err, QueryError::Status { ref body, .. } if body == "boom"));
    }

    #[test]
    fn test_backend_message_is_shown_verbatim() {
        assert_eq!(QueryError::Backend("boom".to_string()).to_string(), "boom");
    }
}

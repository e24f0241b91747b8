use thiserror::Error;

use crate::types::NodeId;

/// The two reserved roles a graph node can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Start,
    End,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Start => write!(f, "start"),
            NodeRole::End => write!(f, "end"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TracewalkError {
    // Graph construction errors
    #[error("Node with id {0} already exists")]
    DuplicateNode(NodeId),

    #[error("The {0} node is already defined")]
    DuplicateRole(NodeRole),

    #[error("Node with id {0} does not exist")]
    UnknownNode(NodeId),

    #[error("The {0} node is not defined")]
    UndefinedRole(NodeRole),

    // Oracle errors
    #[error("Could not parse {oracle} oracle response: {message}")]
    OracleParse { oracle: String, message: String },

    #[error("The {oracle} oracle is unavailable: {message}")]
    OracleUnavailable { oracle: String, message: String },

    #[error("The {oracle} oracle did not answer within {timeout_secs}s")]
    OracleTimeout { oracle: String, timeout_secs: u64 },

    // Execution errors
    #[error("Step '{step}' still failing after {attempts} attempts (last feedback: {feedback})")]
    RetryExhausted {
        step: String,
        attempts: u32,
        feedback: String,
    },

    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Invalid input: {0}")]
    Input(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TracewalkError {
    pub fn parse(oracle: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OracleParse {
            oracle: oracle.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(oracle: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OracleUnavailable {
            oracle: oracle.into(),
            message: message.into(),
        }
    }

    /// Whether a client-level retry could plausibly succeed.
    ///
    /// Only transport failures qualify; graph misuse and semantic step
    /// failures never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            TracewalkError::LlmRequest(msg) => {
                msg.contains("429")
                    || msg.contains("500")
                    || msg.contains("502")
                    || msg.contains("503")
                    || msg.contains("timeout")
                    || msg.contains("connection")
            }
            TracewalkError::LlmStream(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TracewalkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_in_message() {
        let err = TracewalkError::DuplicateRole(NodeRole::Start);
        assert_eq!(err.to_string(), "The start node is already defined");
        let err = TracewalkError::UndefinedRole(NodeRole::End);
        assert_eq!(err.to_string(), "The end node is not defined");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TracewalkError::LlmRequest("HTTP 503: busy".into()).is_retryable());
        assert!(TracewalkError::LlmStream("eof".into()).is_retryable());
        assert!(!TracewalkError::LlmRequest("HTTP 401: bad key".into()).is_retryable());
        assert!(!TracewalkError::UnknownNode(NodeId(3)).is_retryable());
        assert!(!TracewalkError::parse("decision", "no id").is_retryable());
    }
}

//! LLM error types

use thiserror::Error;

/// Errors that can occur during LLM operations
///
/// None of these are retried automatically; the user resends.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("Quota exceeded ({status}): {message}")]
    Quota { status: u16, message: String },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Stream interrupted: {0}")]
    Stream(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => LlmError::Authentication { status, message },
            402 | 429 => LlmError::Quota { status, message },
            _ => LlmError::ApiError { status, message },
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, LlmError::Authentication { .. })
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, LlmError::Quota { .. })
    }

    /// Short message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            LlmError::Authentication { .. } => {
                "Your session is not authorized. Check the API key and try again.".to_string()
            }
            LlmError::Quota { status: 402, .. } => {
                "The provider requires payment before more requests can be made.".to_string()
            }
            LlmError::Quota { .. } => "Rate limit reached. Wait a moment, then resend.".to_string(),
            LlmError::Network(_) | LlmError::Stream(_) => {
                "The connection dropped before the reply finished. Please resend.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert!(LlmError::from_status(401, "expired".to_string()).is_authentication());
        assert!(LlmError::from_status(403, "forbidden".to_string()).is_authentication());
        assert!(LlmError::from_status(402, "pay".to_string()).is_quota());
        assert!(LlmError::from_status(429, "slow down".to_string()).is_quota());

        let err = LlmError::from_status(500, "boom".to_string());
        assert!(!err.is_quota());
        assert!(!err.is_authentication());
        assert_eq!(err.to_string(), "API error 500: boom");
    }

    #[test]
    fn test_user_message_is_specific_for_quota() {
        let rate = LlmError::from_status(429, String::new()).user_message();
        let pay = LlmError::from_status(402, String::new()).user_message();
        assert!(rate.contains("Rate limit"));
        assert!(pay.contains("payment"));
    }
}

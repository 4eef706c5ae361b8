use thiserror::Error;

/// Failures surfaced to the chat UI. Every variant resolves to a notice the
/// user can read; none of them is fatal.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Webhook request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Webhook answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Message quota exhausted ({used}/{limit})")]
    QuotaExceeded { used: u64, limit: u64 },

    #[error("Nothing to send")]
    EmptyMessage,

    #[error("No authenticated user")]
    NotAuthenticated,

    #[error("Authentication rejected: {0}")]
    Rejected(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChatError {
    pub fn status(status: u16, body: &str, max_chars: usize) -> Self {
        ChatError::Status {
            status,
            body: body.chars().take(max_chars).collect(),
        }
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, ChatError::QuotaExceeded { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ChatError::Network(_) | ChatError::Status { .. })
    }

    /// Hebrew notice shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Network(_) => "נכשל בשליחת ההודעה. אנא נסו שוב.".to_string(),
            ChatError::Status { status, body } => format!("שגיאה {status}: {body}"),
            ChatError::QuotaExceeded { .. } => {
                "נגמרו לכם הטוקנים לחודש זה. שדרגו את התוכנית או המתינו לחידוש החודשי."
                    .to_string()
            }
            ChatError::EmptyMessage => "אין הודעה לשליחה.".to_string(),
            ChatError::NotAuthenticated => "יש להתחבר כדי לשלוח הודעות.".to_string(),
            ChatError::Rejected(message) | ChatError::Invalid(message) => message.clone(),
            ChatError::Storage(_) | ChatError::Serialization(_) => {
                "לא ניתן לשמור את השיחה".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Network(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_body_is_truncated() {
        let body = "x".repeat(500);
        let err = ChatError::status(502, &body, 180);

        match &err {
            ChatError::Status { status, body } => {
                assert_eq!(*status, 502);
                assert_eq!(body.chars().count(), 180);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(err.is_transient());
        assert!(err.user_message().starts_with("שגיאה 502"));
    }

    #[test]
    fn test_quota_is_not_transient() {
        let err = ChatError::QuotaExceeded { used: 50, limit: 50 };
        assert!(err.is_quota());
        assert!(!err.is_transient());
    }
}

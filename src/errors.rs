use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Upload failed ({status}): {body}")]
    UploadFailed { status: u16, body: String },

    #[error("Job trigger failed ({status}): {body}")]
    JobTriggerFailed { status: u16, body: String },

    #[error("Job output fetch failed ({status}): {body}")]
    JobOutputFailed { status: u16, body: String },

    #[error("Inference failed ({status}): {body}")]
    InferenceFailed { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    ParseFailure(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP status carried by a remote failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UploadFailed { status, .. }
            | Self::JobTriggerFailed { status, .. }
            | Self::JobOutputFailed { status, .. }
            | Self::InferenceFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_failures_carry_status() {
        let err = ChatError::InferenceFailed {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.to_string(), "Inference failed (503): overloaded");

        assert_eq!(ChatError::config("missing").status(), None);
    }
}

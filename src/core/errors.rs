use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Setup call not found in gateway response")]
    SetupNotFound,

    #[error("Incorrect setup params: got {got}, want {want}")]
    ParamCountMismatch { got: usize, want: usize },

    #[error("Failed to unquote setup line {line}: {reason}")]
    MalformedParam { line: usize, reason: String },

    #[error("Gateway echoed a token that does not match the channel token")]
    TokenMismatch,

    #[error("Unable to decode {raw:?}: {reason}")]
    DecodeError { raw: String, reason: String },

    #[error("Unable to extract sid: {0}")]
    SidExtraction(String),

    #[error("Packet framing error: {0}")]
    FramingError(String),

    /// The gateway rejected the token; a fresh one must be obtained.
    #[error("Channel token rejected, re-authentication required")]
    ReauthRequired,

    #[error("Output receiver dropped")]
    OutputClosed,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}

impl ChannelError {
    /// Whether the caller has to obtain a new token before reopening the channel
    pub const fn is_reauth(&self) -> bool {
        matches!(self, Self::ReauthRequired)
    }

    /// Errors the poll loop treats as a corrupt frame rather than a broken session
    pub const fn is_transient_decode(&self) -> bool {
        matches!(
            self,
            Self::FramingError(_)
                | Self::DecodeError { .. }
                | Self::JsonError(_)
                | Self::HttpError(_)
                | Self::NetworkError(_)
        )
    }

    pub(crate) fn decode(raw: impl AsRef<str>, reason: impl std::fmt::Display) -> Self {
        const PREVIEW: usize = 256;
        let raw = raw.as_ref();
        let raw = match raw.char_indices().nth(PREVIEW) {
            Some((end, _)) => format!("{}...", &raw[..end]),
            None => raw.to_string(),
        };
        Self::DecodeError {
            raw,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reauth_is_distinct() {
        assert!(ChannelError::ReauthRequired.is_reauth());
        assert!(!ChannelError::NetworkError("reset".to_string()).is_reauth());
        assert!(!ChannelError::SetupNotFound.is_reauth());
    }

    #[test]
    fn test_decode_error_preview_is_truncated() {
        let long = "x".repeat(1000);
        match ChannelError::decode(&long, "bad") {
            ChannelError::DecodeError { raw, reason } => {
                assert_eq!(raw.len(), 259);
                assert!(raw.ends_with("..."));
                assert_eq!(reason, "bad");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_transient_decode_classification() {
        assert!(ChannelError::FramingError("size".to_string()).is_transient_decode());
        assert!(ChannelError::decode("[", "eof").is_transient_decode());
        assert!(!ChannelError::OutputClosed.is_transient_decode());
        assert!(!ChannelError::ReauthRequired.is_transient_decode());
    }
}

use thiserror::Error;

/// Failures of a single backend request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection refused, timeout, TLS failure and the like.
    #[error("Connection error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-OK response; `message` is the backend's `{error}` text when present.
    #[error("{message}")]
    Backend { status: u16, message: String },

    /// OK response whose body did not have the expected shape.
    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Text to show the operator: backend messages verbatim, everything else
    /// folded into a generic connection error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend { message, .. } => message.clone(),
            Self::Io(e) => e.to_string(),
            Self::Transport(_) | Self::Decode(_) => "Connection error".to_string(),
        }
    }
}

/// Failures while establishing the live event connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("backend URL '{0}' is not http(s) or ws(s)")]
    BadUrl(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("server refused connection: {0}")]
    Refused(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("stats poll failed: {0}")]
    Poll(#[from] ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_backend_is_verbatim() {
        let err = ApiError::Backend {
            status: 400,
            message: "Canal não especificado".into(),
        };
        assert_eq!(err.user_message(), "Canal não especificado");
    }

    #[test]
    fn test_user_message_decode_is_generic() {
        let err = ApiError::Decode("expected object".into());
        assert_eq!(err.user_message(), "Connection error");
    }
}

use thiserror::Error;

/// HTTP status every `Unauthorized` error reports
pub const UNAUTHORIZED_STATUS: u16 = 401;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The backend answered 401. Counts as an HTTP error as well.
    #[error("Unauthorized")]
    Unauthorized,

    /// Non-401 response carrying an `error` field, or a malformed envelope.
    #[error("{message}")]
    Http { message: String, status: u16 },

    /// The request never produced a response. Passed through untouched.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A granted credential could not be written to the session store.
    #[error("Failed to persist session: {0}")]
    Storage(String),
}

impl ClientError {
    pub fn http(message: impl Into<String>, status: u16) -> Self {
        ClientError::Http {
            message: message.into(),
            status,
        }
    }

    /// Status code for HTTP-level errors (including `Unauthorized`).
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized => Some(UNAUTHORIZED_STATUS),
            ClientError::Http { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            ClientError::Decode(_) | ClientError::InvalidUrl(_) | ClientError::Storage(_) => None,
        }
    }

    /// True for errors that mean "log in again".
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }

    /// True for both HTTP error kinds; an auth error is a kind of HTTP error.
    pub fn is_http(&self) -> bool {
        matches!(self, ClientError::Unauthorized | ClientError::Http { .. })
    }
}

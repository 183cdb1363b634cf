use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("payload did not decode to a listing: {0}")]
    Decode(String),

    #[error("authentication rejected for {url}: {reason}")]
    Auth { url: String, reason: String },

    #[error("traversal of {address} failed: {reason}")]
    Traversal { address: String, reason: String },

    #[error("could not resolve playback url for {url}: {reason}")]
    Resolution { url: String, reason: String },

    #[error("http error: {0}")]
    Http(#[from] ureq::Error),

    #[error("unexpected http status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid link descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("crawl canceled")]
    Canceled,
}

impl EngineError {
    /// Errors that invalidate the whole session rather than one subtree.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::Canceled)
    }
}

impl From<url::ParseError> for EngineError {
    fn from(value: url::ParseError) -> Self {
        Self::InvalidUrl(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

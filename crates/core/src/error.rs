use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Rag(#[from] RagError),
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("missing configuration: {0}")]
    Config(String),

    #[error("{provider} API error: {status} {body}")]
    Upstream {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid {provider} response: {details}")]
    MalformedResponse {
        provider: &'static str,
        details: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(String),
}

impl From<tokio_postgres::Error> for RagError {
    fn from(error: tokio_postgres::Error) -> Self {
        RagError::Store(error.to_string())
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;

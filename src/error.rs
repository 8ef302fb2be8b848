use thiserror::Error;

/// A malformed exposition body, pointing at the offending line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("List error: {0}")]
    List(String),

    #[error("Scrape error: {0}")]
    Scrape(#[from] reqwest::Error),

    #[error("Scrape error: unexpected status {status} from {url}")]
    ScrapeStatus { url: String, status: u16 },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CollectorError>;

/// Domain-specific error types for the analytics service.
/// All external failures must be handled. The service must:
/// - Continue running on recoverable errors (feed outages, bad payloads)
/// - Never persist a partial result for a rejected chain snapshot
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("NSE API error: {status} {body}")]
    NseApi { status: u16, body: String },

    #[error("quote feed error: {0}")]
    QuoteFeed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Database(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Network(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

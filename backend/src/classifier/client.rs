use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("URL parsing failed: {0}")]
    UrlError(#[from] url::ParseError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("Unexpected protocol response: {0}")]
    Protocol(String),
}

/// A remote image classifier that takes a local image file and returns the
/// structured output of `operation`.
#[async_trait]
pub trait ClassifierClient: Send + Sync {
    async fn submit(&self, path: &Path, operation: &str) -> Result<Value, ClassifierError>;

    /// Human readable target, used in logs.
    fn endpoint(&self) -> String;
}

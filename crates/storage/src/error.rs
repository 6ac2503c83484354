use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to open url: {0}")]
    Open(#[from] std::io::Error),
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no archive file named {0} in search results")]
    NotFound(String),

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("unexpected archive response: {0}")]
    MalformedResponse(String),

    #[error("invalid archive url: {0}")]
    Url(#[from] url::ParseError),
}

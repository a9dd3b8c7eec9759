use thiserror::Error;

/// Failure while acquiring an asset or a request image.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server responded with HTTP {0}")]
    Status(u16),

    #[error("transfer timed out")]
    Timeout,

    #[error("could not decode payload: {0}")]
    Decode(String),

    #[error("payload exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Maps an io error raised while reading a remote body, keeping timeouts distinct.
    pub fn from_transfer(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    #[error("resource '{key}' requires {path}, which is missing; run the download_models operation first")]
    MissingAsset { key: String, path: String },

    #[error("failed to construct resource '{key}': {reason}")]
    Construction { key: String, reason: String },
}

/// Everything a request handler can fail with. The dispatcher is the only
/// place these are turned into responses.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: DownloadError,
    },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("operation '{0}' not implemented")]
    Dispatch(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn download(url: impl Into<String>, source: DownloadError) -> Self {
        Self::Download {
            url: url.into(),
            source,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable machine-readable category reported alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Download { .. } => "download",
            Self::Validation(_) => "validation",
            Self::Resource(_) => "resource",
            Self::Dispatch(_) => "dispatch",
            Self::Internal(_) => "internal",
        }
    }
}

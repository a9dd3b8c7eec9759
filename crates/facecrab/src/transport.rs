use async_trait::async_trait;
use futures::io::AsyncRead;
use log::debug;
use rusty_swap_core::DownloadError;
use std::time::Duration;

const MAX_REDIRECTS: u8 = 5;

/// An opened remote body. `len` is the advertised content length, if any.
pub struct RemoteBody {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub len: Option<u64>,
}

/// Opens a byte stream for a source locator.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn open(&self, url: &str) -> Result<RemoteBody, DownloadError>;
}

/// HTTP(S) transport backed by surf, following redirects.
pub struct HttpFetcher {
    client: surf::Client,
}

impl HttpFetcher {
    /// `timeout` bounds each request up to the response head; body reads are
    /// bounded separately by the store.
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client: surf::Client = surf::Config::new()
            .set_timeout(Some(timeout))
            .try_into()
            .map_err(|e| DownloadError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client: client.with(RedirectMiddleware::new(MAX_REDIRECTS)),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn open(&self, url: &str) -> Result<RemoteBody, DownloadError> {
        let response = self.client.get(url).await.map_err(|e| {
            if e.status() == surf::StatusCode::RequestTimeout {
                DownloadError::Timeout
            } else {
                DownloadError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status as u16));
        }

        let len = response.len().map(|n| n as u64);
        debug!("GET {} -> {} ({:?} bytes)", url, status, len);
        Ok(RemoteBody {
            reader: Box::new(response),
            len,
        })
    }
}

struct RedirectMiddleware {
    max_attempts: u8,
}

impl RedirectMiddleware {
    pub fn new(max_attempts: u8) -> Self {
        Self { max_attempts }
    }
}

#[surf::utils::async_trait]
impl surf::middleware::Middleware for RedirectMiddleware {
    async fn handle(
        &self,
        req: surf::Request,
        client: surf::Client,
        next: surf::middleware::Next<'_>,
    ) -> surf::Result<surf::Response> {
        let mut attempts = 0;
        let mut current_req = req;

        loop {
            if attempts > self.max_attempts {
                return Err(surf::Error::from_str(
                    surf::StatusCode::LoopDetected,
                    "Too many redirects",
                ));
            }

            let response = next.run(current_req.clone(), client.clone()).await?;

            if !response.status().is_redirection() {
                return Ok(response);
            }

            let Some(location) = response.header("Location") else {
                return Ok(response);
            };
            let loc_str = location.last().as_str().to_string();

            // Hugging Face and most CDNs send absolute locations; relative
            // ones are resolved against the current URL.
            let new_url = match surf::Url::parse(&loc_str) {
                Ok(u) => u,
                Err(_) => current_req.url().join(&loc_str).map_err(|_| {
                    surf::Error::from_str(
                        surf::StatusCode::BadGateway,
                        "Invalid redirect location",
                    )
                })?,
            };

            debug!("redirect {} -> {}", current_req.url(), new_url);
            current_req = surf::Request::new(current_req.method(), new_url);
            attempts += 1;
        }
    }
}

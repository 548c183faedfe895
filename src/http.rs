use std::time::Duration;
use thiserror::Error;

/// Various spam, advertising and domain-parking hosts won't return either a
/// 404 or a consistent landing page unless the request looks like a browser.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; U; Linux i686; en-US; rv:1.9.2.3) \
                              Gecko/20100423 Ubuntu/10.04 (lucid) Firefox/3.6.3";

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The server answered with an HTTP error status. The host is alive, so
    /// this never counts toward the host-down budget.
    #[error("Error code: {code}")]
    Status { code: u16 },
    /// DNS, TCP, TLS or timeout failure below the HTTP layer.
    #[error("Failed to reach the server: {reason}")]
    Transport { reason: String },
}

impl FetchError {
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport { .. })
    }
}

/// The engine's only view of the network: a URL in, raw body bytes out.
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(HttpFetcher { client })
    }
}

fn transport(error: reqwest::Error) -> FetchError {
    let reason = if error.is_timeout() {
        "request timed out".to_string()
    } else {
        error.to_string()
    };
    FetchError::Transport { reason }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::Status { code: status.as_u16() });
        }
        let body = response.bytes().await.map_err(transport)?;
        Ok(body.to_vec())
    }
}

use std::io::ErrorKind;
use thiserror::Error;

/// Failure of a single HTTP round-trip
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Connection dropped: {0}")]
    Disconnected(String),
    #[error("Server returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("HTTP request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Connection-level failures that are worth trying again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Connect(_) | TransportError::Timeout(_) | TransportError::Disconnected(_)
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else if err.is_request() || err.is_body() || io_dropped(&err) {
            // Sent or half-read, then the peer reset or closed the connection
            TransportError::Disconnected(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

fn io_dropped(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        source = e.source();
    }
    false
}

/// Read the body of a response, turning non-success statuses into errors
pub(crate) async fn read_body(response: reqwest::Response) -> Result<String, TransportError> {
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response.text().await?)
}

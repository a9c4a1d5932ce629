use super::{async_trait, BatchTransport};
use crate::transport::{read_body, TransportError};
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("wokharvest/", env!("CARGO_PKG_VERSION"));

/// HTTP transport for the batch citation service.
///
/// Requests carry their own credentials, so one client can be shared by
/// every worker.
pub struct LamrClient {
    client: Client,
    url: String,
}

impl LamrClient {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl BatchTransport for LamrClient {
    async fn submit(&self, payload: &str) -> Result<String, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=UTF-8")
            .body(payload.to_string())
            .send()
            .await?;
        read_body(response).await
    }
}

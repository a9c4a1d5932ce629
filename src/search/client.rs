use super::{async_trait, PortalTransport};
use crate::transport::{read_body, TransportError};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::Duration;

const SESSION_COOKIE: &str = "SID";

/// HTTP transport for the search portal, keeping cookies between requests.
///
/// Opening a session replaces the cookie jar and the client with new ones,
/// so nothing from a previous session leaks into the next.
pub struct PortalClient {
    user_agent: String,
    jar: Arc<Jar>,
    client: Client,
}

impl PortalClient {
    pub fn new(user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        let (jar, client) = fresh_client(&user_agent);
        Self {
            user_agent,
            jar,
            client,
        }
    }

    /// Value of the session cookie the portal set for `url`
    fn session_id(&self, url: &Url) -> Option<String> {
        let header = self.jar.cookies(url)?;
        let cookies = header.to_str().ok()?;
        cookies.split(';').find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            (name == SESSION_COOKIE).then(|| value.trim_matches('"').to_string())
        })
    }
}

fn fresh_client(user_agent: &str) -> (Arc<Jar>, Client) {
    let jar = Arc::new(Jar::default());
    let client = Client::builder()
        .user_agent(user_agent)
        .cookie_provider(Arc::clone(&jar))
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
        .expect("Failed to create HTTP client");
    (jar, client)
}

#[async_trait]
impl PortalTransport for PortalClient {
    async fn open_session(&mut self, url: &str) -> Result<Option<String>, TransportError> {
        let (jar, client) = fresh_client(&self.user_agent);
        self.jar = jar;
        self.client = client;

        let response = self.client.get(url).send().await?;
        let final_url = response.url().clone();
        read_body(response).await?;

        let requested = Url::parse(url).map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(self
            .session_id(&final_url)
            .or_else(|| self.session_id(&requested)))
    }

    async fn post_form(
        &mut self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<String, TransportError> {
        let response = self.client.post(url).form(form).send().await?;
        read_body(response).await
    }

    async fn get(&mut self, url: &str) -> Result<String, TransportError> {
        let response = self.client.get(url).send().await?;
        read_body(response).await
    }
}

//! Scraping the interactive search portal.
//!
//! A query is one POST followed by GETs that enlarge the page size and walk
//! the remaining result pages, all tied together by the server's session
//! and query identifiers.

pub use async_trait::async_trait;

pub mod client;
pub mod driver;
pub mod parse;
pub mod query;
pub mod session;

pub use client::PortalClient;
pub use driver::SearchDriver;
pub use query::{BoolOp, SearchField, SearchForm};
pub use session::Session;

use crate::record::ArticleRecord;
use crate::transport::TransportError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("Session handshake failed: {0}")]
    Handshake(TransportError),
    #[error("Portal did not issue a session ID cookie")]
    MissingSessionId,
    #[error("Session is unusable after a failed handshake: {0}")]
    SessionUnavailable(String),
    #[error("Expected exactly one query ID in the response, found {found:?}")]
    InconsistentQueryId { found: Vec<u64> },
}

impl QueryError {
    /// Numeric code for callers that report failures as `(-1, 0)`
    pub fn code(&self) -> i32 {
        -1
    }
}

/// Records gathered by one query and the number of result pages they cover
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub records: Vec<ArticleRecord>,
    pub pages: u32,
}

impl QueryOutcome {
    /// "Nothing found", which is not an error
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// HTTP round-trips against the portal, with cookie persistence between them
#[async_trait]
pub trait PortalTransport: Send {
    /// Throw away all cookies, request `url` and return the session ID cookie if one was set
    async fn open_session(&mut self, url: &str) -> Result<Option<String>, TransportError>;

    async fn post_form(
        &mut self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<String, TransportError>;

    /// `url` already carries its encoded query string
    async fn get(&mut self, url: &str) -> Result<String, TransportError>;
}

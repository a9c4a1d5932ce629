//! Batch citation lookups against the Links Article Match Retrieval service.
//!
//! Keys are split into request-sized groups, each group is posted as one XML
//! request, and a small pool of workers drains the groups concurrently.

pub use async_trait::async_trait;

pub mod client;
pub mod orchestrator;
pub mod request;
pub mod response;

pub use client::LamrClient;
pub use orchestrator::BatchFetcher;

use crate::record::IdType;
use crate::transport::TransportError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Batch mixes identifier types: expected {expected}, key {position} is {found}")]
    MixedIdTypes {
        expected: IdType,
        found: IdType,
        position: usize,
    },
    #[error("Failed to encode request: {0}")]
    Encode(String),
    #[error("Failed to parse response: {0}")]
    Parse(String),
    #[error("Group {group} sent {expected} keys but the response holds {returned} papers")]
    GroupSizeMismatch {
        group: usize,
        expected: usize,
        returned: usize,
    },
    #[error("Key {position} was '{expected}' but the service returned {id_type} {returned:?}")]
    KeyMismatch {
        position: usize,
        id_type: IdType,
        expected: String,
        returned: Option<String>,
    },
    #[error("Request for group {group} failed: {source}")]
    Transport {
        group: usize,
        #[source]
        source: TransportError,
    },
    #[error("Request for group {group} still failing after {attempts} attempts: {source}")]
    RetriesExhausted {
        group: usize,
        attempts: u32,
        #[source]
        source: TransportError,
    },
}

/// Sends one encoded request to the batch service and returns the raw response body
#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn submit(&self, payload: &str) -> Result<String, TransportError>;
}

#[async_trait]
impl<T: BatchTransport + ?Sized> BatchTransport for Arc<T> {
    async fn submit(&self, payload: &str) -> Result<String, TransportError> {
        (**self).submit(payload).await
    }
}

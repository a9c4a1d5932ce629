pub mod config;
pub mod lamr;
pub mod matcher;
pub mod papers;
pub mod record;
pub mod report;
pub mod search;
pub mod soap;
pub mod transport;

pub use config::Config;
pub use lamr::{BatchFetcher, FetchError, LamrClient};
pub use papers::Paper;
pub use record::{ArticleRecord, CitationRecord, IdType, QueryKey};
pub use search::{PortalClient, QueryError, QueryOutcome, SearchDriver};
pub use transport::TransportError;

/// Batch fetcher talking to the configured citation service
pub fn lamr_fetcher(config: &Config) -> BatchFetcher<LamrClient> {
    BatchFetcher::new(LamrClient::new(config.lamr.url.clone()), &config.lamr)
}

/// Search driver with its own portal session
pub fn search_driver(config: &Config) -> SearchDriver<PortalClient> {
    SearchDriver::new(
        PortalClient::new(config.portal.user_agent.clone()),
        config.portal.clone(),
    )
}

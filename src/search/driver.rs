use super::parse;
use super::query::{page_params, page_size_params, with_query, SearchField, SearchForm};
use super::session::Session;
use super::{PortalTransport, QueryError, QueryOutcome};
use crate::config::PortalConfig;
use crate::papers::Paper;
use crate::transport::TransportError;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    /// No handshake yet; the first query performs one
    Unauthenticated,
    Active,
    /// A handshake failed; the driver refuses further queries
    Broken(String),
}

/// Runs queries against the search portal, one at a time, on a single session.
///
/// Queries mutate the session (its ID and counters), so they take `&mut self`;
/// concurrent querying needs one driver per session.
pub struct SearchDriver<T: PortalTransport> {
    transport: T,
    config: PortalConfig,
    session: Session,
    state: SessionState,
}

impl<T: PortalTransport> SearchDriver<T> {
    pub fn new(transport: T, config: PortalConfig) -> Self {
        Self {
            transport,
            config,
            session: Session::default(),
            state: SessionState::Unauthenticated,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Search for several papers at once by OR-ing one of their fields
    pub async fn query_for_field(
        &mut self,
        papers: &[Paper],
        field: SearchField,
    ) -> Result<QueryOutcome, QueryError> {
        let values = papers.iter().filter_map(|paper| match field {
            SearchField::Title => paper.title.as_deref(),
            SearchField::Doi => paper.doi.as_deref(),
            SearchField::Author => paper.authors.first().map(String::as_str),
        });
        let form = SearchForm::any_of(field, values);
        self.query(&form).await
    }

    pub async fn query_for_title(&mut self, papers: &[Paper]) -> Result<QueryOutcome, QueryError> {
        self.query_for_field(papers, SearchField::Title).await
    }

    pub async fn query_for_doi(&mut self, papers: &[Paper]) -> Result<QueryOutcome, QueryError> {
        self.query_for_field(papers, SearchField::Doi).await
    }

    /// Papers co-authored by both authors
    pub async fn query_for_author_pair(
        &mut self,
        first: &str,
        second: &str,
    ) -> Result<QueryOutcome, QueryError> {
        self.query(&SearchForm::author_pair(first, second)).await
    }

    /// Submit one query and collect the records from all of its result pages.
    ///
    /// A response without a usable page count means nothing was found and
    /// yields an empty outcome. When a later page cannot be fetched, the
    /// records gathered so far are returned along with the number of pages
    /// they came from.
    pub async fn query(&mut self, form: &SearchForm) -> Result<QueryOutcome, QueryError> {
        if form.is_empty() {
            debug!("Query has no terms, nothing to search for");
            return Ok(QueryOutcome::empty());
        }

        self.prepare_session().await?;
        self.session.query_count += 1;
        let query = self.session.query_count;
        let sid = self.sid()?;

        let search_url = self.config.search_url.clone();
        let response = self
            .post(&search_url, &form.to_form(&sid))
            .await
            .inspect_err(|e| warn!(query, "Search request failed: {}", e))?;

        let mut pages = match parse::page_count(&response) {
            Some(pages) => pages,
            None => {
                info!(query, terms = ?form.terms(), "No usable page count, treating as no results");
                return Ok(QueryOutcome::empty());
            }
        };
        if pages == 0 {
            return Ok(QueryOutcome::empty());
        }

        // The server's query ID does not always follow our own count, so take it from the page.
        let qid = match parse::query_ids(&response).as_slice() {
            [qid] => *qid,
            found => {
                warn!(query, ?found, terms = ?form.terms(), "Could not find a consistent query ID");
                return Err(QueryError::InconsistentQueryId {
                    found: found.to_vec(),
                });
            }
        };

        let mut first_page = response;
        if pages > 1 {
            let url = with_query(
                &self.config.summary_url,
                &page_size_params(qid, &sid, self.config.page_size),
            );
            first_page = self.get(&url).await?;
            pages = match parse::page_count(&first_page) {
                Some(pages) => pages,
                None => {
                    info!(query, "No usable page count after resizing pages");
                    return Ok(QueryOutcome::empty());
                }
            };
        }

        let mut records = parse::result_items(&first_page);

        if pages > self.config.max_pages {
            info!(query, pages, "Too many result pages, keeping only the first");
            return Ok(QueryOutcome { records, pages: 1 });
        }

        for page in 2..=pages {
            debug!(query, page, "Fetching additional page");
            let url = with_query(&self.config.summary_url, &page_params(qid, &sid, page));
            match self.get(&url).await {
                Ok(html) => records.extend(parse::result_items(&html)),
                Err(e) => {
                    warn!(query, page, "Page request failed, returning partial results: {}", e);
                    return Ok(QueryOutcome {
                        records,
                        pages: page - 1,
                    });
                }
            }
        }

        Ok(QueryOutcome { records, pages })
    }

    fn sid(&self) -> Result<String, QueryError> {
        self.session.sid.clone().ok_or(QueryError::MissingSessionId)
    }

    /// Handshake on first use, pause now and then, and start a fresh session
    /// once the current one has served its share of queries.
    async fn prepare_session(&mut self) -> Result<(), QueryError> {
        match &self.state {
            SessionState::Broken(reason) => {
                return Err(QueryError::SessionUnavailable(reason.clone()))
            }
            SessionState::Unauthenticated => return self.connect().await,
            SessionState::Active => {}
        }

        if let Some(delay) = self.jitter() {
            tokio::time::sleep(delay).await;
        }

        if self.session.due_for_reset(self.config.query_reset) {
            let backoff = self.reset_backoff();
            info!(
                query = self.session.query_count,
                ?backoff,
                "Resetting session with the portal"
            );
            tokio::time::sleep(backoff).await;
            self.connect().await?;
        }
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), QueryError> {
        self.session.sid = None;
        self.session.get_requests += 1;
        let root = self.config.root_url.clone();

        match self.transport.open_session(&root).await {
            Ok(Some(sid)) => {
                debug!(session = self.session.session_count + 1, "Opened portal session");
                self.session.sid = Some(sid);
                self.session.session_count += 1;
                self.state = SessionState::Active;
                Ok(())
            }
            Ok(None) => {
                warn!("Portal did not set a session ID cookie");
                self.state = SessionState::Broken(QueryError::MissingSessionId.to_string());
                Err(QueryError::MissingSessionId)
            }
            Err(e) => {
                warn!("Session handshake failed: {}", e);
                self.state = SessionState::Broken(e.to_string());
                Err(QueryError::Handshake(e))
            }
        }
    }

    async fn post(&mut self, url: &str, form: &[(String, String)]) -> Result<String, TransportError> {
        self.session.post_requests += 1;
        self.transport.post_form(url, form).await
    }

    async fn get(&mut self, url: &str) -> Result<String, TransportError> {
        self.session.get_requests += 1;
        self.transport.get(url).await
    }

    fn jitter(&self) -> Option<Duration> {
        let mut rng = rand::thread_rng();
        if self.config.max_jitter_ms == 0 || rng.gen::<f64>() >= self.config.jitter_probability {
            return None;
        }
        Some(Duration::from_millis(rng.gen_range(0..=self.config.max_jitter_ms)))
    }

    fn reset_backoff(&self) -> Duration {
        let spread = if self.config.reset_backoff_spread_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.config.reset_backoff_spread_ms)
        };
        Duration::from_millis(self.config.reset_backoff_min_ms + spread)
    }
}

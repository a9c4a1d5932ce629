use super::request::build_request;
use super::response::parse_response;
use super::{BatchTransport, FetchError};
use crate::config::{LamrConfig, RetryConfig};
use crate::record::{CitationRecord, IdType, QueryKey};
use futures::future::try_join_all;
use indicatif::ProgressBar;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Progress of one request group
#[derive(Debug)]
enum Slot {
    /// Waiting for a worker; `attempts` counts failed tries so far
    Pending { attempts: u32 },
    /// Claimed by exactly one worker
    InFlight { attempts: u32 },
    /// Raw response body of the one successful call
    Done(String),
}

/// Outcome of asking the table for work
#[derive(Debug, PartialEq, Eq)]
enum Claim {
    Group { index: usize, attempt: u32 },
    /// Nothing pending, but a group in flight may still come back
    Wait,
    Finished,
}

/// Shared slot table. Claiming, releasing and completing all go through
/// one lock, so a group is never in flight at two workers.
struct SlotTable {
    slots: Mutex<Vec<Slot>>,
    changed: Notify,
}

impl SlotTable {
    fn new(groups: usize) -> Self {
        Self {
            slots: Mutex::new((0..groups).map(|_| Slot::Pending { attempts: 0 }).collect()),
            changed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        // A worker never panics while holding the lock, but recover the data if one did.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the lowest-indexed pending group
    fn claim(&self) -> Claim {
        let mut slots = self.lock();
        let claimed = slots.iter_mut().enumerate().find_map(|(index, slot)| match *slot {
            Slot::Pending { attempts } => {
                *slot = Slot::InFlight { attempts };
                Some(Claim::Group {
                    index,
                    attempt: attempts + 1,
                })
            }
            _ => None,
        });
        if let Some(claim) = claimed {
            return claim;
        }
        if slots.iter().any(|s| matches!(s, Slot::InFlight { .. })) {
            Claim::Wait
        } else {
            Claim::Finished
        }
    }

    fn complete(&self, index: usize, body: String) {
        self.lock()[index] = Slot::Done(body);
        self.changed.notify_waiters();
    }

    /// Put a failed group back so any free worker can retry it
    fn release(&self, index: usize) {
        {
            let mut slots = self.lock();
            if let Slot::InFlight { attempts } = slots[index] {
                slots[index] = Slot::Pending {
                    attempts: attempts + 1,
                };
            }
        }
        self.changed.notify_waiters();
    }

    fn into_bodies(self) -> Vec<Option<String>> {
        self.slots
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .into_iter()
            .map(|slot| match slot {
                Slot::Done(body) => Some(body),
                _ => None,
            })
            .collect()
    }
}

/// Fetches citation records for large batches of keys through a bounded worker pool
pub struct BatchFetcher<T: BatchTransport> {
    transport: T,
    source: String,
    request_limit: usize,
    max_workers: usize,
    retry: RetryConfig,
    progress: Option<ProgressBar>,
}

impl<T: BatchTransport> BatchFetcher<T> {
    pub fn new(transport: T, config: &LamrConfig) -> Self {
        Self {
            transport,
            source: config.source_attribute(),
            request_limit: config.request_limit.max(1),
            max_workers: config.max_workers.max(1),
            retry: config.retry.clone(),
            progress: None,
        }
    }

    /// Advance `progress` by one for every completed request group
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn fetch_by_doi(
        &self,
        dois: &[&str],
    ) -> Result<Vec<Option<CitationRecord>>, FetchError> {
        self.fetch_values(IdType::Doi, dois).await
    }

    pub async fn fetch_by_pmid(
        &self,
        pmids: &[&str],
    ) -> Result<Vec<Option<CitationRecord>>, FetchError> {
        self.fetch_values(IdType::Pmid, pmids).await
    }

    pub async fn fetch_by_ut(&self, uts: &[&str]) -> Result<Vec<Option<CitationRecord>>, FetchError> {
        self.fetch_values(IdType::Ut, uts).await
    }

    async fn fetch_values(
        &self,
        id_type: IdType,
        values: &[&str],
    ) -> Result<Vec<Option<CitationRecord>>, FetchError> {
        let keys: Vec<QueryKey> = values.iter().map(|v| QueryKey::new(id_type, *v)).collect();
        self.fetch(&keys, id_type).await
    }

    /// Look up every key and return one slot per key, in input order.
    ///
    /// A slot is `None` when the service reports no match. A returned
    /// identifier that differs from the requested one is an error, since it
    /// means results and keys have drifted apart.
    pub async fn fetch(
        &self,
        keys: &[QueryKey],
        id_type: IdType,
    ) -> Result<Vec<Option<CitationRecord>>, FetchError> {
        if let Some((position, key)) = keys.iter().enumerate().find(|(_, k)| k.id_type != id_type) {
            return Err(FetchError::MixedIdTypes {
                expected: id_type,
                found: key.id_type,
                position,
            });
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let groups: Vec<&[QueryKey]> = keys.chunks(self.request_limit).collect();
        let payloads = groups
            .iter()
            .map(|group| {
                let values: Vec<&str> = group.iter().map(|k| k.value.as_str()).collect();
                build_request(&self.source, id_type, &values)
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            papers = keys.len(),
            requests = payloads.len(),
            "Fetching papers by {}",
            id_type
        );

        let bodies = self.dispatch(&payloads).await?;

        let mut found = Vec::with_capacity(keys.len());
        for (group_index, (group, body)) in groups.iter().zip(bodies).enumerate() {
            let records = parse_response(&body)?;
            if records.len() != group.len() {
                return Err(FetchError::GroupSizeMismatch {
                    group: group_index,
                    expected: group.len(),
                    returned: records.len(),
                });
            }
            for (key, record) in group.iter().zip(records) {
                let position = found.len();
                if record.is_not_found() {
                    found.push(None);
                    continue;
                }
                check_key(position, key, &record)?;
                found.push(Some(record));
            }
        }

        Ok(found)
    }

    /// Send every payload exactly once successfully and return the bodies in payload order
    async fn dispatch(&self, payloads: &[String]) -> Result<Vec<String>, FetchError> {
        let table = SlotTable::new(payloads.len());
        let workers = self.max_workers.min(payloads.len());

        try_join_all((0..workers).map(|worker| self.run_worker(worker, &table, payloads))).await?;

        table
            .into_bodies()
            .into_iter()
            .enumerate()
            .map(|(group, body)| {
                body.ok_or_else(|| FetchError::Parse(format!("Group {} never completed", group)))
            })
            .collect()
    }

    async fn run_worker(
        &self,
        worker: usize,
        table: &SlotTable,
        payloads: &[String],
    ) -> Result<(), FetchError> {
        loop {
            // Register interest before looking, so a release between the look
            // and the wait still wakes this worker.
            let changed = table.changed.notified();

            let (index, attempt) = match table.claim() {
                Claim::Group { index, attempt } => (index, attempt),
                Claim::Wait => {
                    changed.await;
                    continue;
                }
                Claim::Finished => return Ok(()),
            };

            debug!(worker, group = index, attempt, "Submitting request");
            match self.transport.submit(&payloads[index]).await {
                Ok(body) => {
                    table.complete(index, body);
                    if let Some(progress) = &self.progress {
                        progress.inc(1);
                    }
                }
                Err(err) if err.is_transient() => {
                    if self.retry.exhausted(attempt) {
                        return Err(FetchError::RetriesExhausted {
                            group: index,
                            attempts: attempt,
                            source: err,
                        });
                    }
                    let delay = self.retry.backoff(attempt);
                    warn!(worker, group = index, attempt, ?delay, "Connection error, will retry: {}", err);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    table.release(index);
                }
                Err(err) => {
                    return Err(FetchError::Transport {
                        group: index,
                        source: err,
                    })
                }
            }
        }
    }
}

fn check_key(position: usize, key: &QueryKey, record: &CitationRecord) -> Result<(), FetchError> {
    let returned = record.id(key.id_type);
    match returned {
        Some(value) if value.to_lowercase() == key.value.to_lowercase() => Ok(()),
        _ => Err(FetchError::KeyMismatch {
            position,
            id_type: key.id_type,
            expected: key.value.clone(),
            returned: returned.map(str::to_string),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lamr::async_trait;
    use crate::transport::TransportError;
    use regex::Regex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every request from the keys it carries. Values listed in
    /// `missing` come back as not found, `rename` swaps the echoed value,
    /// and `flaky` makes the first N calls for a group fail with a
    /// connection error.
    #[derive(Default)]
    struct EchoService {
        missing: Vec<String>,
        rename: HashMap<String, String>,
        flaky: Mutex<HashMap<String, usize>>,
        fatal: bool,
        calls: Mutex<HashMap<String, usize>>,
        successes: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
    }

    fn first_value(payload: &str) -> String {
        let re = Regex::new(r#"<map name="0"><val name="\w+">([^<]*)</val>"#).unwrap();
        re.captures(payload).unwrap()[1].to_string()
    }

    #[async_trait]
    impl BatchTransport for EchoService {
        async fn submit(&self, payload: &str) -> Result<String, TransportError> {
            self.total.fetch_add(1, Ordering::SeqCst);
            let group = first_value(payload);
            *self.calls.lock().unwrap().entry(group.clone()).or_default() += 1;

            if self.fatal {
                return Err(TransportError::Status {
                    status: 403,
                    url: "mock".into(),
                });
            }
            {
                let mut flaky = self.flaky.lock().unwrap();
                if let Some(left) = flaky.get_mut(&group) {
                    if *left > 0 {
                        *left -= 1;
                        return Err(TransportError::Connect("connection reset".into()));
                    }
                }
            }
            tokio::task::yield_now().await;

            let re = Regex::new(r#"<map name="(\d+)"><val name="(\w+)">([^<]*)</val></map>"#).unwrap();
            let mut papers = String::new();
            // Reverse the order: the service does not keep it.
            let caps: Vec<_> = re.captures_iter(payload).collect();
            for cap in caps.iter().rev() {
                let value = &cap[3];
                let fields = if self.missing.iter().any(|m| m == value) {
                    r#"<val name="message">No Result Found</val>"#.to_string()
                } else {
                    let echoed = self
                        .rename
                        .get(value)
                        .cloned()
                        .unwrap_or_else(|| value.to_uppercase());
                    format!(
                        r#"<val name="{}">{}</val><val name="timesCited">{}</val>"#,
                        &cap[2],
                        echoed,
                        value.len()
                    )
                };
                papers.push_str(&format!(
                    r#"<map name="{}"><map name="WOS">{}</map></map>"#,
                    &cap[1], fields
                ));
            }
            *self.successes.lock().unwrap().entry(group).or_default() += 1;
            Ok(format!(
                r#"<response><fn name="LinksAMR.retrieve" rc="OK"><map>{}</map></fn></response>"#,
                papers
            ))
        }
    }

    fn config(request_limit: usize, max_workers: usize) -> LamrConfig {
        LamrConfig {
            request_limit,
            max_workers,
            retry: RetryConfig::unbounded(),
            ..LamrConfig::default()
        }
    }

    fn keys(n: usize) -> Vec<QueryKey> {
        (0..n).map(|i| QueryKey::doi(format!("10.1000/p{}", i))).collect()
    }

    #[tokio::test]
    async fn test_output_matches_input_for_any_grouping() {
        for (n, limit, workers) in [(1, 50, 10), (7, 3, 2), (120, 50, 10), (23, 1, 4), (50, 50, 1)] {
            let fetcher = BatchFetcher::new(EchoService::default(), &config(limit, workers));
            let input = keys(n);
            let found = fetcher.fetch(&input, IdType::Doi).await.unwrap();

            assert_eq!(found.len(), n);
            for (key, record) in input.iter().zip(&found) {
                let record = record.as_ref().unwrap();
                assert_eq!(record.id(IdType::Doi).unwrap().to_lowercase(), key.value);
            }
            assert_eq!(
                fetcher.transport().total.load(Ordering::SeqCst),
                n.div_ceil(limit)
            );
        }
    }

    #[tokio::test]
    async fn test_not_found_keys_are_absent() {
        let service = EchoService {
            missing: vec!["10.1000/p1".into(), "10.1000/p4".into()],
            ..EchoService::default()
        };
        let fetcher = BatchFetcher::new(service, &config(2, 3));
        let found = fetcher.fetch(&keys(5), IdType::Doi).await.unwrap();

        let present: Vec<bool> = found.iter().map(Option::is_some).collect();
        assert_eq!(present, vec![true, false, true, true, false]);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_once_to_completion() {
        let service = EchoService::default();
        service
            .flaky
            .lock()
            .unwrap()
            .insert("10.1000/p4".into(), 2);
        let fetcher = BatchFetcher::new(service, &config(4, 3));
        let found = fetcher.fetch(&keys(12), IdType::Doi).await.unwrap();

        assert_eq!(found.len(), 12);
        assert!(found.iter().all(Option::is_some));

        let service = fetcher.transport();
        assert_eq!(service.calls.lock().unwrap()["10.1000/p4"], 3);
        let successes = service.successes.lock().unwrap();
        assert_eq!(successes.len(), 3);
        assert!(successes.values().all(|&count| count == 1));
    }

    #[tokio::test]
    async fn test_retry_limit_is_reported() {
        let service = EchoService::default();
        service
            .flaky
            .lock()
            .unwrap()
            .insert("10.1000/p0".into(), usize::MAX);
        let mut cfg = config(10, 2);
        cfg.retry = RetryConfig {
            max_attempts: Some(3),
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
        };
        let fetcher = BatchFetcher::new(service, &cfg);
        let err = fetcher.fetch(&keys(3), IdType::Doi).await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::RetriesExhausted {
                group: 0,
                attempts: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_non_transient_failure_is_fatal() {
        let service = EchoService {
            fatal: true,
            ..EchoService::default()
        };
        let fetcher = BatchFetcher::new(service, &config(10, 2));
        let err = fetcher.fetch(&keys(3), IdType::Doi).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
        assert_eq!(fetcher.transport().total.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mismatched_identifier_is_fatal() {
        let mut rename = HashMap::new();
        rename.insert("10.1000/p2".to_string(), "10.9999/other".to_string());
        let service = EchoService {
            rename,
            ..EchoService::default()
        };
        let fetcher = BatchFetcher::new(service, &config(50, 10));
        let err = fetcher.fetch(&keys(4), IdType::Doi).await.unwrap_err();

        match err {
            FetchError::KeyMismatch {
                position,
                expected,
                returned,
                ..
            } => {
                assert_eq!(position, 2);
                assert_eq!(expected, "10.1000/p2");
                assert_eq!(returned.as_deref(), Some("10.9999/other"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_mixed_key_types_rejected() {
        let fetcher = BatchFetcher::new(EchoService::default(), &config(50, 10));
        let input = vec![QueryKey::doi("10.1/a"), QueryKey::pmid("123")];
        let err = fetcher.fetch(&input, IdType::Doi).await.unwrap_err();
        assert!(matches!(err, FetchError::MixedIdTypes { position: 1, .. }));
        assert_eq!(fetcher.transport().total.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        let fetcher = BatchFetcher::new(EchoService::default(), &config(50, 10));
        assert!(fetcher.fetch_by_doi(&[]).await.unwrap().is_empty());
        assert_eq!(fetcher.transport().total.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_claim_takes_lowest_pending_and_waits_on_in_flight() {
        let table = SlotTable::new(3);
        assert_eq!(table.claim(), Claim::Group { index: 0, attempt: 1 });
        assert_eq!(table.claim(), Claim::Group { index: 1, attempt: 1 });
        table.release(0);
        assert_eq!(table.claim(), Claim::Group { index: 0, attempt: 2 });
        assert_eq!(table.claim(), Claim::Group { index: 2, attempt: 1 });
        assert_eq!(table.claim(), Claim::Wait);
        table.complete(0, "a".into());
        table.complete(1, "b".into());
        assert_eq!(table.claim(), Claim::Wait);
        table.complete(2, "c".into());
        assert_eq!(table.claim(), Claim::Finished);
    }
}

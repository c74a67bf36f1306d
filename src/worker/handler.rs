use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::deliver::{self, Delivered};
use super::fetch::ArtifactFetcher;
use crate::core::models::DownloadResult;
use crate::errors::HandlingError;
use crate::telegram::ChatTransport;

/// What the consumer should tell the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fully handled, discard.
    Ack,
    /// Transient failure, redeliver.
    Requeue,
    /// Malformed or out of attempts, drop (or dead-letter).
    Discard,
}

/// Failure counts older than this are dropped; the message is long gone.
pub const ATTEMPT_TTL: Duration = Duration::from_secs(60 * 60);

/// Most failure counts kept at once. The stalest go first past this.
pub const MAX_TRACKED_RESULTS: usize = 10_000;

/// Per-result failure counts, bounded by age and size.
#[derive(Debug)]
struct AttemptLedger {
    entries: HashMap<String, (u32, Instant)>,
    ttl: Duration,
    capacity: usize,
}

impl AttemptLedger {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn record(&mut self, id: &str) -> u32 {
        let now = Instant::now();
        self.prune(now);

        if !self.entries.contains_key(id) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        let (count, seen) = self.entries.entry(id.to_string()).or_insert((0, now));
        *count += 1;
        *seen = now;
        *count
    }

    fn forget(&mut self, id: &str) {
        self.entries.remove(id);
    }

    fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, (_, seen)| now.saturating_duration_since(*seen) < ttl);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(dropped, "Expired stale attempt counters");
        }
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, (_, seen))| *seen)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            self.entries.remove(&id);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Runs the result-handling protocol for one message at a time.
pub struct ResultHandler {
    fetcher: ArtifactFetcher,
    transport: Arc<dyn ChatTransport>,
    max_attempts: u32,
    attempts: Mutex<AttemptLedger>,
}

impl ResultHandler {
    #[must_use]
    pub fn new(
        fetcher: ArtifactFetcher,
        transport: Arc<dyn ChatTransport>,
        max_attempts: u32,
    ) -> Self {
        Self {
            fetcher,
            transport,
            max_attempts: max_attempts.max(1),
            attempts: Mutex::new(AttemptLedger::new(ATTEMPT_TTL, MAX_TRACKED_RESULTS)),
        }
    }

    /// Overrides how long and how many failure counts are remembered.
    #[must_use]
    pub fn with_attempt_limits(mut self, ttl: Duration, capacity: usize) -> Self {
        self.attempts = Mutex::new(AttemptLedger::new(ttl, capacity));
        self
    }

    /// Number of results currently carrying a failure count.
    #[must_use]
    pub fn tracked_results(&self) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Decodes `body`, handles it and picks the broker disposition.
    pub async fn process(&self, body: &[u8]) -> Disposition {
        let result = match DownloadResult::decode(body) {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Dropping malformed result message");
                return Disposition::Discard;
            }
        };

        match self.handle(&result).await {
            Ok(delivered) => {
                self.forget(&result.id);
                info!(
                    task_id = %result.id,
                    chat_id = result.chat_id,
                    outcome = ?delivered,
                    "Handled result"
                );
                Disposition::Ack
            }
            Err(e) => {
                let attempts = self.record_failure(&result.id);
                if attempts >= self.max_attempts {
                    self.forget(&result.id);
                    error!(
                        task_id = %result.id,
                        attempts,
                        error = %e,
                        "Giving up on result"
                    );
                    Disposition::Discard
                } else {
                    warn!(
                        task_id = %result.id,
                        attempts,
                        error = %e,
                        "Failed to handle result, requeueing"
                    );
                    Disposition::Requeue
                }
            }
        }
    }

    /// Decide then dispatch. The fetched artifact never outlives this call.
    ///
    /// # Errors
    ///
    /// Returns the fetch or delivery error that interrupted handling.
    pub async fn handle(&self, result: &DownloadResult) -> Result<Delivered, HandlingError> {
        info!(task_id = %result.id, url = %result.url, "Processing result");
        let outcome = deliver::decide(result, &self.fetcher).await?;
        Ok(deliver::dispatch(outcome, self.transport.as_ref()).await?)
    }

    fn record_failure(&self, id: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(id)
    }

    fn forget(&self, id: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .forget(id);
    }
}

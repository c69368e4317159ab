//! Batching webhook transport with retry and rate-limit handling.
//!
//! Entries are queued in arrival order and delivered in groups of at most
//! `max_batch_size`, either when the batch interval elapses or as soon as the
//! queue fills up. Failed batches go to a retry queue with exponential
//! backoff; a 429 response waits out the advertised `Retry-After` first.
//!
//! The pending and retry queues are unbounded. Under sustained overload they
//! grow without limit, so callers that need bounded memory must throttle
//! upstream of `log`.

pub mod batch;
pub mod client;
pub mod registry;
pub mod retry;

pub use batch::{Batch, MAX_CONTENT_CHARS, format_entry, pack_messages};
pub use registry::WebhookRegistry;

use super::{ErrorReporter, Transport, TransportError, TransportOptions, report};
use crate::app::config::serde_helpers;
use crate::domain::LogEntry;
use crate::redact::RedactionTarget;
use async_trait::async_trait;
use batch::QueuedEntry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use retry::Backoff;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    #[serde(with = "serde_helpers")]
    pub batch_interval: Duration,
    pub max_batch_size: usize,
    pub username: String,
    pub max_retries: u32,
    /// Silences `tracing` output for delivery failures. The error reporter
    /// still sees them.
    pub suppress_console_errors: bool,
    #[serde(with = "serde_helpers")]
    pub retry_base_delay: Duration,
    #[serde(with = "serde_helpers")]
    pub max_retry_delay: Duration,
    pub jitter: bool,
    #[serde(with = "serde_helpers")]
    pub request_timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            batch_interval: Duration::from_millis(2000),
            max_batch_size: 10,
            username: "JellyLogger".to_string(),
            max_retries: 3,
            suppress_console_errors: false,
            retry_base_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
            jitter: false,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl WebhookConfig {
    fn batch_limit(&self) -> usize {
        self.max_batch_size.max(1)
    }

    fn backoff(&self) -> Backoff {
        Backoff {
            base_delay: self.retry_base_delay,
            max_delay: self.max_retry_delay,
            jitter: self.jitter,
        }
    }
}

#[derive(Debug)]
struct RetryItem {
    batch: Batch,
    retry_count: u32,
    next_attempt: Instant,
}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Queues {
    pending: VecDeque<QueuedEntry>,
    retry: VecDeque<RetryItem>,
    timer: Option<Timer>,
    timer_generation: u64,
}

impl Queues {
    /// How long until something needs delivering, if anything is queued.
    fn next_due(&self, batch_interval: Duration) -> Option<Duration> {
        if !self.pending.is_empty() {
            return Some(batch_interval);
        }
        let now = Instant::now();
        self.retry
            .iter()
            .map(|item| item.next_attempt.saturating_duration_since(now))
            .min()
    }
}

type FlushFuture = Shared<BoxFuture<'static, ()>>;

struct WebhookInner {
    url: String,
    config: WebhookConfig,
    client: reqwest::Client,
    queues: parking_lot::Mutex<Queues>,
    in_flight: parking_lot::Mutex<Option<FlushFuture>>,
    reporter: Option<ErrorReporter>,
}

/// Cheap to clone; clones share queues, timer and flush state.
#[derive(Clone)]
pub struct WebhookTransport {
    inner: Arc<WebhookInner>,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>, config: WebhookConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("jelly-logger/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TransportError::ClientBuild)?;
        Ok(Self::with_client(url, config, client))
    }

    pub fn with_client(url: impl Into<String>, config: WebhookConfig, client: reqwest::Client) -> Self {
        Self::build(url.into(), config, client, None)
    }

    pub(crate) fn build(
        url: String,
        config: WebhookConfig,
        client: reqwest::Client,
        reporter: Option<ErrorReporter>,
    ) -> Self {
        Self {
            inner: Arc::new(WebhookInner {
                url,
                config,
                client,
                queues: parking_lot::Mutex::new(Queues::default()),
                in_flight: parking_lot::Mutex::new(None),
                reporter,
            }),
        }
    }

    /// Must be called before the transport is cloned or used.
    pub fn with_error_reporter(mut self, reporter: ErrorReporter) -> Self {
        let inner = Arc::get_mut(&mut self.inner);
        debug_assert!(
            inner.is_some(),
            "with_error_reporter called on a shared WebhookTransport"
        );
        match inner {
            Some(inner) => inner.reporter = Some(reporter),
            None => warn!("Error reporter ignored: {} is already shared", self.inner.url),
        }
        self
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.inner.config
    }

    pub fn pending_len(&self) -> usize {
        self.inner.queues.lock().pending.len()
    }

    pub fn retry_len(&self) -> usize {
        self.inner.queues.lock().retry.len()
    }

    pub fn has_timer(&self) -> bool {
        self.inner.queues.lock().timer.is_some()
    }

    pub(crate) fn same_instance(&self, other: &WebhookTransport) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl WebhookInner {
    fn report(&self, error: TransportError) {
        report(
            self.reporter.as_ref(),
            error,
            self.config.suppress_console_errors,
        );
    }

    fn arm_timer(self: &Arc<Self>, queues: &mut Queues, delay: Duration) {
        queues.timer_generation += 1;
        let generation = queues.timer_generation;
        let inner = Arc::clone(self);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                // A newer timer replaced this one while it slept.
                let mut queues = inner.queues.lock();
                if queues.timer.as_ref().map(|t| t.generation) != Some(generation) {
                    return;
                }
                queues.timer = None;
            }
            inner.flush_pass().await;
        });

        queues.timer = Some(Timer { generation, handle });
    }

    fn rearm_timer(self: &Arc<Self>) {
        let mut queues = self.queues.lock();
        if let Some(timer) = queues.timer.take() {
            timer.handle.abort();
        }
        if let Some(delay) = queues.next_due(self.config.batch_interval) {
            self.arm_timer(&mut queues, delay);
        }
    }

    /// Runs one flush pass, or joins the pass already running.
    async fn flush_pass(self: &Arc<Self>) {
        let pass = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.as_ref() {
                Some(pass) => pass.clone(),
                None => {
                    let inner = Arc::clone(self);
                    // Spawned so the pass completes even if every waiter is dropped.
                    let handle = tokio::spawn(async move { inner.run_pass().await });
                    let pass = async move {
                        let _ = handle.await;
                    }
                    .boxed()
                    .shared();
                    *in_flight = Some(pass.clone());
                    pass
                }
            }
        };
        pass.await;
    }

    async fn run_pass(self: Arc<Self>) {
        let limit = self.config.batch_limit();

        loop {
            let group: Vec<QueuedEntry> = {
                let mut queues = self.queues.lock();
                if queues.pending.is_empty() {
                    break;
                }
                let take = queues.pending.len().min(limit);
                queues.pending.drain(..take).collect()
            };
            let batch = Batch::pack(group, self.reporter.as_ref());
            self.deliver_with_retry(batch, 0).await;
        }

        let due: Vec<RetryItem> = {
            let mut queues = self.queues.lock();
            let now = Instant::now();
            let (due, waiting): (VecDeque<RetryItem>, VecDeque<RetryItem>) = queues
                .retry
                .drain(..)
                .partition(|item| item.next_attempt <= now);
            queues.retry = waiting;
            due.into()
        };
        for item in due {
            self.deliver_with_retry(item.batch, item.retry_count).await;
        }

        self.rearm_timer();
        *self.in_flight.lock() = None;
    }

    async fn deliver_with_retry(&self, batch: Batch, retry_count: u32) {
        match self.deliver(&batch).await {
            Ok(()) => {
                if retry_count > 0 {
                    info!(
                        "Delivered batch {} on attempt {}",
                        batch.id(),
                        retry_count + 1
                    );
                }
            }
            Err(error) if error.is_retryable() && retry_count < self.config.max_retries => {
                // A rate-limited attempt already slept through Retry-After.
                let delay = if error.is_rate_limited() {
                    Duration::ZERO
                } else {
                    self.config.backoff().delay(retry_count)
                };
                if !self.config.suppress_console_errors {
                    warn!(
                        "Batch {} failed ({}), retrying in {:?} (attempt {})",
                        batch.id(),
                        error,
                        delay,
                        retry_count + 2
                    );
                }
                if let Some(reporter) = &self.reporter {
                    reporter(&error);
                }
                self.queues.lock().retry.push_back(RetryItem {
                    batch,
                    retry_count: retry_count + 1,
                    next_attempt: Instant::now() + delay,
                });
            }
            Err(error) => {
                self.report(error);
                self.report(TransportError::RetriesExhausted {
                    batch_id: batch.id().to_string(),
                    entries: batch.size(),
                    attempts: retry_count + 1,
                });
            }
        }
    }

    /// Sends every message of the batch in order.
    ///
    /// Network-level failures are reported here and count as done: a
    /// destination that cannot be reached or parsed will not recover on retry.
    async fn deliver(&self, batch: &Batch) -> Result<(), TransportError> {
        for message in batch.messages() {
            let result = client::send_message(
                &self.client,
                &self.url,
                &self.config.username,
                message,
                self.config.request_timeout,
            )
            .await;

            match result {
                Ok(()) => {}
                Err(error @ TransportError::Network(_)) => {
                    self.report(error);
                    debug!("Dropping batch {} after network failure", batch.id());
                    return Ok(());
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for WebhookTransport {
    async fn log(&self, entry: &LogEntry, options: &TransportOptions) {
        let entry = options.redact(entry, RedactionTarget::Webhook).into_owned();

        let batch_full = {
            let mut queues = self.inner.queues.lock();
            queues.pending.push_back(QueuedEntry {
                entry,
                options: options.clone(),
            });
            if queues.timer.is_none() {
                self.inner.arm_timer(&mut queues, self.inner.config.batch_interval);
            }
            queues.pending.len() >= self.inner.config.batch_limit()
        };

        if batch_full {
            self.inner.flush_pass().await;
        }
    }

    /// Delivers everything queued, waiting out scheduled retries.
    async fn flush(&self, _options: &TransportOptions) {
        loop {
            self.inner.flush_pass().await;
            let wait = {
                let queues = self.inner.queues.lock();
                if queues.pending.is_empty() {
                    queues.next_due(Duration::ZERO)
                } else {
                    Some(Duration::ZERO)
                }
            };
            match wait {
                Some(delay) => tokio::time::sleep(delay).await,
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogLevel;

    #[tokio::test]
    async fn test_log_arms_single_timer() {
        let transport = WebhookTransport::new(
            "http://127.0.0.1:9/hook",
            WebhookConfig {
                batch_interval: Duration::from_secs(60),
                ..Default::default()
            },
        )
        .unwrap();
        let options = TransportOptions::default();

        transport.log(&LogEntry::new(LogLevel::Info, "a"), &options).await;
        transport.log(&LogEntry::new(LogLevel::Info, "b"), &options).await;

        assert_eq!(transport.pending_len(), 2);
        assert!(transport.has_timer());
        assert_eq!(transport.inner.queues.lock().timer_generation, 1);
    }

    #[test]
    fn test_next_due_prefers_pending() {
        let mut queues = Queues::default();
        assert_eq!(queues.next_due(Duration::from_secs(2)), None);

        queues.pending.push_back(QueuedEntry {
            entry: LogEntry::new(LogLevel::Info, "x"),
            options: TransportOptions::default(),
        });
        assert_eq!(
            queues.next_due(Duration::from_secs(2)),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "with_error_reporter called on a shared WebhookTransport")]
    fn test_reporter_on_shared_transport_is_caught() {
        let transport =
            WebhookTransport::new("http://127.0.0.1:9/hook", WebhookConfig::default()).unwrap();
        let _clone = transport.clone();
        let _ = transport.with_error_reporter(Arc::new(|_: &TransportError| {}));
    }

    #[test]
    fn test_zero_batch_size_is_treated_as_one() {
        let config = WebhookConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        assert_eq!(config.batch_limit(), 1);
    }
}

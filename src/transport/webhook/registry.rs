use super::{WebhookConfig, WebhookTransport};
use crate::transport::{ErrorReporter, Transport, TransportError, TransportOptions};
use std::collections::HashMap;

/// One shared `WebhookTransport` per webhook URL.
///
/// Owned by whoever owns the logger and passed by reference to call sites,
/// so batching and backoff state stays continuous no matter how many places
/// log to the same URL. Every transport it creates shares one HTTP client.
pub struct WebhookRegistry {
    defaults: WebhookConfig,
    client: reqwest::Client,
    reporter: Option<ErrorReporter>,
    transports: parking_lot::Mutex<HashMap<String, WebhookTransport>>,
}

impl WebhookRegistry {
    pub fn new(defaults: WebhookConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("jelly-logger/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TransportError::ClientBuild)?;

        Ok(Self {
            defaults,
            client,
            reporter: None,
            transports: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// Reporter handed to every transport created afterwards.
    pub fn with_error_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Transport for `url`, created with the registry defaults on first use.
    pub fn get(&self, url: &str) -> WebhookTransport {
        self.get_with(url, self.defaults.clone())
    }

    /// Like `get`, but `config` is used if the transport has to be created.
    /// An existing transport keeps the configuration it was created with.
    pub fn get_with(&self, url: &str, config: WebhookConfig) -> WebhookTransport {
        let mut transports = self.transports.lock();
        transports
            .entry(url.to_string())
            .or_insert_with(|| self.create(url, config))
            .clone()
    }

    /// Installs a fresh transport for `url` and returns the one it displaced.
    ///
    /// The displaced transport keeps whatever it has queued; flush it to
    /// deliver that backlog.
    pub fn replace(&self, url: &str, config: WebhookConfig) -> Option<WebhookTransport> {
        let fresh = self.create(url, config);
        self.transports.lock().insert(url.to_string(), fresh)
    }

    pub fn remove(&self, url: &str) -> Option<WebhookTransport> {
        self.transports.lock().remove(url)
    }

    pub fn len(&self) -> usize {
        self.transports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.lock().is_empty()
    }

    /// Flushes every registered transport.
    pub async fn flush_all(&self) {
        let transports: Vec<WebhookTransport> = self.transports.lock().values().cloned().collect();
        let options = TransportOptions::default();
        futures::future::join_all(transports.iter().map(|t| t.flush(&options))).await;
    }

    fn create(&self, url: &str, config: WebhookConfig) -> WebhookTransport {
        WebhookTransport::build(
            url.to_string(),
            config,
            self.client.clone(),
            self.reporter.clone(),
        )
    }
}

//! Level filtering and fan-out to transports.
//!
//! Every transport gets its own lane: an unbounded channel drained by one
//! task, so `log` returns as soon as the entry is queued and each transport
//! still sees entries in call order. `flush` travels down the same lanes and
//! is the only call that waits on transport I/O.

use crate::domain::{LogEntry, LogLevel};
use crate::transport::{Transport, TransportOptions};
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

enum Command {
    Log(LogEntry, TransportOptions),
    Flush(TransportOptions, oneshot::Sender<()>),
}

struct Lane {
    transport: Arc<dyn Transport>,
    sender: OnceLock<mpsc::UnboundedSender<Command>>,
}

impl Lane {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            sender: OnceLock::new(),
        }
    }

    /// The worker is started on first use so loggers can be built outside a runtime.
    fn sender(&self) -> &mpsc::UnboundedSender<Command> {
        self.sender.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_lane(Arc::clone(&self.transport), rx));
            tx
        })
    }

    fn send(&self, command: Command) -> bool {
        self.sender().send(command).is_ok()
    }
}

async fn run_lane(transport: Arc<dyn Transport>, mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Log(entry, options) => transport.log(&entry, &options).await,
            Command::Flush(options, done) => {
                transport.flush(&options).await;
                let _ = done.send(());
            }
        }
    }
    debug!("Transport lane closed");
}

/// Cheap to clone; clones and children share the same transport lanes.
#[derive(Clone)]
pub struct Logger {
    level: LogLevel,
    lanes: Vec<Arc<Lane>>,
    options: TransportOptions,
    prefix: Option<String>,
}

impl Logger {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            lanes: Vec::new(),
            options: TransportOptions::default(),
            prefix: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.lanes.push(Arc::new(Lane::new(transport)));
        self
    }

    pub fn with_options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Logger sharing this one's transports whose messages start with
    /// `[prefix] `. Prefixes of nested children are joined with `:`.
    pub fn child(&self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let mut child = self.clone();
        child.prefix = Some(match &self.prefix {
            Some(parent) => format!("{parent}:{prefix}"),
            None => prefix,
        });
        child
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    pub fn transport_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.level.admits(level)
    }

    /// Queues the entry for every transport and returns without waiting for
    /// delivery. Lanes are unbounded; `flush` is where callers wait.
    pub async fn log_entry(&self, mut entry: LogEntry) {
        if !self.is_enabled(entry.level) {
            return;
        }
        if let Some(prefix) = &self.prefix {
            entry.message = format!("[{prefix}] {}", entry.message);
        }
        for lane in &self.lanes {
            if !lane.send(Command::Log(entry.clone(), self.options.clone())) {
                debug!("Dropping entry for a closed transport lane");
            }
        }
    }

    pub async fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        args: Vec<String>,
        data: Option<BTreeMap<String, Value>>,
    ) {
        if !self.is_enabled(level) {
            return;
        }
        let mut entry = LogEntry::new(level, message).with_args(args);
        entry.data = data;
        self.log_entry(entry).await;
    }

    pub async fn fatal(&self, message: impl Into<String>) {
        self.log(LogLevel::Fatal, message, Vec::new(), None).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, Vec::new(), None).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message, Vec::new(), None).await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, Vec::new(), None).await;
    }

    pub async fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, Vec::new(), None).await;
    }

    pub async fn trace(&self, message: impl Into<String>) {
        self.log(LogLevel::Trace, message, Vec::new(), None).await;
    }

    /// Waits until every entry queued so far has been handed to its
    /// transport, then drains every transport. Call before shutdown.
    pub async fn flush(&self) {
        join_all(self.lanes.iter().map(|lane| {
            let (done, finished) = oneshot::channel();
            let sent = lane.send(Command::Flush(self.options.clone(), done));
            async move {
                if sent {
                    let _ = finished.await;
                }
            }
        }))
        .await;
    }
}

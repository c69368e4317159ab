//! Appending file transport with size and date based rotation.
//!
//! Writes are serialized through a FIFO `tokio::sync::Mutex`, so lines land in
//! the file in the order `log` was called. A size-triggered rotation takes over
//! the writer's guard instead of releasing it: every later writer is already
//! queued on the same lock and resumes only once the rotation has finished.
//!
//! Writes and rotations are never reported to the caller. Failures go to the
//! configured `ErrorReporter` and to `tracing`, and the transport keeps
//! appending to its live path.

pub mod fs;
pub mod rotation;

pub use fs::{FileSystem, TokioFileSystem};
pub use rotation::RotationConfig;

use super::{ErrorReporter, RotationStage, Transport, TransportError, TransportOptions, report};
use crate::domain::LogEntry;
use crate::format::render_builtin;
use crate::redact::RedactionTarget;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use rotation::{RotatedPaths, gzip};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Source of the current calendar date, replaceable in tests.
pub type DateSource = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

struct FileState<W> {
    writer: Option<W>,
    last_date: NaiveDate,
}

struct FileInner<F: FileSystem> {
    path: PathBuf,
    rotation: Option<RotationConfig>,
    paths: RotatedPaths,
    fs: F,
    state: Arc<Mutex<FileState<F::Writer>>>,
    rotating: AtomicBool,
    reporter: Option<ErrorReporter>,
    today: DateSource,
}

pub struct FileTransport<F: FileSystem = TokioFileSystem> {
    inner: Arc<FileInner<F>>,
}

impl<F: FileSystem> Clone for FileTransport<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl FileTransport<TokioFileSystem> {
    pub fn new(path: impl Into<PathBuf>, rotation: Option<RotationConfig>) -> Self {
        Self::with_fs(path, rotation, TokioFileSystem)
    }
}

impl<F: FileSystem> FileTransport<F> {
    pub fn with_fs(path: impl Into<PathBuf>, rotation: Option<RotationConfig>, fs: F) -> Self {
        let path = path.into();
        let paths = RotatedPaths::new(&path);
        let today: DateSource = Arc::new(|| Local::now().date_naive());
        let last_date = today();

        Self {
            inner: Arc::new(FileInner {
                path,
                rotation,
                paths,
                fs,
                state: Arc::new(Mutex::new(FileState {
                    writer: None,
                    last_date,
                })),
                rotating: AtomicBool::new(false),
                reporter: None,
                today,
            }),
        }
    }

    /// Must be called before the transport is cloned or used.
    pub fn with_error_reporter(mut self, reporter: ErrorReporter) -> Self {
        match self.exclusive_inner("with_error_reporter") {
            Some(inner) => inner.reporter = Some(reporter),
            None => warn!("Error reporter ignored: {} is already shared", self.inner.path.display()),
        }
        self
    }

    /// Replaces the calendar used for date rotation. The remembered date is
    /// reset to the new source's current day. Must be called before the
    /// transport is cloned or used.
    pub fn with_date_source(mut self, today: DateSource) -> Self {
        match self.exclusive_inner("with_date_source") {
            Some(inner) => {
                let last_date = today();
                inner.today = today;
                // Only `inner` holds the state until the first size rotation.
                if let Some(state) = Arc::get_mut(&mut inner.state) {
                    state.get_mut().last_date = last_date;
                }
            }
            None => warn!("Date source ignored: {} is already shared", self.inner.path.display()),
        }
        self
    }

    fn exclusive_inner(&mut self, caller: &str) -> Option<&mut FileInner<F>> {
        let inner = Arc::get_mut(&mut self.inner);
        debug_assert!(inner.is_some(), "{caller} called on a shared FileTransport");
        inner
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Path of the rotated file at `index` (1 = most recent).
    pub fn rotated_path(&self, index: usize, compressed: bool) -> PathBuf {
        self.inner.paths.path(index, compressed)
    }

    pub fn is_rotating(&self) -> bool {
        self.inner.rotating.load(Ordering::Acquire)
    }

    /// Forces a rotation, waiting behind any queued writes.
    pub async fn rotate(&self) {
        let mut state = self.inner.state.lock().await;
        self.inner.rotating.store(true, Ordering::Release);
        self.inner.rotate(&mut state).await;
        self.inner.rotating.store(false, Ordering::Release);
    }

    fn render(&self, entry: &LogEntry, options: &TransportOptions) -> String {
        let mut line = options
            .custom_line(entry, self.inner.reporter.as_ref())
            .unwrap_or_else(|| render_builtin(entry, options.format));
        line.push('\n');
        line
    }
}

impl<F: FileSystem> FileInner<F> {
    fn report(&self, error: TransportError) {
        report(self.reporter.as_ref(), error, false);
    }

    fn rotation_failed(&self, stage: RotationStage, path: &Path, source: std::io::Error) {
        self.report(TransportError::Rotation {
            stage,
            path: path.to_path_buf(),
            source,
        });
    }

    async fn check_date_rotation(&self, state: &mut FileState<F::Writer>) {
        if !self.rotation.as_ref().is_some_and(|r| r.date_rotation) {
            return;
        }
        let today = (self.today)();
        if today == state.last_date {
            return;
        }
        // Updated first so a failing rotation is not retried on every write.
        state.last_date = today;
        info!("Date changed, rotating {}", self.path.display());
        self.rotating.store(true, Ordering::Release);
        self.rotate(state).await;
        self.rotating.store(false, Ordering::Release);
    }

    async fn append(&self, state: &mut FileState<F::Writer>, data: &[u8]) -> std::io::Result<()> {
        let mut writer = match state.writer.take() {
            Some(writer) => writer,
            None => self.fs.open_append(&self.path).await?,
        };
        let result = async {
            writer.write_all(data).await?;
            writer.flush().await
        }
        .await;
        // A failed handle is dropped and reopened on the next write.
        if result.is_ok() {
            state.writer = Some(writer);
        }
        result
    }

    async fn exceeds_size_limit(&self) -> bool {
        let Some(limit) = self.rotation.as_ref().and_then(|r| r.max_file_size) else {
            return false;
        };
        match self.fs.size(&self.path).await {
            Ok(size) => size > limit,
            Err(e) => {
                debug!("Could not stat {}: {}", self.path.display(), e);
                false
            }
        }
    }

    async fn reopen(&self, state: &mut FileState<F::Writer>) {
        match self.fs.open_append(&self.path).await {
            Ok(writer) => state.writer = Some(writer),
            Err(e) => {
                state.writer = None;
                self.rotation_failed(RotationStage::Reopen, &self.path, e);
            }
        }
    }

    async fn remove_if_present(&self, path: &Path, stage: RotationStage) {
        match self.fs.exists(path).await {
            Ok(true) => {
                if let Err(e) = self.fs.remove(path).await {
                    self.rotation_failed(stage, path, e);
                }
            }
            Ok(false) => {}
            Err(e) => self.rotation_failed(stage, path, e),
        }
    }

    /// Gzips the live file into `target` and removes the original. On error
    /// nothing but the live file is left behind, so a plain rename can follow.
    async fn compress_live(&self, target: &Path) -> std::io::Result<()> {
        let raw = self.fs.read(&self.path).await?;
        let compressed = gzip(&raw)?;
        if let Err(e) = self.fs.write(target, &compressed).await {
            let _ = self.fs.remove(target).await;
            return Err(e);
        }
        if let Err(e) = self.fs.remove(&self.path).await {
            let _ = self.fs.remove(target).await;
            return Err(e);
        }
        Ok(())
    }

    async fn rotate(&self, state: &mut FileState<F::Writer>) {
        let Some(config) = self.rotation.as_ref() else {
            return;
        };
        let max_files = config.retained();

        if let Some(mut writer) = state.writer.take() {
            if let Err(e) = writer.shutdown().await {
                self.rotation_failed(RotationStage::Drain, &self.path, e);
            }
        }

        match self.fs.exists(&self.path).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Nothing to rotate at {}", self.path.display());
                self.reopen(state).await;
                return;
            }
            Err(e) => {
                self.rotation_failed(RotationStage::Probe, &self.path, e);
                self.reopen(state).await;
                return;
            }
        }

        for compressed in [false, true] {
            self.remove_if_present(&self.paths.path(max_files, compressed), RotationStage::RemoveOldest)
                .await;
        }

        for index in (1..max_files).rev() {
            for compressed in [false, true] {
                let from = self.paths.path(index, compressed);
                match self.fs.exists(&from).await {
                    Ok(true) => {
                        let to = self.paths.path(index + 1, compressed);
                        if let Err(e) = self.fs.rename(&from, &to).await {
                            self.rotation_failed(RotationStage::Shift, &from, e);
                        }
                    }
                    Ok(false) => {}
                    Err(e) => self.rotation_failed(RotationStage::Shift, &from, e),
                }
            }
        }

        let mut moved = false;
        if config.compress {
            let target = self.paths.path(1, true);
            match self.compress_live(&target).await {
                Ok(()) => moved = true,
                Err(e) => self.rotation_failed(RotationStage::Compress, &self.path, e),
            }
        }
        if !moved {
            let target = self.paths.path(1, false);
            if let Err(e) = self.fs.rename(&self.path, &target).await {
                self.rotation_failed(RotationStage::Move, &self.path, e);
            }
        }

        self.reopen(state).await;
        info!("Rotated {}", self.path.display());
    }
}

/// Runs a size-triggered rotation while holding the writer's guard.
fn spawn_rotation<F: FileSystem>(inner: Arc<FileInner<F>>, mut state: OwnedMutexGuard<FileState<F::Writer>>) {
    inner.rotating.store(true, Ordering::Release);
    tokio::spawn(async move {
        inner.rotate(&mut state).await;
        inner.rotating.store(false, Ordering::Release);
        drop(state);
    });
}

#[async_trait]
impl<F: FileSystem> Transport for FileTransport<F> {
    async fn log(&self, entry: &LogEntry, options: &TransportOptions) {
        let entry = options.redact(entry, RedactionTarget::File);
        let line = self.render(&entry, options);

        let mut state = Arc::clone(&self.inner.state).lock_owned().await;
        self.inner.check_date_rotation(&mut state).await;

        if let Err(source) = self.inner.append(&mut state, line.as_bytes()).await {
            self.inner.report(TransportError::Write {
                path: self.inner.path.clone(),
                source,
            });
            return;
        }

        if self.inner.exceeds_size_limit().await {
            spawn_rotation(Arc::clone(&self.inner), state);
        }
    }

    async fn flush(&self, _options: &TransportOptions) {
        // Queued behind every earlier write and any rotation in progress.
        let mut state = self.inner.state.lock().await;
        if let Some(writer) = state.writer.as_mut() {
            if let Err(source) = writer.flush().await {
                self.inner.report(TransportError::Write {
                    path: self.inner.path.clone(),
                    source,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogLevel;
    use tempfile::TempDir;

    fn entry(i: usize) -> LogEntry {
        LogEntry::new(LogLevel::Info, format!("entry {i}")).with_timestamp("2024-01-01T00:00:00.000Z")
    }

    #[tokio::test]
    async fn test_lazy_open_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/app.log");
        let transport = FileTransport::new(&path, None);

        transport.log(&entry(1), &TransportOptions::default()).await;
        transport.flush(&TransportOptions::default()).await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "[2024-01-01T00:00:00.000Z] INFO: entry 1\n");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "with_error_reporter called on a shared FileTransport")]
    fn test_reporter_on_shared_transport_is_caught() {
        let transport = FileTransport::new("app.log", None);
        let _clone = transport.clone();
        let _ = transport.with_error_reporter(Arc::new(|_: &TransportError| {}));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "with_date_source called on a shared FileTransport")]
    fn test_date_source_on_shared_transport_is_caught() {
        let transport = FileTransport::new("app.log", None);
        let _clone = transport.clone();
        let today: DateSource = Arc::new(|| Local::now().date_naive());
        let _ = transport.with_date_source(today);
    }

    #[tokio::test]
    async fn test_rotate_without_live_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let transport = FileTransport::new(&path, Some(RotationConfig::default()));

        transport.rotate().await;

        assert!(!transport.rotated_path(1, true).exists());
        assert!(!transport.rotated_path(1, false).exists());
        assert!(!transport.is_rotating());
    }

    #[tokio::test]
    async fn test_without_rotation_config_rotate_does_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let transport = FileTransport::new(&path, None);

        transport.log(&entry(1), &TransportOptions::default()).await;
        transport.rotate().await;
        transport.log(&entry(2), &TransportOptions::default()).await;
        transport.flush(&TransportOptions::default()).await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}

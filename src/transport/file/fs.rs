use std::future::Future;
use std::io;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWrite;

/// File-system operations used by `FileTransport`.
///
/// Injected so tests can simulate failing renames, writes or compression
/// without touching the real disk semantics.
pub trait FileSystem: Send + Sync + 'static {
    type Writer: AsyncWrite + Unpin + Send + 'static;

    fn open_append(&self, path: &Path) -> impl Future<Output = io::Result<Self::Writer>> + Send;
    fn exists(&self, path: &Path) -> impl Future<Output = io::Result<bool>> + Send;
    fn size(&self, path: &Path) -> impl Future<Output = io::Result<u64>> + Send;
    fn rename(&self, from: &Path, to: &Path) -> impl Future<Output = io::Result<()>> + Send;
    fn remove(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send;
    fn read(&self, path: &Path) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
    fn write(&self, path: &Path, data: &[u8]) -> impl Future<Output = io::Result<()>> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl FileSystem for TokioFileSystem {
    type Writer = fs::File;

    async fn open_append(&self, path: &Path) -> io::Result<fs::File> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
    }

    async fn exists(&self, path: &Path) -> io::Result<bool> {
        fs::try_exists(path).await
    }

    async fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(path, data).await
    }
}

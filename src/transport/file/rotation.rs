use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Rotate once the live file grows past this many bytes. `None` disables
    /// size-based rotation.
    pub max_file_size: Option<u64>,
    /// Number of rotated files kept next to the live file.
    pub max_files: usize,
    pub compress: bool,
    /// Rotate before the first write of a new calendar day (local time).
    pub date_rotation: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_file_size: None,
            max_files: 5,
            compress: true,
            date_rotation: false,
        }
    }
}

impl RotationConfig {
    pub fn by_size(max_file_size: u64) -> Self {
        Self {
            max_file_size: Some(max_file_size),
            ..Default::default()
        }
    }

    /// `max_files` of zero would leave nowhere to move the live file.
    pub(crate) fn retained(&self) -> usize {
        self.max_files.max(1)
    }
}

/// Naming scheme for rotated files: `app.log` -> `app.3.log` / `app.3.log.gz`.
#[derive(Debug, Clone)]
pub(crate) struct RotatedPaths {
    dir: PathBuf,
    stem: String,
    extension: Option<String>,
}

impl RotatedPaths {
    pub(crate) fn new(live: &Path) -> Self {
        let dir = live.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = live
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = live
            .extension()
            .map(|e| e.to_string_lossy().into_owned());
        Self {
            dir,
            stem,
            extension,
        }
    }

    pub(crate) fn path(&self, index: usize, compressed: bool) -> PathBuf {
        let mut name = match &self.extension {
            Some(ext) => format!("{}.{index}.{ext}", self.stem),
            None => format!("{}.{index}", self.stem),
        };
        if compressed {
            name.push_str(".gz");
        }
        self.dir.join(name)
    }
}

pub(crate) fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_rotated_names_keep_extension_last() {
        let paths = RotatedPaths::new(Path::new("/var/log/app.log"));
        assert_eq!(paths.path(1, false), PathBuf::from("/var/log/app.1.log"));
        assert_eq!(paths.path(5, true), PathBuf::from("/var/log/app.5.log.gz"));
    }

    #[test]
    fn test_rotated_names_without_extension() {
        let paths = RotatedPaths::new(Path::new("service"));
        assert_eq!(paths.path(2, false), PathBuf::from("service.2"));
        assert_eq!(paths.path(2, true), PathBuf::from("service.2.gz"));
    }

    #[test]
    fn test_gzip_round_trip() {
        let input = b"line one\nline two\n".repeat(50);
        let compressed = gzip(&input).unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_zero_max_files_still_keeps_one() {
        let config = RotationConfig {
            max_files: 0,
            ..Default::default()
        };
        assert_eq!(config.retained(), 1);
    }
}

//! Archive access: a local or fetched collection ZIP, exposed as a flat
//! set of named entries.

use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{Error, Result};
use crate::host::{Host, HostError};

/// Where a collection archive comes from: a file on disk or a URL fetched
/// through the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveSource {
    Path(PathBuf),
    Url(String),
}

impl ArchiveSource {
    /// Classify an input string: anything with an HTTP scheme is a URL,
    /// everything else a local path.
    pub fn detect(s: &str) -> Self {
        if s.starts_with("http://") || s.starts_with("https://") {
            ArchiveSource::Url(s.to_string())
        } else {
            ArchiveSource::Path(PathBuf::from(s))
        }
    }
}

impl FromStr for ArchiveSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::detect(s))
    }
}

impl From<PathBuf> for ArchiveSource {
    fn from(path: PathBuf) -> Self {
        ArchiveSource::Path(path)
    }
}

/// A decompressed, navigable collection archive.
///
/// The whole ZIP is held in memory (offline collections are tens of
/// megabytes at most) behind a mutex, so entry reads can be issued from
/// the decode worker pool. Parsing always happens outside the lock.
#[derive(Debug)]
pub struct Archive {
    zip: Mutex<ZipArchive<Cursor<Vec<u8>>>>,
    entries: Vec<String>,
}

impl Archive {
    /// Open an archive from its source. Local read and remote fetch
    /// failures are `SourceUnavailable`; undecodable ZIP structure is
    /// `CorruptArchive` and aborts the import.
    pub fn open(source: &ArchiveSource, host: &dyn Host, timeout: Duration) -> Result<Self> {
        let bytes = match source {
            ArchiveSource::Path(path) => std::fs::read(path)
                .map_err(|e| Error::SourceUnavailable(format!("{}: {e}", path.display())))?,
            ArchiveSource::Url(url) => {
                debug!(%url, ?timeout, "fetching remote collection");
                host.fetch(url, timeout).map_err(|e| match e {
                    HostError::Timeout => {
                        Error::SourceUnavailable(format!("{url}: fetch timed out"))
                    }
                    other => Error::SourceUnavailable(format!("{url}: {other}")),
                })?
            }
        };
        Self::from_bytes(bytes)
    }

    /// Open an archive already held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::CorruptArchive(e.to_string()))?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let entry = zip
                .by_index(i)
                .map_err(|e| Error::CorruptArchive(e.to_string()))?;
            if !entry.is_dir() {
                entries.push(entry.name().to_string());
            }
        }
        debug!(entries = entries.len(), "archive opened");
        Ok(Archive {
            zip: Mutex::new(zip),
            entries,
        })
    }

    /// Entry paths in central-directory order (directories excluded).
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Read one entry. `Ok(None)` means the entry does not exist (after
    /// also trying the percent-decoded form of the path, which some
    /// archives need); a decompression failure mid-stream is fatal.
    pub fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.read_exact_name(path)? {
            Some(bytes) => Ok(Some(bytes)),
            None => {
                let decoded = percent_encoding::percent_decode_str(path)
                    .decode_utf8()
                    .map(|s| s.into_owned());
                match decoded {
                    Ok(decoded) if decoded != path => self.read_exact_name(&decoded),
                    _ => Ok(None),
                }
            }
        }
    }

    fn read_exact_name(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let mut zip = self.zip.lock().unwrap_or_else(|poison| poison.into_inner());
        match zip.by_name(path) {
            Ok(mut entry) => {
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry
                    .read_to_end(&mut bytes)
                    .map_err(|e| Error::CorruptArchive(format!("{path}: {e}")))?;
                Ok(Some(bytes))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(Error::CorruptArchive(format!("{path}: {e}"))),
        }
    }
}

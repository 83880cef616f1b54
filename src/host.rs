//! Host collaborator interface.
//!
//! The importer owns decoding and normalization; the publishing host owns
//! networking, media persistence, and the destination book model. This
//! trait is the seam between the two.

use std::time::Duration;

use thiserror::Error;

use crate::book::{ImportResult, MediaKind};

/// Failures reported by host collaborators.
///
/// `Storage` is recoverable from the importer's point of view (the
/// affected asset degrades to a placeholder reference); the others abort
/// the stage that triggered them.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

/// Services the publishing host provides to an import run.
pub trait Host: Send + Sync {
    /// Fetch a remote archive. Only called for URL sources; hosts that
    /// import local files only can keep the default.
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, HostError> {
        let _ = timeout;
        Err(HostError::Network(format!(
            "remote sources not supported by this host: {url}"
        )))
    }

    /// Persist one media asset and return its durable identifier. `origin`
    /// is the asset's path within the archive, for hosts that name media
    /// after the source file.
    fn persist_media(
        &self,
        bytes: &[u8],
        kind: MediaKind,
        origin: &str,
    ) -> Result<String, HostError>;

    /// Final handoff of the assembled book.
    fn emit_entities(&self, result: &ImportResult) -> Result<(), HostError>;
}

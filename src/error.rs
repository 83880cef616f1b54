//! Error types for import operations.

use thiserror::Error;

use crate::book::Warning;

/// Fatal errors that abort an import run.
///
/// Recoverable conditions (a missing asset, an unparsable module) never
/// surface here; they degrade the affected unit and are reported as
/// [`Warning`]s on the final `ImportResult`. The exception is strict mode,
/// where the first would-be warning is escalated to [`Error::Strict`].
#[derive(Error, Debug)]
pub enum Error {
    /// The archive could not be read from disk or fetched from its URL.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The archive bytes are not a readable ZIP (bad central directory,
    /// truncated stream). Nothing can be salvaged from such an archive.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// No `collection.xml` manifest anywhere in the archive.
    #[error("no collection manifest in archive")]
    ManifestMissing,

    /// The manifest exists but its structure is unparsable.
    #[error("malformed collection manifest: {0}")]
    ManifestMalformed(String),

    /// The caller's cancellation flag was raised mid-run.
    #[error("import cancelled")]
    Cancelled,

    /// The host refused the final entity handoff.
    #[error("host rejected import: {0}")]
    HostRejected(String),

    /// Strict mode only: a condition that would otherwise have been
    /// recorded as a warning of the same kind.
    #[error("strict: {0}")]
    Strict(Warning),
}

pub type Result<T> = std::result::Result<T, Error>;

//! # stax
//!
//! Decode an OpenStax/CNX "offline ZIP" collection into a structured,
//! ordered book for a publishing host.
//!
//! The pipeline locates the collection manifest inside the archive,
//! resolves the ordered tree of parts and modules, decodes each module's
//! CNXML document into normalized content blocks (math spans classified,
//! never rendered), resolves embedded media through the host's media
//! store, and emits the entities in the manifest's depth-first document
//! order. Individual bad modules or missing assets degrade to
//! placeholders with warnings; only an unreadable source, a corrupt
//! archive, or a missing/malformed manifest aborts the run.
//!
//! ## Quick Start
//!
//! ```no_run
//! use stax::{ArchiveSource, Host, HostError, ImportOptions, ImportResult, MediaKind, run_import};
//!
//! struct MyHost;
//!
//! impl Host for MyHost {
//!     fn persist_media(
//!         &self,
//!         _bytes: &[u8],
//!         _kind: MediaKind,
//!         origin: &str,
//!     ) -> Result<String, HostError> {
//!         Ok(format!("media/{origin}"))
//!     }
//!
//!     fn emit_entities(&self, _result: &ImportResult) -> Result<(), HostError> {
//!         Ok(())
//!     }
//! }
//!
//! let source = ArchiveSource::detect("biology-textbook.zip");
//! let result = run_import(&source, &MyHost, &ImportOptions::default())?;
//! println!("{}: {} entities", result.title, result.entities.len());
//! # Ok::<(), stax::Error>(())
//! ```

pub mod archive;
pub mod assemble;
pub mod assets;
pub mod book;
pub mod cnxml;
pub mod collxml;
pub mod error;
pub mod host;
pub mod pipeline;
pub(crate) mod util;

pub use archive::{Archive, ArchiveSource};
pub use book::{
    AssetRef, Block, BlockId, BlockKind, Collection, CollectionNode, Entity, EntityKind,
    ImportResult, MediaKind, Module, ModuleRef, Warning, WarningKind,
};
pub use error::{Error, Result};
pub use host::{Host, HostError};
pub use pipeline::{CancelFlag, ImportOptions, run_import};

//! The import pipeline: archive, manifest, concurrent module decoding and
//! asset resolution, ordered assembly, host handoff.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::archive::{Archive, ArchiveSource};
use crate::assemble::{AssembleOptions, assemble};
use crate::assets::resolve_assets;
use crate::book::{ImportResult, Module, ModuleRef, Warning};
use crate::cnxml::decode_module;
use crate::collxml::{ParsedManifest, parse_collection};
use crate::error::{Error, Result};
use crate::host::Host;

/// Cooperative cancellation signal shared between the caller and an
/// in-flight run. Checked at stage boundaries and before each per-module
/// unit of work; once raised, the run fails with [`Error::Cancelled`] and
/// nothing is handed to the host.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Options for a single import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Budget for fetching a URL source. Large collections need a
    /// generous window; the default matches the 90 minutes the hosted
    /// importer configures instead of its platform's 5-second default.
    pub timeout: Duration,
    /// Escalate the first would-be warning to a fatal error of the same
    /// kind instead of degrading the affected unit.
    pub strict: bool,
    /// Emit no part marker for parts that hold a single child.
    pub flatten_single_parts: bool,
    /// Worker threads for module decoding and asset resolution;
    /// 0 sizes the pool to the machine.
    pub workers: usize,
    pub cancel: CancelFlag,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            timeout: Duration::from_secs(5400),
            strict: false,
            flatten_single_parts: false,
            workers: 0,
            cancel: CancelFlag::new(),
        }
    }
}

/// Run a complete import: decode the collection at `source` and hand the
/// assembled book to `host`.
///
/// Fatal conditions (unreachable source, corrupt archive, missing or
/// malformed manifest, cancellation) return an error and emit nothing.
/// Everything else degrades per unit and is enumerated in the returned
/// result's warnings.
pub fn run_import(
    source: &ArchiveSource,
    host: &dyn Host,
    options: &ImportOptions,
) -> Result<ImportResult> {
    options.cancel.check()?;
    let archive = Archive::open(source, host, options.timeout)?;
    options.cancel.check()?;

    let ParsedManifest {
        collection,
        warnings: mut all_warnings,
        base_dir,
    } = parse_collection(&archive)?;
    options.cancel.check()?;

    // Decode each distinct module once, even when the tree references it
    // repeatedly.
    let mut seen = HashSet::new();
    let refs: Vec<&ModuleRef> = collection
        .module_refs()
        .into_iter()
        .filter(|m| seen.insert(m.id.clone()))
        .collect();
    debug!(
        modules = refs.len(),
        workers = options.workers,
        "decoding modules"
    );

    let decode_one = |mref: &&ModuleRef| -> Result<(Module, Vec<Warning>)> {
        options.cancel.check()?;
        let mut decoded = decode_module(&archive, mref, &base_dir)?;
        let asset_warnings = resolve_assets(&archive, &mut decoded.module, host, &base_dir)?;
        let mut warnings = decoded.warnings;
        warnings.extend(asset_warnings);
        Ok((decoded.module, warnings))
    };

    // Fan out across a bounded pool; results come back in manifest order
    // regardless of completion order.
    let decoded: Vec<(Module, Vec<Warning>)> = if options.workers == 1 {
        refs.iter().map(&decode_one).collect::<Result<_>>()?
    } else if options.workers == 0 {
        refs.par_iter().map(&decode_one).collect::<Result<_>>()?
    } else {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .build()
        {
            Ok(pool) => {
                pool.install(|| refs.par_iter().map(&decode_one).collect::<Result<Vec<_>>>())?
            }
            Err(e) => {
                warn!(error = %e, "worker pool unavailable, decoding serially");
                refs.iter().map(&decode_one).collect::<Result<_>>()?
            }
        }
    };
    options.cancel.check()?;

    let mut modules = HashMap::with_capacity(decoded.len());
    for (module, warnings) in decoded {
        all_warnings.extend(warnings);
        modules.insert(module.id.clone(), module);
    }

    let result = assemble(
        &collection,
        &modules,
        all_warnings,
        AssembleOptions {
            flatten_single_parts: options.flatten_single_parts,
        },
    );

    if options.strict
        && let Some(warning) = result.warnings.first()
    {
        return Err(Error::Strict(warning.clone()));
    }
    options.cancel.check()?;

    host.emit_entities(&result)
        .map_err(|e| Error::HostRejected(e.to_string()))?;
    info!(
        title = %result.title,
        entities = result.entities.len(),
        warnings = result.warnings.len(),
        "import complete"
    );
    Ok(result)
}

//! Asset resolution: embedded media references to durable host identifiers.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::archive::Archive;
use crate::book::{MediaKind, Module, Warning, WarningKind};
use crate::error::Result;
use crate::host::Host;
use crate::util::join_path;

/// Identifier substituted for an asset that could not be resolved. The
/// content stays structurally valid; the reference degrades.
pub fn placeholder_id(path: &str) -> String {
    format!("missing:{path}")
}

/// Resolve every asset reference of one decoded module: read the bytes
/// from the archive, persist them through the host, and rewrite the
/// module's blocks to the returned identifiers.
///
/// Distinct original paths are resolved once each — a path referenced by
/// several blocks triggers exactly one archive read and one
/// `persist_media` call. Missing entries and storage failures degrade to
/// placeholder identifiers plus a warning; only archive corruption
/// propagates.
pub fn resolve_assets(
    archive: &Archive,
    module: &mut Module,
    host: &dyn Host,
    base_dir: &str,
) -> Result<Vec<Warning>> {
    if module.assets.is_empty() {
        return Ok(Vec::new());
    }

    let dir = join_path(base_dir, &module.id);
    let mut warnings = Vec::new();

    // Coalesce references by original path, keeping document order and the
    // first-seen media kind.
    let mut distinct: BTreeMap<&str, MediaKind> = BTreeMap::new();
    for asset in &module.assets {
        distinct.entry(asset.path.as_str()).or_insert(asset.kind);
    }

    let mut resolved: Vec<(String, String)> = Vec::with_capacity(distinct.len());
    for (path, kind) in distinct {
        let full = join_path(&dir, path);
        let id = match archive.read(&full)? {
            None => {
                warn!(module = %module.id, asset = %path, "asset missing from archive");
                warnings.push(Warning::new(
                    WarningKind::AssetMissing,
                    format!("{}/{path}", module.id),
                    format!("referenced media not found at {full}"),
                ));
                placeholder_id(path)
            }
            Some(bytes) => match host.persist_media(&bytes, kind, &full) {
                Ok(id) => id,
                Err(e) => {
                    warn!(module = %module.id, asset = %path, error = %e, "media persistence failed");
                    warnings.push(Warning::new(
                        WarningKind::Storage,
                        format!("{}/{path}", module.id),
                        e.to_string(),
                    ));
                    placeholder_id(path)
                }
            },
        };
        resolved.push((path.to_string(), id));
    }

    for (path, id) in &resolved {
        for block in &mut module.blocks {
            block.rewrite_asset(path, id);
        }
    }
    debug!(module = %module.id, assets = resolved.len(), "assets resolved");
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{AssetRef, Block, BlockId, BlockKind, ImportResult};
    use crate::host::HostError;
    use std::io::{Cursor, Write};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingHost {
        persisted: AtomicUsize,
        origins: Mutex<Vec<String>>,
        fail_storage: bool,
    }

    impl CountingHost {
        fn new(fail_storage: bool) -> Self {
            CountingHost {
                persisted: AtomicUsize::new(0),
                origins: Mutex::new(Vec::new()),
                fail_storage,
            }
        }
    }

    impl Host for CountingHost {
        fn fetch(&self, _url: &str, _timeout: Duration) -> std::result::Result<Vec<u8>, HostError> {
            Err(HostError::Timeout)
        }

        fn persist_media(
            &self,
            _bytes: &[u8],
            _kind: MediaKind,
            origin: &str,
        ) -> std::result::Result<String, HostError> {
            if self.fail_storage {
                return Err(HostError::Storage("disk full".into()));
            }
            self.persisted.fetch_add(1, Ordering::SeqCst);
            self.origins.lock().unwrap().push(origin.to_string());
            Ok(format!("host:{origin}"))
        }

        fn emit_entities(&self, _result: &ImportResult) -> std::result::Result<(), HostError> {
            Ok(())
        }
    }

    fn zip_with(files: &[(&str, &[u8])]) -> Archive {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            writer
                .start_file(name.to_string(), zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        Archive::from_bytes(writer.finish().unwrap().into_inner()).unwrap()
    }

    fn figure(id: u32, src: &str) -> Block {
        Block {
            id: BlockId(id),
            kind: BlockKind::Figure {
                src: src.into(),
                alt: None,
                caption: None,
            },
        }
    }

    fn module_with(blocks: Vec<Block>, assets: Vec<AssetRef>) -> Module {
        Module {
            id: "m1".into(),
            title: "T".into(),
            blocks,
            assets,
            placeholder: false,
        }
    }

    #[test]
    fn duplicate_paths_persist_once() {
        let archive = zip_with(&[("col/m1/pic.png", b"png-bytes")]);
        let mut module = module_with(
            vec![figure(0, "pic.png"), figure(1, "pic.png")],
            vec![
                AssetRef {
                    path: "pic.png".into(),
                    block: BlockId(0),
                    kind: MediaKind::Image,
                },
                AssetRef {
                    path: "pic.png".into(),
                    block: BlockId(1),
                    kind: MediaKind::Image,
                },
            ],
        );
        let host = CountingHost::new(false);
        let warnings = resolve_assets(&archive, &mut module, &host, "col").unwrap();
        assert!(warnings.is_empty());
        assert_eq!(host.persisted.load(Ordering::SeqCst), 1);
        let expected = "host:col/m1/pic.png";
        for block in &module.blocks {
            assert!(matches!(&block.kind, BlockKind::Figure { src, .. } if src == expected));
        }
    }

    #[test]
    fn missing_asset_degrades_to_placeholder() {
        let archive = zip_with(&[("col/m1/index.cnxml", b"<x/>")]);
        let mut module = module_with(
            vec![figure(0, "gone.png")],
            vec![AssetRef {
                path: "gone.png".into(),
                block: BlockId(0),
                kind: MediaKind::Image,
            }],
        );
        let host = CountingHost::new(false);
        let warnings = resolve_assets(&archive, &mut module, &host, "col").unwrap();
        assert_eq!(host.persisted.load(Ordering::SeqCst), 0);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::AssetMissing);
        assert_eq!(warnings[0].subject, "m1/gone.png");
        assert!(matches!(
            &module.blocks[0].kind,
            BlockKind::Figure { src, .. } if src == "missing:gone.png"
        ));
    }

    #[test]
    fn storage_failure_is_recoverable() {
        let archive = zip_with(&[("col/m1/pic.png", b"png-bytes")]);
        let mut module = module_with(
            vec![figure(0, "pic.png")],
            vec![AssetRef {
                path: "pic.png".into(),
                block: BlockId(0),
                kind: MediaKind::Image,
            }],
        );
        let host = CountingHost::new(true);
        let warnings = resolve_assets(&archive, &mut module, &host, "col").unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::Storage);
        assert!(matches!(
            &module.blocks[0].kind,
            BlockKind::Figure { src, .. } if src == "missing:pic.png"
        ));
    }

    #[test]
    fn relative_paths_resolve_against_module_dir() {
        let archive = zip_with(&[("col/shared/logo.png", b"png")]);
        let mut module = module_with(
            vec![figure(0, "../shared/logo.png")],
            vec![AssetRef {
                path: "../shared/logo.png".into(),
                block: BlockId(0),
                kind: MediaKind::Image,
            }],
        );
        let host = CountingHost::new(false);
        let warnings = resolve_assets(&archive, &mut module, &host, "col").unwrap();
        assert!(warnings.is_empty());
        assert_eq!(
            host.origins.lock().unwrap().as_slice(),
            ["col/shared/logo.png"]
        );
    }
}

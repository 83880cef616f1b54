//! CollXML manifest parsing.
//!
//! The manifest (`collection.xml`) declares the collection's metadata and
//! the ordered tree of subcollections (parts) and module references. Its
//! structure must parse; individual metadata fields degrade to defaults.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use crate::archive::Archive;
use crate::book::{Collection, CollectionNode, ModuleRef, Warning, WarningKind};
use crate::error::{Error, Result};
use crate::util::{decode_text, expand_entity, local_name, normalize_ws};

/// Well-known manifest file name, conventionally inside the collection's
/// top-level directory.
pub const MANIFEST_NAME: &str = "collection.xml";

/// Fallback title for a manifest that declares none.
pub const UNTITLED_COLLECTION: &str = "Untitled Collection";

/// A parsed manifest: the collection tree, field-level warnings, and the
/// directory the manifest was found in (module directories live beside it).
pub struct ParsedManifest {
    pub collection: Collection,
    pub warnings: Vec<Warning>,
    pub base_dir: String,
}

/// Locate and parse the collection manifest.
pub fn parse_collection(archive: &Archive) -> Result<ParsedManifest> {
    let path = locate_manifest(archive).ok_or(Error::ManifestMissing)?;
    let bytes = archive.read(&path)?.ok_or(Error::ManifestMissing)?;
    let (text, malformed) = decode_text(&bytes);

    let mut warnings = Vec::new();
    if malformed {
        warnings.push(Warning::new(
            WarningKind::Encoding,
            path.clone(),
            "manifest contains byte ranges that are not valid UTF-8",
        ));
    }

    let (collection, field_warnings) = parse_collection_xml(&text)?;
    warnings.extend(field_warnings);

    let base_dir = path
        .rsplit_once('/')
        .map(|(dir, _)| dir.to_string())
        .unwrap_or_default();
    debug!(
        manifest = %path,
        modules = collection.module_refs().len(),
        "manifest parsed"
    );
    Ok(ParsedManifest {
        collection,
        warnings,
        base_dir,
    })
}

/// The shallowest `collection.xml` in the archive wins; ties break on path
/// order so the choice is stable across entry reorderings.
fn locate_manifest(archive: &Archive) -> Option<String> {
    archive
        .entries()
        .iter()
        .filter(|e| e.as_str() == MANIFEST_NAME || e.ends_with("/collection.xml"))
        .min_by(|a, b| {
            (a.matches('/').count(), a.as_str()).cmp(&(b.matches('/').count(), b.as_str()))
        })
        .cloned()
}

/// An in-progress part (subcollection) during tree construction.
struct Frame {
    title: Option<String>,
    children: Vec<CollectionNode>,
}

/// Which metadata field text is currently being captured.
#[derive(Clone, Copy, PartialEq)]
enum Field {
    Title,
    License,
    Subject,
    Abstract,
    Language,
    Version,
    ContentId,
    Created,
    Revised,
    Fullname,
}

impl Field {
    fn key(self) -> &'static str {
        match self {
            Field::Abstract => "abstract",
            Field::Language => "language",
            Field::Version => "version",
            Field::ContentId => "content-id",
            Field::Created => "created",
            Field::Revised => "revised",
            Field::Title | Field::License | Field::Subject | Field::Fullname => "",
        }
    }
}

/// Parse CollXML markup into a [`Collection`]. Structural problems are
/// fatal; field-level problems come back as warnings.
pub fn parse_collection_xml(text: &str) -> Result<(Collection, Vec<Warning>)> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut warnings = Vec::new();
    let mut stack = vec![Frame {
        title: None,
        children: Vec::new(),
    }];
    let mut current_module: Option<ModuleRef> = None;
    let mut capture: Option<Field> = None;
    let mut buf = String::new();

    let mut title = String::new();
    let mut license_url: Option<String> = None;
    let mut license_text = String::new();
    let mut subjects: Vec<String> = Vec::new();
    let mut authors: Vec<String> = Vec::new();
    let mut metadata: BTreeMap<String, String> = BTreeMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"subcollection" => stack.push(Frame {
                    title: None,
                    children: Vec::new(),
                }),
                b"module" => {
                    current_module = module_from_attrs(&e, &mut warnings);
                }
                b"title" => {
                    capture = Some(Field::Title);
                    buf.clear();
                }
                b"license" => {
                    license_url = attr(&e, b"url");
                    capture = Some(Field::License);
                    buf.clear();
                }
                b"subject" => {
                    capture = Some(Field::Subject);
                    buf.clear();
                }
                b"abstract" => {
                    capture = Some(Field::Abstract);
                    buf.clear();
                }
                b"language" => {
                    capture = Some(Field::Language);
                    buf.clear();
                }
                b"version" => {
                    capture = Some(Field::Version);
                    buf.clear();
                }
                b"content-id" => {
                    capture = Some(Field::ContentId);
                    buf.clear();
                }
                b"created" => {
                    capture = Some(Field::Created);
                    buf.clear();
                }
                b"revised" => {
                    capture = Some(Field::Revised);
                    buf.clear();
                }
                b"fullname" => {
                    capture = Some(Field::Fullname);
                    buf.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match local_name(e.name().as_ref()) {
                b"module" => {
                    if let Some(module) = module_from_attrs(&e, &mut warnings)
                        && let Some(frame) = stack.last_mut()
                    {
                        frame.children.push(CollectionNode::Module(module));
                    }
                }
                b"license" => {
                    if let Some(url) = attr(&e, b"url") {
                        license_url = Some(url);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if capture.is_some() {
                    buf.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Ok(Event::CData(t)) => {
                if capture.is_some() {
                    buf.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if capture.is_some() {
                    buf.push_str(&expand_entity(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"title" => {
                    let value = normalize_ws(&buf);
                    if let Some(module) = &mut current_module {
                        if !value.is_empty() {
                            module.title = Some(value);
                        }
                    } else if stack.len() > 1 {
                        if let Some(frame) = stack.last_mut() {
                            frame.title = Some(value);
                        }
                    } else if title.is_empty() {
                        title = value;
                    }
                    capture = None;
                }
                b"license" => {
                    license_text = normalize_ws(&buf);
                    capture = None;
                }
                b"subject" => {
                    let value = normalize_ws(&buf);
                    if !value.is_empty() {
                        subjects.push(value);
                    }
                    capture = None;
                }
                b"fullname" => {
                    let value = normalize_ws(&buf);
                    if !value.is_empty() {
                        authors.push(value);
                    }
                    capture = None;
                }
                b"abstract" | b"language" | b"version" | b"content-id" | b"created"
                | b"revised" => {
                    if let Some(field) = capture.take() {
                        let value = normalize_ws(&buf);
                        if value.is_empty() {
                            warnings.push(Warning::new(
                                WarningKind::MetadataInvalid,
                                MANIFEST_NAME,
                                format!("empty metadata field: {}", field.key()),
                            ));
                        } else {
                            metadata.insert(field.key().to_string(), value);
                        }
                    }
                }
                b"module" => {
                    if let Some(module) = current_module.take()
                        && let Some(frame) = stack.last_mut()
                    {
                        frame.children.push(CollectionNode::Module(module));
                    }
                }
                b"subcollection" => {
                    let frame = match stack.pop() {
                        Some(frame) if !stack.is_empty() => frame,
                        _ => {
                            return Err(Error::ManifestMalformed(
                                "subcollection close without open".into(),
                            ));
                        }
                    };
                    let part_title = match frame.title {
                        Some(t) if !t.is_empty() => t,
                        _ => {
                            warnings.push(Warning::new(
                                WarningKind::MetadataInvalid,
                                MANIFEST_NAME,
                                "subcollection without a title",
                            ));
                            "Untitled Part".to_string()
                        }
                    };
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(CollectionNode::Part {
                            title: part_title,
                            children: frame.children,
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::ManifestMalformed(e.to_string())),
            _ => {}
        }
    }

    let root = match stack.pop() {
        Some(frame) if stack.is_empty() => frame,
        _ => return Err(Error::ManifestMalformed("unclosed subcollection".into())),
    };
    if root.children.is_empty() {
        return Err(Error::ManifestMalformed("collection has no content".into()));
    }

    if title.is_empty() {
        warnings.push(Warning::new(
            WarningKind::MetadataInvalid,
            MANIFEST_NAME,
            "collection has no title",
        ));
        title = UNTITLED_COLLECTION.to_string();
    }

    if !subjects.is_empty() {
        metadata.insert("subjects".into(), subjects.join("; "));
    }
    if !authors.is_empty() {
        metadata.insert("authors".into(), authors.join("; "));
    }

    let license = if !license_text.is_empty() {
        Some(license_text)
    } else {
        license_url
    };

    Ok((
        Collection {
            title,
            license,
            metadata,
            nodes: root.children,
        },
        warnings,
    ))
}

fn module_from_attrs(e: &BytesStart, warnings: &mut Vec<Warning>) -> Option<ModuleRef> {
    match attr(e, b"document") {
        Some(id) if !id.is_empty() => Some(ModuleRef { id, title: None }),
        _ => {
            warnings.push(Warning::new(
                WarningKind::MetadataInvalid,
                MANIFEST_NAME,
                "module element without a document attribute",
            ));
            None
        }
    }
}

fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

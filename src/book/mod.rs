//! Book data model: the collection tree, decoded modules, and the final
//! ordered entity sequence handed to the host.

use std::collections::BTreeMap;
use std::fmt;

/// A parsed collection manifest: document metadata plus the ordered tree
/// of parts and module references.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub title: String,
    pub license: Option<String>,
    /// Flat document-level metadata (language, version, authors, subjects...).
    pub metadata: BTreeMap<String, String>,
    pub nodes: Vec<CollectionNode>,
}

/// A node in the collection tree. Parts nest arbitrarily deep; module
/// references are the leaves.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionNode {
    Part {
        title: String,
        children: Vec<CollectionNode>,
    },
    Module(ModuleRef),
}

/// A leaf reference to a content module, by its identifier in the archive
/// (e.g. `m12345`). The manifest may carry a title override.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRef {
    pub id: String,
    pub title: Option<String>,
}

impl Collection {
    /// All module references in depth-first document order.
    pub fn module_refs(&self) -> Vec<&ModuleRef> {
        let mut refs = Vec::new();
        fn walk<'a>(nodes: &'a [CollectionNode], out: &mut Vec<&'a ModuleRef>) {
            for node in nodes {
                match node {
                    CollectionNode::Part { children, .. } => walk(children, out),
                    CollectionNode::Module(m) => out.push(m),
                }
            }
        }
        walk(&self.nodes, &mut refs);
        refs
    }
}

/// Identifies a content block within a module, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BlockId(pub u32);

/// A normalized content block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
}

/// Block payloads. Math spans are classified and carried raw; rendering is
/// a downstream concern.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum BlockKind {
    Paragraph(String),
    Heading {
        level: u8,
        text: String,
    },
    List {
        ordered: bool,
        items: Vec<String>,
    },
    Table {
        summary: Option<String>,
        rows: Vec<Vec<String>>,
    },
    Math(String),
    Figure {
        src: String,
        alt: Option<String>,
        caption: Option<String>,
    },
    RawEmbed {
        label: Option<String>,
        xml: String,
    },
}

impl Block {
    /// Rewrite every embedded reference to `path` in this block to `id`.
    /// Figures carry the reference structurally; math and raw-embed blocks
    /// carry it inside their markup as `src` attributes.
    pub fn rewrite_asset(&mut self, path: &str, id: &str) {
        match &mut self.kind {
            BlockKind::Figure { src, .. } => {
                if src == path {
                    *src = id.to_string();
                }
            }
            BlockKind::Math(xml) | BlockKind::RawEmbed { xml, .. } => {
                let double = format!("src=\"{path}\"");
                let single = format!("src='{path}'");
                if xml.contains(&double) || xml.contains(&single) {
                    *xml = xml
                        .replace(&double, &format!("src=\"{id}\""))
                        .replace(&single, &format!("src='{id}'"));
                }
            }
            _ => {}
        }
    }
}

/// Classification of an embedded media reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum MediaKind {
    Image,
    Other,
}

/// An embedded media reference discovered while decoding a module: the
/// path as written in the source document, tied to the block it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRef {
    pub path: String,
    pub block: BlockId,
    pub kind: MediaKind,
}

/// A decoded content module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub id: String,
    pub title: String,
    pub blocks: Vec<Block>,
    /// Media references discovered during decoding, in document order.
    /// Paths here are the originals; after asset resolution the block
    /// content refers to host identifiers instead.
    pub assets: Vec<AssetRef>,
    /// True when the module body is an explanatory placeholder because the
    /// source document was missing or unparsable.
    pub placeholder: bool,
}

impl Module {
    /// A stand-in module for a source document that could not be decoded.
    pub fn placeholder(id: impl Into<String>, title: impl Into<String>) -> Self {
        let id = id.into();
        Module {
            title: title.into(),
            blocks: vec![Block {
                id: BlockId(0),
                kind: BlockKind::Paragraph(format!(
                    "The content of module {id} could not be imported from the source archive."
                )),
            }],
            assets: Vec::new(),
            placeholder: true,
            id,
        }
    }
}

/// Kinds of host-ready entities, in the host's book model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum EntityKind {
    PartMarker,
    Chapter,
    FrontMatter,
    BackMatter,
}

/// One host-ready entity: a part boundary or a content-bearing chapter /
/// front-matter / back-matter unit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Entity {
    pub kind: EntityKind,
    pub title: String,
    pub blocks: Vec<Block>,
}

/// Kinds of recoverable degradations recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum WarningKind {
    AssetMissing,
    ModuleMissing,
    ModuleParse,
    Encoding,
    Storage,
    EmptyModule,
    MetadataInvalid,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::AssetMissing => "asset-missing",
            WarningKind::ModuleMissing => "module-missing",
            WarningKind::ModuleParse => "module-parse",
            WarningKind::Encoding => "encoding",
            WarningKind::Storage => "storage",
            WarningKind::EmptyModule => "empty-module",
            WarningKind::MetadataInvalid => "metadata-invalid",
        }
    }
}

/// A non-fatal degradation: which unit was affected and why. `subject`
/// locates the unit in the source archive (module id, or
/// `module-id/asset-path` for assets).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Warning {
    pub kind: WarningKind,
    pub subject: String,
    pub detail: String,
}

impl Warning {
    pub fn new(kind: WarningKind, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Warning {
            kind,
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind.as_str(), self.subject, self.detail)
    }
}

/// The final artifact of an import run: document metadata, the ordered
/// entity sequence, and every warning collected along the way.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImportResult {
    pub title: String,
    pub license: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub entities: Vec<Entity>,
    pub warnings: Vec<Warning>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_refs_depth_first() {
        let collection = Collection {
            title: "t".into(),
            license: None,
            metadata: BTreeMap::new(),
            nodes: vec![
                CollectionNode::Module(ModuleRef {
                    id: "m1".into(),
                    title: None,
                }),
                CollectionNode::Part {
                    title: "Unit".into(),
                    children: vec![
                        CollectionNode::Part {
                            title: "Nested".into(),
                            children: vec![CollectionNode::Module(ModuleRef {
                                id: "m2".into(),
                                title: None,
                            })],
                        },
                        CollectionNode::Module(ModuleRef {
                            id: "m3".into(),
                            title: None,
                        }),
                    ],
                },
            ],
        };
        let ids: Vec<_> = collection.module_refs().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
    }

    #[test]
    fn rewrite_figure_src() {
        let mut block = Block {
            id: BlockId(0),
            kind: BlockKind::Figure {
                src: "graphics/cell.png".into(),
                alt: None,
                caption: None,
            },
        };
        block.rewrite_asset("graphics/cell.png", "media/abc123.png");
        assert_eq!(
            block.kind,
            BlockKind::Figure {
                src: "media/abc123.png".into(),
                alt: None,
                caption: None,
            }
        );
    }

    #[test]
    fn rewrite_embed_src_attributes() {
        let mut block = Block {
            id: BlockId(2),
            kind: BlockKind::RawEmbed {
                label: Some("note".into()),
                xml: r#"<image src="a.png"/><image src='a.png'/>"#.into(),
            },
        };
        block.rewrite_asset("a.png", "media/1.png");
        match &block.kind {
            BlockKind::RawEmbed { xml, .. } => {
                assert_eq!(xml, r#"<image src="media/1.png"/><image src='media/1.png'/>"#);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn placeholder_module_flags() {
        let module = Module::placeholder("m404", "Missing Chapter");
        assert!(module.placeholder);
        assert_eq!(module.blocks.len(), 1);
        assert!(module.assets.is_empty());
    }
}

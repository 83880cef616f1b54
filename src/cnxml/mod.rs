//! CNXML module decoding.
//!
//! Each module is one content document (`index.cnxml`, or the
//! auto-generated variant when present). Decoding turns it into an ordered
//! sequence of normalized blocks and collects every embedded media
//! reference along the way. Decoding never fails the run: a missing or
//! unparsable document degrades to a placeholder module plus a warning.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::warn;

use crate::archive::Archive;
use crate::book::{
    AssetRef, Block, BlockId, BlockKind, MediaKind, Module, ModuleRef, Warning, WarningKind,
};
use crate::error::Result;
use crate::util::{decode_text, expand_entity, is_external_ref, join_path, local_name, normalize_ws};

/// Content document candidates inside a module directory, in preference
/// order. The auto-generated file carries resolved numbering.
const CONTENT_FILES: [&str; 2] = ["index_auto_generated.cnxml", "index.cnxml"];

/// A decoded module together with the warnings its decoding produced.
pub struct Decoded {
    pub module: Module,
    pub warnings: Vec<Warning>,
}

/// Decode one module from the archive. Per-module failures degrade to a
/// placeholder module; only archive-level corruption propagates.
pub fn decode_module(archive: &Archive, mref: &ModuleRef, base_dir: &str) -> Result<Decoded> {
    let dir = join_path(base_dir, &mref.id);
    let mut warnings = Vec::new();

    let mut bytes = None;
    for name in CONTENT_FILES {
        if let Some(found) = archive.read(&join_path(&dir, name))? {
            bytes = Some(found);
            break;
        }
    }
    let Some(bytes) = bytes else {
        warn!(module = %mref.id, "module content document missing");
        warnings.push(Warning::new(
            WarningKind::ModuleMissing,
            mref.id.clone(),
            format!("no content document under {dir}/"),
        ));
        return Ok(Decoded {
            module: Module::placeholder(&mref.id, fallback_title(mref)),
            warnings,
        });
    };

    let (text, malformed) = decode_text(&bytes);
    if malformed {
        warnings.push(Warning::new(
            WarningKind::Encoding,
            mref.id.clone(),
            "byte ranges that are not valid UTF-8 were replaced with U+FFFD",
        ));
    }

    match parse_document(&text) {
        Ok(doc) => {
            if doc.blocks.is_empty() {
                warnings.push(Warning::new(
                    WarningKind::EmptyModule,
                    mref.id.clone(),
                    "module decoded to zero content blocks",
                ));
            }
            let title = if doc.title.is_empty() {
                fallback_title(mref)
            } else {
                doc.title
            };
            Ok(Decoded {
                module: Module {
                    id: mref.id.clone(),
                    title,
                    blocks: doc.blocks,
                    assets: doc.assets,
                    placeholder: false,
                },
                warnings,
            })
        }
        Err(detail) => {
            warn!(module = %mref.id, %detail, "module document unparsable");
            warnings.push(Warning::new(WarningKind::ModuleParse, mref.id.clone(), detail));
            Ok(Decoded {
                module: Module::placeholder(&mref.id, fallback_title(mref)),
                warnings,
            })
        }
    }
}

fn fallback_title(mref: &ModuleRef) -> String {
    mref.title
        .clone()
        .unwrap_or_else(|| format!("Module {}", mref.id))
}

/// Result of parsing one CNXML document.
#[derive(Debug)]
pub struct ParsedDoc {
    pub title: String,
    pub blocks: Vec<Block>,
    pub assets: Vec<AssetRef>,
}

/// Which text container is currently accumulating character data.
#[derive(Clone, Copy, PartialEq)]
enum Target {
    Para,
    DocTitle,
    SectionTitle,
    Caption,
    TableTitle,
    Item,
    Entry,
    Discard,
}

impl Target {
    /// Absorbing targets swallow nested structure as plain text (a list
    /// item keeps the text of paragraphs nested inside it, for example).
    fn absorbs(self) -> bool {
        !matches!(self, Target::Para)
    }
}

struct ListState {
    ordered: bool,
    items: Vec<String>,
}

struct TableState {
    summary: Option<String>,
    rows: Vec<Vec<String>>,
    row: Option<Vec<String>>,
}

struct FigureState {
    src: Option<String>,
    alt: Option<String>,
    caption: Option<String>,
    kind: MediaKind,
    /// The figure was opened by a bare `media` element (no `figure`
    /// wrapper) and closes with it.
    from_media: bool,
}

struct DocParser {
    title: String,
    blocks: Vec<Block>,
    assets: Vec<AssetRef>,
    target: Option<Target>,
    buf: String,
    section_depth: u8,
    list: Option<ListState>,
    table: Option<TableState>,
    figure: Option<FigureState>,
}

/// Parse CNXML markup into blocks in document order. `Err` carries the
/// parse failure detail; the caller turns it into a placeholder module.
pub fn parse_document(text: &str) -> std::result::Result<ParsedDoc, String> {
    let mut reader = Reader::from_str(text);
    let mut p = DocParser {
        title: String::new(),
        blocks: Vec::new(),
        assets: Vec::new(),
        target: None,
        buf: String::new(),
        section_depth: 0,
        list: None,
        table: None,
        figure: None,
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => p.on_start(&mut reader, &e, text)?,
            Ok(Event::Empty(e)) => p.on_empty(&e),
            Ok(Event::Text(t)) => {
                if p.target.is_some() {
                    p.buf.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Ok(Event::CData(t)) => {
                if p.target.is_some() {
                    p.buf.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if p.target.is_some() {
                    p.buf
                        .push_str(&expand_entity(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Ok(Event::End(e)) => p.on_end(&e),
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
    }

    Ok(ParsedDoc {
        title: p.title,
        blocks: p.blocks,
        assets: p.assets,
    })
}

impl DocParser {
    fn next_id(&self) -> BlockId {
        BlockId(self.blocks.len() as u32)
    }

    fn push_block(&mut self, kind: BlockKind) -> BlockId {
        let id = self.next_id();
        self.blocks.push(Block { id, kind });
        id
    }

    /// Close an open paragraph, emitting it when it has any text.
    fn flush_para(&mut self) {
        if matches!(self.target, Some(Target::Para)) {
            let text = normalize_ws(&self.buf);
            if !text.is_empty() {
                self.push_block(BlockKind::Paragraph(text));
            }
            self.buf.clear();
            self.target = None;
        }
    }

    fn begin(&mut self, target: Target) {
        self.target = Some(target);
        self.buf.clear();
    }

    fn on_start<'t>(
        &mut self,
        reader: &mut Reader<&'t [u8]>,
        e: &BytesStart,
        text: &'t str,
    ) -> std::result::Result<(), String> {
        let name = e.name();
        let local = local_name(name.as_ref());

        // Inside an absorbing container, nested structure flattens to text.
        // Math keeps its raw markup; images still register as assets.
        if self.target.is_some_and(Target::absorbs) {
            match local {
                b"math" => {
                    let raw = read_raw(reader, e, text)?;
                    self.buf.push(' ');
                    self.buf.push_str(raw.trim());
                    self.buf.push(' ');
                }
                b"image" => self.on_image(e),
                _ => {}
            }
            return Ok(());
        }

        match local {
            b"metadata" => {
                // Module metadata duplicates the manifest; skip it entirely
                // so its fields never leak into content blocks.
                reader.read_to_end(name).map_err(|err| err.to_string())?;
            }
            b"title" => {
                let target = if self.figure.is_some() {
                    Target::Caption
                } else if self.table.is_some() {
                    Target::TableTitle
                } else if self.list.is_some() {
                    Target::Discard
                } else if self.section_depth > 0 {
                    Target::SectionTitle
                } else if self.title.is_empty() && self.blocks.is_empty() {
                    Target::DocTitle
                } else {
                    Target::Discard
                };
                self.begin(target);
            }
            b"para" => {
                if self.target.is_none()
                    && self.list.is_none()
                    && self.table.is_none()
                    && self.figure.is_none()
                {
                    self.begin(Target::Para);
                }
            }
            b"section" => {
                self.flush_para();
                self.section_depth = self.section_depth.saturating_add(1);
            }
            b"list" => {
                self.flush_para();
                if self.list.is_none() {
                    self.list = Some(ListState {
                        ordered: attr(e, b"list-type").as_deref() == Some("enumerated"),
                        items: Vec::new(),
                    });
                }
            }
            b"item" => {
                if self.list.is_some() {
                    self.begin(Target::Item);
                }
            }
            b"table" => {
                self.flush_para();
                if self.table.is_none() {
                    self.table = Some(TableState {
                        summary: attr(e, b"summary"),
                        rows: Vec::new(),
                        row: None,
                    });
                }
            }
            b"row" => {
                if let Some(table) = &mut self.table {
                    table.row = Some(Vec::new());
                }
            }
            b"entry" => {
                if self.table.is_some() {
                    self.begin(Target::Entry);
                }
            }
            b"figure" => {
                self.flush_para();
                if self.figure.is_none() {
                    self.figure = Some(FigureState {
                        src: None,
                        alt: None,
                        caption: None,
                        kind: MediaKind::Image,
                        from_media: false,
                    });
                }
            }
            b"media" => match &mut self.figure {
                Some(figure) => {
                    if figure.alt.is_none() {
                        figure.alt = attr(e, b"alt");
                    }
                }
                None => {
                    self.flush_para();
                    self.figure = Some(FigureState {
                        src: None,
                        alt: attr(e, b"alt"),
                        caption: None,
                        kind: MediaKind::Image,
                        from_media: true,
                    });
                }
            },
            b"caption" => {
                self.begin(if self.figure.is_some() {
                    Target::Caption
                } else {
                    Target::Discard
                });
            }
            b"image" => self.on_image(e),
            b"math" => {
                // Inline math interrupts the surrounding paragraph: flush
                // the text so far, classify the span, resume capture.
                let resumed = matches!(self.target, Some(Target::Para));
                if resumed {
                    let flushed = normalize_ws(&self.buf);
                    if !flushed.is_empty() {
                        self.push_block(BlockKind::Paragraph(flushed));
                    }
                    self.buf.clear();
                }
                let inner = read_raw(reader, e, text)?;
                let markup = format!("{}{}</{}>", raw_start_tag(e), inner, lossy_name(e));
                let id = self.push_block(BlockKind::Math(markup.clone()));
                self.register_src_refs(&markup, id);
                if resumed {
                    self.target = Some(Target::Para);
                }
            }
            b"equation" => {
                self.flush_para();
                let inner = read_raw(reader, e, text)?;
                let raw = inner.trim().to_string();
                let id = self.push_block(BlockKind::Math(raw.clone()));
                self.register_src_refs(&raw, id);
            }
            b"code" | b"preformat" | b"quote" if matches!(self.target, Some(Target::Para)) => {
                // Inline code/quote flows into the paragraph text.
            }
            b"note" | b"example" | b"exercise" | b"rule" | b"definition" | b"glossary"
            | b"code" | b"preformat" | b"quote" => {
                self.flush_para();
                let inner = read_raw(reader, e, text)?;
                let raw = inner.trim().to_string();
                let label = String::from_utf8_lossy(local).into_owned();
                let id = self.push_block(BlockKind::RawEmbed {
                    label: Some(label),
                    xml: raw.clone(),
                });
                self.register_src_refs(&raw, id);
            }
            _ => {}
        }
        Ok(())
    }

    fn on_empty(&mut self, e: &BytesStart) {
        match local_name(e.name().as_ref()) {
            b"image" => self.on_image(e),
            b"newline" => {
                if self.target.is_some() {
                    self.buf.push(' ');
                }
            }
            _ => {}
        }
    }

    fn on_end(&mut self, e: &quick_xml::events::BytesEnd) {
        match local_name(e.name().as_ref()) {
            b"para" => self.flush_para(),
            b"title" => {
                match self.target.take() {
                    Some(Target::DocTitle) => self.title = normalize_ws(&self.buf),
                    Some(Target::SectionTitle) => {
                        let text = normalize_ws(&self.buf);
                        if !text.is_empty() {
                            let level = (self.section_depth + 1).min(6);
                            self.push_block(BlockKind::Heading { level, text });
                        }
                    }
                    Some(Target::TableTitle) => {
                        if let Some(table) = &mut self.table
                            && table.summary.is_none()
                        {
                            let text = normalize_ws(&self.buf);
                            if !text.is_empty() {
                                table.summary = Some(text);
                            }
                        }
                    }
                    Some(Target::Caption) => {
                        if let Some(figure) = &mut self.figure
                            && figure.caption.is_none()
                        {
                            let text = normalize_ws(&self.buf);
                            if !text.is_empty() {
                                figure.caption = Some(text);
                            }
                        }
                    }
                    other => self.target = other,
                }
                if !matches!(self.target, Some(Target::Para)) {
                    self.buf.clear();
                }
            }
            b"caption" => {
                if matches!(self.target, Some(Target::Caption)) {
                    if let Some(figure) = &mut self.figure {
                        let text = normalize_ws(&self.buf);
                        if !text.is_empty() {
                            figure.caption = Some(text);
                        }
                    }
                    self.target = None;
                    self.buf.clear();
                } else if matches!(self.target, Some(Target::Discard)) {
                    self.target = None;
                    self.buf.clear();
                }
            }
            b"item" => {
                if matches!(self.target, Some(Target::Item)) {
                    if let Some(list) = &mut self.list {
                        list.items.push(normalize_ws(&self.buf));
                    }
                    self.target = None;
                    self.buf.clear();
                }
            }
            b"list" => {
                if let Some(list) = self.list.take() {
                    self.push_block(BlockKind::List {
                        ordered: list.ordered,
                        items: list.items,
                    });
                }
            }
            b"entry" => {
                if matches!(self.target, Some(Target::Entry)) {
                    if let Some(table) = &mut self.table
                        && let Some(row) = &mut table.row
                    {
                        row.push(normalize_ws(&self.buf));
                    }
                    self.target = None;
                    self.buf.clear();
                }
            }
            b"row" => {
                if let Some(table) = &mut self.table
                    && let Some(row) = table.row.take()
                {
                    table.rows.push(row);
                }
            }
            b"table" => {
                if let Some(table) = self.table.take() {
                    self.push_block(BlockKind::Table {
                        summary: table.summary,
                        rows: table.rows,
                    });
                }
            }
            b"media" => {
                if self.figure.as_ref().is_some_and(|f| f.from_media) {
                    self.emit_figure();
                }
            }
            b"figure" => {
                if self.figure.is_some() {
                    self.emit_figure();
                }
            }
            b"section" => {
                self.flush_para();
                self.section_depth = self.section_depth.saturating_sub(1);
            }
            _ => {}
        }
    }

    /// Record an `image` element: into the open figure when there is one,
    /// otherwise as an immediate standalone figure block.
    fn on_image(&mut self, e: &BytesStart) {
        let Some(src) = attr(e, b"src").filter(|s| !s.is_empty()) else {
            return;
        };
        let kind = media_kind(attr(e, b"mime-type").as_deref(), &src);
        if let Some(figure) = &mut self.figure {
            if figure.src.is_none() {
                figure.src = Some(src);
                figure.kind = kind;
            } else if !is_external_ref(&src) {
                // Subfigure image: extra asset tied to the figure's block.
                let block = self.next_id();
                self.assets.push(AssetRef { path: src, block, kind });
            }
        } else if self.target.is_some_and(Target::absorbs) {
            if !is_external_ref(&src) {
                let block = self.next_id();
                self.assets.push(AssetRef { path: src, block, kind });
            }
        } else {
            self.flush_para();
            let alt = attr(e, b"alt");
            let id = self.next_id();
            if !is_external_ref(&src) {
                self.assets.push(AssetRef {
                    path: src.clone(),
                    block: id,
                    kind,
                });
            }
            self.push_block(BlockKind::Figure {
                src,
                alt,
                caption: None,
            });
        }
    }

    fn emit_figure(&mut self) {
        let Some(figure) = self.figure.take() else {
            return;
        };
        let src = figure.src.unwrap_or_default();
        let id = self.next_id();
        if !src.is_empty() && !is_external_ref(&src) {
            self.assets.push(AssetRef {
                path: src.clone(),
                block: id,
                kind: figure.kind,
            });
        }
        self.push_block(BlockKind::Figure {
            src,
            alt: figure.alt,
            caption: figure.caption,
        });
    }

    /// Register every local `src="..."` reference inside raw markup as an
    /// asset of the given block.
    fn register_src_refs(&mut self, xml: &str, block: BlockId) {
        for (path, kind) in scan_src_refs(xml) {
            self.assets.push(AssetRef { path, block, kind });
        }
    }
}

/// Skip to the end of the current element and return its raw inner markup,
/// sliced out of the original document text.
fn read_raw<'t>(
    reader: &mut Reader<&'t [u8]>,
    e: &BytesStart,
    text: &'t str,
) -> std::result::Result<&'t str, String> {
    let span = reader.read_to_end(e.name()).map_err(|err| err.to_string())?;
    Ok(&text[span.start as usize..span.end as usize])
}

fn raw_start_tag(e: &BytesStart) -> String {
    let mut tag = format!("<{}", lossy_name(e));
    for a in e.attributes().flatten() {
        tag.push_str(&format!(
            " {}=\"{}\"",
            String::from_utf8_lossy(a.key.as_ref()),
            String::from_utf8_lossy(&a.value)
        ));
    }
    tag.push('>');
    tag
}

fn lossy_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn media_kind(mime: Option<&str>, src: &str) -> MediaKind {
    if let Some(mime) = mime {
        return if mime.starts_with("image/") {
            MediaKind::Image
        } else {
            MediaKind::Other
        };
    }
    let ext = src.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "bmp" => MediaKind::Image,
        _ => MediaKind::Other,
    }
}

/// Scan markup for local `src` attribute references.
pub(crate) fn scan_src_refs(xml: &str) -> Vec<(String, MediaKind)> {
    let mut out = Vec::new();
    for quote in ['"', '\''] {
        let needle = format!("src={quote}");
        let mut rest = xml;
        while let Some(pos) = rest.find(&needle) {
            let after = &rest[pos + needle.len()..];
            let Some(end) = after.find(quote) else { break };
            let path = &after[..end];
            if !path.is_empty() && !is_external_ref(path) {
                out.push((path.to_string(), media_kind(None, path)));
            }
            rest = &after[end..];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks_of(xml: &str) -> Vec<BlockKind> {
        parse_document(xml)
            .unwrap()
            .blocks
            .into_iter()
            .map(|b| b.kind)
            .collect()
    }

    const SIMPLE: &str = r#"<?xml version="1.0"?>
<document xmlns="http://cnx.rice.edu/cnxml" xmlns:md="http://cnx.rice.edu/mdml">
  <title>The Cell</title>
  <metadata><md:title>The Cell</md:title><md:abstract>ignored</md:abstract></metadata>
  <content>
    <para id="p1">Cells are the basic unit of life.</para>
    <section id="s1">
      <title>Membranes</title>
      <para>The membrane is <emphasis effect="italics">selective</emphasis>.</para>
    </section>
  </content>
</document>"#;

    #[test]
    fn parses_title_paragraphs_and_headings() {
        let doc = parse_document(SIMPLE).unwrap();
        assert_eq!(doc.title, "The Cell");
        assert_eq!(
            doc.blocks.iter().map(|b| &b.kind).collect::<Vec<_>>(),
            vec![
                &BlockKind::Paragraph("Cells are the basic unit of life.".into()),
                &BlockKind::Heading {
                    level: 2,
                    text: "Membranes".into()
                },
                &BlockKind::Paragraph("The membrane is selective.".into()),
            ]
        );
        assert!(doc.assets.is_empty());
        for (i, block) in doc.blocks.iter().enumerate() {
            assert_eq!(block.id, BlockId(i as u32));
        }
    }

    #[test]
    fn metadata_fields_do_not_leak() {
        let doc = parse_document(SIMPLE).unwrap();
        assert!(
            !doc.blocks.iter().any(|b| matches!(
                &b.kind,
                BlockKind::Paragraph(t) if t.contains("ignored")
            ))
        );
    }

    #[test]
    fn figure_with_caption_collects_asset() {
        let xml = r#"<document><title>T</title><content>
            <figure id="f1">
              <media alt="a cell diagram"><image mime-type="image/png" src="graphics/cell.png"/></media>
              <caption>A typical cell.</caption>
            </figure>
        </content></document>"#;
        let doc = parse_document(xml).unwrap();
        assert_eq!(
            doc.blocks[0].kind,
            BlockKind::Figure {
                src: "graphics/cell.png".into(),
                alt: Some("a cell diagram".into()),
                caption: Some("A typical cell.".into()),
            }
        );
        assert_eq!(
            doc.assets,
            vec![AssetRef {
                path: "graphics/cell.png".into(),
                block: BlockId(0),
                kind: MediaKind::Image,
            }]
        );
    }

    #[test]
    fn remote_image_is_not_an_asset() {
        let xml = r#"<document><title>T</title><content>
            <figure><media><image src="https://cnx.org/pic.png"/></media></figure>
        </content></document>"#;
        let doc = parse_document(xml).unwrap();
        assert!(doc.assets.is_empty());
        assert!(matches!(
            &doc.blocks[0].kind,
            BlockKind::Figure { src, .. } if src == "https://cnx.org/pic.png"
        ));
    }

    #[test]
    fn inline_math_splits_paragraph() {
        let xml = r#"<document><title>T</title><content>
            <para>Energy is <m:math xmlns:m="http://www.w3.org/1998/Math/MathML"><m:mi>E</m:mi></m:math> here.</para>
        </content></document>"#;
        let blocks = blocks_of(xml);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], BlockKind::Paragraph("Energy is".into()));
        match &blocks[1] {
            BlockKind::Math(markup) => {
                assert!(markup.contains("<m:mi>E</m:mi>"), "markup: {markup}");
                assert!(markup.starts_with("<m:math"), "markup: {markup}");
            }
            other => panic!("expected math, got {other:?}"),
        }
        assert_eq!(blocks[2], BlockKind::Paragraph("here.".into()));
    }

    #[test]
    fn equation_becomes_math_block() {
        let xml = r#"<document><title>T</title><content>
            <equation id="e1"><m:math xmlns:m="http://www.w3.org/1998/Math/MathML"><m:mn>2</m:mn></m:math></equation>
        </content></document>"#;
        let blocks = blocks_of(xml);
        assert_eq!(blocks.len(), 1);
        assert!(matches!(
            &blocks[0],
            BlockKind::Math(raw) if raw.contains("<m:mn>2</m:mn>")
        ));
    }

    #[test]
    fn lists_and_tables() {
        let xml = r#"<document><title>T</title><content>
            <list id="l1" list-type="enumerated">
              <item>first</item>
              <item><para>second, nested</para></item>
            </list>
            <table summary="Sizes">
              <tgroup cols="2"><tbody>
                <row><entry>cell</entry><entry>1 um</entry></row>
                <row><entry>virus</entry><entry>100 nm</entry></row>
              </tbody></tgroup>
            </table>
        </content></document>"#;
        let blocks = blocks_of(xml);
        assert_eq!(
            blocks[0],
            BlockKind::List {
                ordered: true,
                items: vec!["first".into(), "second, nested".into()],
            }
        );
        assert_eq!(
            blocks[1],
            BlockKind::Table {
                summary: Some("Sizes".into()),
                rows: vec![
                    vec!["cell".into(), "1 um".into()],
                    vec!["virus".into(), "100 nm".into()],
                ],
            }
        );
    }

    #[test]
    fn note_is_raw_embed_with_assets() {
        let xml = r#"<document><title>T</title><content>
            <note id="n1"><para>See <image src="icons/tip.png"/> for details.</para></note>
        </content></document>"#;
        let doc = parse_document(xml).unwrap();
        match &doc.blocks[0].kind {
            BlockKind::RawEmbed { label, xml } => {
                assert_eq!(label.as_deref(), Some("note"));
                assert!(xml.contains("icons/tip.png"));
            }
            other => panic!("expected raw embed, got {other:?}"),
        }
        assert_eq!(
            doc.assets,
            vec![AssetRef {
                path: "icons/tip.png".into(),
                block: BlockId(0),
                kind: MediaKind::Image,
            }]
        );
    }

    #[test]
    fn unparsable_document_errors() {
        let err = parse_document("<document><content><para>a</quote></document>").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn decode_missing_module_degrades() {
        let archive = crate::archive::Archive::from_bytes(test_zip(&[(
            "col/collection.xml",
            b"<x/>",
        )]))
        .unwrap();
        let mref = ModuleRef {
            id: "m9".into(),
            title: Some("Lost Chapter".into()),
        };
        let decoded = decode_module(&archive, &mref, "col").unwrap();
        assert!(decoded.module.placeholder);
        assert_eq!(decoded.module.title, "Lost Chapter");
        assert_eq!(decoded.warnings.len(), 1);
        assert_eq!(decoded.warnings[0].kind, WarningKind::ModuleMissing);
    }

    #[test]
    fn decode_invalid_utf8_warns_and_replaces() {
        let doc = b"<document><title>Caf\xe9</title><content><para>ok</para></content></document>";
        let archive = crate::archive::Archive::from_bytes(test_zip(&[(
            "col/m1/index.cnxml",
            doc.as_slice(),
        )]))
        .unwrap();
        let mref = ModuleRef {
            id: "m1".into(),
            title: None,
        };
        let decoded = decode_module(&archive, &mref, "col").unwrap();
        assert!(!decoded.module.placeholder);
        assert_eq!(decoded.module.title, "Caf\u{FFFD}");
        assert!(
            decoded
                .warnings
                .iter()
                .any(|w| w.kind == WarningKind::Encoding)
        );
    }

    #[test]
    fn decode_empty_module_warns() {
        let archive = crate::archive::Archive::from_bytes(test_zip(&[(
            "col/m1/index.cnxml",
            b"<document><title>Empty</title><content></content></document>".as_slice(),
        )]))
        .unwrap();
        let mref = ModuleRef {
            id: "m1".into(),
            title: None,
        };
        let decoded = decode_module(&archive, &mref, "col").unwrap();
        assert!(decoded.module.blocks.is_empty());
        assert_eq!(decoded.warnings[0].kind, WarningKind::EmptyModule);
    }

    #[test]
    fn auto_generated_document_preferred() {
        let archive = crate::archive::Archive::from_bytes(test_zip(&[
            (
                "col/m1/index.cnxml",
                b"<document><title>Plain</title><content><para>a</para></content></document>"
                    .as_slice(),
            ),
            (
                "col/m1/index_auto_generated.cnxml",
                b"<document><title>Numbered</title><content><para>a</para></content></document>"
                    .as_slice(),
            ),
        ]))
        .unwrap();
        let mref = ModuleRef {
            id: "m1".into(),
            title: None,
        };
        let decoded = decode_module(&archive, &mref, "col").unwrap();
        assert_eq!(decoded.module.title, "Numbered");
    }

    fn test_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        use std::io::{Cursor, Write};
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            writer
                .start_file(name.to_string(), zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}

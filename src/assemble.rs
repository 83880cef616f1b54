//! Tree assembly: the manifest tree plus decoded modules, flattened into
//! the host's ordered entity sequence.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::book::{
    Collection, CollectionNode, Entity, EntityKind, ImportResult, Module, Warning, WarningKind,
};

/// Assembly policy knobs, carried over from the run options.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssembleOptions {
    /// Treat a part with exactly one child as pass-through: no part
    /// marker, the child keeps its own entity kind.
    pub flatten_single_parts: bool,
}

/// Build the final ordered [`ImportResult`].
///
/// Entities appear in the collection's depth-first document order; worker
/// completion order has no bearing because modules are looked up by id
/// from the manifest walk. Top-level modules before the first part become
/// front matter, after the last part back matter, everything else
/// chapters.
pub fn assemble(
    collection: &Collection,
    modules: &HashMap<String, Module>,
    warnings: Vec<Warning>,
    options: AssembleOptions,
) -> ImportResult {
    let mut entities = Vec::new();
    let mut extra_warnings = Vec::new();

    let first_part = collection
        .nodes
        .iter()
        .position(|n| matches!(n, CollectionNode::Part { .. }));
    let last_part = collection
        .nodes
        .iter()
        .rposition(|n| matches!(n, CollectionNode::Part { .. }));

    for (index, node) in collection.nodes.iter().enumerate() {
        let kind = match (node, first_part, last_part) {
            (CollectionNode::Module(_), Some(first), _) if index < first => {
                EntityKind::FrontMatter
            }
            (CollectionNode::Module(_), _, Some(last)) if index > last => EntityKind::BackMatter,
            _ => EntityKind::Chapter,
        };
        emit(
            node,
            kind,
            modules,
            options,
            &mut entities,
            &mut extra_warnings,
        );
    }

    let mut all_warnings = warnings;
    all_warnings.extend(extra_warnings);
    debug!(
        entities = entities.len(),
        warnings = all_warnings.len(),
        "collection assembled"
    );

    ImportResult {
        title: collection.title.clone(),
        license: collection.license.clone(),
        metadata: collection.metadata.clone(),
        entities,
        warnings: dedup_warnings(all_warnings),
    }
}

fn emit(
    node: &CollectionNode,
    kind: EntityKind,
    modules: &HashMap<String, Module>,
    options: AssembleOptions,
    entities: &mut Vec<Entity>,
    warnings: &mut Vec<Warning>,
) {
    match node {
        CollectionNode::Part { title, children } => {
            if options.flatten_single_parts && children.len() == 1 {
                emit(&children[0], kind, modules, options, entities, warnings);
                return;
            }
            entities.push(Entity {
                kind: EntityKind::PartMarker,
                title: title.clone(),
                blocks: Vec::new(),
            });
            for child in children {
                // Nested content always reads as chapters; front/back
                // matter is a top-level position convention.
                emit(
                    child,
                    EntityKind::Chapter,
                    modules,
                    options,
                    entities,
                    warnings,
                );
            }
        }
        CollectionNode::Module(mref) => match modules.get(&mref.id) {
            Some(module) => {
                let title = mref.title.clone().unwrap_or_else(|| module.title.clone());
                entities.push(Entity {
                    kind,
                    title,
                    blocks: module.blocks.clone(),
                });
            }
            None => {
                warnings.push(Warning::new(
                    WarningKind::ModuleMissing,
                    mref.id.clone(),
                    "module was never decoded",
                ));
                let placeholder = Module::placeholder(&mref.id, format!("Module {}", mref.id));
                entities.push(Entity {
                    kind,
                    title: mref.title.clone().unwrap_or(placeholder.title),
                    blocks: placeholder.blocks,
                });
            }
        },
    }
}

/// Deduplicate warnings by `(kind, subject)`, keeping first occurrences in
/// collection order.
fn dedup_warnings(warnings: Vec<Warning>) -> Vec<Warning> {
    let mut seen: HashSet<(WarningKind, String)> = HashSet::new();
    warnings
        .into_iter()
        .filter(|w| seen.insert((w.kind, w.subject.clone())))
        .collect()
}

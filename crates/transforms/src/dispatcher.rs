//! Drives a [`Transformer`] over every class of an arena.
//!
//! Order is fixed: classes in arena order, then within a class the class
//! hook, each field, and each method followed by its instructions. The
//! instruction ids of a method are snapshotted before its first instruction
//! is visited.

use crate::Transformer;
use jarsmith_core::classfile::InsnId;
use jarsmith_core::graph::{ClassArena, ClassEntry};
use jarsmith_utils::errors::TransformError;
use jarsmith_utils::log::LogSink;

/// Outcome of one [`dispatch`] run.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Classes visited.
    pub classes: usize,
    /// Classes whose visit stopped early, with the error that stopped it.
    pub failures: Vec<(String, TransformError)>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs `transformer` over `arena`.
///
/// A failing hook ends the visit of its class and is collected in the
/// report; the remaining classes are still visited. The arena is reindexed
/// afterwards, since hooks may rename classes, and must be resolved again.
pub fn dispatch(
    arena: &mut ClassArena,
    transformer: &mut dyn Transformer,
    log: &dyn LogSink,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for (_, class) in arena.iter_mut() {
        let name = class.name().to_string();
        report.classes += 1;
        if let Err(err) = visit_class(class, transformer) {
            log.error(&format!("{} failed on {name}: {err}", transformer.name()));
            report.failures.push((name, err));
        }
    }
    arena.reindex();
    tracing::debug!(
        "{} visited {} classes, {} failed",
        transformer.name(),
        report.classes,
        report.failures.len()
    );
    report
}

fn visit_class(
    class: &mut ClassEntry,
    transformer: &mut dyn Transformer,
) -> Result<(), TransformError> {
    transformer.transform_class(class)?;
    let (node, fields, methods) = class.split_members_mut();
    for field in fields {
        transformer.transform_field(node, field)?;
    }
    for method in methods {
        transformer.transform_method(node, method)?;
        let (method_node, stream) = method.split_instructions_mut();
        let snapshot: Vec<InsnId> = stream.ids();
        for id in snapshot {
            // removed by an earlier hook
            if stream.get(id).is_none() {
                continue;
            }
            transformer.transform_instruction(node, method_node, stream, id)?;
        }
    }
    Ok(())
}

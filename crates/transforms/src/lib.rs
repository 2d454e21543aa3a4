pub mod dispatcher;
pub mod hierarchy;
pub mod jar;
pub mod remapper;

pub use dispatcher::{dispatch, DispatchReport};
pub use hierarchy::ArenaHierarchy;
pub use jar::{Jar, LoadOptions, ProcessContext, SaveOptions, SaveReport};
pub use remapper::{remap_arena, Remapper};

use jarsmith_core::classfile::{ClassNode, InsnId, MethodNode};
use jarsmith_core::graph::{ClassEntry, FieldEntry, InstructionStream, MethodEntry};
use jarsmith_utils::errors::TransformError;

/// Caller-supplied visitor run by [`dispatch`].
///
/// Every hook defaults to doing nothing, so an implementation overrides only
/// the levels it cares about. An error stops the visit of the current class
/// only.
pub trait Transformer: Send {
    /// Returns the transformer's name for logging.
    fn name(&self) -> &str {
        "transformer"
    }

    fn transform_class(&mut self, _class: &mut ClassEntry) -> Result<(), TransformError> {
        Ok(())
    }

    fn transform_field(
        &mut self,
        _class: &ClassNode,
        _field: &mut FieldEntry,
    ) -> Result<(), TransformError> {
        Ok(())
    }

    fn transform_method(
        &mut self,
        _class: &ClassNode,
        _method: &mut MethodEntry,
    ) -> Result<(), TransformError> {
        Ok(())
    }

    /// Called once for every instruction present when the method's visit
    /// started. Instructions inserted by the hook are not visited.
    fn transform_instruction(
        &mut self,
        _class: &ClassNode,
        _method: &MethodNode,
        _stream: &mut InstructionStream,
        _insn: InsnId,
    ) -> Result<(), TransformError> {
        Ok(())
    }
}

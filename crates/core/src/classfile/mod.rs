//! In-tree class file model: reader, writer and frame analysis.
//!
//! [`read_class`] turns bytes into a [`ClassNode`] tree; [`write_class`] turns
//! a tree back into bytes. Instructions are label based (see [`insn`]), so
//! callers can insert and remove code without tracking offsets.

mod bytes;
pub mod constant_pool;
pub mod frames;
pub mod insn;
pub mod mutf8;
pub mod node;
mod reader;
mod writer;

pub use frames::{CommonSuper, ObjectFallback};
pub use insn::{
    Constant, ConstantDynamic, Frame, Handle, Insn, InsnId, InsnList, LabelId, VerificationType,
};
pub use node::{
    AnnotationNode, ClassNode, ElementValue, FieldNode, InnerClassNode, LocalVariableNode,
    MethodNode, ParameterNode, RawAttribute, TryCatchBlock,
};
pub use reader::read_class;
pub use writer::write_class;

use serde::{Deserialize, Serialize};

/// How the writer produces `StackMapTable` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    /// Re-encode the [`Insn::Frame`] entries already in the list.
    #[default]
    Preserve,
    /// Drop existing frames and compute new ones by data-flow analysis.
    Compute,
}

/// Options for [`write_class`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    pub frames: FrameMode,
}

impl WriterOptions {
    pub fn with_frames(frames: FrameMode) -> Self {
        Self { frames }
    }
}

//! In-memory class graph of one archive.
//!
//! A [`ClassArena`] owns every [`ClassEntry`]. Links between classes
//! (superclass, interfaces, outer class, override bases, annotation types)
//! are [`ClassId`]s into the arena, filled in by [`ClassArena::resolve`].

mod arena;
mod entry;
mod resolver;
mod stream;

pub use arena::ClassArena;
pub use entry::{
    simple_name, Annotated, AnnotationEntry, ClassEntry, FieldEntry, InnerClassRef,
    LocalVariableEntry, MethodEntry, DEFAULT_MAJOR_VERSION, MAIN_METHOD_DESC, MAIN_METHOD_NAME,
};
pub use stream::{InstructionStream, MemberRef};

/// Position of a class in its [`ClassArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub usize);

impl std::fmt::Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//! Class-file model, archive I/O and class graph for jarsmith.
//!
//! The crate is layered bottom-up:
//! - [`classfile`] reads and writes single class files as [`classfile::ClassNode`] trees;
//! - [`archive`] reads and writes jar containers and their manifest;
//! - [`graph`] links the classes of one archive into a [`graph::ClassArena`].

pub mod access;
pub mod archive;
pub mod classfile;
pub mod descriptor;
pub mod graph;
pub mod opcode;

pub use access::Access;
pub use graph::{ClassArena, ClassEntry, ClassId, FieldEntry, MethodEntry};

//! Tree representation of a class file.

use super::constant_pool::ConstantPool;
use super::insn::{Constant, InsnList, LabelId};
use indexmap::IndexMap;
use std::sync::Arc;

/// An attribute kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub name: String,
    pub data: Vec<u8>,
}

impl RawAttribute {
    /// Attributes whose payload holds no constant-pool index and can be copied
    /// into any pool.
    pub fn is_pool_independent(&self) -> bool {
        matches!(
            self.name.as_str(),
            "Deprecated" | "Synthetic" | "SourceDebugExtension"
        )
    }
}

/// The constant pool a node was read from.
///
/// While present the writer keeps it as a prefix of the new pool, so raw
/// attributes keep valid indices. It never takes part in node equality.
#[derive(Debug, Clone)]
pub struct SourcePool(pub Arc<ConstantPool>);

impl PartialEq for SourcePool {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for SourcePool {}

/// A class file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassNode {
    pub minor_version: u16,
    pub major_version: u16,
    pub access: u16,
    /// Internal name.
    pub name: String,
    /// `None` only for `java/lang/Object` and module-info.
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub signature: Option<String>,
    pub source_file: Option<String>,
    /// Class named by the `EnclosingMethod` attribute.
    pub outer_class: Option<String>,
    pub outer_method: Option<String>,
    pub outer_method_desc: Option<String>,
    pub inner_classes: Vec<InnerClassNode>,
    pub nest_host: Option<String>,
    pub nest_members: Vec<String>,
    pub permitted_subclasses: Vec<String>,
    pub visible_annotations: Vec<AnnotationNode>,
    pub invisible_annotations: Vec<AnnotationNode>,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<MethodNode>,
    /// Attributes this model does not decode.
    pub attributes: Vec<RawAttribute>,
    pub constant_pool: Option<SourcePool>,
}

impl ClassNode {
    /// Creates a class with no members.
    pub fn new(
        major_version: u16,
        access: u16,
        name: impl Into<String>,
        super_name: Option<String>,
        interfaces: Vec<String>,
    ) -> Self {
        Self {
            major_version,
            access,
            name: name.into(),
            super_name,
            interfaces,
            ..Self::default()
        }
    }

    pub fn method(&self, name: &str, desc: &str) -> Option<&MethodNode> {
        self.methods.iter().find(|m| m.name == name && m.desc == desc)
    }

    pub fn field(&self, name: &str, desc: &str) -> Option<&FieldNode> {
        self.fields.iter().find(|f| f.name == name && f.desc == desc)
    }
}

/// One entry of the `InnerClasses` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassNode {
    pub name: String,
    pub outer_name: Option<String>,
    /// Simple name; `None` for anonymous classes.
    pub inner_name: Option<String>,
    pub access: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldNode {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
    /// `ConstantValue` attribute.
    pub value: Option<Constant>,
    pub visible_annotations: Vec<AnnotationNode>,
    pub invisible_annotations: Vec<AnnotationNode>,
    pub attributes: Vec<RawAttribute>,
}

impl FieldNode {
    pub fn new(access: u16, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            desc: desc.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodNode {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
    /// Internal names from the `Exceptions` attribute.
    pub exceptions: Vec<String>,
    pub parameters: Vec<ParameterNode>,
    pub visible_annotations: Vec<AnnotationNode>,
    pub invisible_annotations: Vec<AnnotationNode>,
    pub visible_parameter_annotations: Option<Vec<Vec<AnnotationNode>>>,
    pub invisible_parameter_annotations: Option<Vec<Vec<AnnotationNode>>>,
    pub annotation_default: Option<ElementValue>,
    pub instructions: InsnList,
    pub try_catch_blocks: Vec<TryCatchBlock>,
    pub local_variables: Vec<LocalVariableNode>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub attributes: Vec<RawAttribute>,
    /// Unknown attributes of the `Code` attribute.
    pub code_attributes: Vec<RawAttribute>,
}

impl MethodNode {
    pub fn new(access: u16, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            desc: desc.into(),
            ..Self::default()
        }
    }
}

/// One entry of the `MethodParameters` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterNode {
    pub name: Option<String>,
    pub access: u16,
}

/// Exception table entry; `catch_type` is `None` for `finally` handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchBlock {
    pub start: LabelId,
    pub end: LabelId,
    pub handler: LabelId,
    pub catch_type: Option<String>,
}

/// A `LocalVariableTable` entry merged with its `LocalVariableTypeTable`
/// signature, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableNode {
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
    pub start: LabelId,
    pub end: LabelId,
    pub index: u16,
}

/// An annotation instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnnotationNode {
    /// Type descriptor, `L<name>;`.
    pub desc: String,
    pub values: IndexMap<String, ElementValue>,
}

impl AnnotationNode {
    pub fn new(desc: impl Into<String>) -> Self {
        Self {
            desc: desc.into(),
            values: IndexMap::new(),
        }
    }
}

/// An annotation element value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    Byte(i8),
    Char(u16),
    /// Raw IEEE bits.
    Double(u64),
    /// Raw IEEE bits.
    Float(u32),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    String(String),
    Enum { desc: String, name: String },
    /// Return descriptor of the class literal, e.g. `Ljava/lang/String;` or `V`.
    Class(String),
    Annotation(AnnotationNode),
    Array(Vec<ElementValue>),
}

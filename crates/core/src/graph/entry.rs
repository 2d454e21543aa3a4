//! Class, field and method records of the arena.

use super::stream::{InstructionStream, MemberRef};
use super::ClassId;
use crate::access::Access;
use crate::classfile::{
    read_class, write_class, AnnotationNode, ClassNode, CommonSuper, ElementValue, FieldNode,
    InnerClassNode, LocalVariableNode, MethodNode, WriterOptions,
};
use crate::descriptor::object_name;
use jarsmith_utils::errors::{ClassFormatError, ClassWriteError};

/// Default major version of synthesised classes (Java 8).
pub const DEFAULT_MAJOR_VERSION: u16 = 52;

pub const MAIN_METHOD_NAME: &str = "main";
pub const MAIN_METHOD_DESC: &str = "([Ljava/lang/String;)V";

/// A local variable table entry.
pub type LocalVariableEntry = LocalVariableNode;

/// A visible annotation and the arena class of its type, when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationEntry {
    pub(crate) node: AnnotationNode,
    pub(crate) class: Option<ClassId>,
}

impl AnnotationEntry {
    pub fn new(node: AnnotationNode) -> Self {
        Self { node, class: None }
    }

    /// Type descriptor, `L<name>;`.
    pub fn desc(&self) -> &str {
        &self.node.desc
    }

    /// Bare internal name of the annotation type.
    pub fn type_name(&self) -> Option<&str> {
        object_name(&self.node.desc)
    }

    /// The annotation type's class, after resolution.
    pub fn class(&self) -> Option<ClassId> {
        self.class
    }

    pub fn value(&self, key: &str) -> Option<&ElementValue> {
        self.node.values.get(key)
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.node.values.contains_key(key)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &ElementValue)> {
        self.node.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn node(&self) -> &AnnotationNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut AnnotationNode {
        &mut self.node
    }
}

/// Records that carry visible annotations.
pub trait Annotated {
    fn annotations(&self) -> &[AnnotationEntry];

    /// Looks an annotation up by the bare internal name of its type.
    fn annotation(&self, name: &str) -> Option<&AnnotationEntry> {
        self.annotations()
            .iter()
            .find(|a| a.type_name() == Some(name))
    }

    fn is_annotation_present(&self, name: &str) -> bool {
        self.annotation(name).is_some()
    }
}

fn wrap_annotations(nodes: Vec<AnnotationNode>) -> Vec<AnnotationEntry> {
    nodes.into_iter().map(AnnotationEntry::new).collect()
}

fn unwrap_annotations(entries: &[AnnotationEntry]) -> Vec<AnnotationNode> {
    entries.iter().map(|a| a.node.clone()).collect()
}

/// One `InnerClasses` record, linked to the arena class it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassRef {
    pub(crate) node: InnerClassNode,
    pub(crate) class: Option<ClassId>,
}

impl InnerClassRef {
    pub fn new(node: InnerClassNode) -> Self {
        Self { node, class: None }
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn outer_name(&self) -> Option<&str> {
        self.node.outer_name.as_deref()
    }

    pub fn inner_name(&self) -> Option<&str> {
        self.node.inner_name.as_deref()
    }

    /// The named inner class, after resolution.
    pub fn class(&self) -> Option<ClassId> {
        self.class
    }

    pub fn node(&self) -> &InnerClassNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut InnerClassNode {
        &mut self.node
    }
}

impl Access for InnerClassRef {
    fn access(&self) -> u16 {
        self.node.access
    }
}

#[derive(Debug, Clone)]
pub struct FieldEntry {
    pub(crate) node: FieldNode,
    pub(crate) annotations: Vec<AnnotationEntry>,
    pub(crate) parent: Option<ClassId>,
}

/// Fields compare by name, descriptor and access.
impl PartialEq for FieldEntry {
    fn eq(&self, other: &Self) -> bool {
        self.node.name == other.node.name
            && self.node.desc == other.node.desc
            && self.node.access == other.node.access
    }
}

impl Eq for FieldEntry {}

impl FieldEntry {
    pub fn from_node(mut node: FieldNode) -> Self {
        let annotations = wrap_annotations(std::mem::take(&mut node.visible_annotations));
        Self {
            node,
            annotations,
            parent: None,
        }
    }

    pub fn new(access: u16, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self::from_node(FieldNode::new(access, name, desc))
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn desc(&self) -> &str {
        &self.node.desc
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.node.name = name.into();
    }

    pub fn set_desc(&mut self, desc: impl Into<String>) {
        self.node.desc = desc.into();
    }

    pub fn set_access(&mut self, access: u16) {
        self.node.access = access;
    }

    pub fn parent(&self) -> Option<ClassId> {
        self.parent
    }

    /// The underlying node; visible annotations live in
    /// [`annotations`](Annotated::annotations) instead.
    pub fn node(&self) -> &FieldNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut FieldNode {
        &mut self.node
    }

    pub fn annotations_mut(&mut self) -> &mut Vec<AnnotationEntry> {
        &mut self.annotations
    }

    pub fn to_field_node(&self) -> FieldNode {
        let mut node = self.node.clone();
        node.visible_annotations = unwrap_annotations(&self.annotations);
        node
    }
}

impl Access for FieldEntry {
    fn access(&self) -> u16 {
        self.node.access
    }
}

impl Annotated for FieldEntry {
    fn annotations(&self) -> &[AnnotationEntry] {
        &self.annotations
    }
}

#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub(crate) node: MethodNode,
    pub(crate) annotations: Vec<AnnotationEntry>,
    pub(crate) instructions: InstructionStream,
    pub(crate) parent: Option<ClassId>,
    pub(crate) base: Option<(ClassId, usize)>,
}

/// Methods compare by name, descriptor and access, so a bridge or a method
/// with different flags never counts as the same method.
impl PartialEq for MethodEntry {
    fn eq(&self, other: &Self) -> bool {
        self.node.name == other.node.name
            && self.node.desc == other.node.desc
            && self.node.access == other.node.access
    }
}

impl Eq for MethodEntry {}

impl MethodEntry {
    pub fn from_node(mut node: MethodNode) -> Self {
        let annotations = wrap_annotations(std::mem::take(&mut node.visible_annotations));
        let instructions = InstructionStream::from(std::mem::take(&mut node.instructions));
        Self {
            node,
            annotations,
            instructions,
            parent: None,
            base: None,
        }
    }

    pub fn new(access: u16, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self::from_node(MethodNode::new(access, name, desc))
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn desc(&self) -> &str {
        &self.node.desc
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.node.name = name.into();
    }

    pub fn set_desc(&mut self, desc: impl Into<String>) {
        self.node.desc = desc.into();
    }

    pub fn set_access(&mut self, access: u16) {
        self.node.access = access;
    }

    pub fn parent(&self) -> Option<ClassId> {
        self.parent
    }

    /// The ancestor class and method index this method overrides.
    pub fn base(&self) -> Option<(ClassId, usize)> {
        self.base
    }

    pub fn is_override(&self) -> bool {
        self.base.is_some()
    }

    /// `public static void main(String[])`.
    pub fn is_main_method(&self) -> bool {
        self.node.name == MAIN_METHOD_NAME && self.node.desc == MAIN_METHOD_DESC
    }

    pub fn instructions(&self) -> &InstructionStream {
        &self.instructions
    }

    /// The method node next to its mutable instruction stream.
    pub fn split_instructions_mut(&mut self) -> (&MethodNode, &mut InstructionStream) {
        (&self.node, &mut self.instructions)
    }

    pub fn instructions_mut(&mut self) -> &mut InstructionStream {
        &mut self.instructions
    }

    pub fn local_variables(&self) -> &[LocalVariableEntry] {
        &self.node.local_variables
    }

    pub fn local_variables_mut(&mut self) -> &mut Vec<LocalVariableEntry> {
        &mut self.node.local_variables
    }

    /// The underlying node, without its instructions and visible annotations.
    pub fn node(&self) -> &MethodNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut MethodNode {
        &mut self.node
    }

    pub fn annotations_mut(&mut self) -> &mut Vec<AnnotationEntry> {
        &mut self.annotations
    }

    pub fn to_method_node(&self) -> MethodNode {
        let mut node = self.node.clone();
        node.visible_annotations = unwrap_annotations(&self.annotations);
        node.instructions = self.instructions.list().clone();
        node
    }
}

impl Access for MethodEntry {
    fn access(&self) -> u16 {
        self.node.access
    }
}

impl Annotated for MethodEntry {
    fn annotations(&self) -> &[AnnotationEntry] {
        &self.annotations
    }
}

/// A loaded or synthesised class.
///
/// Members, inner-class records and visible annotations are lifted out of the
/// node into their own entries. Everything else stays on the node and is
/// written back untouched. Fields marked "resolved" are only meaningful after
/// [`ClassArena::resolve`](super::ClassArena::resolve).
#[derive(Debug, Clone)]
pub struct ClassEntry {
    pub(crate) node: ClassNode,
    pub(crate) fields: Vec<FieldEntry>,
    pub(crate) methods: Vec<MethodEntry>,
    pub(crate) inner_classes: Vec<InnerClassRef>,
    pub(crate) annotations: Vec<AnnotationEntry>,
    pub(crate) is_main: bool,
    // resolved
    pub(crate) is_inner: bool,
    pub(crate) superclass: Option<ClassId>,
    pub(crate) interfaces: Vec<ClassId>,
    pub(crate) outer: Option<ClassId>,
    pub(crate) ancestors: Vec<ClassId>,
}

impl ClassEntry {
    pub fn from_node(mut node: ClassNode) -> Self {
        let fields = std::mem::take(&mut node.fields)
            .into_iter()
            .map(FieldEntry::from_node)
            .collect();
        let methods = std::mem::take(&mut node.methods)
            .into_iter()
            .map(MethodEntry::from_node)
            .collect();
        let inner_classes = std::mem::take(&mut node.inner_classes)
            .into_iter()
            .map(InnerClassRef::new)
            .collect();
        let annotations = wrap_annotations(std::mem::take(&mut node.visible_annotations));
        Self {
            node,
            fields,
            methods,
            inner_classes,
            annotations,
            is_main: false,
            is_inner: false,
            superclass: None,
            interfaces: Vec::new(),
            outer: None,
            ancestors: Vec::new(),
        }
    }

    /// Parses one class file.
    pub fn load(bytes: &[u8]) -> Result<Self, ClassFormatError> {
        read_class(bytes).map(Self::from_node)
    }

    /// An empty class with its source file set to `<simple name>.java`.
    pub fn create(
        major_version: u16,
        access: u16,
        name: impl Into<String>,
        super_name: Option<String>,
        interfaces: Vec<String>,
    ) -> Self {
        let mut node = ClassNode::new(major_version, access, name, super_name, interfaces);
        node.source_file = Some(format!("{}.java", simple_name(&node.name)));
        Self::from_node(node)
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Renames the class node. The arena must be reindexed afterwards.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.node.name = name.into();
    }

    pub fn super_name(&self) -> Option<&str> {
        self.node.super_name.as_deref()
    }

    pub fn interface_names(&self) -> &[String] {
        &self.node.interfaces
    }

    /// The `EnclosingMethod` class name.
    pub fn outer_class_name(&self) -> Option<&str> {
        self.node.outer_class.as_deref()
    }

    pub fn set_access(&mut self, access: u16) {
        self.node.access = access;
    }

    /// Sets the declared outer class. The arena must be resolved again.
    pub fn set_outer_class(&mut self, outer: impl Into<String>) {
        self.node.outer_class = Some(outer.into());
    }

    pub fn is_main(&self) -> bool {
        self.is_main
    }

    pub fn set_main(&mut self, is_main: bool) {
        self.is_main = is_main;
    }

    /// Whether another class declares this one as its inner class, or this
    /// class has an outer class.
    pub fn is_inner(&self) -> bool {
        self.is_inner
    }

    pub fn superclass(&self) -> Option<ClassId> {
        self.superclass
    }

    /// Resolved interfaces, skipping the ones outside the arena.
    pub fn interfaces(&self) -> &[ClassId] {
        &self.interfaces
    }

    pub fn outer(&self) -> Option<ClassId> {
        self.outer
    }

    /// Every ancestor reachable through superclass and interface links,
    /// depth first with the superclass before the interfaces. A class
    /// reachable on two paths appears twice.
    pub fn ancestors(&self) -> &[ClassId] {
        &self.ancestors
    }

    pub fn fields(&self) -> &[FieldEntry] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut [FieldEntry] {
        &mut self.fields
    }

    pub fn methods(&self) -> &[MethodEntry] {
        &self.methods
    }

    pub fn methods_mut(&mut self) -> &mut [MethodEntry] {
        &mut self.methods
    }

    pub fn inner_classes(&self) -> &[InnerClassRef] {
        &self.inner_classes
    }

    pub fn inner_classes_mut(&mut self) -> &mut [InnerClassRef] {
        &mut self.inner_classes
    }

    pub fn annotations_mut(&mut self) -> &mut Vec<AnnotationEntry> {
        &mut self.annotations
    }

    /// Class-level attributes not lifted into entries.
    pub fn node(&self) -> &ClassNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut ClassNode {
        &mut self.node
    }

    /// The class node next to its mutable members, so members can be
    /// visited while the class header stays readable.
    pub fn split_members_mut(&mut self) -> (&ClassNode, &mut [FieldEntry], &mut [MethodEntry]) {
        (&self.node, &mut self.fields, &mut self.methods)
    }

    pub fn add_field(&mut self, field: FieldEntry) -> usize {
        self.fields.push(field);
        self.fields.len() - 1
    }

    pub fn add_method(&mut self, method: MethodEntry) -> usize {
        self.methods.push(method);
        self.methods.len() - 1
    }

    pub fn add_inner_class(&mut self, inner: InnerClassNode) {
        self.inner_classes.push(InnerClassRef::new(inner));
    }

    pub fn field(&self, name: &str, desc: &str) -> Option<&FieldEntry> {
        self.fields.iter().find(|f| f.name() == name && f.desc() == desc)
    }

    pub fn field_index(&self, name: &str, desc: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name() == name && f.desc() == desc)
    }

    pub fn find_method(&self, name: &str, desc: &str) -> Option<&MethodEntry> {
        self.methods
            .iter()
            .find(|m| m.name() == name && m.desc() == desc)
    }

    pub fn method_index(&self, name: &str, desc: &str) -> Option<usize> {
        self.methods
            .iter()
            .position(|m| m.name() == name && m.desc() == desc)
    }

    pub fn find_method_mut(&mut self, name: &str, desc: &str) -> Option<&mut MethodEntry> {
        self.methods
            .iter_mut()
            .find(|m| m.name() == name && m.desc() == desc)
    }

    /// Reference to the field at `index`, owned by this class.
    pub fn field_ref(&self, index: usize) -> Option<MemberRef> {
        self.fields.get(index).map(|f| MemberRef {
            owner: self.name().to_string(),
            name: f.name().to_string(),
            desc: f.desc().to_string(),
            access: f.access(),
            interface: self.is_interface(),
        })
    }

    /// Reference to the method at `index`, owned by this class.
    pub fn method_ref(&self, index: usize) -> Option<MemberRef> {
        self.methods.get(index).map(|m| MemberRef {
            owner: self.name().to_string(),
            name: m.name().to_string(),
            desc: m.desc().to_string(),
            access: m.access(),
            interface: self.is_interface(),
        })
    }

    /// Reassembles the full class node.
    pub fn to_class_node(&self) -> ClassNode {
        let mut node = self.node.clone();
        node.fields = self.fields.iter().map(FieldEntry::to_field_node).collect();
        node.methods = self.methods.iter().map(MethodEntry::to_method_node).collect();
        node.inner_classes = self.inner_classes.iter().map(|i| i.node.clone()).collect();
        node.visible_annotations = unwrap_annotations(&self.annotations);
        node
    }

    /// Serialises the class.
    pub fn write(
        &self,
        options: &WriterOptions,
        hierarchy: &dyn CommonSuper,
    ) -> Result<Vec<u8>, ClassWriteError> {
        write_class(&self.to_class_node(), options, hierarchy)
    }
}

impl Access for ClassEntry {
    fn access(&self) -> u16 {
        self.node.access
    }
}

impl Annotated for ClassEntry {
    fn annotations(&self) -> &[AnnotationEntry] {
        &self.annotations
    }
}

/// `a/b/C$D` -> `C$D`.
pub fn simple_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ACC_PUBLIC, ACC_STATIC, ACC_SYNTHETIC};
    use crate::classfile::ObjectFallback;

    #[test]
    fn created_class_names_its_source_file() {
        let class = ClassEntry::create(
            DEFAULT_MAJOR_VERSION,
            ACC_PUBLIC,
            "demo/pkg/Created",
            Some("java/lang/Object".into()),
            vec![],
        );
        assert_eq!(class.node().source_file.as_deref(), Some("Created.java"));
        assert!(class.is_public());
        assert!(class.methods().is_empty());
    }

    #[test]
    fn method_equality_includes_access() {
        let a = MethodEntry::new(ACC_PUBLIC, "f", "()V");
        let b = MethodEntry::new(ACC_PUBLIC | ACC_SYNTHETIC, "f", "()V");
        assert_ne!(a, b);
        assert_eq!(a, MethodEntry::new(ACC_PUBLIC, "f", "()V"));
    }

    #[test]
    fn annotations_are_found_by_bare_name() {
        let mut node = ClassNode::new(52, ACC_PUBLIC, "demo/A", None, vec![]);
        let mut marker = AnnotationNode::new("Ldemo/Marker;");
        marker.values.insert("value".into(), ElementValue::Int(3));
        node.visible_annotations.push(marker);
        let class = ClassEntry::from_node(node);

        assert!(class.is_annotation_present("demo/Marker"));
        let marker = class.annotation("demo/Marker").unwrap();
        assert!(marker.has_value("value"));
        assert_eq!(marker.value("value"), Some(&ElementValue::Int(3)));
        assert!(!class.is_annotation_present("Ldemo/Marker;"));
    }

    #[test]
    fn entry_survives_write_and_load() {
        let mut class = ClassEntry::create(
            DEFAULT_MAJOR_VERSION,
            ACC_PUBLIC,
            "demo/Holder",
            Some("java/lang/Object".into()),
            vec![],
        );
        class.add_field(FieldEntry::new(ACC_STATIC, "count", "I"));
        let main = class.add_method(MethodEntry::new(
            ACC_PUBLIC | ACC_STATIC,
            MAIN_METHOD_NAME,
            MAIN_METHOD_DESC,
        ));
        class.methods_mut()[main]
            .instructions_mut()
            .add(crate::classfile::Insn::Simple(crate::opcode::RETURN));

        let bytes = class.write(&WriterOptions::default(), &ObjectFallback).unwrap();
        let back = ClassEntry::load(&bytes).unwrap();
        assert_eq!(back.name(), "demo/Holder");
        assert_eq!(back.fields(), class.fields());
        assert!(back.methods()[0].is_main_method());
        assert_eq!(back.methods()[0].instructions().len(), 1);
    }
}

//! Rewrites every name reference in a class arena through a mapping store.
//!
//! Declarations are looked up directly under their own class. Use sites
//! (field accesses, invocations, method handles) name the static receiver
//! type, which is often a subclass of the declaring class, so a miss on the
//! direct key walks the receiver's hierarchy in the arena and retries under
//! the declaring class. Names with no mapping pass through unchanged.

use indexmap::IndexMap;
use jarsmith_core::classfile::{
    AnnotationNode, Constant, ElementValue, Handle, Insn, InnerClassNode, VerificationType,
};
use jarsmith_core::descriptor::{map_descriptor, map_signature, object_name, return_type};
use jarsmith_core::graph::{simple_name, ClassArena, ClassEntry, MethodEntry};
use jarsmith_core::opcode::field_opcode_for_handle;
use jarsmith_mapping::MappingStore;

const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

fn field_key(owner: &str, name: &str) -> String {
    format!("{owner}.{name}")
}

fn method_key(owner: &str, name: &str, desc: &str) -> String {
    format!("{owner}.{name}{desc}")
}

/// Name lookups against a flattened mapping table and a resolved arena.
#[derive(Debug)]
pub struct Remapper<'a> {
    arena: &'a ClassArena,
    table: IndexMap<String, String>,
}

impl<'a> Remapper<'a> {
    pub fn new(arena: &'a ClassArena, store: &MappingStore) -> Self {
        Self::with_table(arena, store.flatten())
    }

    pub fn with_table(arena: &'a ClassArena, table: IndexMap<String, String>) -> Self {
        Self { arena, table }
    }

    pub fn table(&self) -> &IndexMap<String, String> {
        &self.table
    }

    fn class_mapping(&self, name: &str) -> Option<String> {
        self.table.get(name).cloned()
    }

    /// Maps an internal name, or an array descriptor as found in
    /// `anewarray`/`checkcast` operands and class constants.
    pub fn map_type(&self, name: &str) -> String {
        if name.starts_with('[') {
            return self.map_desc(name);
        }
        self.class_mapping(name).unwrap_or_else(|| name.to_string())
    }

    pub fn map_desc(&self, desc: &str) -> String {
        map_descriptor(desc, |name| self.class_mapping(name))
    }

    pub fn map_signature(&self, signature: &str) -> String {
        map_signature(signature, |name| self.class_mapping(name))
    }

    /// Name of the field a `opcode` access on `owner.name:desc` reaches.
    pub fn map_field_name(&self, owner: &str, name: &str, desc: &str, opcode: u8) -> String {
        if let Some(mapped) = self.table.get(&field_key(owner, name)) {
            return mapped.clone();
        }
        let declared = self
            .arena
            .id_of(owner)
            .and_then(|id| self.arena.find_field(id, opcode, name, desc))
            .and_then(|(id, _)| self.arena.name_of(id));
        declared
            .and_then(|declaring| self.table.get(&field_key(declaring, name)))
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Name of the method an invocation of `owner.name desc` reaches.
    pub fn map_method_name(&self, owner: &str, name: &str, desc: &str) -> String {
        if let Some(mapped) = self.table.get(&method_key(owner, name, desc)) {
            return mapped.clone();
        }
        let declared = self
            .arena
            .id_of(owner)
            .and_then(|id| self.arena.find_method(id, name, desc))
            .and_then(|(id, _)| self.arena.name_of(id));
        declared
            .and_then(|declaring| self.table.get(&method_key(declaring, name, desc)))
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// New name of a method declared on `owner`. An override missing from
    /// the table takes the mapping of the method it overrides.
    fn map_declared_method(&self, owner: &str, method: &MethodEntry) -> String {
        if let Some(mapped) = self.table.get(&method_key(owner, method.name(), method.desc())) {
            return mapped.clone();
        }
        method
            .base()
            .and_then(|base| Some((self.arena.name_of(base.0)?, self.arena.method(base)?)))
            .and_then(|(declaring, base)| {
                self.table
                    .get(&method_key(declaring, base.name(), base.desc()))
            })
            .cloned()
            .unwrap_or_else(|| method.name().to_string())
    }

    fn map_element_name(&self, annotation: &str, name: String) -> String {
        let Some(class) = self.arena.get(annotation) else {
            return name;
        };
        let Some(element) = class
            .methods()
            .iter()
            .find(|m| m.name() == name && m.desc().starts_with("()"))
        else {
            return name;
        };
        self.table
            .get(&method_key(annotation, &name, element.desc()))
            .cloned()
            .unwrap_or(name)
    }

    /// Maps the type, element names and values of an annotation.
    pub fn map_annotation(&self, node: &mut AnnotationNode) {
        let owner = object_name(&node.desc).map(str::to_string);
        let values = std::mem::take(&mut node.values);
        node.values = values
            .into_iter()
            .map(|(key, mut value)| {
                self.map_element_value(&mut value);
                let key = match &owner {
                    Some(owner) => self.map_element_name(owner, key),
                    None => key,
                };
                (key, value)
            })
            .collect();
        node.desc = self.map_desc(&node.desc);
    }

    fn map_element_value(&self, value: &mut ElementValue) {
        match value {
            ElementValue::Enum { desc, name } => {
                let constant = object_name(desc)
                    .and_then(|owner| self.table.get(&field_key(owner, name)))
                    .cloned();
                if let Some(constant) = constant {
                    *name = constant;
                }
                *desc = self.map_desc(desc);
            }
            ElementValue::Class(desc) => *desc = self.map_desc(desc),
            ElementValue::Annotation(node) => self.map_annotation(node),
            ElementValue::Array(values) => {
                for value in values {
                    self.map_element_value(value);
                }
            }
            _ => {}
        }
    }

    fn map_annotations(&self, nodes: &mut [AnnotationNode]) {
        for node in nodes {
            self.map_annotation(node);
        }
    }

    pub fn map_handle(&self, handle: &mut Handle) {
        handle.name = match field_opcode_for_handle(handle.kind) {
            Some(opcode) => self.map_field_name(&handle.owner, &handle.name, &handle.desc, opcode),
            None => self.map_method_name(&handle.owner, &handle.name, &handle.desc),
        };
        handle.owner = self.map_type(&handle.owner);
        handle.desc = self.map_desc(&handle.desc);
    }

    pub fn map_constant(&self, constant: &mut Constant) {
        match constant {
            Constant::Class(name) => *name = self.map_type(name),
            Constant::MethodType(desc) => *desc = self.map_desc(desc),
            Constant::MethodHandle(handle) => self.map_handle(handle),
            Constant::Dynamic(dynamic) => {
                dynamic.desc = self.map_desc(&dynamic.desc);
                self.map_handle(&mut dynamic.bsm);
                for arg in &mut dynamic.args {
                    self.map_constant(arg);
                }
            }
            _ => {}
        }
    }

    pub fn map_insn(&self, insn: &mut Insn) {
        match insn {
            Insn::Frame(frame) => {
                for slot in frame.locals.iter_mut().chain(frame.stack.iter_mut()) {
                    if let VerificationType::Object(name) = slot {
                        *name = self.map_type(name);
                    }
                }
            }
            Insn::Type { class, .. } => *class = self.map_type(class),
            Insn::Field {
                opcode,
                owner,
                name,
                desc,
            } => {
                *name = self.map_field_name(owner, name, desc, *opcode);
                *owner = self.map_type(owner);
                *desc = self.map_desc(desc);
            }
            Insn::Method {
                owner, name, desc, ..
            } => {
                *name = self.map_method_name(owner, name, desc);
                *owner = self.map_type(owner);
                *desc = self.map_desc(desc);
            }
            Insn::InvokeDynamic {
                name,
                desc,
                bsm,
                args,
            } => {
                // lambda call sites are named after the functional interface method
                let implemented = match (object_name(return_type(desc)), args.first()) {
                    (Some(interface), Some(Constant::MethodType(erased)))
                        if bsm.owner == LAMBDA_METAFACTORY =>
                    {
                        Some(self.map_method_name(interface, name, erased))
                    }
                    _ => None,
                };
                if let Some(implemented) = implemented {
                    *name = implemented;
                }
                *desc = self.map_desc(desc);
                self.map_handle(bsm);
                for arg in args {
                    self.map_constant(arg);
                }
            }
            Insn::Ldc(constant) => self.map_constant(constant),
            Insn::MultiANewArray { desc, .. } => *desc = self.map_desc(desc),
            _ => {}
        }
    }

    fn map_inner_class(&self, node: &mut InnerClassNode) {
        let original = std::mem::take(&mut node.name);
        node.name = self.map_type(&original);
        node.outer_name = node.outer_name.as_deref().map(|outer| self.map_type(outer));
        if node.inner_name.is_some() && node.name != original {
            node.inner_name = Some(inner_simple_name(&node.name, node.outer_name.as_deref()));
        }
    }

    /// A remapped copy of `class`.
    pub fn remap_class(&self, class: &ClassEntry) -> ClassEntry {
        let owner = class.name();
        let mut out = class.clone();

        let node = out.node_mut();
        node.name = self.map_type(&node.name);
        node.super_name = node.super_name.as_deref().map(|s| self.map_type(s));
        node.interfaces = node.interfaces.iter().map(|i| self.map_type(i)).collect();
        node.signature = node.signature.as_deref().map(|s| self.map_signature(s));
        if let Some(outer) = node.outer_class.take() {
            let method = match (node.outer_method.as_deref(), node.outer_method_desc.as_deref()) {
                (Some(name), Some(desc)) => Some(self.map_method_name(&outer, name, desc)),
                _ => None,
            };
            if method.is_some() {
                node.outer_method = method;
            }
            node.outer_method_desc = node.outer_method_desc.as_deref().map(|d| self.map_desc(d));
            node.outer_class = Some(self.map_type(&outer));
        }
        node.nest_host = node.nest_host.as_deref().map(|h| self.map_type(h));
        node.nest_members = node.nest_members.iter().map(|m| self.map_type(m)).collect();
        node.permitted_subclasses = node
            .permitted_subclasses
            .iter()
            .map(|p| self.map_type(p))
            .collect();
        self.map_annotations(&mut node.invisible_annotations);

        for inner in out.inner_classes_mut() {
            self.map_inner_class(inner.node_mut());
        }
        for annotation in out.annotations_mut() {
            self.map_annotation(annotation.node_mut());
        }

        for field in out.fields_mut() {
            if let Some(mapped) = self.table.get(&field_key(owner, field.name())) {
                field.set_name(mapped.clone());
            }
            field.set_desc(self.map_desc(field.desc()));
            for annotation in field.annotations_mut() {
                self.map_annotation(annotation.node_mut());
            }
            let node = field.node_mut();
            node.signature = node.signature.as_deref().map(|s| self.map_signature(s));
            self.map_annotations(&mut node.invisible_annotations);
        }

        for method in out.methods_mut() {
            let name = self.map_declared_method(owner, method);
            method.set_name(name);
            method.set_desc(self.map_desc(method.desc()));
            for annotation in method.annotations_mut() {
                self.map_annotation(annotation.node_mut());
            }
            self.remap_method_body(method);
        }
        out
    }

    fn remap_method_body(&self, method: &mut MethodEntry) {
        let node = method.node_mut();
        node.signature = node.signature.as_deref().map(|s| self.map_signature(s));
        node.exceptions = node.exceptions.iter().map(|e| self.map_type(e)).collect();
        self.map_annotations(&mut node.invisible_annotations);
        for parameters in [
            &mut node.visible_parameter_annotations,
            &mut node.invisible_parameter_annotations,
        ]
        .into_iter()
        .flatten()
        {
            for annotations in parameters {
                self.map_annotations(annotations);
            }
        }
        if let Some(default) = &mut node.annotation_default {
            self.map_element_value(default);
        }
        for block in &mut node.try_catch_blocks {
            block.catch_type = block.catch_type.as_deref().map(|t| self.map_type(t));
        }
        for local in &mut node.local_variables {
            local.desc = self.map_desc(&local.desc);
            local.signature = local.signature.as_deref().map(|s| self.map_signature(s));
        }
        for (_, insn) in method.instructions_mut().list_mut().iter_mut() {
            self.map_insn(insn);
        }
    }
}

/// Simple name of a remapped inner class: what follows its outer class and
/// `$`, or the last `$` segment.
fn inner_simple_name(name: &str, outer: Option<&str>) -> String {
    outer
        .and_then(|outer| name.strip_prefix(outer))
        .and_then(|rest| rest.strip_prefix('$'))
        .or_else(|| name.rsplit_once('$').map(|(_, simple)| simple))
        .unwrap_or_else(|| simple_name(name))
        .to_string()
}

/// Remaps every class of `arena` through `store`, then reindexes and
/// resolves it again under the new names. Returns the number of classes
/// whose name changed.
pub fn remap_arena(arena: &mut ClassArena, store: &MappingStore) -> usize {
    if !arena.is_resolved() {
        arena.resolve();
    }
    let remapper = Remapper::new(arena, store);
    tracing::debug!(
        "remapping {} classes through {} table entries",
        arena.len(),
        remapper.table().len()
    );
    let remapped: Vec<ClassEntry> = arena.iter().map(|(_, c)| remapper.remap_class(c)).collect();
    let renamed = arena
        .iter()
        .zip(&remapped)
        .filter(|((_, before), after)| before.name() != after.name())
        .count();

    arena.replace_all(remapped);
    arena.resolve();
    tracing::debug!("remap renamed {renamed} classes");
    renamed
}

//! Bidirectional symbol table for classes, fields and methods.

use indexmap::IndexMap;
use jarsmith_core::descriptor::{map_descriptor, return_type};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which way [`MappingStore::flatten`] translates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// `name -> mapping`.
    #[default]
    Applying,
    /// `mapping -> name`.
    Reversing,
}

impl Direction {
    pub const fn flipped(self) -> Self {
        match self {
            Self::Applying => Self::Reversing,
            Self::Reversing => Self::Applying,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMapping {
    pub name: String,
    pub mapping: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub name: String,
    pub mapping: String,
    /// Field descriptor; empty when the source format carries none.
    pub return_type: String,
    pub mapped_return_type: String,
}

impl FieldMapping {
    pub fn new(name: impl Into<String>, mapping: impl Into<String>, desc: impl Into<String>) -> Self {
        let desc = desc.into();
        Self {
            name: name.into(),
            mapping: mapping.into(),
            mapped_return_type: desc.clone(),
            return_type: desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodMapping {
    pub name: String,
    pub mapping: String,
    pub return_type: String,
    pub mapped_return_type: String,
    pub descriptor: String,
    pub mapped_descriptor: String,
}

impl MethodMapping {
    /// A mapping whose mapped descriptor is filled in later by
    /// [`MappingStore::complete_descriptors`].
    pub fn new(name: impl Into<String>, mapping: impl Into<String>, desc: impl Into<String>) -> Self {
        let desc = desc.into();
        Self::with_mapped_descriptor(name, mapping, desc.clone(), desc)
    }

    pub fn with_mapped_descriptor(
        name: impl Into<String>,
        mapping: impl Into<String>,
        desc: impl Into<String>,
        mapped_desc: impl Into<String>,
    ) -> Self {
        let descriptor = desc.into();
        let mapped_descriptor = mapped_desc.into();
        Self {
            name: name.into(),
            mapping: mapping.into(),
            return_type: return_type(&descriptor).to_string(),
            mapped_return_type: return_type(&mapped_descriptor).to_string(),
            descriptor,
            mapped_descriptor,
        }
    }
}

/// Class, field and method mappings of one archive.
///
/// Classes are keyed by their `name`; a reverse table finds them by
/// `mapping`. Member lists are keyed by the owning class's `name`. Every
/// insertion is first-wins, except that a class entry added by
/// [`ensure_class`](Self::ensure_class) gives way to a later explicit one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingStore {
    classes: IndexMap<String, ClassMapping>,
    reverse: IndexMap<String, String>,
    implicit: HashSet<String>,
    fields: IndexMap<String, Vec<FieldMapping>>,
    methods: IndexMap<String, Vec<MethodMapping>>,
    direction: Direction,
}

impl MappingStore {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    pub const fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    /// True when the store holds no mapping of any kind.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.fields.is_empty() && self.methods.is_empty()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.values().map(Vec::len).sum()
    }

    pub fn method_count(&self) -> usize {
        self.methods.values().map(Vec::len).sum()
    }

    /// Maps class `name` to `mapping`. Returns `false` when `name` already has
    /// an explicit mapping.
    pub fn map_class(&mut self, name: impl Into<String>, mapping: impl Into<String>) -> bool {
        let name = name.into();
        let mapping = mapping.into();
        if self.classes.contains_key(&name) {
            if !self.implicit.remove(&name) {
                return false;
            }
            if self.reverse.get(&name) == Some(&name) {
                self.reverse.shift_remove(&name);
            }
        }
        self.reverse
            .entry(mapping.clone())
            .or_insert_with(|| name.clone());
        self.classes
            .insert(name.clone(), ClassMapping { name, mapping });
        true
    }

    /// Adds a self-mapping for `name` unless it is already mapped.
    pub fn ensure_class(&mut self, name: &str) {
        if !self.classes.contains_key(name) {
            self.map_class(name, name);
            self.implicit.insert(name.to_string());
        }
    }

    /// Adds a field mapping unless `(class, name, return_type)` is taken.
    pub fn map_field(&mut self, class: impl Into<String>, field: FieldMapping) -> bool {
        let fields = self.fields.entry(class.into()).or_default();
        if fields
            .iter()
            .any(|f| f.name == field.name && f.return_type == field.return_type)
        {
            return false;
        }
        fields.push(field);
        true
    }

    /// Adds a method mapping unless `(class, name, descriptor)` is taken.
    pub fn map_method(&mut self, class: impl Into<String>, method: MethodMapping) -> bool {
        let methods = self.methods.entry(class.into()).or_default();
        if methods
            .iter()
            .any(|m| m.name == method.name && m.descriptor == method.descriptor)
        {
            return false;
        }
        methods.push(method);
        true
    }

    /// Class keyed by `name`.
    pub fn class(&self, name: &str) -> Option<&ClassMapping> {
        self.classes.get(name)
    }

    pub fn class_by_mapping(&self, mapping: &str) -> Option<&ClassMapping> {
        self.reverse.get(mapping).and_then(|name| self.classes.get(name))
    }

    /// Looks `key` up as a name first, then as a mapping.
    pub fn class_for(&self, key: &str) -> Option<&ClassMapping> {
        self.class(key).or_else(|| self.class_by_mapping(key))
    }

    /// The mapping of class `name`, or `name` itself.
    pub fn mapped_class_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.class(name).map_or(name, |c| c.mapping.as_str())
    }

    /// Member tables are keyed by class name; accept a mapping too.
    fn member_key<'a>(&'a self, class: &'a str) -> &'a str {
        if self.classes.contains_key(class) {
            return class;
        }
        self.reverse.get(class).map_or(class, String::as_str)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassMapping> {
        self.classes.values()
    }

    pub fn fields_of(&self, class: &str) -> &[FieldMapping] {
        self.fields
            .get(self.member_key(class))
            .map_or(&[][..], Vec::as_slice)
    }

    pub fn methods_of(&self, class: &str) -> &[MethodMapping] {
        self.methods
            .get(self.member_key(class))
            .map_or(&[][..], Vec::as_slice)
    }

    pub fn method(&self, class: &str, name: &str, desc: &str) -> Option<&MethodMapping> {
        self.methods_of(class)
            .iter()
            .find(|m| m.name == name && m.descriptor == desc)
    }

    pub fn method_by_mapping(
        &self,
        class: &str,
        mapping: &str,
        mapped_desc: &str,
    ) -> Option<&MethodMapping> {
        self.methods_of(class)
            .iter()
            .find(|m| m.mapping == mapping && m.mapped_descriptor == mapped_desc)
    }

    /// Fields without a recorded type match any `desc`.
    pub fn field(&self, class: &str, name: &str, desc: &str) -> Option<&FieldMapping> {
        self.fields_of(class)
            .iter()
            .find(|f| f.name == name && (f.return_type.is_empty() || f.return_type == desc))
    }

    pub fn field_by_mapping(
        &self,
        class: &str,
        mapping: &str,
        mapped_desc: &str,
    ) -> Option<&FieldMapping> {
        self.fields_of(class).iter().find(|f| {
            f.mapping == mapping
                && (f.mapped_return_type.is_empty() || f.mapped_return_type == mapped_desc)
        })
    }

    /// Rewrites a descriptor with the class mappings.
    pub fn map_type(&self, desc: &str) -> String {
        map_descriptor(desc, |name| self.class_for(name).map(|c| c.mapping.clone()))
    }

    /// Recomputes every mapped return type and mapped descriptor from the
    /// unmapped ones and the class table.
    pub fn complete_descriptors(&mut self) {
        let mut fields = std::mem::take(&mut self.fields);
        for field in fields.values_mut().flatten() {
            field.mapped_return_type = self.map_type(&field.return_type);
        }
        self.fields = fields;

        let mut methods = std::mem::take(&mut self.methods);
        for method in methods.values_mut().flatten() {
            method.return_type = return_type(&method.descriptor).to_string();
            method.mapped_descriptor = self.map_type(&method.descriptor);
            method.mapped_return_type = return_type(&method.mapped_descriptor).to_string();
        }
        self.methods = methods;
    }

    /// Flat lookup for the remapper, in the current direction.
    ///
    /// Keys are `class`, `class.field` and `class.method<descriptor>`, all in
    /// the namespace being translated from.
    pub fn flatten(&self) -> IndexMap<String, String> {
        let mut out = IndexMap::new();
        let reversing = self.direction == Direction::Reversing;

        for class in self.classes.values() {
            let (from, to) = if reversing {
                (&class.mapping, &class.name)
            } else {
                (&class.name, &class.mapping)
            };
            out.entry(from.clone()).or_insert_with(|| to.clone());
        }

        for (class, fields) in &self.fields {
            let owner = if reversing {
                self.mapped_class_name(class)
            } else {
                class.as_str()
            };
            for field in fields {
                let (from, to) = if reversing {
                    (&field.mapping, &field.name)
                } else {
                    (&field.name, &field.mapping)
                };
                out.entry(format!("{owner}.{from}"))
                    .or_insert_with(|| to.clone());
            }
        }

        for (class, methods) in &self.methods {
            let owner = if reversing {
                self.mapped_class_name(class)
            } else {
                class.as_str()
            };
            for method in methods {
                let (from, desc, to) = if reversing {
                    (&method.mapping, &method.mapped_descriptor, &method.name)
                } else {
                    (&method.name, &method.descriptor, &method.mapping)
                };
                out.entry(format!("{owner}.{from}{desc}"))
                    .or_insert_with(|| to.clone());
            }
        }
        out
    }

    /// The same mappings with names and mappings swapped, in the same
    /// direction. Applying the inverse undoes applying the original.
    pub fn inverse(&self) -> Self {
        let mut out = Self::new(self.direction);
        for class in self.classes.values() {
            out.map_class(&class.mapping, &class.name);
        }
        for (class, fields) in &self.fields {
            let owner = self.mapped_class_name(class).to_string();
            for field in fields {
                out.map_field(
                    owner.clone(),
                    FieldMapping {
                        name: field.mapping.clone(),
                        mapping: field.name.clone(),
                        return_type: field.mapped_return_type.clone(),
                        mapped_return_type: field.return_type.clone(),
                    },
                );
            }
        }
        for (class, methods) in &self.methods {
            let owner = self.mapped_class_name(class).to_string();
            for method in methods {
                out.map_method(
                    owner.clone(),
                    MethodMapping {
                        name: method.mapping.clone(),
                        mapping: method.name.clone(),
                        return_type: method.mapped_return_type.clone(),
                        mapped_return_type: method.return_type.clone(),
                        descriptor: method.mapped_descriptor.clone(),
                        mapped_descriptor: method.descriptor.clone(),
                    },
                );
            }
        }
        out
    }

    /// Iterates `(class name, fields)` pairs in insertion order.
    pub fn field_tables(&self) -> impl Iterator<Item = (&str, &[FieldMapping])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Iterates `(class name, methods)` pairs in insertion order.
    pub fn method_tables(&self) -> impl Iterator<Item = (&str, &[MethodMapping])> {
        self.methods.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

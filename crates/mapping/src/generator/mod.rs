//! Synthesises a mapping for every renameable symbol of a resolved arena.
//!
//! Classes are visited outermost first so an inner class can be named
//! `<outer mapping>$<short name>`. Overrides copy the mapping of the method
//! they override, and inherited fields are mapped under every subclass so
//! accesses through a subclass owner still resolve.

mod alphabet;
mod random;

pub use alphabet::AlphabetStrategy;
pub use random::{RandomStrategy, NAME_LENGTH};

use crate::store::{Direction, FieldMapping, MappingStore, MethodMapping};
use jarsmith_core::graph::{ClassArena, ClassId, MethodEntry};
use jarsmith_core::Access;
use jarsmith_utils::errors::MappingGenerateError;
use serde::{Deserialize, Serialize};

/// Method names that are never renamed.
pub const RESERVED_METHODS: [&str; 5] = ["valueOf", "values", "ordinal", "toString", "hashCode"];

/// Source of fresh names for each scope.
pub trait NameStrategy: std::fmt::Debug {
    fn class_name(&mut self) -> String;
    /// Starts the field and method scopes of the next class.
    fn enter_class(&mut self);
    fn field_name(&mut self) -> String;
    fn method_name(&mut self) -> String;
    /// Starts the local variable scope of the next method.
    fn enter_method(&mut self);
    fn local_name(&mut self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameStrategyKind {
    #[default]
    Alphabet,
    Random,
}

/// Configuration for [`MappingGenerator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Naming scheme.
    pub strategy: NameStrategyKind,
    /// Seed for [`NameStrategyKind::Random`]; drawn from the OS when unset.
    pub seed: Option<u64>,
    /// Method names kept as they are.
    pub reserved_methods: Vec<String>,
    /// Also rename local variable table entries, except `this`.
    pub rename_locals: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            strategy: NameStrategyKind::Alphabet,
            seed: None,
            reserved_methods: RESERVED_METHODS.iter().map(|s| s.to_string()).collect(),
            rename_locals: false,
        }
    }
}

impl GeneratorConfig {
    pub fn build_strategy(&self) -> Box<dyn NameStrategy> {
        match self.strategy {
            NameStrategyKind::Alphabet => Box::new(AlphabetStrategy::new()),
            NameStrategyKind::Random => Box::new(RandomStrategy::new(self.seed)),
        }
    }
}

#[derive(Debug)]
pub struct MappingGenerator {
    config: GeneratorConfig,
    names: Box<dyn NameStrategy>,
}

impl MappingGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let names = config.build_strategy();
        Self { config, names }
    }

    pub fn with_strategy(config: GeneratorConfig, names: Box<dyn NameStrategy>) -> Self {
        Self { config, names }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Whether a declaration of `method` may get a new name.
    ///
    /// Only supertypes inside the arena are consulted. A method implementing
    /// a library type, such as `run` for `java/lang/Runnable`, is renamed
    /// unless its name is listed in [`GeneratorConfig::reserved_methods`].
    pub fn is_changeable(&self, method: &MethodEntry) -> bool {
        let name = method.name();
        !method.is_native()
            && !name.starts_with('<')
            && !name.contains('$')
            && !method.is_main_method()
            && !self.config.reserved_methods.iter().any(|r| r == name)
    }

    /// Generates a new store in the applying direction.
    pub fn generate(&mut self, arena: &ClassArena) -> Result<MappingStore, MappingGenerateError> {
        let mut store = MappingStore::new(Direction::Applying);
        self.generate_into(arena, &mut store)?;
        Ok(store)
    }

    /// Populates an empty `store` from `arena`.
    pub fn generate_into(
        &mut self,
        arena: &ClassArena,
        store: &mut MappingStore,
    ) -> Result<(), MappingGenerateError> {
        if !arena.is_resolved() {
            return Err(MappingGenerateError::NotResolved);
        }
        if !store.is_empty() {
            return Err(MappingGenerateError::StoreNotEmpty(store.class_count()));
        }

        for id in class_order(arena) {
            self.map_declarations(arena, id, store);
        }
        map_overrides(arena, store);
        map_inherited_fields(arena, store);
        store.complete_descriptors();

        tracing::debug!(
            "generated {} class, {} field and {} method mappings",
            store.class_count(),
            store.field_count(),
            store.method_count()
        );
        Ok(())
    }

    fn map_declarations(&mut self, arena: &ClassArena, id: ClassId, store: &mut MappingStore) {
        let Some(class) = arena.by_id(id) else {
            return;
        };

        if !class.is_main() {
            let short = self.names.class_name();
            let mapping = match class.outer().and_then(|o| arena.name_of(o)) {
                Some(outer) => format!("{}${short}", store.mapped_class_name(outer)),
                None => short,
            };
            store.map_class(class.name(), mapping);
        }

        self.names.enter_class();
        if !class.is_enum() {
            for field in class.fields() {
                let mapping = self.names.field_name();
                store.map_field(class.name(), FieldMapping::new(field.name(), mapping, field.desc()));
            }
        }
        for method in class.methods() {
            if method.is_override() || !self.is_changeable(method) {
                continue;
            }
            let mapping = self.names.method_name();
            store.map_method(class.name(), MethodMapping::new(method.name(), mapping, method.desc()));
        }
    }

    /// Gives every local variable but `this` a fresh name per method.
    /// Returns the number of renamed entries.
    pub fn rename_locals(&mut self, arena: &mut ClassArena) -> usize {
        let mut renamed = 0;
        for (_, class) in arena.iter_mut() {
            for method in class.methods_mut() {
                self.names.enter_method();
                for local in method.local_variables_mut() {
                    if local.name != "this" {
                        local.name = self.names.local_name();
                        renamed += 1;
                    }
                }
            }
        }
        renamed
    }
}

/// Non-inner classes in arena order, then inner classes by nesting depth.
fn class_order(arena: &ClassArena) -> Vec<ClassId> {
    let (inner, outer): (Vec<_>, Vec<_>) = arena
        .iter()
        .map(|(id, class)| (id, class.is_inner()))
        .partition(|(_, is_inner)| *is_inner);
    let mut inner: Vec<ClassId> = inner.into_iter().map(|(id, _)| id).collect();
    inner.sort_by_key(|&id| nesting_depth(arena, id));
    outer.into_iter().map(|(id, _)| id).chain(inner).collect()
}

fn nesting_depth(arena: &ClassArena, id: ClassId) -> usize {
    let mut depth = 0;
    let mut current = arena.by_id(id).and_then(|c| c.outer());
    while let Some(outer) = current {
        depth += 1;
        if depth > arena.len() {
            break;
        }
        current = arena.by_id(outer).and_then(|c| c.outer());
    }
    depth
}

/// Follows override bases up to the declaration that has none.
fn root_declaration(arena: &ClassArena, mut at: (ClassId, usize)) -> (ClassId, usize) {
    for _ in 0..arena.len() {
        match arena.method(at).and_then(MethodEntry::base) {
            Some(next) => at = next,
            None => break,
        }
    }
    at
}

fn map_overrides(arena: &ClassArena, store: &mut MappingStore) {
    for (_, class) in arena.iter() {
        for method in class.methods() {
            let Some(base) = method.base() else {
                continue;
            };
            let root = root_declaration(arena, base);
            let (Some(owner), Some(declared)) = (arena.name_of(root.0), arena.method(root)) else {
                continue;
            };
            let inherited = store
                .method(owner, declared.name(), declared.desc())
                .map(|m| m.mapping.clone());
            if let Some(mapping) = inherited {
                store.map_method(class.name(), MethodMapping::new(method.name(), mapping, method.desc()));
            }
        }
    }
}

fn map_inherited_fields(arena: &ClassArena, store: &mut MappingStore) {
    for (id, class) in arena.iter() {
        for (ancestor, fields) in arena.super_fields(id) {
            let Some(owner) = arena.name_of(ancestor) else {
                continue;
            };
            for field in fields {
                if let Some(mapping) = store.field(owner, field.name(), field.desc()).cloned() {
                    store.map_field(class.name(), mapping);
                }
            }
        }
    }
}

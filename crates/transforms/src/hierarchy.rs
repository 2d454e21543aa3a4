//! Common-superclass answers for frame computation, backed by the arena.

use jarsmith_core::classfile::CommonSuper;
use jarsmith_core::graph::ClassArena;
use jarsmith_core::Access;

const OBJECT: &str = "java/lang/Object";

/// Walks superclass names through the arena.
///
/// When either type is not in the arena the first operand is returned, so
/// frame computation can proceed with an incomplete classpath.
#[derive(Debug, Clone, Copy)]
pub struct ArenaHierarchy<'a> {
    arena: &'a ClassArena,
}

impl<'a> ArenaHierarchy<'a> {
    pub fn new(arena: &'a ClassArena) -> Self {
        Self { arena }
    }

    /// `name` followed by its superclasses, ending at the first class that
    /// is not in the arena.
    fn superclass_chain(&self, name: &str) -> Vec<String> {
        let mut chain = vec![name.to_string()];
        let mut current = self.arena.get(name);
        while let Some(super_name) = current.and_then(|c| c.super_name()) {
            if chain.iter().any(|n| n == super_name) || chain.len() > self.arena.len() {
                break;
            }
            chain.push(super_name.to_string());
            current = self.arena.get(super_name);
        }
        chain
    }
}

impl CommonSuper for ArenaHierarchy<'_> {
    fn common_super(&self, a: &str, b: &str) -> String {
        if a == b {
            return a.to_string();
        }
        let (Some(first), Some(second)) = (self.arena.get(a), self.arena.get(b)) else {
            tracing::trace!("common super of {a} and {b} falls back to {a}");
            return a.to_string();
        };
        if first.is_interface() || second.is_interface() {
            return OBJECT.to_string();
        }
        let chain = self.superclass_chain(a);
        self.superclass_chain(b)
            .into_iter()
            .find(|candidate| chain.contains(candidate))
            .unwrap_or_else(|| OBJECT.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarsmith_core::access::{ACC_ABSTRACT, ACC_INTERFACE, ACC_PUBLIC};
    use jarsmith_core::graph::{ClassEntry, DEFAULT_MAJOR_VERSION};

    fn class(name: &str, super_name: &str) -> ClassEntry {
        ClassEntry::create(
            DEFAULT_MAJOR_VERSION,
            ACC_PUBLIC,
            name,
            Some(super_name.to_string()),
            vec![],
        )
    }

    fn arena() -> ClassArena {
        let mut arena = ClassArena::new();
        arena.insert(class("p/Base", "java/lang/Exception"));
        arena.insert(class("p/Left", "p/Base"));
        arena.insert(class("p/Right", "p/Base"));
        arena.insert(class("p/Deep", "p/Left"));
        arena.insert(class("p/Other", "java/lang/Exception"));
        let mut marker = class("p/Marker", "java/lang/Object");
        marker.set_access(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
        arena.insert(marker);
        arena
    }

    #[test]
    fn finds_nearest_shared_superclass() {
        let arena = arena();
        let hierarchy = ArenaHierarchy::new(&arena);
        assert_eq!(hierarchy.common_super("p/Deep", "p/Right"), "p/Base");
        assert_eq!(hierarchy.common_super("p/Left", "p/Deep"), "p/Left");
        assert_eq!(hierarchy.common_super("p/Deep", "p/Other"), "java/lang/Exception");
        assert_eq!(hierarchy.common_super("p/Marker", "p/Left"), OBJECT);
    }

    #[test]
    fn unknown_types_fall_back_to_first_operand() {
        let arena = arena();
        let hierarchy = ArenaHierarchy::new(&arena);
        assert_eq!(hierarchy.common_super("p/Left", "java/lang/String"), "p/Left");
        assert_eq!(hierarchy.common_super("java/util/List", "p/Left"), "java/util/List");
    }
}

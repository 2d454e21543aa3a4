//! Linking and hierarchy passes over a [`ClassArena`].
//!
//! [`ClassArena::repair_broken_inner`] runs once on a freshly loaded archive.
//! [`ClassArena::resolve`] runs the link and hierarchy passes and can be
//! repeated any number of times; the result only depends on the arena's
//! contents.

use super::arena::ClassArena;
use super::entry::{AnnotationEntry, ClassEntry};
use super::ClassId;
use crate::descriptor::object_name;
use std::collections::{HashMap, HashSet};

type NameIndex = HashMap<String, ClassId>;

impl ClassArena {
    /// Gives an outer class to classes named `Outer$Inner` that declare none.
    ///
    /// A class is broken when its name holds a `$`, it has no enclosing class
    /// and its own `InnerClasses` record names no outer class. The prefix
    /// before the first `$` becomes the outer class when the arena holds it.
    /// Returns the number of repaired classes.
    pub fn repair_broken_inner(&mut self) -> usize {
        let repairs: Vec<(ClassId, String)> = self
            .iter()
            .filter(|(_, class)| is_broken_inner(class))
            .filter_map(|(id, class)| {
                let (outer, _) = class.name().split_once('$')?;
                self.contains(outer).then(|| (id, outer.to_string()))
            })
            .collect();

        for (id, outer) in &repairs {
            if let Some(class) = self.by_id_mut(*id) {
                tracing::debug!("repairing inner class {} with outer {}", class.name(), outer);
                class.set_outer_class(outer.clone());
            }
        }
        if !repairs.is_empty() {
            self.invalidate();
        }
        repairs.len()
    }

    /// Links every name to its arena class and computes ancestors and
    /// overrides.
    pub fn resolve(&mut self) {
        let index: NameIndex = self
            .iter()
            .map(|(id, class)| (class.name().to_string(), id))
            .collect();
        self.link(&index);
        self.mark_inner(&index);
        self.build_hierarchy();
        self.mark_resolved();
        tracing::debug!("resolved {} classes", self.len());
    }

    fn link(&mut self, index: &NameIndex) {
        let lookup = |name: &str| index.get(name).copied();
        for (id, class) in self.iter_mut() {
            class.superclass = class.node.super_name.as_deref().and_then(lookup);
            class.interfaces = class
                .node
                .interfaces
                .iter()
                .filter_map(|name| lookup(name.as_str()))
                .collect();

            for inner in &mut class.inner_classes {
                inner.class = lookup(inner.node.name.as_str());
            }

            let own_name = class.node.name.clone();
            class.outer = class
                .node
                .outer_class
                .as_deref()
                .or_else(|| {
                    class
                        .inner_classes
                        .iter()
                        .find(|i| i.node.name == own_name)
                        .and_then(|i| i.node.outer_name.as_deref())
                })
                .and_then(lookup);

            link_annotations(&mut class.annotations, index);
            for field in &mut class.fields {
                field.parent = Some(id);
                link_annotations(&mut field.annotations, index);
            }
            for method in &mut class.methods {
                method.parent = Some(id);
                method.base = None;
                link_annotations(&mut method.annotations, index);
            }
        }
    }

    fn mark_inner(&mut self, index: &NameIndex) {
        let mut inner: HashSet<ClassId> = HashSet::new();
        for (id, class) in self.iter() {
            if class.outer.is_some() {
                inner.insert(id);
            }
            for record in class.inner_classes() {
                if !record.outer_name().is_some_and(|o| index.contains_key(o)) {
                    continue;
                }
                if let Some(target) = record.class() {
                    inner.insert(target);
                }
            }
        }
        for (id, class) in self.iter_mut() {
            class.is_inner = inner.contains(&id);
        }
    }

    fn build_hierarchy(&mut self) {
        let ancestors: Vec<Vec<ClassId>> = self.ids().map(|id| self.collect_ancestors(id)).collect();

        let bases: Vec<Vec<Option<(ClassId, usize)>>> = self
            .iter()
            .zip(&ancestors)
            .map(|((_, class), supers)| {
                class
                    .methods()
                    .iter()
                    .map(|method| {
                        supers.iter().find_map(|&a| {
                            self.by_id(a)?
                                .methods()
                                .iter()
                                .position(|m| m == method)
                                .map(|index| (a, index))
                        })
                    })
                    .collect()
            })
            .collect();

        for (((_, class), supers), bases) in self.iter_mut().zip(ancestors).zip(bases) {
            class.ancestors = supers;
            for (method, base) in class.methods.iter_mut().zip(bases) {
                method.base = base;
            }
        }
    }

    /// Depth-first walk of superclass then interfaces. Classes reached twice
    /// are listed twice; a class on the current path is not re-entered.
    fn collect_ancestors(&self, id: ClassId) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut path = vec![id];
        self.walk_ancestors(id, &mut path, &mut out);
        out
    }

    fn walk_ancestors(&self, id: ClassId, path: &mut Vec<ClassId>, out: &mut Vec<ClassId>) {
        let Some(class) = self.by_id(id) else {
            return;
        };
        let parents = class.superclass().into_iter().chain(class.interfaces().iter().copied());
        for parent in parents {
            if path.contains(&parent) {
                tracing::warn!("inheritance cycle through {}", class.name());
                continue;
            }
            out.push(parent);
            path.push(parent);
            self.walk_ancestors(parent, path, out);
            path.pop();
        }
    }
}

fn is_broken_inner(class: &ClassEntry) -> bool {
    let name = class.name();
    name.contains('$')
        && class.outer_class_name().is_none()
        && !class
            .inner_classes()
            .iter()
            .any(|i| i.name() == name && i.outer_name().is_some())
}

fn link_annotations(annotations: &mut [AnnotationEntry], index: &NameIndex) {
    for annotation in annotations {
        annotation.class = object_name(&annotation.node.desc).and_then(|n| index.get(n).copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ACC_INTERFACE, ACC_ABSTRACT, ACC_PUBLIC, ACC_STATIC};
    use crate::classfile::{AnnotationNode, InnerClassNode};
    use crate::graph::entry::{Annotated, MethodEntry, DEFAULT_MAJOR_VERSION};

    fn class(name: &str, super_name: &str, interfaces: &[&str]) -> ClassEntry {
        ClassEntry::create(
            DEFAULT_MAJOR_VERSION,
            ACC_PUBLIC,
            name,
            Some(super_name.to_string()),
            interfaces.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn override_points_at_declaring_ancestor() {
        let mut arena = ClassArena::new();
        let mut a = class("A", "java/lang/Object", &[]);
        a.add_method(MethodEntry::new(ACC_PUBLIC, "f", "(I)I"));
        let mut b = class("B", "A", &[]);
        b.add_method(MethodEntry::new(ACC_PUBLIC, "f", "(I)I"));
        b.add_method(MethodEntry::new(ACC_PUBLIC | ACC_STATIC, "g", "()V"));
        let a = arena.insert(a);
        let b = arena.insert(b);
        arena.resolve();

        let class_b = arena.by_id(b).unwrap();
        assert_eq!(class_b.superclass(), Some(a));
        assert_eq!(class_b.methods()[0].base(), Some((a, 0)));
        assert_eq!(class_b.methods()[1].base(), None);
        assert_eq!(arena.by_id(a).unwrap().superclass(), None);
        assert_eq!(class_b.methods()[0].parent(), Some(b));
    }

    #[test]
    fn differing_access_is_not_an_override() {
        let mut arena = ClassArena::new();
        let mut a = class("A", "java/lang/Object", &[]);
        a.add_method(MethodEntry::new(ACC_PUBLIC, "f", "()V"));
        let mut b = class("B", "A", &[]);
        b.add_method(MethodEntry::new(0, "f", "()V"));
        arena.insert(a);
        let b = arena.insert(b);
        arena.resolve();
        assert!(!arena.by_id(b).unwrap().methods()[0].is_override());
    }

    #[test]
    fn ancestors_keep_duplicate_paths() {
        let mut arena = ClassArena::new();
        let mut i = class("I", "java/lang/Object", &[]);
        i.set_access(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
        let i = arena.insert(i);
        let a = arena.insert(class("A", "java/lang/Object", &["I"]));
        let b = arena.insert(class("B", "A", &["I"]));
        arena.resolve();
        assert_eq!(arena.by_id(b).unwrap().ancestors(), &[a, i, i]);
    }

    #[test]
    fn cyclic_hierarchy_terminates() {
        let mut arena = ClassArena::new();
        let a = arena.insert(class("A", "B", &[]));
        let b = arena.insert(class("B", "A", &[]));
        arena.resolve();
        assert_eq!(arena.by_id(a).unwrap().ancestors(), &[b]);
        assert_eq!(arena.by_id(b).unwrap().ancestors(), &[a]);
    }

    #[test]
    fn broken_inner_class_gets_its_outer() {
        let mut arena = ClassArena::new();
        let foo = arena.insert(class("x/y/Foo", "java/lang/Object", &[]));
        let bar = arena.insert(class("x/y/Foo$Bar", "java/lang/Object", &[]));
        assert_eq!(arena.repair_broken_inner(), 1);
        arena.resolve();

        let bar = arena.by_id(bar).unwrap();
        assert_eq!(bar.outer_class_name(), Some("x/y/Foo"));
        assert_eq!(bar.outer(), Some(foo));
        assert!(bar.is_inner());
        assert!(!arena.by_id(foo).unwrap().is_inner());
    }

    #[test]
    fn declared_member_class_is_left_alone() {
        let mut arena = ClassArena::new();
        let record = InnerClassNode {
            name: "p/Outer$Inner".into(),
            outer_name: Some("p/Outer".into()),
            inner_name: Some("Inner".into()),
            access: ACC_PUBLIC,
        };
        let mut outer = class("p/Outer", "java/lang/Object", &[]);
        outer.add_inner_class(record.clone());
        let mut inner = class("p/Outer$Inner", "java/lang/Object", &[]);
        inner.add_inner_class(record);
        let outer = arena.insert(outer);
        let inner = arena.insert(inner);

        assert_eq!(arena.repair_broken_inner(), 0);
        arena.resolve();
        let entry = arena.by_id(inner).unwrap();
        assert!(entry.is_inner());
        assert_eq!(entry.outer(), Some(outer));
        assert_eq!(entry.outer_class_name(), None);
        let outer_entry = arena.by_id(outer).unwrap();
        assert_eq!(outer_entry.inner_classes()[0].class(), Some(inner));
    }

    #[test]
    fn annotations_link_to_present_types() {
        let mut arena = ClassArena::new();
        let mut marker = class("p/Marker", "java/lang/Object", &[]);
        marker.set_access(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT | crate::access::ACC_ANNOTATION);
        let marker = arena.insert(marker);
        let mut user = class("p/User", "java/lang/Object", &[]);
        user.annotations_mut()
            .push(AnnotationEntry::new(AnnotationNode::new("Lp/Marker;")));
        user.annotations_mut()
            .push(AnnotationEntry::new(AnnotationNode::new("Ljava/lang/Deprecated;")));
        let user = arena.insert(user);
        arena.resolve();

        let annotations = arena.by_id(user).unwrap().annotations();
        assert_eq!(annotations[0].class(), Some(marker));
        assert_eq!(annotations[1].class(), None);
    }

    #[test]
    fn resolving_twice_gives_the_same_graph() {
        let mut arena = ClassArena::new();
        let mut a = class("A", "java/lang/Object", &[]);
        a.add_method(MethodEntry::new(ACC_PUBLIC, "f", "()V"));
        let mut b = class("B", "A", &[]);
        b.add_method(MethodEntry::new(ACC_PUBLIC, "f", "()V"));
        arena.insert(a);
        let b = arena.insert(b);
        arena.resolve();
        let first = arena.by_id(b).unwrap().methods()[0].base();
        arena.resolve();
        assert_eq!(arena.by_id(b).unwrap().methods()[0].base(), first);
        assert!(arena.is_resolved());
    }
}

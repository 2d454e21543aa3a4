//! The archive-wide class table.

use super::entry::{ClassEntry, FieldEntry, MethodEntry};
use super::ClassId;
use crate::access::Access;
use crate::opcode::{GETFIELD, GETSTATIC, PUTFIELD, PUTSTATIC};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Owns every [`ClassEntry`] of an archive, keyed by internal name.
///
/// Links between classes are [`ClassId`]s into this arena. Ids are positions
/// in insertion order; inserting keeps existing ids, while removing or
/// renaming a class shifts them, so those operations drop the resolved state
/// and the arena must be resolved again before links are read.
#[derive(Debug, Clone, Default)]
pub struct ClassArena {
    classes: IndexMap<String, ClassEntry>,
    resolved: bool,
}

impl FromIterator<ClassEntry> for ClassArena {
    fn from_iter<I: IntoIterator<Item = ClassEntry>>(iter: I) -> Self {
        let mut arena = Self::new();
        arena.replace_all(iter);
        arena
    }
}

impl ClassArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Whether links reflect the current contents.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Marks the links stale.
    pub fn invalidate(&mut self) {
        self.resolved = false;
    }

    pub(crate) fn mark_resolved(&mut self) {
        self.resolved = true;
    }

    /// Inserts a class under its own name, replacing any class of that name.
    pub fn insert(&mut self, class: ClassEntry) -> ClassId {
        self.resolved = false;
        let (index, _) = self.classes.insert_full(class.name().to_string(), class);
        ClassId(index)
    }

    pub fn remove(&mut self, name: &str) -> Option<ClassEntry> {
        self.resolved = false;
        self.classes.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ClassEntry> {
        self.classes.get(name)
    }

    /// Mutable access. Renaming the class through this requires
    /// [`reindex`](Self::reindex).
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ClassEntry> {
        self.classes.get_mut(name)
    }

    pub fn id_of(&self, name: &str) -> Option<ClassId> {
        self.classes.get_index_of(name).map(ClassId)
    }

    pub fn by_id(&self, id: ClassId) -> Option<&ClassEntry> {
        self.classes.get_index(id.0).map(|(_, c)| c)
    }

    pub fn by_id_mut(&mut self, id: ClassId) -> Option<&mut ClassEntry> {
        self.classes.get_index_mut(id.0).map(|(_, c)| c)
    }

    /// Classes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &ClassEntry)> {
        self.classes.values().enumerate().map(|(i, c)| (ClassId(i), c))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ClassId, &mut ClassEntry)> {
        self.classes
            .values_mut()
            .enumerate()
            .map(|(i, c)| (ClassId(i), c))
    }

    pub fn ids(&self) -> impl Iterator<Item = ClassId> {
        (0..self.classes.len()).map(ClassId)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn name_of(&self, id: ClassId) -> Option<&str> {
        self.classes.get_index(id.0).map(|(k, _)| k.as_str())
    }

    /// Rebuilds the name keys from the class nodes, keeping order. Two classes
    /// renamed to the same name collapse into the later one.
    pub fn reindex(&mut self) {
        let classes = std::mem::take(&mut self.classes);
        self.classes = classes
            .into_values()
            .map(|c| (c.name().to_string(), c))
            .collect();
        self.resolved = false;
    }

    /// Replaces every class, keeping the given order.
    pub fn replace_all(&mut self, classes: impl IntoIterator<Item = ClassEntry>) {
        self.classes = classes
            .into_iter()
            .map(|c| (c.name().to_string(), c))
            .collect();
        self.resolved = false;
    }

    /// Ancestors of `id` paired with their methods, see
    /// [`ClassEntry::ancestors`].
    pub fn super_methods(
        &self,
        id: ClassId,
    ) -> impl Iterator<Item = (ClassId, &[MethodEntry])> + '_ {
        self.ancestor_ids(id).filter_map(move |a| {
            self.by_id(a).map(|class| (a, class.methods()))
        })
    }

    /// Ancestors of `id` paired with their fields.
    pub fn super_fields(&self, id: ClassId) -> impl Iterator<Item = (ClassId, &[FieldEntry])> + '_ {
        self.ancestor_ids(id)
            .filter_map(move |a| self.by_id(a).map(|class| (a, class.fields())))
    }

    fn ancestor_ids(&self, id: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        self.by_id(id)
            .map(|c| c.ancestors())
            .unwrap_or(&[])
            .iter()
            .copied()
    }

    /// Resolved method `index` of class `id`.
    pub fn method(&self, (id, index): (ClassId, usize)) -> Option<&MethodEntry> {
        self.by_id(id)?.methods().get(index)
    }

    /// Resolved field `index` of class `id`.
    pub fn field(&self, (id, index): (ClassId, usize)) -> Option<&FieldEntry> {
        self.by_id(id)?.fields().get(index)
    }

    /// Finds the field an access with `opcode` on class `id` reaches: the
    /// class itself, then its superclass chain, then its interfaces, depth
    /// first. Candidates must suit the opcode: static for `getstatic`,
    /// static and non-final for `putstatic`, non-static for `getfield`,
    /// non-static and non-final for `putfield`.
    pub fn find_field(
        &self,
        id: ClassId,
        opcode: u8,
        name: &str,
        desc: &str,
    ) -> Option<(ClassId, usize)> {
        let mut seen = HashSet::new();
        self.find_field_in(id, opcode, name, desc, &mut seen)
    }

    fn find_field_in(
        &self,
        id: ClassId,
        opcode: u8,
        name: &str,
        desc: &str,
        seen: &mut HashSet<ClassId>,
    ) -> Option<(ClassId, usize)> {
        if !seen.insert(id) {
            return None;
        }
        let class = self.by_id(id)?;
        let own = class.fields().iter().position(|f| {
            f.name() == name && f.desc() == desc && field_matches_opcode(f, opcode)
        });
        if let Some(index) = own {
            return Some((id, index));
        }
        if let Some(found) = class
            .superclass()
            .and_then(|s| self.find_field_in(s, opcode, name, desc, seen))
        {
            return Some(found);
        }
        class
            .interfaces()
            .iter()
            .find_map(|&i| self.find_field_in(i, opcode, name, desc, seen))
    }

    /// Finds the declaration of `name desc` visible from class `id`: the
    /// class itself, then its ancestors in [`ClassEntry::ancestors`] order.
    pub fn find_method(&self, id: ClassId, name: &str, desc: &str) -> Option<(ClassId, usize)> {
        let class = self.by_id(id)?;
        if let Some(index) = class.method_index(name, desc) {
            return Some((id, index));
        }
        self.super_methods(id).find_map(|(owner, methods)| {
            methods
                .iter()
                .position(|m| m.name() == name && m.desc() == desc)
                .map(|index| (owner, index))
        })
    }
}

fn field_matches_opcode(field: &FieldEntry, opcode: u8) -> bool {
    match opcode {
        GETSTATIC => field.is_static(),
        PUTSTATIC => field.is_static() && !field.is_final(),
        GETFIELD => !field.is_static(),
        PUTFIELD => !field.is_static() && !field.is_final(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ACC_FINAL, ACC_PUBLIC, ACC_STATIC};
    use crate::graph::entry::DEFAULT_MAJOR_VERSION;

    fn class(name: &str, super_name: Option<&str>) -> ClassEntry {
        ClassEntry::create(
            DEFAULT_MAJOR_VERSION,
            ACC_PUBLIC,
            name,
            Some(super_name.unwrap_or("java/lang/Object").to_string()),
            vec![],
        )
    }

    #[test]
    fn field_lookup_honours_opcode() {
        let mut arena = ClassArena::new();
        let mut a = class("p/A", None);
        a.add_field(FieldEntry::new(ACC_STATIC, "f", "I"));
        a.add_field(FieldEntry::new(ACC_STATIC | ACC_FINAL, "k", "I"));
        let a = arena.insert(a);
        let b = arena.insert(class("p/B", Some("p/A")));
        arena.resolve();

        assert_eq!(arena.find_field(a, GETSTATIC, "f", "I"), Some((a, 0)));
        assert_eq!(arena.find_field(b, GETSTATIC, "f", "I"), Some((a, 0)));
        assert_eq!(arena.find_field(b, GETFIELD, "f", "I"), None);
        assert_eq!(arena.find_field(b, GETSTATIC, "k", "I"), Some((a, 1)));
        assert_eq!(arena.find_field(b, PUTSTATIC, "k", "I"), None);
    }

    #[test]
    fn method_lookup_walks_ancestors() {
        let mut arena = ClassArena::new();
        let mut a = class("p/A", None);
        a.add_method(MethodEntry::new(ACC_PUBLIC, "run", "()V"));
        let a = arena.insert(a);
        let b = arena.insert(class("p/B", Some("p/A")));
        let c = arena.insert(class("p/C", Some("p/B")));
        arena.resolve();

        assert_eq!(arena.find_method(c, "run", "()V"), Some((a, 0)));
        assert_eq!(arena.find_method(b, "run", "(I)V"), None);
        let supers: Vec<ClassId> = arena.super_methods(c).map(|(id, _)| id).collect();
        assert_eq!(supers, vec![b, a]);
    }

    #[test]
    fn reindex_follows_renames() {
        let mut arena = ClassArena::new();
        arena.insert(class("p/A", None));
        arena.insert(class("p/B", None));
        arena.get_mut("p/A").unwrap().set_name("a");
        arena.reindex();

        assert!(!arena.is_resolved());
        assert_eq!(arena.names().collect::<Vec<_>>(), vec!["a", "p/B"]);
        assert_eq!(arena.id_of("a"), Some(ClassId(0)));
    }
}

//! Editable instruction stream of one method.

use crate::access::Access;
use crate::classfile::{Insn, InsnId, InsnList, LabelId};
use crate::opcode::*;
use std::collections::HashMap;

/// A field or method reference, enough to emit an access or a call to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub desc: String,
    pub access: u16,
    /// Whether `owner` is an interface.
    pub interface: bool,
}

impl Access for MemberRef {
    fn access(&self) -> u16 {
        self.access
    }
}

/// Instruction list with a nearest-preceding-label cache.
///
/// Every structural mutation drops the cache; it is rebuilt on the next
/// [`label_for`](Self::label_for) call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionStream {
    list: InsnList,
    labels: Option<HashMap<InsnId, LabelId>>,
}

impl From<InsnList> for InstructionStream {
    fn from(list: InsnList) -> Self {
        Self { list, labels: None }
    }
}

impl InstructionStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &InsnList {
        &self.list
    }

    /// Direct access to the list. Drops the label cache.
    pub fn list_mut(&mut self) -> &mut InsnList {
        self.labels = None;
        &mut self.list
    }

    pub fn into_list(self) -> InsnList {
        self.list
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Snapshot of the current ids, in order.
    pub fn ids(&self) -> Vec<InsnId> {
        self.list.ids()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InsnId, &Insn)> + '_ {
        self.list.iter()
    }

    pub fn get(&self, id: InsnId) -> Option<&Insn> {
        self.list.get(id)
    }

    /// Mutable access to one instruction. Replacing a label through this
    /// drops the cache.
    pub fn get_mut(&mut self, id: InsnId) -> Option<&mut Insn> {
        if matches!(self.list.get(id), Some(Insn::Label(_))) {
            self.labels = None;
        }
        self.list.get_mut(id)
    }

    pub fn index_of(&self, id: InsnId) -> Option<usize> {
        self.list.position(id)
    }

    pub fn first(&self) -> Option<(InsnId, &Insn)> {
        self.list.first()
    }

    pub fn last(&self) -> Option<(InsnId, &Insn)> {
        self.list.last()
    }

    pub fn new_label(&mut self) -> LabelId {
        self.list.new_label()
    }

    /// Appends an instruction.
    pub fn add(&mut self, insn: Insn) -> InsnId {
        self.labels = None;
        self.list.push(insn)
    }

    /// Appends every instruction of `other`, in order.
    pub fn add_all(&mut self, other: impl IntoIterator<Item = Insn>) {
        self.labels = None;
        for insn in other {
            self.list.push(insn);
        }
    }

    /// Inserts at the start of the stream.
    pub fn insert(&mut self, insn: Insn) -> InsnId {
        self.labels = None;
        self.list.push_front(insn)
    }

    /// Inserts `insns` at the start of the stream, keeping their order.
    pub fn insert_all(&mut self, insns: impl IntoIterator<Item = Insn>) {
        self.labels = None;
        for (offset, insn) in insns.into_iter().enumerate() {
            self.list.insert_at(offset, insn);
        }
    }

    pub fn insert_before(&mut self, anchor: InsnId, insn: Insn) -> Option<InsnId> {
        self.labels = None;
        self.list.insert_before(anchor, insn)
    }

    pub fn insert_after(&mut self, anchor: InsnId, insn: Insn) -> Option<InsnId> {
        self.labels = None;
        self.list.insert_after(anchor, insn)
    }

    pub fn remove(&mut self, id: InsnId) -> Option<Insn> {
        self.labels = None;
        self.list.remove(id)
    }

    pub fn clear(&mut self) {
        self.labels = None;
        self.list.clear();
    }

    /// The label closest before `id`, or `None` when no label precedes it or
    /// `id` is itself a label.
    pub fn label_for(&mut self, id: InsnId) -> Option<LabelId> {
        if self.labels.is_none() {
            self.labels = Some(self.build_label_cache());
        }
        self.labels.as_ref()?.get(&id).copied()
    }

    fn build_label_cache(&self) -> HashMap<InsnId, LabelId> {
        let mut cache = HashMap::new();
        let mut current = None;
        for (id, insn) in self.list.iter() {
            match insn {
                Insn::Label(label) => current = Some(*label),
                _ => {
                    if let Some(label) = current {
                        cache.insert(id, label);
                    }
                }
            }
        }
        tracing::trace!("rebuilt label cache with {} entries", cache.len());
        cache
    }

    fn get_field_insns(field: &MemberRef) -> Vec<Insn> {
        let get = Insn::Field {
            opcode: if field.is_static() { GETSTATIC } else { GETFIELD },
            owner: field.owner.clone(),
            name: field.name.clone(),
            desc: field.desc.clone(),
        };
        if field.is_static() {
            vec![get]
        } else {
            vec![Insn::Var { opcode: ALOAD, var: 0 }, get]
        }
    }

    fn invoke_insns(method: &MemberRef) -> Vec<Insn> {
        let opcode = if method.is_static() {
            INVOKESTATIC
        } else if method.is_private() || method.name == "<init>" {
            INVOKESPECIAL
        } else if method.interface {
            INVOKEINTERFACE
        } else {
            INVOKEVIRTUAL
        };
        let invoke = Insn::Method {
            opcode,
            owner: method.owner.clone(),
            name: method.name.clone(),
            desc: method.desc.clone(),
            interface: method.interface,
        };
        if opcode == INVOKESTATIC {
            vec![invoke]
        } else {
            vec![Insn::Var { opcode: ALOAD, var: 0 }, invoke]
        }
    }

    /// Appends a read of `field` on `this` (or the static read).
    pub fn add_get_field(&mut self, field: &MemberRef) {
        self.add_all(Self::get_field_insns(field));
    }

    /// Prepends a read of `field` on `this` (or the static read).
    pub fn insert_get_field(&mut self, field: &MemberRef) {
        self.insert_all(Self::get_field_insns(field));
    }

    /// Appends a call of `method` on `this` (or the static call). Arguments
    /// must already be on the stack after the receiver.
    pub fn add_invoke(&mut self, method: &MemberRef) {
        self.add_all(Self::invoke_insns(method));
    }

    /// Prepends a call of `method` on `this` (or the static call).
    pub fn insert_invoke(&mut self, method: &MemberRef) {
        self.insert_all(Self::invoke_insns(method));
    }
}

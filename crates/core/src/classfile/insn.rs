//! Label-based instruction model.
//!
//! Branch targets, exception ranges, line numbers and local-variable scopes
//! refer to [`LabelId`]s placed in the list with [`Insn::Label`]; byte offsets
//! only exist while reading and writing. Every entry of an [`InsnList`] carries
//! a stable [`InsnId`] so callers can insert relative to an instruction they
//! looked at earlier even after the list has shifted.

use crate::opcode;
use std::fmt;

/// Identity of a label within one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

/// Stable identity of an instruction within one list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A `CONSTANT_MethodHandle` value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    /// Reference kind, see [`opcode::handle_kind`].
    pub kind: u8,
    pub owner: String,
    pub name: String,
    pub desc: String,
    /// Whether the owner is an interface (`InterfaceMethodref`).
    pub interface: bool,
}

/// A `CONSTANT_Dynamic` value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantDynamic {
    pub name: String,
    pub desc: String,
    pub bsm: Handle,
    pub args: Vec<Constant>,
}

/// A loadable constant, as used by `ldc`, `ConstantValue` and bootstrap
/// arguments. Floating point values keep their raw IEEE bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    String(String),
    /// Internal name, or array descriptor for array classes.
    Class(String),
    /// Method descriptor.
    MethodType(String),
    MethodHandle(Handle),
    Dynamic(Box<ConstantDynamic>),
}

impl Constant {
    /// Whether the value takes two stack slots (and `ldc2_w`).
    pub fn is_wide(&self) -> bool {
        match self {
            Self::Long(_) | Self::Double(_) => true,
            Self::Dynamic(dynamic) => matches!(dynamic.desc.as_str(), "J" | "D"),
            _ => false,
        }
    }
}

/// One entry of a stack map frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    /// Internal name, or array descriptor.
    Object(String),
    /// Result of the `new` instruction that follows this label.
    Uninitialized(LabelId),
}

/// An expanded stack map frame: full locals and stack at this point.
///
/// Long and double values take a single entry, as in the `StackMapTable`
/// attribute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

/// One instruction or pseudo-instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insn {
    Label(LabelId),
    LineNumber { line: u16, start: LabelId },
    Frame(Frame),
    /// Zero-operand instruction.
    Simple(u8),
    /// `bipush`, `sipush` and `newarray`.
    Int { opcode: u8, operand: i32 },
    /// Loads, stores and `ret`, always in long form.
    Var { opcode: u8, var: u16 },
    /// `new`, `anewarray`, `checkcast` and `instanceof`.
    Type { opcode: u8, class: String },
    Field {
        opcode: u8,
        owner: String,
        name: String,
        desc: String,
    },
    Method {
        opcode: u8,
        owner: String,
        name: String,
        desc: String,
        interface: bool,
    },
    InvokeDynamic {
        name: String,
        desc: String,
        bsm: Handle,
        args: Vec<Constant>,
    },
    Jump { opcode: u8, target: LabelId },
    Ldc(Constant),
    Iinc { var: u16, increment: i16 },
    TableSwitch {
        low: i32,
        high: i32,
        default: LabelId,
        targets: Vec<LabelId>,
    },
    LookupSwitch {
        default: LabelId,
        keys: Vec<i32>,
        targets: Vec<LabelId>,
    },
    MultiANewArray { desc: String, dims: u8 },
}

impl Insn {
    /// The opcode this instruction encodes to, `None` for pseudo-instructions.
    pub fn opcode(&self) -> Option<u8> {
        Some(match self {
            Self::Label(_) | Self::LineNumber { .. } | Self::Frame(_) => return None,
            Self::Simple(op)
            | Self::Int { opcode: op, .. }
            | Self::Var { opcode: op, .. }
            | Self::Type { opcode: op, .. }
            | Self::Field { opcode: op, .. }
            | Self::Method { opcode: op, .. }
            | Self::Jump { opcode: op, .. } => *op,
            Self::InvokeDynamic { .. } => opcode::INVOKEDYNAMIC,
            Self::Ldc(c) if c.is_wide() => opcode::LDC2_W,
            Self::Ldc(_) => opcode::LDC,
            Self::Iinc { .. } => opcode::IINC,
            Self::TableSwitch { .. } => opcode::TABLESWITCH,
            Self::LookupSwitch { .. } => opcode::LOOKUPSWITCH,
            Self::MultiANewArray { .. } => opcode::MULTIANEWARRAY,
        })
    }

    /// True for labels, line numbers and frames.
    pub const fn is_pseudo(&self) -> bool {
        matches!(self, Self::Label(_) | Self::LineNumber { .. } | Self::Frame(_))
    }

    /// Labels this instruction may transfer control to.
    pub fn branch_targets(&self) -> Vec<LabelId> {
        match self {
            Self::Jump { target, .. } => vec![*target],
            Self::TableSwitch {
                default, targets, ..
            }
            | Self::LookupSwitch {
                default, targets, ..
            } => {
                let mut all = Vec::with_capacity(targets.len() + 1);
                all.push(*default);
                all.extend(targets.iter().copied());
                all
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label(l) => write!(f, "{l}:"),
            Self::LineNumber { line, start } => write!(f, "line {line} {start}"),
            Self::Frame(frame) => write!(f, "frame {frame:?}"),
            Self::Simple(op) => f.write_str(opcode::mnemonic(*op)),
            Self::Int { opcode, operand } => write!(f, "{} {operand}", opcode::mnemonic(*opcode)),
            Self::Var { opcode, var } => write!(f, "{} {var}", opcode::mnemonic(*opcode)),
            Self::Type { opcode, class } => write!(f, "{} {class}", opcode::mnemonic(*opcode)),
            Self::Field {
                opcode,
                owner,
                name,
                desc,
            } => write!(f, "{} {owner}.{name}:{desc}", opcode::mnemonic(*opcode)),
            Self::Method {
                opcode,
                owner,
                name,
                desc,
                ..
            } => write!(f, "{} {owner}.{name}{desc}", opcode::mnemonic(*opcode)),
            Self::InvokeDynamic { name, desc, .. } => write!(f, "invokedynamic {name}{desc}"),
            Self::Jump { opcode, target } => write!(f, "{} {target}", opcode::mnemonic(*opcode)),
            Self::Ldc(c) => write!(f, "ldc {c:?}"),
            Self::Iinc { var, increment } => write!(f, "iinc {var} {increment}"),
            Self::TableSwitch { low, high, .. } => write!(f, "tableswitch {low}..={high}"),
            Self::LookupSwitch { keys, .. } => write!(f, "lookupswitch {} keys", keys.len()),
            Self::MultiANewArray { desc, dims } => write!(f, "multianewarray {desc} {dims}"),
        }
    }
}

/// Ordered instruction list with stable ids.
#[derive(Debug, Clone, Default)]
pub struct InsnList {
    entries: Vec<(InsnId, Insn)>,
    next_id: u32,
    next_label: u32,
}

impl PartialEq for InsnList {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|((_, a), (_, b))| a == b)
    }
}

impl Eq for InsnList {}

impl InsnList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh label id. The label still has to be placed.
    pub fn new_label(&mut self) -> LabelId {
        let label = LabelId(self.next_label);
        self.next_label += 1;
        label
    }

    fn wrap(&mut self, insn: Insn) -> (InsnId, Insn) {
        if let Insn::Label(label) = &insn {
            self.next_label = self.next_label.max(label.0 + 1);
        }
        let id = InsnId(self.next_id);
        self.next_id += 1;
        (id, insn)
    }

    /// Appends an instruction.
    pub fn push(&mut self, insn: Insn) -> InsnId {
        let entry = self.wrap(insn);
        let id = entry.0;
        self.entries.push(entry);
        id
    }

    /// Prepends an instruction.
    pub fn push_front(&mut self, insn: Insn) -> InsnId {
        self.insert_at(0, insn)
    }

    /// Inserts at a list index, clamped to the list length.
    pub fn insert_at(&mut self, index: usize, insn: Insn) -> InsnId {
        let entry = self.wrap(insn);
        let id = entry.0;
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
        id
    }

    /// Inserts directly before `anchor`. Returns `None` if `anchor` is gone.
    pub fn insert_before(&mut self, anchor: InsnId, insn: Insn) -> Option<InsnId> {
        let index = self.position(anchor)?;
        Some(self.insert_at(index, insn))
    }

    /// Inserts directly after `anchor`. Returns `None` if `anchor` is gone.
    pub fn insert_after(&mut self, anchor: InsnId, insn: Insn) -> Option<InsnId> {
        let index = self.position(anchor)?;
        Some(self.insert_at(index + 1, insn))
    }

    /// Removes an instruction, returning it.
    pub fn remove(&mut self, id: InsnId) -> Option<Insn> {
        let index = self.position(id)?;
        Some(self.entries.remove(index).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// List index of an instruction.
    pub fn position(&self, id: InsnId) -> Option<usize> {
        self.entries.iter().position(|(i, _)| *i == id)
    }

    pub fn get(&self, id: InsnId) -> Option<&Insn> {
        self.entries.iter().find(|(i, _)| *i == id).map(|(_, insn)| insn)
    }

    pub fn get_mut(&mut self, id: InsnId) -> Option<&mut Insn> {
        self.entries
            .iter_mut()
            .find(|(i, _)| *i == id)
            .map(|(_, insn)| insn)
    }

    /// Entry at a list index.
    pub fn at(&self, index: usize) -> Option<(InsnId, &Insn)> {
        self.entries.get(index).map(|(id, insn)| (*id, insn))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the current ids, in order.
    pub fn ids(&self) -> Vec<InsnId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InsnId, &Insn)> + '_ {
        self.entries.iter().map(|(id, insn)| (*id, insn))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (InsnId, &mut Insn)> + '_ {
        self.entries.iter_mut().map(|(id, insn)| (*id, insn))
    }

    /// Instructions only, in order.
    pub fn insns(&self) -> impl Iterator<Item = &Insn> + '_ {
        self.entries.iter().map(|(_, insn)| insn)
    }

    pub fn first(&self) -> Option<(InsnId, &Insn)> {
        self.at(0)
    }

    pub fn last(&self) -> Option<(InsnId, &Insn)> {
        self.entries.last().map(|(id, insn)| (*id, insn))
    }
}

impl FromIterator<Insn> for InsnList {
    fn from_iter<T: IntoIterator<Item = Insn>>(iter: T) -> Self {
        let mut list = Self::new();
        for insn in iter {
            list.push(insn);
        }
        list
    }
}

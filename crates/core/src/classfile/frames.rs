//! Data-flow analysis over a method body.
//!
//! The analyzer runs a worklist over instruction indices, merging the
//! abstract state at every control flow join. It produces the maximum stack
//! depth, the number of local slots used, and the entry state of every
//! reachable instruction, which is what the writer needs to recompute
//! `max_stack`/`max_locals` and to build `StackMapTable` frames from scratch.
//!
//! States are slot based: a `long` or `double` takes its own entry followed by
//! [`VerificationType::Top`], both in locals and on the stack.

use super::insn::{Constant, Frame, Insn, LabelId, VerificationType};
use super::node::MethodNode;
use super::reader::initial_frame_locals;
use crate::descriptor::{self, FieldType};
use crate::opcode::*;
use std::collections::{HashMap, VecDeque};

const OBJECT: &str = "java/lang/Object";
const THROWABLE: &str = "java/lang/Throwable";

/// Finds the nearest common superclass of two internal names.
///
/// Used when two reference types meet at a control flow join.
pub trait CommonSuper {
    fn common_super(&self, a: &str, b: &str) -> String;
}

/// Answers `java/lang/Object` for every distinct pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectFallback;

impl CommonSuper for ObjectFallback {
    fn common_super(&self, a: &str, b: &str) -> String {
        if a == b {
            a.to_string()
        } else {
            OBJECT.to_string()
        }
    }
}

/// Abstract state before an instruction executes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct State {
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

impl State {
    /// Converts to the `StackMapTable` representation, where two-slot values
    /// appear once and trailing `Top` locals are dropped.
    pub fn to_frame(&self) -> Frame {
        let mut locals = compact(&self.locals);
        while locals.last() == Some(&VerificationType::Top) {
            locals.pop();
        }
        Frame {
            locals,
            stack: compact(&self.stack),
        }
    }
}

fn compact(slots: &[VerificationType]) -> Vec<VerificationType> {
    let mut out = Vec::with_capacity(slots.len());
    let mut i = 0;
    while i < slots.len() {
        let slot = &slots[i];
        out.push(slot.clone());
        i += if is_wide(slot) { 2 } else { 1 };
    }
    out
}

fn expand(types: &[VerificationType]) -> Vec<VerificationType> {
    let mut out = Vec::with_capacity(types.len());
    for ty in types {
        out.push(ty.clone());
        if is_wide(ty) {
            out.push(VerificationType::Top);
        }
    }
    out
}

const fn is_wide(ty: &VerificationType) -> bool {
    matches!(ty, VerificationType::Long | VerificationType::Double)
}

/// Result of [`analyze`].
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Entry state per instruction index; `None` where unreachable.
    pub states: Vec<Option<State>>,
    pub max_stack: u16,
    pub max_locals: u16,
}

impl Analysis {
    /// Indices of real instructions no path reaches.
    pub fn unreachable(&self, method: &MethodNode) -> Vec<usize> {
        method
            .instructions
            .iter()
            .enumerate()
            .filter(|(i, (_, insn))| !insn.is_pseudo() && self.states[*i].is_none())
            .map(|(i, _)| i)
            .collect()
    }
}

/// Runs the analysis. `class_name` is the owner of `method`.
pub fn analyze(
    class_name: &str,
    method: &MethodNode,
    hierarchy: &dyn CommonSuper,
) -> Result<Analysis, String> {
    let insns: Vec<&Insn> = method.instructions.insns().collect();
    let mut label_index = HashMap::new();
    for (i, insn) in insns.iter().enumerate() {
        if let Insn::Label(label) = insn {
            label_index.insert(*label, i);
        }
    }
    let index_of = |label: &LabelId| {
        label_index
            .get(label)
            .copied()
            .ok_or_else(|| format!("label L{} is not placed", label.0))
    };

    let mut handlers = Vec::with_capacity(method.try_catch_blocks.len());
    for block in &method.try_catch_blocks {
        let catch = block.catch_type.clone().unwrap_or_else(|| THROWABLE.to_string());
        handlers.push((
            index_of(&block.start)?,
            index_of(&block.end)?,
            index_of(&block.handler)?,
            catch,
        ));
    }

    let mut interp = Interpreter {
        class_name,
        insns: &insns,
        new_sites: HashMap::new(),
        max_stack: 0,
        max_locals: 0,
    };

    let entry = State {
        locals: expand(&initial_frame_locals(class_name, method)),
        stack: Vec::new(),
    };
    interp.max_locals = entry.locals.len();
    let mut states: Vec<Option<State>> = vec![None; insns.len()];
    let mut queued = vec![false; insns.len()];
    let mut worklist = VecDeque::new();
    if !insns.is_empty() {
        states[0] = Some(entry);
        queued[0] = true;
        worklist.push_back(0);
    }

    while let Some(index) = worklist.pop_front() {
        queued[index] = false;
        let Some(before) = states[index].clone() else {
            continue;
        };
        let insn = insns[index];

        if !insn.is_pseudo() {
            for (start, end, handler, catch) in &handlers {
                if (*start..*end).contains(&index) {
                    let state = State {
                        locals: before.locals.clone(),
                        stack: vec![VerificationType::Object(catch.clone())],
                    };
                    interp.max_stack = interp.max_stack.max(1);
                    if merge_into(&mut states[*handler], &state, hierarchy)? && !queued[*handler] {
                        queued[*handler] = true;
                        worklist.push_back(*handler);
                    }
                }
            }
        }

        let mut after = before;
        interp
            .execute(index, insn, &mut after)
            .map_err(|msg| format!("{} at #{index}: {msg}", insn))?;

        let mut successors = Vec::new();
        for target in insn.branch_targets() {
            successors.push(index_of(&target)?);
        }
        let falls_through = match insn.opcode() {
            Some(op) => !is_terminal(op),
            None => true,
        };
        if falls_through {
            if index + 1 >= insns.len() {
                return Err("execution falls off the end of the code".to_string());
            }
            successors.push(index + 1);
        }
        for next in successors {
            if merge_into(&mut states[next], &after, hierarchy)? && !queued[next] {
                queued[next] = true;
                worklist.push_back(next);
            }
        }
    }

    Ok(Analysis {
        states,
        max_stack: u16::try_from(interp.max_stack).map_err(|_| "stack too deep".to_string())?,
        max_locals: u16::try_from(interp.max_locals).map_err(|_| "too many locals".to_string())?,
    })
}

/// Merges `incoming` into `slot`; returns whether `slot` changed.
fn merge_into(
    slot: &mut Option<State>,
    incoming: &State,
    hierarchy: &dyn CommonSuper,
) -> Result<bool, String> {
    if slot.is_none() {
        *slot = Some(incoming.clone());
        return Ok(true);
    }
    let Some(existing) = slot.as_mut() else {
        return Ok(false);
    };
    if existing.stack.len() != incoming.stack.len() {
        return Err(format!(
            "stack height mismatch at join: {} vs {}",
            existing.stack.len(),
            incoming.stack.len()
        ));
    }
    let mut changed = false;
    for (old, new) in existing.stack.iter_mut().zip(&incoming.stack) {
        let merged = merge_type(old, new, hierarchy);
        if merged != *old {
            *old = merged;
            changed = true;
        }
    }
    let len = existing.locals.len().max(incoming.locals.len());
    for i in 0..len {
        let new = incoming.locals.get(i).unwrap_or(&VerificationType::Top);
        if i >= existing.locals.len() {
            existing.locals.push(VerificationType::Top);
            changed = true;
            continue;
        }
        let merged = merge_type(&existing.locals[i], new, hierarchy);
        if merged != existing.locals[i] {
            existing.locals[i] = merged;
            changed = true;
        }
    }
    Ok(changed)
}

fn merge_type(
    a: &VerificationType,
    b: &VerificationType,
    hierarchy: &dyn CommonSuper,
) -> VerificationType {
    use VerificationType::*;
    match (a, b) {
        _ if a == b => a.clone(),
        (Null, Object(_)) => b.clone(),
        (Object(_), Null) => a.clone(),
        (Object(x), Object(y)) => {
            if x.starts_with('[') || y.starts_with('[') {
                Object(merge_arrays(x, y, hierarchy))
            } else {
                Object(hierarchy.common_super(x, y))
            }
        }
        _ => Top,
    }
}

fn merge_arrays(x: &str, y: &str, hierarchy: &dyn CommonSuper) -> String {
    let dims = |s: &str| s.bytes().take_while(|b| *b == b'[').count();
    let (dx, dy) = (dims(x), dims(y));
    if dx == dy && dx > 0 {
        if let (Some(ex), Some(ey)) = (
            descriptor::object_name(&x[dx..]),
            descriptor::object_name(&y[dy..]),
        ) {
            let common = hierarchy.common_super(ex, ey);
            return format!("{}L{common};", "[".repeat(dx));
        }
    }
    OBJECT.to_string()
}

struct Interpreter<'a> {
    class_name: &'a str,
    insns: &'a [&'a Insn],
    /// Class created at each allocation site seen so far.
    new_sites: HashMap<LabelId, String>,
    max_stack: usize,
    max_locals: usize,
}

fn value_of(ty: &FieldType) -> Option<VerificationType> {
    Some(match ty {
        FieldType::Boolean | FieldType::Byte | FieldType::Char | FieldType::Short | FieldType::Int => {
            VerificationType::Integer
        }
        FieldType::Float => VerificationType::Float,
        FieldType::Long => VerificationType::Long,
        FieldType::Double => VerificationType::Double,
        FieldType::Object(name) => VerificationType::Object(name.clone()),
        FieldType::Array(desc) => VerificationType::Object(desc.clone()),
        FieldType::Void => return None,
    })
}

fn value_of_desc(desc: &str) -> Result<Option<VerificationType>, String> {
    match descriptor::parse_field_type(desc) {
        Some((ty, "")) => Ok(value_of(&ty)),
        _ => Err(format!("bad descriptor {desc}")),
    }
}

/// Array class for an element internal name or descriptor.
fn array_of(class: &str) -> String {
    if class.starts_with('[') {
        format!("[{class}")
    } else {
        format!("[L{class};")
    }
}

impl Interpreter<'_> {
    fn push(&mut self, state: &mut State, ty: VerificationType) {
        let wide = is_wide(&ty);
        state.stack.push(ty);
        if wide {
            state.stack.push(VerificationType::Top);
        }
        self.max_stack = self.max_stack.max(state.stack.len());
    }

    fn pop(&self, state: &mut State, slots: usize) -> Result<Vec<VerificationType>, String> {
        if state.stack.len() < slots {
            return Err("operand stack underflow".to_string());
        }
        Ok(state.stack.split_off(state.stack.len() - slots))
    }

    fn pop_value(&self, state: &mut State) -> Result<VerificationType, String> {
        Ok(self.pop(state, 1)?.remove(0))
    }

    fn pop_args(&self, state: &mut State, desc: &str) -> Result<(), String> {
        let slots = descriptor::argument_slots(desc);
        self.pop(state, slots).map(|_| ())
    }

    fn push_return(&mut self, state: &mut State, desc: &str) -> Result<(), String> {
        let ret = descriptor::return_type(desc);
        if let Some(value) = value_of_desc(ret)? {
            self.push(state, value);
        }
        Ok(())
    }

    fn store(&mut self, state: &mut State, var: u16, ty: VerificationType) {
        let var = var as usize;
        let width = if is_wide(&ty) { 2 } else { 1 };
        if state.locals.len() < var + width {
            state.locals.resize(var + width, VerificationType::Top);
        }
        if var > 0 && is_wide(&state.locals[var - 1]) {
            state.locals[var - 1] = VerificationType::Top;
        }
        if is_wide(&state.locals[var]) && width == 1 && var + 1 < state.locals.len() {
            state.locals[var + 1] = VerificationType::Top;
        }
        state.locals[var] = ty;
        if width == 2 {
            state.locals[var + 1] = VerificationType::Top;
        }
        self.max_locals = self.max_locals.max(var + width);
    }

    /// Names the allocation site of the `new` at `index`: the label directly
    /// in front of it, or a synthetic id when there is none.
    fn new_site(&self, index: usize) -> LabelId {
        self.insns[..index]
            .iter()
            .rev()
            .take_while(|insn| insn.is_pseudo())
            .find_map(|insn| match insn {
                Insn::Label(label) => Some(*label),
                _ => None,
            })
            .unwrap_or(LabelId(u32::MAX - index as u32))
    }

    fn execute(&mut self, index: usize, insn: &Insn, state: &mut State) -> Result<(), String> {
        use VerificationType as V;
        match insn {
            Insn::Label(_) | Insn::LineNumber { .. } | Insn::Frame(_) => {}
            Insn::Simple(op) => self.simple(*op, state)?,
            Insn::Int { opcode, operand } => {
                if *opcode == NEWARRAY {
                    self.pop(state, 1)?;
                    let elem = match *operand {
                        array_type::T_BOOLEAN => 'Z',
                        array_type::T_CHAR => 'C',
                        array_type::T_FLOAT => 'F',
                        array_type::T_DOUBLE => 'D',
                        array_type::T_BYTE => 'B',
                        array_type::T_SHORT => 'S',
                        array_type::T_INT => 'I',
                        array_type::T_LONG => 'J',
                        other => return Err(format!("bad newarray type {other}")),
                    };
                    self.push(state, V::Object(format!("[{elem}")));
                } else {
                    self.push(state, V::Integer);
                }
            }
            Insn::Var { opcode, var } => {
                let var_usize = *var as usize;
                match *opcode {
                    ILOAD => self.push(state, V::Integer),
                    LLOAD => self.push(state, V::Long),
                    FLOAD => self.push(state, V::Float),
                    DLOAD => self.push(state, V::Double),
                    ALOAD => {
                        let value = state
                            .locals
                            .get(var_usize)
                            .cloned()
                            .ok_or_else(|| format!("load of unset local {var}"))?;
                        self.push(state, value);
                    }
                    ISTORE | FSTORE | ASTORE => {
                        let value = self.pop_value(state)?;
                        self.store(state, *var, value);
                    }
                    LSTORE | DSTORE => {
                        let value = self.pop(state, 2)?.remove(0);
                        self.store(state, *var, value);
                    }
                    RET => return Err("jsr/ret subroutines are not supported".to_string()),
                    other => return Err(format!("bad local variable opcode {other}")),
                }
                let width = if matches!(*opcode, LLOAD | DLOAD | LSTORE | DSTORE) { 2 } else { 1 };
                self.max_locals = self.max_locals.max(var_usize + width);
            }
            Insn::Type { opcode, class } => match *opcode {
                NEW => {
                    let site = self.new_site(index);
                    self.new_sites.insert(site, class.clone());
                    self.push(state, V::Uninitialized(site));
                }
                ANEWARRAY => {
                    self.pop(state, 1)?;
                    self.push(state, V::Object(array_of(class)));
                }
                CHECKCAST => {
                    self.pop(state, 1)?;
                    self.push(state, V::Object(class.clone()));
                }
                INSTANCEOF => {
                    self.pop(state, 1)?;
                    self.push(state, V::Integer);
                }
                other => return Err(format!("bad type opcode {other}")),
            },
            Insn::Field {
                opcode, desc, ..
            } => {
                let size = value_of_desc(desc)?.map_or(0, |v| if is_wide(&v) { 2 } else { 1 });
                match *opcode {
                    GETSTATIC => {}
                    PUTSTATIC => {
                        self.pop(state, size)?;
                    }
                    GETFIELD => {
                        self.pop(state, 1)?;
                    }
                    _ => {
                        self.pop(state, size + 1)?;
                    }
                }
                if matches!(*opcode, GETSTATIC | GETFIELD) {
                    if let Some(value) = value_of_desc(desc)? {
                        self.push(state, value);
                    }
                }
            }
            Insn::Method {
                opcode,
                owner,
                name,
                desc,
                ..
            } => {
                self.pop_args(state, desc)?;
                if *opcode != INVOKESTATIC {
                    let receiver = self.pop_value(state)?;
                    if *opcode == INVOKESPECIAL && name == "<init>" {
                        let initialized = match &receiver {
                            V::UninitializedThis => V::Object(self.class_name.to_string()),
                            V::Uninitialized(label) => V::Object(
                                self.new_sites
                                    .get(label)
                                    .cloned()
                                    .ok_or_else(|| format!("no allocation site {label}"))?,
                            ),
                            _ => V::Object(owner.clone()),
                        };
                        for slot in state.locals.iter_mut().chain(state.stack.iter_mut()) {
                            if *slot == receiver {
                                *slot = initialized.clone();
                            }
                        }
                    }
                }
                self.push_return(state, desc)?;
            }
            Insn::InvokeDynamic { desc, .. } => {
                self.pop_args(state, desc)?;
                self.push_return(state, desc)?;
            }
            Insn::Jump { opcode, .. } => match *opcode {
                IFEQ..=IFLE | IFNULL | IFNONNULL => {
                    self.pop(state, 1)?;
                }
                IF_ICMPEQ..=IF_ACMPNE => {
                    self.pop(state, 2)?;
                }
                GOTO | GOTO_W => {}
                _ => return Err("jsr/ret subroutines are not supported".to_string()),
            },
            Insn::Ldc(constant) => {
                let value = match constant {
                    Constant::Integer(_) => V::Integer,
                    Constant::Float(_) => V::Float,
                    Constant::Long(_) => V::Long,
                    Constant::Double(_) => V::Double,
                    Constant::String(_) => V::Object("java/lang/String".to_string()),
                    Constant::Class(_) => V::Object("java/lang/Class".to_string()),
                    Constant::MethodType(_) => V::Object("java/lang/invoke/MethodType".to_string()),
                    Constant::MethodHandle(_) => {
                        V::Object("java/lang/invoke/MethodHandle".to_string())
                    }
                    Constant::Dynamic(dynamic) => value_of_desc(&dynamic.desc)?
                        .ok_or_else(|| "dynamic constant of type void".to_string())?,
                };
                self.push(state, value);
            }
            Insn::Iinc { var, .. } => {
                self.max_locals = self.max_locals.max(*var as usize + 1);
            }
            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => {
                self.pop(state, 1)?;
            }
            Insn::MultiANewArray { desc, dims } => {
                self.pop(state, *dims as usize)?;
                self.push(state, V::Object(desc.clone()));
            }
        }
        Ok(())
    }

    fn simple(&mut self, op: u8, state: &mut State) -> Result<(), String> {
        use VerificationType as V;
        match op {
            NOP => {}
            ACONST_NULL => self.push(state, V::Null),
            ICONST_M1..=ICONST_5 => self.push(state, V::Integer),
            LCONST_0 | LCONST_1 => self.push(state, V::Long),
            FCONST_0..=FCONST_2 => self.push(state, V::Float),
            DCONST_0 | DCONST_1 => self.push(state, V::Double),
            IALOAD | BALOAD | CALOAD | SALOAD => self.binary(state, 2, V::Integer)?,
            LALOAD => self.binary(state, 2, V::Long)?,
            FALOAD => self.binary(state, 2, V::Float)?,
            DALOAD => self.binary(state, 2, V::Double)?,
            AALOAD => {
                let popped = self.pop(state, 2)?;
                let element = match &popped[0] {
                    V::Object(array) if array.starts_with("[[") => V::Object(array[1..].to_string()),
                    V::Object(array) => descriptor::object_name(&array[1..])
                        .map_or(V::Object(OBJECT.to_string()), |name| V::Object(name.to_string())),
                    _ => V::Null,
                };
                self.push(state, element);
            }
            IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => {
                self.pop(state, 3)?;
            }
            LASTORE | DASTORE => {
                self.pop(state, 4)?;
            }
            POP => {
                self.pop(state, 1)?;
            }
            POP2 => {
                self.pop(state, 2)?;
            }
            DUP | DUP_X1 | DUP_X2 | DUP2 | DUP2_X1 | DUP2_X2 | SWAP => {
                let (taken, order): (usize, &[usize]) = match op {
                    DUP => (1, &[0, 0][..]),
                    DUP_X1 => (2, &[1, 0, 1][..]),
                    DUP_X2 => (3, &[2, 0, 1, 2][..]),
                    DUP2 => (2, &[0, 1, 0, 1][..]),
                    DUP2_X1 => (3, &[1, 2, 0, 1, 2][..]),
                    DUP2_X2 => (4, &[2, 3, 0, 1, 2, 3][..]),
                    _ => (2, &[1, 0][..]),
                };
                let values = self.pop(state, taken)?;
                for i in order {
                    state.stack.push(values[*i].clone());
                }
                self.max_stack = self.max_stack.max(state.stack.len());
            }
            IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR => {
                self.binary(state, 2, V::Integer)?;
            }
            LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR => self.binary(state, 4, V::Long)?,
            LSHL | LSHR | LUSHR => self.binary(state, 3, V::Long)?,
            FADD | FSUB | FMUL | FDIV | FREM => self.binary(state, 2, V::Float)?,
            DADD | DSUB | DMUL | DDIV | DREM => self.binary(state, 4, V::Double)?,
            INEG | I2B | I2C | I2S | F2I => self.binary(state, 1, V::Integer)?,
            LNEG | L2D => self.binary(state, 2, if op == LNEG { V::Long } else { V::Double })?,
            FNEG | I2F => self.binary(state, 1, V::Float)?,
            DNEG | D2L => self.binary(state, 2, if op == DNEG { V::Double } else { V::Long })?,
            I2L | F2L => self.binary(state, 1, V::Long)?,
            I2D | F2D => self.binary(state, 1, V::Double)?,
            L2I | D2I => self.binary(state, 2, V::Integer)?,
            L2F | D2F => self.binary(state, 2, V::Float)?,
            LCMP | DCMPL | DCMPG => self.binary(state, 4, V::Integer)?,
            FCMPL | FCMPG => self.binary(state, 2, V::Integer)?,
            IRETURN | FRETURN | ARETURN | ATHROW | MONITORENTER | MONITOREXIT => {
                self.pop(state, 1)?;
            }
            LRETURN | DRETURN => {
                self.pop(state, 2)?;
            }
            RETURN => {}
            ARRAYLENGTH => self.binary(state, 1, V::Integer)?,
            other => return Err(format!("unexpected opcode {}", mnemonic(other))),
        }
        Ok(())
    }

    /// Pops `slots` stack slots and pushes one `result`.
    fn binary(&mut self, state: &mut State, slots: usize, result: VerificationType) -> Result<(), String> {
        self.pop(state, slots)?;
        self.push(state, result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ACC_PUBLIC, ACC_STATIC};
    use crate::classfile::node::TryCatchBlock;

    fn method(access: u16, desc: &str) -> MethodNode {
        MethodNode::new(access, "run", desc)
    }

    #[test]
    fn computes_maxs_for_straight_line_code() {
        let mut m = method(ACC_PUBLIC | ACC_STATIC, "(JI)J");
        m.instructions.push(Insn::Var { opcode: LLOAD, var: 0 });
        m.instructions.push(Insn::Var { opcode: ILOAD, var: 2 });
        m.instructions.push(Insn::Simple(I2L));
        m.instructions.push(Insn::Simple(LADD));
        m.instructions.push(Insn::Simple(LRETURN));

        let analysis = analyze("a/B", &m, &ObjectFallback).unwrap();
        assert_eq!(analysis.max_stack, 4);
        assert_eq!(analysis.max_locals, 3);
    }

    #[test]
    fn merges_branches_to_common_super() {
        struct Fixed;
        impl CommonSuper for Fixed {
            fn common_super(&self, _a: &str, _b: &str) -> String {
                "a/Base".to_string()
            }
        }

        let mut m = method(ACC_PUBLIC | ACC_STATIC, "(I)La/Base;");
        let other = m.instructions.new_label();
        let join = m.instructions.new_label();
        m.instructions.push(Insn::Var { opcode: ILOAD, var: 0 });
        m.instructions.push(Insn::Jump { opcode: IFEQ, target: other });
        m.instructions.push(Insn::Type { opcode: NEW, class: "a/Left".into() });
        m.instructions.push(Insn::Jump { opcode: GOTO, target: join });
        m.instructions.push(Insn::Label(other));
        m.instructions.push(Insn::Simple(ACONST_NULL));
        m.instructions.push(Insn::Type { opcode: CHECKCAST, class: "a/Right".into() });
        m.instructions.push(Insn::Label(join));
        m.instructions.push(Insn::Simple(ARETURN));

        let site = m.instructions.new_label();
        m.instructions.insert_at(2, Insn::Label(site));
        let analysis = analyze("a/B", &m, &Fixed).unwrap();
        let join_index = m
            .instructions
            .insns()
            .position(|i| *i == Insn::Label(join))
            .unwrap();
        let state = analysis.states[join_index].as_ref().unwrap();
        assert_eq!(state.stack, vec![VerificationType::Top]);

        let mut m2 = method(ACC_PUBLIC | ACC_STATIC, "(I)La/Base;");
        let other = m2.instructions.new_label();
        let join = m2.instructions.new_label();
        m2.instructions.push(Insn::Var { opcode: ILOAD, var: 0 });
        m2.instructions.push(Insn::Jump { opcode: IFEQ, target: other });
        m2.instructions.push(Insn::Simple(ACONST_NULL));
        m2.instructions.push(Insn::Type { opcode: CHECKCAST, class: "a/Left".into() });
        m2.instructions.push(Insn::Jump { opcode: GOTO, target: join });
        m2.instructions.push(Insn::Label(other));
        m2.instructions.push(Insn::Simple(ACONST_NULL));
        m2.instructions.push(Insn::Type { opcode: CHECKCAST, class: "a/Right".into() });
        m2.instructions.push(Insn::Label(join));
        m2.instructions.push(Insn::Simple(ARETURN));
        let analysis = analyze("a/B", &m2, &Fixed).unwrap();
        let state = analysis.states[8].as_ref().unwrap();
        assert_eq!(state.stack, vec![VerificationType::Object("a/Base".into())]);
        assert_eq!(
            state.to_frame().locals,
            vec![VerificationType::Integer]
        );
    }

    #[test]
    fn constructor_receiver_becomes_initialized() {
        let mut m = MethodNode::new(ACC_PUBLIC, "<init>", "()V");
        m.instructions.push(Insn::Var { opcode: ALOAD, var: 0 });
        m.instructions.push(Insn::Method {
            opcode: INVOKESPECIAL,
            owner: "java/lang/Object".into(),
            name: "<init>".into(),
            desc: "()V".into(),
            interface: false,
        });
        let end = m.instructions.new_label();
        m.instructions.push(Insn::Label(end));
        m.instructions.push(Insn::Simple(RETURN));

        let analysis = analyze("a/B", &m, &ObjectFallback).unwrap();
        assert_eq!(
            analysis.states[0].as_ref().unwrap().locals,
            vec![VerificationType::UninitializedThis]
        );
        assert_eq!(
            analysis.states[2].as_ref().unwrap().locals,
            vec![VerificationType::Object("a/B".into())]
        );
    }

    #[test]
    fn handler_sees_catch_type_and_unreachable_code_is_reported() {
        let mut m = method(ACC_PUBLIC | ACC_STATIC, "()V");
        let start = m.instructions.new_label();
        let end = m.instructions.new_label();
        let handler = m.instructions.new_label();
        m.instructions.push(Insn::Label(start));
        m.instructions.push(Insn::Simple(NOP));
        m.instructions.push(Insn::Label(end));
        m.instructions.push(Insn::Simple(RETURN));
        m.instructions.push(Insn::Simple(NOP));
        m.instructions.push(Insn::Label(handler));
        m.instructions.push(Insn::Simple(ATHROW));
        m.try_catch_blocks.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: Some("java/io/IOException".into()),
        });

        let analysis = analyze("a/B", &m, &ObjectFallback).unwrap();
        assert_eq!(
            analysis.states[5].as_ref().unwrap().stack,
            vec![VerificationType::Object("java/io/IOException".into())]
        );
        assert_eq!(analysis.unreachable(&m), vec![4]);
    }

    #[test]
    fn frames_collapse_wide_values() {
        let state = State {
            locals: vec![
                VerificationType::Long,
                VerificationType::Top,
                VerificationType::Integer,
                VerificationType::Top,
            ],
            stack: vec![VerificationType::Double, VerificationType::Top],
        };
        let frame = state.to_frame();
        assert_eq!(frame.locals, vec![VerificationType::Long, VerificationType::Integer]);
        assert_eq!(frame.stack, vec![VerificationType::Double]);
    }
}

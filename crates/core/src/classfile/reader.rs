//! Class file decoder producing a [`ClassNode`].

use super::bytes::ByteReader;
use super::constant_pool::{BootstrapEntry, ConstantPool, PoolEntry};
use super::insn::{Frame, Insn, InsnList, LabelId, VerificationType};
use super::node::{
    AnnotationNode, ClassNode, ElementValue, FieldNode, InnerClassNode, LocalVariableNode,
    MethodNode, ParameterNode, RawAttribute, SourcePool, TryCatchBlock,
};
use crate::access::ACC_STATIC;
use crate::descriptor::{self, FieldType};
use crate::opcode::*;
use jarsmith_utils::errors::ClassFormatError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

const MAGIC: u32 = 0xCAFE_BABE;

/// An attribute whose payload has not been decoded yet.
struct PendingAttribute<'a> {
    name: String,
    data: &'a [u8],
}

struct PendingMember<'a> {
    access: u16,
    name: String,
    desc: String,
    attributes: Vec<PendingAttribute<'a>>,
}

/// Decodes one class file.
///
/// Short-form loads and stores are expanded, `StackMapTable` frames are
/// expanded into [`Insn::Frame`] entries and every byte offset is replaced by
/// a label. The source constant pool is kept on the node so attributes this
/// reader does not decode can be written back verbatim.
pub fn read_class(bytes: &[u8]) -> Result<ClassNode, ClassFormatError> {
    let mut r = ByteReader::new(bytes);
    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(ClassFormatError::BadMagic(magic));
    }
    let minor_version = r.u16()?;
    let major_version = r.u16()?;
    let mut pool = ConstantPool::parse(&mut r)?;

    let access = r.u16()?;
    let name = pool.class_name(r.u16()?)?.to_string();
    let super_name = pool.opt_class_name(r.u16()?)?;
    let interface_count = r.u16()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interfaces.push(pool.class_name(r.u16()?)?.to_string());
    }

    let fields = pending_members(&mut r, &pool)?;
    let methods = pending_members(&mut r, &pool)?;
    let class_attributes = pending_attributes(&mut r, &pool)?;
    if r.remaining() != 0 {
        tracing::debug!("{} trailing bytes after class {name}", r.remaining());
    }

    if let Some(attr) = class_attributes
        .iter()
        .find(|a| a.name == "BootstrapMethods")
    {
        pool.set_bootstrap(bootstrap_table(attr.data)?);
    }
    let pool = Arc::new(pool);

    let mut class = ClassNode {
        minor_version,
        major_version,
        access,
        name,
        super_name,
        interfaces,
        constant_pool: Some(SourcePool(Arc::clone(&pool))),
        ..ClassNode::default()
    };

    for attr in class_attributes {
        let mut ar = ByteReader::new(attr.data);
        match attr.name.as_str() {
            "SourceFile" => class.source_file = Some(pool.utf8(ar.u16()?)?.to_string()),
            "Signature" => class.signature = Some(pool.utf8(ar.u16()?)?.to_string()),
            "InnerClasses" => {
                let count = ar.u16()?;
                for _ in 0..count {
                    let name = pool.class_name(ar.u16()?)?.to_string();
                    let outer_name = pool.opt_class_name(ar.u16()?)?;
                    let inner_name = pool.opt_utf8(ar.u16()?)?;
                    let access = ar.u16()?;
                    class.inner_classes.push(InnerClassNode {
                        name,
                        outer_name,
                        inner_name,
                        access,
                    });
                }
            }
            "EnclosingMethod" => {
                class.outer_class = Some(pool.class_name(ar.u16()?)?.to_string());
                let method = ar.u16()?;
                if method != 0 {
                    let (name, desc) = pool.name_and_type(method)?;
                    class.outer_method = Some(name.to_string());
                    class.outer_method_desc = Some(desc.to_string());
                }
            }
            "NestHost" => class.nest_host = Some(pool.class_name(ar.u16()?)?.to_string()),
            "NestMembers" => class.nest_members = class_list(&mut ar, &pool)?,
            "PermittedSubclasses" => class.permitted_subclasses = class_list(&mut ar, &pool)?,
            "RuntimeVisibleAnnotations" => {
                class.visible_annotations = annotations(&mut ar, &pool)?;
            }
            "RuntimeInvisibleAnnotations" => {
                class.invisible_annotations = annotations(&mut ar, &pool)?;
            }
            "BootstrapMethods" => {}
            _ => class.attributes.push(raw(attr)),
        }
    }

    for field in fields {
        class.fields.push(read_field(field, &pool)?);
    }
    let ctx = MethodContext {
        class_name: &class.name,
        pool: &pool,
    };
    for method in methods {
        class.methods.push(read_method(method, &ctx)?);
    }
    Ok(class)
}

fn raw(attr: PendingAttribute<'_>) -> RawAttribute {
    RawAttribute {
        name: attr.name,
        data: attr.data.to_vec(),
    }
}

fn pending_attributes<'a>(
    r: &mut ByteReader<'a>,
    pool: &ConstantPool,
) -> Result<Vec<PendingAttribute<'a>>, ClassFormatError> {
    let count = r.u16()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = pool.utf8(r.u16()?)?.to_string();
        let len = r.u32()? as usize;
        out.push(PendingAttribute {
            name,
            data: r.bytes(len)?,
        });
    }
    Ok(out)
}

fn pending_members<'a>(
    r: &mut ByteReader<'a>,
    pool: &ConstantPool,
) -> Result<Vec<PendingMember<'a>>, ClassFormatError> {
    let count = r.u16()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access = r.u16()?;
        let name = pool.utf8(r.u16()?)?.to_string();
        let desc = pool.utf8(r.u16()?)?.to_string();
        let attributes = pending_attributes(r, pool)?;
        out.push(PendingMember {
            access,
            name,
            desc,
            attributes,
        });
    }
    Ok(out)
}

fn bootstrap_table(data: &[u8]) -> Result<Vec<BootstrapEntry>, ClassFormatError> {
    let mut r = ByteReader::new(data);
    let count = r.u16()?;
    let mut table = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let handle = r.u16()?;
        let argc = r.u16()?;
        let mut args = Vec::with_capacity(argc as usize);
        for _ in 0..argc {
            args.push(r.u16()?);
        }
        table.push((handle, args));
    }
    Ok(table)
}

fn class_list(r: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<Vec<String>, ClassFormatError> {
    let count = r.u16()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(pool.class_name(r.u16()?)?.to_string());
    }
    Ok(out)
}

fn annotations(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<AnnotationNode>, ClassFormatError> {
    let count = r.u16()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(annotation(r, pool)?);
    }
    Ok(out)
}

fn parameter_annotations(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<Vec<AnnotationNode>>, ClassFormatError> {
    let count = r.u8()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(annotations(r, pool)?);
    }
    Ok(out)
}

fn annotation(r: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<AnnotationNode, ClassFormatError> {
    let mut node = AnnotationNode::new(pool.utf8(r.u16()?)?);
    let pairs = r.u16()?;
    for _ in 0..pairs {
        let key = pool.utf8(r.u16()?)?.to_string();
        let value = element_value(r, pool)?;
        node.values.insert(key, value);
    }
    Ok(node)
}

fn element_value(r: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<ElementValue, ClassFormatError> {
    let tag = r.u8()?;
    let int_at = |index: u16| match pool.entry(index) {
        Some(PoolEntry::Integer(v)) => Ok(*v),
        _ => Err(ClassFormatError::InvalidConstant {
            index,
            expected: "Integer",
        }),
    };
    Ok(match tag {
        b'B' => ElementValue::Byte(int_at(r.u16()?)? as i8),
        b'C' => ElementValue::Char(int_at(r.u16()?)? as u16),
        b'S' => ElementValue::Short(int_at(r.u16()?)? as i16),
        b'Z' => ElementValue::Boolean(int_at(r.u16()?)? != 0),
        b'I' => ElementValue::Int(int_at(r.u16()?)?),
        b'J' => {
            let index = r.u16()?;
            match pool.entry(index) {
                Some(PoolEntry::Long(v)) => ElementValue::Long(*v),
                _ => {
                    return Err(ClassFormatError::InvalidConstant {
                        index,
                        expected: "Long",
                    });
                }
            }
        }
        b'F' => {
            let index = r.u16()?;
            match pool.entry(index) {
                Some(PoolEntry::Float(bits)) => ElementValue::Float(*bits),
                _ => {
                    return Err(ClassFormatError::InvalidConstant {
                        index,
                        expected: "Float",
                    });
                }
            }
        }
        b'D' => {
            let index = r.u16()?;
            match pool.entry(index) {
                Some(PoolEntry::Double(bits)) => ElementValue::Double(*bits),
                _ => {
                    return Err(ClassFormatError::InvalidConstant {
                        index,
                        expected: "Double",
                    });
                }
            }
        }
        b's' => ElementValue::String(pool.utf8(r.u16()?)?.to_string()),
        b'e' => ElementValue::Enum {
            desc: pool.utf8(r.u16()?)?.to_string(),
            name: pool.utf8(r.u16()?)?.to_string(),
        },
        b'c' => ElementValue::Class(pool.utf8(r.u16()?)?.to_string()),
        b'@' => ElementValue::Annotation(annotation(r, pool)?),
        b'[' => {
            let count = r.u16()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(element_value(r, pool)?);
            }
            ElementValue::Array(values)
        }
        other => {
            return Err(ClassFormatError::Malformed {
                what: "element value",
                msg: format!("unknown tag {:?}", other as char),
            });
        }
    })
}

fn read_field(member: PendingMember<'_>, pool: &ConstantPool) -> Result<FieldNode, ClassFormatError> {
    let mut field = FieldNode::new(member.access, member.name, member.desc);
    for attr in member.attributes {
        let mut ar = ByteReader::new(attr.data);
        match attr.name.as_str() {
            "ConstantValue" => field.value = Some(pool.constant(ar.u16()?, pool.bootstrap())?),
            "Signature" => field.signature = Some(pool.utf8(ar.u16()?)?.to_string()),
            "RuntimeVisibleAnnotations" => field.visible_annotations = annotations(&mut ar, pool)?,
            "RuntimeInvisibleAnnotations" => {
                field.invisible_annotations = annotations(&mut ar, pool)?;
            }
            _ => field.attributes.push(raw(attr)),
        }
    }
    Ok(field)
}

struct MethodContext<'a> {
    class_name: &'a str,
    pool: &'a ConstantPool,
}

fn read_method(member: PendingMember<'_>, ctx: &MethodContext<'_>) -> Result<MethodNode, ClassFormatError> {
    let pool = ctx.pool;
    let mut method = MethodNode::new(member.access, member.name, member.desc);
    let mut code = None;
    for attr in member.attributes {
        let mut ar = ByteReader::new(attr.data);
        match attr.name.as_str() {
            "Code" => code = Some(attr.data),
            "Exceptions" => method.exceptions = class_list(&mut ar, pool)?,
            "Signature" => method.signature = Some(pool.utf8(ar.u16()?)?.to_string()),
            "RuntimeVisibleAnnotations" => method.visible_annotations = annotations(&mut ar, pool)?,
            "RuntimeInvisibleAnnotations" => {
                method.invisible_annotations = annotations(&mut ar, pool)?;
            }
            "RuntimeVisibleParameterAnnotations" => {
                method.visible_parameter_annotations = Some(parameter_annotations(&mut ar, pool)?);
            }
            "RuntimeInvisibleParameterAnnotations" => {
                method.invisible_parameter_annotations =
                    Some(parameter_annotations(&mut ar, pool)?);
            }
            "AnnotationDefault" => method.annotation_default = Some(element_value(&mut ar, pool)?),
            "MethodParameters" => {
                let count = ar.u8()?;
                for _ in 0..count {
                    let name = pool.opt_utf8(ar.u16()?)?;
                    let access = ar.u16()?;
                    method.parameters.push(ParameterNode { name, access });
                }
            }
            _ => method.attributes.push(raw(attr)),
        }
    }
    if let Some(data) = code {
        read_code(data, ctx, &mut method)?;
    }
    Ok(method)
}

/// Offset-to-label allocation while decoding one code attribute.
struct Labels {
    by_offset: BTreeMap<u32, LabelId>,
    code_len: u32,
}

impl Labels {
    fn at(&mut self, list: &mut InsnList, offset: i64) -> Result<LabelId, ClassFormatError> {
        if offset < 0 || offset > i64::from(self.code_len) {
            return Err(ClassFormatError::Malformed {
                what: "code",
                msg: format!("offset {offset} outside code of length {}", self.code_len),
            });
        }
        let offset = offset as u32;
        Ok(*self
            .by_offset
            .entry(offset)
            .or_insert_with(|| list.new_label()))
    }
}

fn read_code(data: &[u8], ctx: &MethodContext<'_>, method: &mut MethodNode) -> Result<(), ClassFormatError> {
    let pool = ctx.pool;
    let mut r = ByteReader::new(data);
    method.max_stack = r.u16()?;
    method.max_locals = r.u16()?;
    let code_len = r.u32()?;
    let code = r.bytes(code_len as usize)?;

    let mut list = InsnList::new();
    let mut labels = Labels {
        by_offset: BTreeMap::new(),
        code_len,
    };
    let decoded = decode_instructions(code, pool, &mut list, &mut labels)?;
    let boundaries: HashSet<u32> = decoded
        .iter()
        .map(|(offset, _)| *offset)
        .chain(std::iter::once(code_len))
        .collect();

    let handler_count = r.u16()?;
    for _ in 0..handler_count {
        let start = labels.at(&mut list, i64::from(r.u16()?))?;
        let end = labels.at(&mut list, i64::from(r.u16()?))?;
        let handler = labels.at(&mut list, i64::from(r.u16()?))?;
        let catch_type = pool.opt_class_name(r.u16()?)?;
        method.try_catch_blocks.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type,
        });
    }

    let mut lines: BTreeMap<u32, Vec<u16>> = BTreeMap::new();
    let mut frames: BTreeMap<u32, Frame> = BTreeMap::new();
    let mut signatures: HashMap<(u16, u16, u16), String> = HashMap::new();
    let mut locals = Vec::new();
    for attr in pending_attributes(&mut r, pool)? {
        let mut ar = ByteReader::new(attr.data);
        match attr.name.as_str() {
            "LineNumberTable" => {
                let count = ar.u16()?;
                for _ in 0..count {
                    let start = u32::from(ar.u16()?);
                    let line = ar.u16()?;
                    if start == code_len || !boundaries.contains(&start) {
                        continue;
                    }
                    labels.at(&mut list, i64::from(start))?;
                    lines.entry(start).or_default().push(line);
                }
            }
            "LocalVariableTable" => {
                let count = ar.u16()?;
                for _ in 0..count {
                    let start = ar.u16()?;
                    let length = ar.u16()?;
                    let name = pool.utf8(ar.u16()?)?.to_string();
                    let desc = pool.utf8(ar.u16()?)?.to_string();
                    let index = ar.u16()?;
                    locals.push((start, length, name, desc, index));
                }
            }
            "LocalVariableTypeTable" => {
                let count = ar.u16()?;
                for _ in 0..count {
                    let start = ar.u16()?;
                    let length = ar.u16()?;
                    ar.u16()?;
                    let signature = pool.utf8(ar.u16()?)?.to_string();
                    let index = ar.u16()?;
                    signatures.insert((start, length, index), signature);
                }
            }
            "StackMapTable" => {
                frames = read_frames(attr.data, ctx, method, &mut list, &mut labels)?;
            }
            _ => method.code_attributes.push(raw(attr)),
        }
    }

    for (start, length, name, desc, index) in locals {
        let end = u32::from(start) + u32::from(length);
        if !boundaries.contains(&u32::from(start)) || !boundaries.contains(&end) {
            tracing::debug!(
                "dropping local {name} of {}.{}: range is not on instruction boundaries",
                ctx.class_name,
                method.name
            );
            continue;
        }
        let signature = signatures.remove(&(start, length, index));
        method.local_variables.push(LocalVariableNode {
            name,
            desc,
            signature,
            start: labels.at(&mut list, i64::from(start))?,
            end: labels.at(&mut list, i64::from(end))?,
            index,
        });
    }

    for (offset, insn) in decoded {
        if let Some(label) = labels.by_offset.get(&offset) {
            list.push(Insn::Label(*label));
        }
        if let Some(line_numbers) = lines.remove(&offset) {
            let start = labels.by_offset[&offset];
            for line in line_numbers {
                list.push(Insn::LineNumber { line, start });
            }
        }
        if let Some(frame) = frames.remove(&offset) {
            list.push(Insn::Frame(frame));
        }
        list.push(insn);
    }
    if let Some(label) = labels.by_offset.get(&code_len) {
        list.push(Insn::Label(*label));
    }

    let decoded_offsets: usize = labels.by_offset.len();
    let placed = list
        .insns()
        .filter(|insn| matches!(insn, Insn::Label(_)))
        .count();
    if placed != decoded_offsets {
        return Err(ClassFormatError::Malformed {
            what: "code",
            msg: format!(
                "{}.{}: a branch, handler or frame offset is not on an instruction boundary",
                ctx.class_name, method.name
            ),
        });
    }
    method.instructions = list;
    Ok(())
}

fn decode_instructions(
    code: &[u8],
    pool: &ConstantPool,
    list: &mut InsnList,
    labels: &mut Labels,
) -> Result<Vec<(u32, Insn)>, ClassFormatError> {
    let mut r = ByteReader::new(code);
    let mut out = Vec::new();
    while r.remaining() > 0 {
        let pc = r.position();
        let op = r.u8()?;
        let jump = |labels: &mut Labels, list: &mut InsnList, delta: i64| {
            labels.at(list, pc as i64 + delta)
        };
        let insn = match op {
            NOP..=DCONST_1 => Insn::Simple(op),
            BIPUSH => Insn::Int {
                opcode: op,
                operand: i32::from(r.i8()?),
            },
            SIPUSH => Insn::Int {
                opcode: op,
                operand: i32::from(r.i16()?),
            },
            LDC => {
                let index = u16::from(r.u8()?);
                Insn::Ldc(pool.constant(index, pool.bootstrap())?)
            }
            LDC_W | LDC2_W => Insn::Ldc(pool.constant(r.u16()?, pool.bootstrap())?),
            ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Var {
                opcode: op,
                var: u16::from(r.u8()?),
            },
            ILOAD_0..=ALOAD_3 => {
                let n = op - ILOAD_0;
                Insn::Var {
                    opcode: ILOAD + n / 4,
                    var: u16::from(n % 4),
                }
            }
            ISTORE_0..=ASTORE_3 => {
                let n = op - ISTORE_0;
                Insn::Var {
                    opcode: ISTORE + n / 4,
                    var: u16::from(n % 4),
                }
            }
            IALOAD..=SALOAD | IASTORE..=LXOR | I2L..=DCMPG => Insn::Simple(op),
            IRETURN..=RETURN | ARRAYLENGTH | ATHROW | MONITORENTER | MONITOREXIT => {
                Insn::Simple(op)
            }
            IINC => Insn::Iinc {
                var: u16::from(r.u8()?),
                increment: i16::from(r.i8()?),
            },
            IFEQ..=JSR | IFNULL | IFNONNULL => {
                let delta = i64::from(r.i16()?);
                Insn::Jump {
                    opcode: op,
                    target: jump(labels, list, delta)?,
                }
            }
            GOTO_W | JSR_W => {
                let delta = i64::from(r.i32()?);
                Insn::Jump {
                    opcode: op,
                    target: jump(labels, list, delta)?,
                }
            }
            TABLESWITCH => {
                r.skip((4 - (pc + 1) % 4) % 4)?;
                let default = jump(labels, list, i64::from(r.i32()?))?;
                let low = r.i32()?;
                let high = r.i32()?;
                if high < low {
                    return Err(ClassFormatError::Malformed {
                        what: "tableswitch",
                        msg: format!("high {high} below low {low} at {pc}"),
                    });
                }
                let count = (i64::from(high) - i64::from(low) + 1) as usize;
                if count * 4 > r.remaining() {
                    return Err(ClassFormatError::UnexpectedEof { offset: pc });
                }
                let mut targets = Vec::with_capacity(count);
                for _ in 0..count {
                    targets.push(jump(labels, list, i64::from(r.i32()?))?);
                }
                Insn::TableSwitch {
                    low,
                    high,
                    default,
                    targets,
                }
            }
            LOOKUPSWITCH => {
                r.skip((4 - (pc + 1) % 4) % 4)?;
                let default = jump(labels, list, i64::from(r.i32()?))?;
                let pairs = r.i32()?;
                if pairs < 0 || pairs as usize * 8 > r.remaining() {
                    return Err(ClassFormatError::UnexpectedEof { offset: pc });
                }
                let mut keys = Vec::with_capacity(pairs as usize);
                let mut targets = Vec::with_capacity(pairs as usize);
                for _ in 0..pairs {
                    keys.push(r.i32()?);
                    targets.push(jump(labels, list, i64::from(r.i32()?))?);
                }
                Insn::LookupSwitch {
                    default,
                    keys,
                    targets,
                }
            }
            GETSTATIC..=PUTFIELD => {
                let (owner, name, desc, _) = pool.member_ref(r.u16()?)?;
                Insn::Field {
                    opcode: op,
                    owner,
                    name,
                    desc,
                }
            }
            INVOKEVIRTUAL..=INVOKEINTERFACE => {
                let (owner, name, desc, interface) = pool.member_ref(r.u16()?)?;
                if op == INVOKEINTERFACE {
                    r.skip(2)?;
                }
                Insn::Method {
                    opcode: op,
                    owner,
                    name,
                    desc,
                    interface,
                }
            }
            INVOKEDYNAMIC => {
                let index = r.u16()?;
                r.skip(2)?;
                let (bootstrap, nat) = match pool.entry(index) {
                    Some(PoolEntry::InvokeDynamic {
                        bootstrap,
                        name_and_type,
                    }) => (*bootstrap, *name_and_type),
                    _ => {
                        return Err(ClassFormatError::InvalidConstant {
                            index,
                            expected: "InvokeDynamic",
                        });
                    }
                };
                let (name, desc) = pool.name_and_type(nat)?;
                let (bsm, args) = pool.bootstrap_method(bootstrap, pool.bootstrap(), 0)?;
                Insn::InvokeDynamic {
                    name: name.to_string(),
                    desc: desc.to_string(),
                    bsm,
                    args,
                }
            }
            NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Insn::Type {
                opcode: op,
                class: pool.class_name(r.u16()?)?.to_string(),
            },
            NEWARRAY => Insn::Int {
                opcode: op,
                operand: i32::from(r.u8()?),
            },
            WIDE => {
                let inner = r.u8()?;
                match inner {
                    IINC => Insn::Iinc {
                        var: r.u16()?,
                        increment: r.i16()?,
                    },
                    ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Var {
                        opcode: inner,
                        var: r.u16()?,
                    },
                    _ => {
                        return Err(ClassFormatError::UnknownOpcode {
                            opcode: inner,
                            offset: pc + 1,
                        });
                    }
                }
            }
            MULTIANEWARRAY => Insn::MultiANewArray {
                desc: pool.class_name(r.u16()?)?.to_string(),
                dims: r.u8()?,
            },
            _ => return Err(ClassFormatError::UnknownOpcode { opcode: op, offset: pc }),
        };
        out.push((pc as u32, insn));
    }
    Ok(out)
}

/// Implicit frame at method entry, in `StackMapTable` form.
pub(crate) fn initial_frame_locals(class_name: &str, method: &MethodNode) -> Vec<VerificationType> {
    let mut locals = Vec::new();
    if method.access & ACC_STATIC == 0 {
        if method.name == "<init>" && class_name != "java/lang/Object" {
            locals.push(VerificationType::UninitializedThis);
        } else {
            locals.push(VerificationType::Object(class_name.to_string()));
        }
    }
    if let Some((args, _)) = descriptor::parse_method(&method.desc) {
        for arg in args {
            locals.push(match arg {
                FieldType::Boolean
                | FieldType::Byte
                | FieldType::Char
                | FieldType::Short
                | FieldType::Int => VerificationType::Integer,
                FieldType::Float => VerificationType::Float,
                FieldType::Long => VerificationType::Long,
                FieldType::Double => VerificationType::Double,
                FieldType::Object(name) => VerificationType::Object(name),
                FieldType::Array(desc) => VerificationType::Object(desc),
                FieldType::Void => VerificationType::Top,
            });
        }
    }
    locals
}

fn verification_type(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    list: &mut InsnList,
    labels: &mut Labels,
) -> Result<VerificationType, ClassFormatError> {
    Ok(match r.u8()? {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => VerificationType::Object(pool.class_name(r.u16()?)?.to_string()),
        8 => VerificationType::Uninitialized(labels.at(list, i64::from(r.u16()?))?),
        tag => {
            return Err(ClassFormatError::Malformed {
                what: "StackMapTable",
                msg: format!("unknown verification type {tag}"),
            });
        }
    })
}

fn read_frames(
    data: &[u8],
    ctx: &MethodContext<'_>,
    method: &MethodNode,
    list: &mut InsnList,
    labels: &mut Labels,
) -> Result<BTreeMap<u32, Frame>, ClassFormatError> {
    let pool = ctx.pool;
    let mut r = ByteReader::new(data);
    let count = r.u16()?;
    let mut locals = initial_frame_locals(ctx.class_name, method);
    let mut frames = BTreeMap::new();
    let mut offset: i64 = -1;

    for _ in 0..count {
        let frame_type = r.u8()?;
        let (delta, stack) = match frame_type {
            0..=63 => (u16::from(frame_type), Vec::new()),
            64..=127 => (u16::from(frame_type - 64), vec![verification_type(&mut r, pool, list, labels)?]),
            247 => {
                let delta = r.u16()?;
                (delta, vec![verification_type(&mut r, pool, list, labels)?])
            }
            248..=250 => {
                let delta = r.u16()?;
                let chop = usize::from(251 - frame_type);
                locals.truncate(locals.len().saturating_sub(chop));
                (delta, Vec::new())
            }
            251 => (r.u16()?, Vec::new()),
            252..=254 => {
                let delta = r.u16()?;
                for _ in 0..(frame_type - 251) {
                    locals.push(verification_type(&mut r, pool, list, labels)?);
                }
                (delta, Vec::new())
            }
            255 => {
                let delta = r.u16()?;
                let local_count = r.u16()?;
                let mut new_locals = Vec::with_capacity(local_count as usize);
                for _ in 0..local_count {
                    new_locals.push(verification_type(&mut r, pool, list, labels)?);
                }
                locals = new_locals;
                let stack_count = r.u16()?;
                let mut stack = Vec::with_capacity(stack_count as usize);
                for _ in 0..stack_count {
                    stack.push(verification_type(&mut r, pool, list, labels)?);
                }
                (delta, stack)
            }
            reserved => {
                return Err(ClassFormatError::Malformed {
                    what: "StackMapTable",
                    msg: format!("reserved frame type {reserved}"),
                });
            }
        };
        offset += i64::from(delta) + 1;
        labels.at(list, offset)?;
        frames.insert(
            offset as u32,
            Frame {
                locals: locals.clone(),
                stack,
            },
        );
    }
    Ok(frames)
}

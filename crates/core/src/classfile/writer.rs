//! Class file encoder.

use super::bytes::PutBytes;
use super::constant_pool::PoolBuilder;
use super::frames::{self, CommonSuper};
use super::insn::{Frame, Insn, InsnList, LabelId, VerificationType};
use super::node::{AnnotationNode, ClassNode, ElementValue, FieldNode, MethodNode, RawAttribute};
use super::reader::initial_frame_locals;
use super::{FrameMode, WriterOptions};
use crate::opcode::*;
use jarsmith_utils::errors::ClassWriteError;
use std::collections::{HashMap, HashSet};

const MAGIC: u32 = 0xCAFE_BABE;
/// First class file version that carries `StackMapTable`.
const V1_6: u16 = 50;
const MAX_CODE: usize = 65535;

/// Serialises `class`.
///
/// `hierarchy` answers common-superclass queries when frames are computed
/// from scratch and when `max_stack` is recomputed.
pub fn write_class(
    class: &ClassNode,
    options: &WriterOptions,
    hierarchy: &dyn CommonSuper,
) -> Result<Vec<u8>, ClassWriteError> {
    let mut pool = match &class.constant_pool {
        Some(source) => PoolBuilder::with_prefix(&source.0),
        None => PoolBuilder::new(),
    };
    let keep_raw = class.constant_pool.is_some();
    let mut writer = ClassWriter {
        class,
        options,
        hierarchy,
        pool: &mut pool,
        keep_raw,
    };

    let mut body = Vec::new();
    body.put_u16(class.access);
    body.put_u16(writer.pool.class(&class.name)?);
    body.put_u16(match &class.super_name {
        Some(name) => writer.pool.class(name)?,
        None => 0,
    });
    body.put_u16(class.interfaces.len() as u16);
    for interface in &class.interfaces {
        body.put_u16(writer.pool.class(interface)?);
    }

    body.put_u16(class.fields.len() as u16);
    for field in &class.fields {
        writer.field(field, &mut body)?;
    }
    body.put_u16(class.methods.len() as u16);
    for method in &class.methods {
        writer.method(method, &mut body)?;
    }

    let mut attributes = writer.class_attributes()?;
    if !writer.pool.bootstrap_table().is_empty() {
        let name = writer.pool.utf8("BootstrapMethods")?;
        let table = writer.pool.bootstrap_table();
        let mut data = Vec::new();
        data.put_u16(table.len() as u16);
        for (handle, args) in table {
            data.put_u16(*handle);
            data.put_u16(args.len() as u16);
            for arg in args {
                data.put_u16(*arg);
            }
        }
        attributes.push((name, data));
    }
    put_attributes(&mut body, &attributes);

    let mut out = Vec::with_capacity(body.len() + 1024);
    out.put_u32(MAGIC);
    out.put_u16(class.minor_version);
    out.put_u16(class.major_version);
    pool.write(&mut out);
    out.extend_from_slice(&body);
    Ok(out)
}

type Attribute = (u16, Vec<u8>);

fn put_attributes(out: &mut Vec<u8>, attributes: &[Attribute]) {
    out.put_u16(attributes.len() as u16);
    for (name, data) in attributes {
        out.put_u16(*name);
        out.put_u32(data.len() as u32);
        out.extend_from_slice(data);
    }
}

struct ClassWriter<'a> {
    class: &'a ClassNode,
    options: &'a WriterOptions,
    hierarchy: &'a dyn CommonSuper,
    pool: &'a mut PoolBuilder,
    /// Whether raw attributes keep valid pool indices.
    keep_raw: bool,
}

impl ClassWriter<'_> {
    fn attribute(&mut self, name: &str, data: Vec<u8>) -> Result<Attribute, ClassWriteError> {
        Ok((self.pool.utf8(name)?, data))
    }

    fn utf8_attribute(&mut self, name: &str, value: &str) -> Result<Attribute, ClassWriteError> {
        let mut data = Vec::with_capacity(2);
        data.put_u16(self.pool.utf8(value)?);
        self.attribute(name, data)
    }

    fn class_list_attribute(&mut self, name: &str, classes: &[String]) -> Result<Attribute, ClassWriteError> {
        let mut data = Vec::with_capacity(2 + classes.len() * 2);
        data.put_u16(classes.len() as u16);
        for class in classes {
            data.put_u16(self.pool.class(class)?);
        }
        self.attribute(name, data)
    }

    fn raw_attributes(&mut self, raw: &[RawAttribute], out: &mut Vec<Attribute>) -> Result<(), ClassWriteError> {
        for attr in raw {
            if self.keep_raw || attr.is_pool_independent() {
                let attribute = self.attribute(&attr.name, attr.data.clone())?;
                out.push(attribute);
            } else {
                tracing::debug!(
                    "dropping {} attribute of {}: source constant pool is gone",
                    attr.name,
                    self.class.name
                );
            }
        }
        Ok(())
    }

    fn annotation_attributes(
        &mut self,
        visible: &[AnnotationNode],
        invisible: &[AnnotationNode],
        out: &mut Vec<Attribute>,
    ) -> Result<(), ClassWriteError> {
        for (name, list) in [
            ("RuntimeVisibleAnnotations", visible),
            ("RuntimeInvisibleAnnotations", invisible),
        ] {
            if list.is_empty() {
                continue;
            }
            let mut data = Vec::new();
            data.put_u16(list.len() as u16);
            for annotation in list {
                self.annotation(annotation, &mut data)?;
            }
            let attribute = self.attribute(name, data)?;
            out.push(attribute);
        }
        Ok(())
    }

    fn annotation(&mut self, annotation: &AnnotationNode, out: &mut Vec<u8>) -> Result<(), ClassWriteError> {
        out.put_u16(self.pool.utf8(&annotation.desc)?);
        out.put_u16(annotation.values.len() as u16);
        for (name, value) in &annotation.values {
            out.put_u16(self.pool.utf8(name)?);
            self.element_value(value, out)?;
        }
        Ok(())
    }

    fn element_value(&mut self, value: &ElementValue, out: &mut Vec<u8>) -> Result<(), ClassWriteError> {
        let (tag, index) = match value {
            ElementValue::Byte(v) => (b'B', self.pool.integer(i32::from(*v))?),
            ElementValue::Char(v) => (b'C', self.pool.integer(i32::from(*v))?),
            ElementValue::Short(v) => (b'S', self.pool.integer(i32::from(*v))?),
            ElementValue::Boolean(v) => (b'Z', self.pool.integer(i32::from(*v))?),
            ElementValue::Int(v) => (b'I', self.pool.integer(*v)?),
            ElementValue::Long(v) => (b'J', self.pool.long(*v)?),
            ElementValue::Float(bits) => (b'F', self.pool.float(*bits)?),
            ElementValue::Double(bits) => (b'D', self.pool.double(*bits)?),
            ElementValue::String(s) => (b's', self.pool.utf8(s)?),
            ElementValue::Class(desc) => (b'c', self.pool.utf8(desc)?),
            ElementValue::Enum { desc, name } => {
                out.put_u8(b'e');
                out.put_u16(self.pool.utf8(desc)?);
                out.put_u16(self.pool.utf8(name)?);
                return Ok(());
            }
            ElementValue::Annotation(nested) => {
                out.put_u8(b'@');
                return self.annotation(nested, out);
            }
            ElementValue::Array(values) => {
                out.put_u8(b'[');
                out.put_u16(values.len() as u16);
                for v in values {
                    self.element_value(v, out)?;
                }
                return Ok(());
            }
        };
        out.put_u8(tag);
        out.put_u16(index);
        Ok(())
    }

    fn class_attributes(&mut self) -> Result<Vec<Attribute>, ClassWriteError> {
        let class = self.class;
        let mut out = Vec::new();
        if let Some(source) = &class.source_file {
            out.push(self.utf8_attribute("SourceFile", source)?);
        }
        if let Some(signature) = &class.signature {
            out.push(self.utf8_attribute("Signature", signature)?);
        }
        if !class.inner_classes.is_empty() {
            let mut data = Vec::new();
            data.put_u16(class.inner_classes.len() as u16);
            for inner in &class.inner_classes {
                data.put_u16(self.pool.class(&inner.name)?);
                data.put_u16(match &inner.outer_name {
                    Some(outer) => self.pool.class(outer)?,
                    None => 0,
                });
                data.put_u16(match &inner.inner_name {
                    Some(simple) => self.pool.utf8(simple)?,
                    None => 0,
                });
                data.put_u16(inner.access);
            }
            out.push(self.attribute("InnerClasses", data)?);
        }
        if let Some(outer) = &class.outer_class {
            let mut data = Vec::with_capacity(4);
            data.put_u16(self.pool.class(outer)?);
            data.put_u16(match (&class.outer_method, &class.outer_method_desc) {
                (Some(name), Some(desc)) => self.pool.name_and_type(name, desc)?,
                _ => 0,
            });
            out.push(self.attribute("EnclosingMethod", data)?);
        }
        if let Some(host) = &class.nest_host {
            let mut data = Vec::with_capacity(2);
            data.put_u16(self.pool.class(host)?);
            out.push(self.attribute("NestHost", data)?);
        }
        if !class.nest_members.is_empty() {
            out.push(self.class_list_attribute("NestMembers", &class.nest_members)?);
        }
        if !class.permitted_subclasses.is_empty() {
            out.push(self.class_list_attribute("PermittedSubclasses", &class.permitted_subclasses)?);
        }
        self.annotation_attributes(&class.visible_annotations, &class.invisible_annotations, &mut out)?;
        self.raw_attributes(&class.attributes, &mut out)?;
        Ok(out)
    }

    fn field(&mut self, field: &FieldNode, out: &mut Vec<u8>) -> Result<(), ClassWriteError> {
        out.put_u16(field.access);
        out.put_u16(self.pool.utf8(&field.name)?);
        out.put_u16(self.pool.utf8(&field.desc)?);
        let mut attributes = Vec::new();
        if let Some(value) = &field.value {
            let mut data = Vec::with_capacity(2);
            data.put_u16(self.pool.constant(value)?);
            attributes.push(self.attribute("ConstantValue", data)?);
        }
        if let Some(signature) = &field.signature {
            attributes.push(self.utf8_attribute("Signature", signature)?);
        }
        self.annotation_attributes(&field.visible_annotations, &field.invisible_annotations, &mut attributes)?;
        self.raw_attributes(&field.attributes, &mut attributes)?;
        put_attributes(out, &attributes);
        Ok(())
    }

    fn method(&mut self, method: &MethodNode, out: &mut Vec<u8>) -> Result<(), ClassWriteError> {
        out.put_u16(method.access);
        out.put_u16(self.pool.utf8(&method.name)?);
        out.put_u16(self.pool.utf8(&method.desc)?);
        let mut attributes = Vec::new();
        if !method.instructions.is_empty() {
            let code = self.code(method)?;
            attributes.push(self.attribute("Code", code)?);
        }
        if !method.exceptions.is_empty() {
            attributes.push(self.class_list_attribute("Exceptions", &method.exceptions)?);
        }
        if let Some(signature) = &method.signature {
            attributes.push(self.utf8_attribute("Signature", signature)?);
        }
        self.annotation_attributes(&method.visible_annotations, &method.invisible_annotations, &mut attributes)?;
        for (name, params) in [
            ("RuntimeVisibleParameterAnnotations", &method.visible_parameter_annotations),
            ("RuntimeInvisibleParameterAnnotations", &method.invisible_parameter_annotations),
        ] {
            let Some(params) = params else { continue };
            let mut data = Vec::new();
            data.put_u8(params.len() as u8);
            for annotations in params {
                data.put_u16(annotations.len() as u16);
                for annotation in annotations {
                    self.annotation(annotation, &mut data)?;
                }
            }
            attributes.push(self.attribute(name, data)?);
        }
        if let Some(default) = &method.annotation_default {
            let mut data = Vec::new();
            self.element_value(default, &mut data)?;
            attributes.push(self.attribute("AnnotationDefault", data)?);
        }
        if !method.parameters.is_empty() {
            let mut data = Vec::new();
            data.put_u8(method.parameters.len() as u8);
            for param in &method.parameters {
                data.put_u16(match &param.name {
                    Some(name) => self.pool.utf8(name)?,
                    None => 0,
                });
                data.put_u16(param.access);
            }
            attributes.push(self.attribute("MethodParameters", data)?);
        }
        self.raw_attributes(&method.attributes, &mut attributes)?;
        put_attributes(out, &attributes);
        Ok(())
    }

    /// Instruction list to encode, with frames recomputed when asked to.
    fn prepare(&self, method: &MethodNode) -> Result<(InsnList, u16, u16), ClassWriteError> {
        let failed = |msg: String| ClassWriteError::FrameComputation {
            method: format!("{}.{}{}", self.class.name, method.name, method.desc),
            msg,
        };
        let compute =
            self.options.frames == FrameMode::Compute && self.class.major_version >= V1_6;
        if !compute {
            return Ok(
                match frames::analyze(&self.class.name, method, self.hierarchy) {
                    Ok(analysis) => (
                        method.instructions.clone(),
                        method.max_stack.max(analysis.max_stack),
                        method.max_locals.max(analysis.max_locals),
                    ),
                    Err(msg) => {
                        tracing::debug!(
                            "keeping declared maxs of {}.{}: {msg}",
                            self.class.name,
                            method.name
                        );
                        (method.instructions.clone(), method.max_stack, method.max_locals)
                    }
                },
            );
        }

        let mut work = method.clone();
        label_allocation_sites(&mut work.instructions);
        let analysis = frames::analyze(&self.class.name, &work, self.hierarchy).map_err(failed)?;
        if let Some(index) = analysis.unreachable(&work).first() {
            return Err(failed(format!("instruction #{index} is unreachable")));
        }

        let insns: Vec<&Insn> = work.instructions.insns().collect();
        let mut targets: HashSet<LabelId> = HashSet::new();
        for insn in &insns {
            targets.extend(insn.branch_targets());
        }
        targets.extend(work.try_catch_blocks.iter().map(|b| b.handler));

        let mut frame_at = HashSet::new();
        let mut after_terminal = false;
        for (i, insn) in insns.iter().enumerate() {
            match insn {
                Insn::Label(label) if targets.contains(label) => {
                    frame_at.insert(i);
                }
                _ if insn.is_pseudo() => {}
                _ => {
                    if after_terminal {
                        frame_at.insert(i);
                    }
                    after_terminal = insn.opcode().is_some_and(is_terminal);
                }
            }
        }

        let mut list = InsnList::new();
        for (i, insn) in insns.iter().enumerate() {
            if frame_at.contains(&i) {
                if let Some(state) = &analysis.states[i] {
                    list.push(Insn::Frame(state.to_frame()));
                }
            }
            if !matches!(insn, Insn::Frame(_)) {
                list.push((*insn).clone());
            }
        }
        Ok((list, analysis.max_stack, analysis.max_locals))
    }

    fn code(&mut self, method: &MethodNode) -> Result<Vec<u8>, ClassWriteError> {
        let method_id = format!("{}.{}{}", self.class.name, method.name, method.desc);
        let (insns, max_stack, max_locals) = self.prepare(method)?;
        let insns: Vec<&Insn> = insns.insns().collect();

        let layout = self.layout(&insns, &method_id)?;
        let label_offset = |label: &LabelId| {
            layout
                .labels
                .get(label)
                .copied()
                .ok_or_else(|| ClassWriteError::UnknownLabel {
                    method: method_id.clone(),
                    label: label.0,
                })
        };

        let mut code = Vec::with_capacity(layout.size);
        let mut lines = Vec::new();
        let mut frames: Vec<(u32, &Frame)> = Vec::new();
        for (i, insn) in insns.iter().enumerate() {
            let pc = layout.offsets[i];
            debug_assert_eq!(pc as usize, code.len());
            match insn {
                Insn::Label(_) => {}
                Insn::LineNumber { line, start } => lines.push((label_offset(start)?, *line)),
                Insn::Frame(frame) => {
                    match frames.last_mut() {
                        Some(last) if last.0 == pc => last.1 = frame,
                        _ => frames.push((pc, frame)),
                    }
                }
                _ => self.encode(insn, pc, layout.wide_jumps.contains(&i), &label_offset, &mut code)?,
            }
        }

        let mut data = Vec::with_capacity(code.len() + 64);
        data.put_u16(max_stack);
        data.put_u16(max_locals);
        data.put_u32(code.len() as u32);
        data.extend_from_slice(&code);

        let mut handlers = Vec::new();
        for block in &method.try_catch_blocks {
            let start = label_offset(&block.start)?;
            let end = label_offset(&block.end)?;
            if start >= end {
                tracing::debug!("dropping empty exception range in {method_id}");
                continue;
            }
            handlers.push((
                start as u16,
                end as u16,
                label_offset(&block.handler)? as u16,
                match &block.catch_type {
                    Some(catch) => self.pool.class(catch)?,
                    None => 0,
                },
            ));
        }
        data.put_u16(handlers.len() as u16);
        for (start, end, handler, catch) in handlers {
            data.put_u16(start);
            data.put_u16(end);
            data.put_u16(handler);
            data.put_u16(catch);
        }

        let mut attributes = Vec::new();
        if !lines.is_empty() {
            let mut table = Vec::with_capacity(2 + lines.len() * 4);
            table.put_u16(lines.len() as u16);
            for (start, line) in &lines {
                table.put_u16(*start as u16);
                table.put_u16(*line);
            }
            attributes.push(self.attribute("LineNumberTable", table)?);
        }
        if !method.local_variables.is_empty() {
            let mut table = Vec::new();
            let mut types = Vec::new();
            let mut count = 0u16;
            let mut type_count = 0u16;
            for local in &method.local_variables {
                let start = label_offset(&local.start)?;
                let end = label_offset(&local.end)?;
                let length = end.saturating_sub(start) as u16;
                table.put_u16(start as u16);
                table.put_u16(length);
                table.put_u16(self.pool.utf8(&local.name)?);
                table.put_u16(self.pool.utf8(&local.desc)?);
                table.put_u16(local.index);
                count += 1;
                if let Some(signature) = &local.signature {
                    types.put_u16(start as u16);
                    types.put_u16(length);
                    types.put_u16(self.pool.utf8(&local.name)?);
                    types.put_u16(self.pool.utf8(signature)?);
                    types.put_u16(local.index);
                    type_count += 1;
                }
            }
            let mut lvt = Vec::with_capacity(2 + table.len());
            lvt.put_u16(count);
            lvt.extend_from_slice(&table);
            attributes.push(self.attribute("LocalVariableTable", lvt)?);
            if type_count > 0 {
                let mut lvtt = Vec::with_capacity(2 + types.len());
                lvtt.put_u16(type_count);
                lvtt.extend_from_slice(&types);
                attributes.push(self.attribute("LocalVariableTypeTable", lvtt)?);
            }
        }
        if !frames.is_empty() && self.class.major_version >= V1_6 {
            let initial = initial_frame_locals(&self.class.name, method);
            let table = self.stack_map_table(&initial, &frames, &label_offset)?;
            attributes.push(self.attribute("StackMapTable", table)?);
        }
        self.raw_attributes(&method.code_attributes, &mut attributes)?;
        put_attributes(&mut data, &attributes);
        Ok(data)
    }

    fn layout(&mut self, insns: &[&Insn], method_id: &str) -> Result<Layout, ClassWriteError> {
        let mut wide_jumps = HashSet::new();
        loop {
            let mut offsets = Vec::with_capacity(insns.len());
            let mut labels = HashMap::new();
            let mut pc: usize = 0;
            for (i, insn) in insns.iter().enumerate() {
                offsets.push(pc as u32);
                if let Insn::Label(label) = insn {
                    labels.insert(*label, pc as u32);
                }
                pc += self.size(insn, pc, wide_jumps.contains(&i))?;
            }
            if pc > MAX_CODE {
                return Err(ClassWriteError::CodeTooLarge {
                    method: method_id.to_string(),
                    size: pc,
                });
            }

            let mut grew = false;
            for (i, insn) in insns.iter().enumerate() {
                let Insn::Jump { opcode, target } = insn else {
                    continue;
                };
                if wide_jumps.contains(&i) || matches!(*opcode, GOTO_W | JSR_W) {
                    continue;
                }
                let Some(dest) = labels.get(target) else {
                    return Err(ClassWriteError::UnknownLabel {
                        method: method_id.to_string(),
                        label: target.0,
                    });
                };
                let delta = i64::from(*dest) - i64::from(offsets[i]);
                if i16::try_from(delta).is_err() {
                    if matches!(*opcode, GOTO | JSR) {
                        wide_jumps.insert(i);
                        grew = true;
                    } else {
                        return Err(ClassWriteError::BranchOutOfRange {
                            method: method_id.to_string(),
                            offset: delta,
                        });
                    }
                }
            }
            if !grew {
                return Ok(Layout {
                    offsets,
                    labels,
                    size: pc,
                    wide_jumps,
                });
            }
        }
    }

    fn size(&mut self, insn: &Insn, pc: usize, wide_jump: bool) -> Result<usize, ClassWriteError> {
        let padding = |pc: usize| (4 - (pc + 1) % 4) % 4;
        Ok(match insn {
            Insn::Label(_) | Insn::LineNumber { .. } | Insn::Frame(_) => 0,
            Insn::Simple(_) => 1,
            Insn::Int { opcode, .. } => {
                if *opcode == SIPUSH {
                    3
                } else {
                    2
                }
            }
            Insn::Var { opcode, var } => {
                if *var <= 3 && *opcode != RET {
                    1
                } else if *var <= 255 {
                    2
                } else {
                    4
                }
            }
            Insn::Type { .. } | Insn::Field { .. } => 3,
            Insn::Method { opcode, .. } => {
                if *opcode == INVOKEINTERFACE {
                    5
                } else {
                    3
                }
            }
            Insn::InvokeDynamic { .. } => 5,
            Insn::Jump { opcode, .. } => {
                if wide_jump || matches!(*opcode, GOTO_W | JSR_W) {
                    5
                } else {
                    3
                }
            }
            Insn::Ldc(constant) => {
                if constant.is_wide() || self.pool.constant(constant)? > 255 {
                    3
                } else {
                    2
                }
            }
            Insn::Iinc { var, increment } => {
                if *var <= 255 && i8::try_from(*increment).is_ok() {
                    3
                } else {
                    6
                }
            }
            Insn::TableSwitch { targets, .. } => 1 + padding(pc) + 12 + 4 * targets.len(),
            Insn::LookupSwitch { keys, .. } => 1 + padding(pc) + 8 + 8 * keys.len(),
            Insn::MultiANewArray { .. } => 4,
        })
    }

    fn encode(
        &mut self,
        insn: &Insn,
        pc: u32,
        wide_jump: bool,
        label_offset: &dyn Fn(&LabelId) -> Result<u32, ClassWriteError>,
        code: &mut Vec<u8>,
    ) -> Result<(), ClassWriteError> {
        let relative = |label: &LabelId| -> Result<i64, ClassWriteError> {
            Ok(i64::from(label_offset(label)?) - i64::from(pc))
        };
        match insn {
            Insn::Label(_) | Insn::LineNumber { .. } | Insn::Frame(_) => {}
            Insn::Simple(op) => code.put_u8(*op),
            Insn::Int { opcode, operand } => {
                code.put_u8(*opcode);
                if *opcode == SIPUSH {
                    code.put_u16(*operand as u16);
                } else {
                    code.put_u8(*operand as u8);
                }
            }
            Insn::Var { opcode, var } => {
                if *var <= 3 && *opcode != RET {
                    let base = match *opcode {
                        ILOAD..=ALOAD => ILOAD_0 + (*opcode - ILOAD) * 4,
                        _ => ISTORE_0 + (*opcode - ISTORE) * 4,
                    };
                    code.put_u8(base + *var as u8);
                } else if *var <= 255 {
                    code.put_u8(*opcode);
                    code.put_u8(*var as u8);
                } else {
                    code.put_u8(WIDE);
                    code.put_u8(*opcode);
                    code.put_u16(*var);
                }
            }
            Insn::Type { opcode, class } => {
                code.put_u8(*opcode);
                code.put_u16(self.pool.class(class)?);
            }
            Insn::Field {
                opcode,
                owner,
                name,
                desc,
            } => {
                code.put_u8(*opcode);
                code.put_u16(self.pool.field_ref(owner, name, desc)?);
            }
            Insn::Method {
                opcode,
                owner,
                name,
                desc,
                interface,
            } => {
                code.put_u8(*opcode);
                code.put_u16(self.pool.method_ref(owner, name, desc, *interface)?);
                if *opcode == INVOKEINTERFACE {
                    let count = crate::descriptor::argument_slots(desc) + 1;
                    code.put_u8(count as u8);
                    code.put_u8(0);
                }
            }
            Insn::InvokeDynamic {
                name,
                desc,
                bsm,
                args,
            } => {
                code.put_u8(INVOKEDYNAMIC);
                code.put_u16(self.pool.invoke_dynamic(name, desc, bsm, args)?);
                code.put_u16(0);
            }
            Insn::Jump { opcode, target } => {
                let delta = relative(target)?;
                if wide_jump || matches!(*opcode, GOTO_W | JSR_W) {
                    code.put_u8(match *opcode {
                        GOTO => GOTO_W,
                        JSR => JSR_W,
                        other => other,
                    });
                    code.put_u32(delta as i32 as u32);
                } else {
                    code.put_u8(*opcode);
                    code.put_u16(delta as i16 as u16);
                }
            }
            Insn::Ldc(constant) => {
                let index = self.pool.constant(constant)?;
                if constant.is_wide() {
                    code.put_u8(LDC2_W);
                    code.put_u16(index);
                } else if index > 255 {
                    code.put_u8(LDC_W);
                    code.put_u16(index);
                } else {
                    code.put_u8(LDC);
                    code.put_u8(index as u8);
                }
            }
            Insn::Iinc { var, increment } => {
                if *var <= 255 && i8::try_from(*increment).is_ok() {
                    code.put_u8(IINC);
                    code.put_u8(*var as u8);
                    code.put_u8(*increment as i8 as u8);
                } else {
                    code.put_u8(WIDE);
                    code.put_u8(IINC);
                    code.put_u16(*var);
                    code.put_u16(*increment as u16);
                }
            }
            Insn::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                code.put_u8(TABLESWITCH);
                while code.len() % 4 != 0 {
                    code.put_u8(0);
                }
                code.put_u32(relative(default)? as i32 as u32);
                code.put_u32(*low as u32);
                code.put_u32(*high as u32);
                for target in targets {
                    code.put_u32(relative(target)? as i32 as u32);
                }
            }
            Insn::LookupSwitch {
                default,
                keys,
                targets,
            } => {
                code.put_u8(LOOKUPSWITCH);
                while code.len() % 4 != 0 {
                    code.put_u8(0);
                }
                code.put_u32(relative(default)? as i32 as u32);
                code.put_u32(keys.len() as u32);
                for (key, target) in keys.iter().zip(targets) {
                    code.put_u32(*key as u32);
                    code.put_u32(relative(target)? as i32 as u32);
                }
            }
            Insn::MultiANewArray { desc, dims } => {
                code.put_u8(MULTIANEWARRAY);
                code.put_u16(self.pool.class(desc)?);
                code.put_u8(*dims);
            }
        }
        Ok(())
    }

    fn verification_type(
        &mut self,
        ty: &VerificationType,
        label_offset: &dyn Fn(&LabelId) -> Result<u32, ClassWriteError>,
        out: &mut Vec<u8>,
    ) -> Result<(), ClassWriteError> {
        match ty {
            VerificationType::Top => out.put_u8(0),
            VerificationType::Integer => out.put_u8(1),
            VerificationType::Float => out.put_u8(2),
            VerificationType::Double => out.put_u8(3),
            VerificationType::Long => out.put_u8(4),
            VerificationType::Null => out.put_u8(5),
            VerificationType::UninitializedThis => out.put_u8(6),
            VerificationType::Object(class) => {
                out.put_u8(7);
                out.put_u16(self.pool.class(class)?);
            }
            VerificationType::Uninitialized(label) => {
                out.put_u8(8);
                out.put_u16(label_offset(label)? as u16);
            }
        }
        Ok(())
    }

    /// Encodes frames using the most compact form each one allows.
    fn stack_map_table(
        &mut self,
        initial: &[VerificationType],
        frames: &[(u32, &Frame)],
        label_offset: &dyn Fn(&LabelId) -> Result<u32, ClassWriteError>,
    ) -> Result<Vec<u8>, ClassWriteError> {
        let mut out = Vec::new();
        out.put_u16(frames.len() as u16);
        let mut previous: &[VerificationType] = initial;
        let mut previous_offset: Option<u32> = None;
        for (offset, frame) in frames {
            let delta = match previous_offset {
                None => *offset,
                Some(prev) => offset - prev - 1,
            } as u16;
            let locals = frame.locals.as_slice();
            let same_locals = locals == previous;
            if frame.stack.is_empty() && same_locals {
                if delta < 64 {
                    out.put_u8(delta as u8);
                } else {
                    out.put_u8(251);
                    out.put_u16(delta);
                }
            } else if frame.stack.len() == 1 && same_locals {
                if delta < 64 {
                    out.put_u8(64 + delta as u8);
                } else {
                    out.put_u8(247);
                    out.put_u16(delta);
                }
                self.verification_type(&frame.stack[0], label_offset, &mut out)?;
            } else if frame.stack.is_empty()
                && locals.len() > previous.len()
                && locals.len() - previous.len() <= 3
                && locals.starts_with(previous)
            {
                let added = &locals[previous.len()..];
                out.put_u8(251 + added.len() as u8);
                out.put_u16(delta);
                for ty in added {
                    self.verification_type(ty, label_offset, &mut out)?;
                }
            } else if frame.stack.is_empty()
                && locals.len() < previous.len()
                && previous.len() - locals.len() <= 3
                && previous.starts_with(locals)
            {
                out.put_u8(251 - (previous.len() - locals.len()) as u8);
                out.put_u16(delta);
            } else {
                out.put_u8(255);
                out.put_u16(delta);
                out.put_u16(locals.len() as u16);
                for ty in locals {
                    self.verification_type(ty, label_offset, &mut out)?;
                }
                out.put_u16(frame.stack.len() as u16);
                for ty in &frame.stack {
                    self.verification_type(ty, label_offset, &mut out)?;
                }
            }
            previous = locals;
            previous_offset = Some(*offset);
        }
        Ok(out)
    }
}

struct Layout {
    offsets: Vec<u32>,
    labels: HashMap<LabelId, u32>,
    size: usize,
    wide_jumps: HashSet<usize>,
}

/// Places a label directly in front of every `new` that lacks one, so the
/// uninitialized value it creates can be named in a frame.
fn label_allocation_sites(list: &mut InsnList) {
    let mut missing = Vec::new();
    let entries: Vec<_> = list.iter().map(|(id, insn)| (id, insn.clone())).collect();
    for (i, (id, insn)) in entries.iter().enumerate() {
        if !matches!(insn, Insn::Type { opcode: NEW, .. }) {
            continue;
        }
        let labelled = entries[..i]
            .iter()
            .rev()
            .take_while(|(_, prev)| prev.is_pseudo())
            .any(|(_, prev)| matches!(prev, Insn::Label(_)));
        if !labelled {
            missing.push(*id);
        }
    }
    for id in missing {
        let label = list.new_label();
        list.insert_before(id, Insn::Label(label));
    }
}

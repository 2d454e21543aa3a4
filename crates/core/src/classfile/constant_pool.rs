//! Constant pool decoding and the pool builder used by the writer.

use super::bytes::{ByteReader, PutBytes};
use super::insn::{Constant, ConstantDynamic, Handle};
use super::mutf8;
use jarsmith_utils::errors::{ClassFormatError, ClassWriteError};
use std::collections::HashMap;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

/// One constant pool slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolEntry {
    /// Index 0 and the slot after a long or double.
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, desc: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl PoolEntry {
    const fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            Self::Unusable => {}
            Self::Utf8(text) => {
                let bytes = mutf8::encode(text);
                out.put_u8(TAG_UTF8);
                out.put_u16(bytes.len() as u16);
                out.extend_from_slice(&bytes);
            }
            Self::Integer(v) => {
                out.put_u8(TAG_INTEGER);
                out.put_u32(*v as u32);
            }
            Self::Float(bits) => {
                out.put_u8(TAG_FLOAT);
                out.put_u32(*bits);
            }
            Self::Long(v) => {
                out.put_u8(TAG_LONG);
                out.put_u64(*v as u64);
            }
            Self::Double(bits) => {
                out.put_u8(TAG_DOUBLE);
                out.put_u64(*bits);
            }
            Self::Class(i) => {
                out.put_u8(TAG_CLASS);
                out.put_u16(*i);
            }
            Self::String(i) => {
                out.put_u8(TAG_STRING);
                out.put_u16(*i);
            }
            Self::FieldRef {
                class,
                name_and_type,
            } => {
                out.put_u8(TAG_FIELDREF);
                out.put_u16(*class);
                out.put_u16(*name_and_type);
            }
            Self::MethodRef {
                class,
                name_and_type,
            } => {
                out.put_u8(TAG_METHODREF);
                out.put_u16(*class);
                out.put_u16(*name_and_type);
            }
            Self::InterfaceMethodRef {
                class,
                name_and_type,
            } => {
                out.put_u8(TAG_INTERFACE_METHODREF);
                out.put_u16(*class);
                out.put_u16(*name_and_type);
            }
            Self::NameAndType { name, desc } => {
                out.put_u8(TAG_NAME_AND_TYPE);
                out.put_u16(*name);
                out.put_u16(*desc);
            }
            Self::MethodHandle { kind, reference } => {
                out.put_u8(TAG_METHOD_HANDLE);
                out.put_u8(*kind);
                out.put_u16(*reference);
            }
            Self::MethodType(i) => {
                out.put_u8(TAG_METHOD_TYPE);
                out.put_u16(*i);
            }
            Self::Dynamic {
                bootstrap,
                name_and_type,
            } => {
                out.put_u8(TAG_DYNAMIC);
                out.put_u16(*bootstrap);
                out.put_u16(*name_and_type);
            }
            Self::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                out.put_u8(TAG_INVOKE_DYNAMIC);
                out.put_u16(*bootstrap);
                out.put_u16(*name_and_type);
            }
            Self::Module(i) => {
                out.put_u8(TAG_MODULE);
                out.put_u16(*i);
            }
            Self::Package(i) => {
                out.put_u8(TAG_PACKAGE);
                out.put_u16(*i);
            }
        }
    }
}

/// A decoded constant pool.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<PoolEntry>,
    bootstrap: Vec<BootstrapEntry>,
}

/// A bootstrap method as stored in `BootstrapMethods`: handle index plus
/// argument indices.
pub(crate) type BootstrapEntry = (u16, Vec<u16>);

impl ConstantPool {
    pub(crate) fn parse(r: &mut ByteReader<'_>) -> Result<Self, ClassFormatError> {
        let count = r.u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(PoolEntry::Unusable);
        let mut index: u32 = 1;
        while index < u32::from(count) {
            let tag = r.u8()?;
            let entry = match tag {
                TAG_UTF8 => {
                    let len = r.u16()? as usize;
                    PoolEntry::Utf8(mutf8::decode(r.bytes(len)?))
                }
                TAG_INTEGER => PoolEntry::Integer(r.i32()?),
                TAG_FLOAT => PoolEntry::Float(r.u32()?),
                TAG_LONG => PoolEntry::Long(r.u64()? as i64),
                TAG_DOUBLE => PoolEntry::Double(r.u64()?),
                TAG_CLASS => PoolEntry::Class(r.u16()?),
                TAG_STRING => PoolEntry::String(r.u16()?),
                TAG_FIELDREF => PoolEntry::FieldRef {
                    class: r.u16()?,
                    name_and_type: r.u16()?,
                },
                TAG_METHODREF => PoolEntry::MethodRef {
                    class: r.u16()?,
                    name_and_type: r.u16()?,
                },
                TAG_INTERFACE_METHODREF => PoolEntry::InterfaceMethodRef {
                    class: r.u16()?,
                    name_and_type: r.u16()?,
                },
                TAG_NAME_AND_TYPE => PoolEntry::NameAndType {
                    name: r.u16()?,
                    desc: r.u16()?,
                },
                TAG_METHOD_HANDLE => PoolEntry::MethodHandle {
                    kind: r.u8()?,
                    reference: r.u16()?,
                },
                TAG_METHOD_TYPE => PoolEntry::MethodType(r.u16()?),
                TAG_DYNAMIC => PoolEntry::Dynamic {
                    bootstrap: r.u16()?,
                    name_and_type: r.u16()?,
                },
                TAG_INVOKE_DYNAMIC => PoolEntry::InvokeDynamic {
                    bootstrap: r.u16()?,
                    name_and_type: r.u16()?,
                },
                TAG_MODULE => PoolEntry::Module(r.u16()?),
                TAG_PACKAGE => PoolEntry::Package(r.u16()?),
                _ => {
                    return Err(ClassFormatError::UnknownConstantTag {
                        tag,
                        index: index as u16,
                    });
                }
            };
            let wide = entry.is_wide();
            entries.push(entry);
            index += 1;
            if wide {
                entries.push(PoolEntry::Unusable);
                index += 1;
            }
        }
        Ok(Self {
            entries,
            bootstrap: Vec::new(),
        })
    }

    /// Attaches the raw `BootstrapMethods` table read from the same class.
    pub(crate) fn set_bootstrap(&mut self, table: Vec<BootstrapEntry>) {
        self.bootstrap = table;
    }

    pub(crate) fn bootstrap(&self) -> &[BootstrapEntry] {
        &self.bootstrap
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn entry(&self, index: u16) -> Option<&PoolEntry> {
        self.entries.get(index as usize)
    }

    pub(crate) fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub(crate) fn utf8(&self, index: u16) -> Result<&str, ClassFormatError> {
        match self.entry(index) {
            Some(PoolEntry::Utf8(s)) => Ok(s),
            _ => Err(ClassFormatError::InvalidConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// `None` for index 0, otherwise the UTF-8 text.
    pub(crate) fn opt_utf8(&self, index: u16) -> Result<Option<String>, ClassFormatError> {
        if index == 0 {
            return Ok(None);
        }
        self.utf8(index).map(|s| Some(s.to_string()))
    }

    pub(crate) fn class_name(&self, index: u16) -> Result<&str, ClassFormatError> {
        match self.entry(index) {
            Some(PoolEntry::Class(name)) => self.utf8(*name),
            _ => Err(ClassFormatError::InvalidConstant {
                index,
                expected: "Class",
            }),
        }
    }

    pub(crate) fn opt_class_name(&self, index: u16) -> Result<Option<String>, ClassFormatError> {
        if index == 0 {
            return Ok(None);
        }
        self.class_name(index).map(|s| Some(s.to_string()))
    }

    pub(crate) fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassFormatError> {
        match self.entry(index) {
            Some(PoolEntry::NameAndType { name, desc }) => Ok((self.utf8(*name)?, self.utf8(*desc)?)),
            _ => Err(ClassFormatError::InvalidConstant {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Owner, name, descriptor and interface flag of a member reference.
    pub(crate) fn member_ref(
        &self,
        index: u16,
    ) -> Result<(String, String, String, bool), ClassFormatError> {
        let (class, nat, interface) = match self.entry(index) {
            Some(PoolEntry::FieldRef {
                class,
                name_and_type,
            })
            | Some(PoolEntry::MethodRef {
                class,
                name_and_type,
            }) => (*class, *name_and_type, false),
            Some(PoolEntry::InterfaceMethodRef {
                class,
                name_and_type,
            }) => (*class, *name_and_type, true),
            _ => {
                return Err(ClassFormatError::InvalidConstant {
                    index,
                    expected: "member reference",
                });
            }
        };
        let owner = self.class_name(class)?.to_string();
        let (name, desc) = self.name_and_type(nat)?;
        Ok((owner, name.to_string(), desc.to_string(), interface))
    }

    pub(crate) fn handle(&self, index: u16) -> Result<Handle, ClassFormatError> {
        match self.entry(index) {
            Some(PoolEntry::MethodHandle { kind, reference }) => {
                let (owner, name, desc, interface) = self.member_ref(*reference)?;
                Ok(Handle {
                    kind: *kind,
                    owner,
                    name,
                    desc,
                    interface,
                })
            }
            _ => Err(ClassFormatError::InvalidConstant {
                index,
                expected: "MethodHandle",
            }),
        }
    }

    /// Decodes a loadable constant. `bootstrap` is the class's
    /// `BootstrapMethods` table, needed for `CONSTANT_Dynamic`.
    pub(crate) fn constant(
        &self,
        index: u16,
        bootstrap: &[BootstrapEntry],
    ) -> Result<Constant, ClassFormatError> {
        self.constant_at_depth(index, bootstrap, 0)
    }

    fn constant_at_depth(
        &self,
        index: u16,
        bootstrap: &[BootstrapEntry],
        depth: usize,
    ) -> Result<Constant, ClassFormatError> {
        let invalid = || ClassFormatError::InvalidConstant {
            index,
            expected: "loadable constant",
        };
        // Dynamic constants may nest through their bootstrap arguments.
        if depth > 32 {
            return Err(invalid());
        }
        Ok(match self.entry(index).ok_or_else(invalid)? {
            PoolEntry::Integer(v) => Constant::Integer(*v),
            PoolEntry::Float(bits) => Constant::Float(*bits),
            PoolEntry::Long(v) => Constant::Long(*v),
            PoolEntry::Double(bits) => Constant::Double(*bits),
            PoolEntry::String(i) => Constant::String(self.utf8(*i)?.to_string()),
            PoolEntry::Class(i) => Constant::Class(self.utf8(*i)?.to_string()),
            PoolEntry::MethodType(i) => Constant::MethodType(self.utf8(*i)?.to_string()),
            PoolEntry::MethodHandle { .. } => Constant::MethodHandle(self.handle(index)?),
            PoolEntry::Dynamic {
                bootstrap: bsm_index,
                name_and_type,
            } => {
                let (name, desc) = self.name_and_type(*name_and_type)?;
                let (bsm, args) = self.bootstrap_method(*bsm_index, bootstrap, depth)?;
                Constant::Dynamic(Box::new(ConstantDynamic {
                    name: name.to_string(),
                    desc: desc.to_string(),
                    bsm,
                    args,
                }))
            }
            _ => return Err(invalid()),
        })
    }

    /// Resolves entry `index` of the `BootstrapMethods` table.
    pub(crate) fn bootstrap_method(
        &self,
        index: u16,
        bootstrap: &[BootstrapEntry],
        depth: usize,
    ) -> Result<(Handle, Vec<Constant>), ClassFormatError> {
        let (handle, args) =
            bootstrap
                .get(index as usize)
                .ok_or_else(|| ClassFormatError::Malformed {
                    what: "BootstrapMethods",
                    msg: format!("no bootstrap method {index}"),
                })?;
        let bsm = self.handle(*handle)?;
        let args = args
            .iter()
            .map(|arg| self.constant_at_depth(*arg, bootstrap, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((bsm, args))
    }
}

/// Builds the constant pool of a class being written.
#[derive(Debug, Clone)]
pub(crate) struct PoolBuilder {
    entries: Vec<PoolEntry>,
    lookup: HashMap<PoolEntry, u16>,
    bootstrap: Vec<BootstrapEntry>,
    bootstrap_lookup: HashMap<BootstrapEntry, u16>,
}

impl PoolBuilder {
    pub(crate) fn new() -> Self {
        Self {
            entries: vec![PoolEntry::Unusable],
            lookup: HashMap::new(),
            bootstrap: Vec::new(),
            bootstrap_lookup: HashMap::new(),
        }
    }

    /// Starts from a copy of `pool`, keeping every index valid.
    pub(crate) fn with_prefix(pool: &ConstantPool) -> Self {
        let mut builder = Self::new();
        builder.entries = pool.entries().to_vec();
        if builder.entries.is_empty() {
            builder.entries.push(PoolEntry::Unusable);
        }
        for (index, entry) in builder.entries.iter().enumerate() {
            if *entry != PoolEntry::Unusable {
                builder.lookup.entry(entry.clone()).or_insert(index as u16);
            }
        }
        builder.seed_bootstrap(pool.bootstrap());
        builder
    }

    fn add(&mut self, entry: PoolEntry) -> Result<u16, ClassWriteError> {
        if let Some(index) = self.lookup.get(&entry) {
            return Ok(*index);
        }
        let slots = if entry.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > usize::from(u16::MAX) {
            return Err(ClassWriteError::ConstantPoolOverflow);
        }
        let index = self.entries.len() as u16;
        let wide = entry.is_wide();
        self.lookup.insert(entry.clone(), index);
        self.entries.push(entry);
        if wide {
            self.entries.push(PoolEntry::Unusable);
        }
        Ok(index)
    }

    pub(crate) fn utf8(&mut self, text: &str) -> Result<u16, ClassWriteError> {
        self.add(PoolEntry::Utf8(text.to_string()))
    }

    pub(crate) fn class(&mut self, name: &str) -> Result<u16, ClassWriteError> {
        let name = self.utf8(name)?;
        self.add(PoolEntry::Class(name))
    }

    pub(crate) fn string(&mut self, text: &str) -> Result<u16, ClassWriteError> {
        let text = self.utf8(text)?;
        self.add(PoolEntry::String(text))
    }

    pub(crate) fn integer(&mut self, v: i32) -> Result<u16, ClassWriteError> {
        self.add(PoolEntry::Integer(v))
    }

    pub(crate) fn float(&mut self, bits: u32) -> Result<u16, ClassWriteError> {
        self.add(PoolEntry::Float(bits))
    }

    pub(crate) fn long(&mut self, v: i64) -> Result<u16, ClassWriteError> {
        self.add(PoolEntry::Long(v))
    }

    pub(crate) fn double(&mut self, bits: u64) -> Result<u16, ClassWriteError> {
        self.add(PoolEntry::Double(bits))
    }

    pub(crate) fn name_and_type(&mut self, name: &str, desc: &str) -> Result<u16, ClassWriteError> {
        let name = self.utf8(name)?;
        let desc = self.utf8(desc)?;
        self.add(PoolEntry::NameAndType { name, desc })
    }

    pub(crate) fn field_ref(
        &mut self,
        owner: &str,
        name: &str,
        desc: &str,
    ) -> Result<u16, ClassWriteError> {
        let class = self.class(owner)?;
        let name_and_type = self.name_and_type(name, desc)?;
        self.add(PoolEntry::FieldRef {
            class,
            name_and_type,
        })
    }

    pub(crate) fn method_ref(
        &mut self,
        owner: &str,
        name: &str,
        desc: &str,
        interface: bool,
    ) -> Result<u16, ClassWriteError> {
        let class = self.class(owner)?;
        let name_and_type = self.name_and_type(name, desc)?;
        if interface {
            self.add(PoolEntry::InterfaceMethodRef {
                class,
                name_and_type,
            })
        } else {
            self.add(PoolEntry::MethodRef {
                class,
                name_and_type,
            })
        }
    }

    pub(crate) fn handle(&mut self, handle: &Handle) -> Result<u16, ClassWriteError> {
        use crate::opcode::handle_kind;
        let reference = if handle.kind <= handle_kind::PUT_STATIC {
            self.field_ref(&handle.owner, &handle.name, &handle.desc)?
        } else {
            self.method_ref(&handle.owner, &handle.name, &handle.desc, handle.interface)?
        };
        self.add(PoolEntry::MethodHandle {
            kind: handle.kind,
            reference,
        })
    }

    pub(crate) fn method_type(&mut self, desc: &str) -> Result<u16, ClassWriteError> {
        let desc = self.utf8(desc)?;
        self.add(PoolEntry::MethodType(desc))
    }

    pub(crate) fn constant(&mut self, constant: &Constant) -> Result<u16, ClassWriteError> {
        match constant {
            Constant::Integer(v) => self.integer(*v),
            Constant::Float(bits) => self.float(*bits),
            Constant::Long(v) => self.long(*v),
            Constant::Double(bits) => self.double(*bits),
            Constant::String(s) => self.string(s),
            Constant::Class(name) => self.class(name),
            Constant::MethodType(desc) => self.method_type(desc),
            Constant::MethodHandle(handle) => self.handle(handle),
            Constant::Dynamic(dynamic) => {
                let bootstrap = self.bootstrap_method(&dynamic.bsm, &dynamic.args)?;
                let name_and_type = self.name_and_type(&dynamic.name, &dynamic.desc)?;
                self.add(PoolEntry::Dynamic {
                    bootstrap,
                    name_and_type,
                })
            }
        }
    }

    pub(crate) fn invoke_dynamic(
        &mut self,
        name: &str,
        desc: &str,
        bsm: &Handle,
        args: &[Constant],
    ) -> Result<u16, ClassWriteError> {
        let bootstrap = self.bootstrap_method(bsm, args)?;
        let name_and_type = self.name_and_type(name, desc)?;
        self.add(PoolEntry::InvokeDynamic {
            bootstrap,
            name_and_type,
        })
    }

    /// Index into the `BootstrapMethods` table, deduplicated.
    pub(crate) fn bootstrap_method(
        &mut self,
        bsm: &Handle,
        args: &[Constant],
    ) -> Result<u16, ClassWriteError> {
        let handle = self.handle(bsm)?;
        let args = args
            .iter()
            .map(|arg| self.constant(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let key = (handle, args);
        if let Some(index) = self.bootstrap_lookup.get(&key) {
            return Ok(*index);
        }
        let index = self.bootstrap.len() as u16;
        self.bootstrap.push(key.clone());
        self.bootstrap_lookup.insert(key, index);
        Ok(index)
    }

    /// Seeds the bootstrap table from the source class so indices stored in
    /// copied `Dynamic`/`InvokeDynamic` entries stay meaningful.
    fn seed_bootstrap(&mut self, table: &[BootstrapEntry]) {
        for (index, entry) in table.iter().enumerate() {
            self.bootstrap.push(entry.clone());
            self.bootstrap_lookup
                .entry(entry.clone())
                .or_insert(index as u16);
        }
    }

    pub(crate) fn bootstrap_table(&self) -> &[BootstrapEntry] {
        &self.bootstrap
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.put_u16(self.entries.len() as u16);
        for entry in &self.entries {
            entry.write(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_deduplicates_and_reserves_wide_slots() {
        let mut pool = PoolBuilder::new();
        let a = pool.class("p/A").unwrap();
        assert_eq!(pool.class("p/A").unwrap(), a);
        let long = pool.long(42).unwrap();
        let next = pool.utf8("after").unwrap();
        assert_eq!(next, long + 2);
    }

    #[test]
    fn written_pool_parses_back() {
        let mut builder = PoolBuilder::new();
        let field = builder.field_ref("p/A", "f", "I").unwrap();
        let double = builder.double(1.5f64.to_bits()).unwrap();
        let mut out = Vec::new();
        builder.write(&mut out);
        let pool = ConstantPool::parse(&mut ByteReader::new(&out)).unwrap();
        let (owner, name, desc, interface) = pool.member_ref(field).unwrap();
        assert_eq!((owner.as_str(), name.as_str(), desc.as_str()), ("p/A", "f", "I"));
        assert!(!interface);
        assert_eq!(
            pool.constant(double, &[]).unwrap(),
            Constant::Double(1.5f64.to_bits())
        );
    }

    #[test]
    fn prefix_keeps_indices() {
        let mut builder = PoolBuilder::new();
        let s = builder.string("hello").unwrap();
        let mut out = Vec::new();
        builder.write(&mut out);
        let pool = ConstantPool::parse(&mut ByteReader::new(&out)).unwrap();
        let mut again = PoolBuilder::with_prefix(&pool);
        assert_eq!(again.string("hello").unwrap(), s);
        assert_eq!(again.utf8("fresh").unwrap() as usize, pool.len());
    }
}

use jarsmith_core::access::{ACC_PUBLIC, ACC_STATIC};
use jarsmith_core::classfile::{Insn, ObjectFallback, WriterOptions};
use jarsmith_core::graph::{ClassEntry, FieldEntry, MethodEntry, DEFAULT_MAJOR_VERSION};
use jarsmith_core::opcode::{ALOAD, ILOAD, INVOKEVIRTUAL, IRETURN, RETURN};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

pub(crate) const MANIFEST: &[u8] = b"Manifest-Version: 1.0\r\nMain-Class: p.Main\r\n\r\n";

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub(crate) fn class(name: &str, super_name: &str) -> ClassEntry {
    ClassEntry::create(
        DEFAULT_MAJOR_VERSION,
        ACC_PUBLIC,
        name,
        Some(super_name.to_string()),
        vec![],
    )
}

/// Adds a method whose body is `insns`.
pub(crate) fn method(class: &mut ClassEntry, access: u16, name: &str, desc: &str, insns: Vec<Insn>) {
    let index = class.add_method(MethodEntry::new(access, name, desc));
    class.methods_mut()[index].instructions_mut().add_all(insns);
}

/// `int name(int x) { return x; }`
pub(crate) fn identity_method(class: &mut ClassEntry, name: &str) {
    method(
        class,
        ACC_PUBLIC,
        name,
        "(I)I",
        vec![Insn::Var { opcode: ILOAD, var: 1 }, Insn::Simple(IRETURN)],
    );
}

pub(crate) fn void_method(class: &mut ClassEntry, access: u16, name: &str) {
    method(class, access, name, "()V", vec![Insn::Simple(RETURN)]);
}

pub(crate) fn static_field(class: &mut ClassEntry, name: &str, desc: &str) {
    class.add_field(FieldEntry::new(ACC_PUBLIC | ACC_STATIC, name, desc));
}

/// `static void call(B b) { b.virtual_call(); }` on `owner`.
pub(crate) fn virtual_caller(owner: &str, target: &str) -> ClassEntry {
    let mut caller = class(owner, "java/lang/Object");
    method(
        &mut caller,
        ACC_PUBLIC | ACC_STATIC,
        "call",
        &format!("(L{target};)V"),
        vec![
            Insn::Var { opcode: ALOAD, var: 0 },
            Insn::Method {
                opcode: INVOKEVIRTUAL,
                owner: target.to_string(),
                name: "virtual_call".into(),
                desc: "()V".into(),
                interface: false,
            },
            Insn::Simple(RETURN),
        ],
    );
    caller
}

pub(crate) fn bytes(class: &ClassEntry) -> Vec<u8> {
    class
        .write(&WriterOptions::default(), &ObjectFallback)
        .expect("fixture class writes")
}

/// Writes `entries` into a new jar file under `dir`.
pub(crate) fn write_jar(dir: &Path, file_name: &str, entries: &[(&str, Vec<u8>)]) -> PathBuf {
    let path = dir.join(file_name);
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    for (name, data) in entries {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
    path
}

/// Every entry of the jar at `path`, in archive order.
pub(crate) fn read_jar(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..zip.len())
        .map(|i| {
            let mut file = zip.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            (file.name().to_string(), data)
        })
        .collect()
}

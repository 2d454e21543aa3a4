use crate::fixtures::{bytes, class, identity_method, read_jar, void_method, write_jar, MANIFEST};
use jarsmith_core::access::{ACC_PUBLIC, ACC_STATIC};
use jarsmith_core::archive::{Manifest, MemoryArchive, MANIFEST_PATH};
use jarsmith_core::classfile::{read_class, ClassNode, FrameMode, Insn, InsnId, MethodNode};
use jarsmith_core::graph::{InstructionStream, MethodEntry, MAIN_METHOD_DESC, MAIN_METHOD_NAME};
use jarsmith_core::opcode::{NOP, RETURN};
use jarsmith_mapping::processor::MappingFormat;
use jarsmith_mapping::GeneratorConfig;
use jarsmith_transform::{Jar, LoadOptions, ProcessContext, SaveOptions, Transformer};
use jarsmith_utils::cancel::CancellationToken;
use jarsmith_utils::errors::{ProcessError, TransformError};
use jarsmith_utils::log::{Level, MemorySink};
use std::io::Write;
use std::sync::Arc;

fn main_class() -> Vec<u8> {
    let mut main = class("p/Main", "java/lang/Object");
    void_method(&mut main, ACC_PUBLIC | ACC_STATIC, MAIN_METHOD_NAME);
    main.methods_mut()[0].set_desc(MAIN_METHOD_DESC);
    identity_method(&mut main, "helper");
    bytes(&main)
}

/// Drops every `nop`.
struct StripNops {
    removed: usize,
}

impl Transformer for StripNops {
    fn name(&self) -> &str {
        "strip-nops"
    }

    fn transform_instruction(
        &mut self,
        _class: &ClassNode,
        _method: &MethodNode,
        stream: &mut InstructionStream,
        insn: InsnId,
    ) -> Result<(), TransformError> {
        if matches!(stream.get(insn), Some(Insn::Simple(NOP))) {
            stream.remove(insn);
            self.removed += 1;
        }
        Ok(())
    }
}

#[test]
fn test_srg_file_renames_main_class_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_jar(
        dir.path(),
        "in.jar",
        &[(MANIFEST_PATH, MANIFEST.to_vec()), ("p/Main.class", main_class())],
    );
    let sink = Arc::new(MemorySink::new());
    let mut jar = Jar::open(&input, &LoadOptions::default(), ProcessContext::new(sink.clone())).unwrap();
    assert_eq!(jar.main_class(), Some("p/Main"));

    let mut mapping = tempfile::NamedTempFile::new().unwrap();
    writeln!(mapping, "CL: p/Main app/Launcher").unwrap();
    writeln!(mapping, "MD: p/Main/helper (I)I app/Launcher/h (I)I").unwrap();
    let store = jar.load_mapping(mapping.path(), MappingFormat::Srg).unwrap();
    jar.remap(&store).unwrap();

    let output = dir.path().join("out.jar");
    jar.save(&output, &SaveOptions::default()).unwrap();
    let entries = read_jar(&output);
    tracing::debug!("saved {} entries", entries.len());
    let manifest = Manifest::parse(&entries[0].1).unwrap();
    assert_eq!(manifest.get("Main-Class"), Some("app.Launcher"));
    assert_eq!(entries[1].0, "app/Launcher.class");
    let launcher = read_class(&entries[1].1).unwrap();
    assert!(launcher.method("h", "(I)I").is_some());
    assert!(launcher.method(MAIN_METHOD_NAME, MAIN_METHOD_DESC).is_some());
    assert!(sink
        .messages(Level::Info)
        .iter()
        .any(|m| m.contains("Main-Class is now app/Launcher")));
}

#[test]
fn test_generated_mapping_keeps_the_entry_point() {
    let mut archive = MemoryArchive::new()
        .with_entry(MANIFEST_PATH, MANIFEST.to_vec())
        .with_entry("p/Main.class", main_class())
        .with_entry("p/Util.class", bytes(&class("p/Util", "java/lang/Object")));
    let mut jar = Jar::load(&mut archive, &LoadOptions::default(), ProcessContext::silent()).unwrap();
    let store = jar.generate_mapping(&GeneratorConfig::default()).unwrap();
    jar.remap(&store).unwrap();

    let main = jar.arena().get("p/Main").unwrap();
    assert!(main.find_method(MAIN_METHOD_NAME, MAIN_METHOD_DESC).is_some());
    assert!(main.find_method("helper", "(I)I").is_none());
    assert!(jar.contains("a"));
    assert_eq!(jar.manifest().unwrap().get("Main-Class"), Some("p.Main"));
}

#[test]
fn test_custom_transformer_runs_before_save() {
    let mut work = class("p/Work", "java/lang/Object");
    let index = work.add_method(MethodEntry::new(ACC_PUBLIC | ACC_STATIC, "run", "()V"));
    work.methods_mut()[index].instructions_mut().add_all([
        Insn::Simple(NOP),
        Insn::Simple(NOP),
        Insn::Simple(RETURN),
    ]);
    let mut archive = MemoryArchive::new().with_entry("p/Work.class", bytes(&work));
    let mut jar = Jar::load(&mut archive, &LoadOptions::default(), ProcessContext::silent()).unwrap();

    let mut strip = StripNops { removed: 0 };
    let report = jar.transform(&mut strip).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.classes, 1);
    assert_eq!(strip.removed, 2);
    assert!(jar.arena().is_resolved());

    let options = SaveOptions {
        frames: FrameMode::Compute,
        ..SaveOptions::default()
    };
    let mut out = MemoryArchive::new();
    let saved = jar.save_to(&mut out, &options).unwrap();
    assert!(saved.frame_fallbacks.is_empty());
    let node = read_class(out.get("p/Work.class").unwrap()).unwrap();
    let run = node.method("run", "()V").unwrap();
    assert_eq!(run.instructions.insns().collect::<Vec<_>>(), vec![&Insn::Simple(RETURN)]);
}

#[test]
fn test_cancellation_between_phases() {
    let token = CancellationToken::new();
    let mut archive = MemoryArchive::new().with_entry("p/Main.class", main_class());
    let context = ProcessContext::silent().with_cancel(token.clone());
    let mut jar = Jar::load(&mut archive, &LoadOptions::default(), context).unwrap();
    let store = jar.generate_mapping(&GeneratorConfig::default()).unwrap();

    token.cancel();
    assert!(matches!(
        jar.remap(&store),
        Err(ProcessError::Cancelled { phase: "remap" })
    ));
    assert!(jar.arena().contains("p/Main"));
    assert!(matches!(
        jar.save_to(&mut MemoryArchive::new(), &SaveOptions::default()),
        Err(ProcessError::Cancelled { phase: "serialize" })
    ));
}

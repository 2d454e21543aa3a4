use crate::fixtures::{bytes, class, static_field, virtual_caller, void_method};
use jarsmith_core::access::{ACC_PUBLIC, ACC_STATIC};
use jarsmith_core::archive::MemoryArchive;
use jarsmith_core::classfile::{read_class, ClassNode, Insn};
use jarsmith_core::graph::MethodEntry;
use jarsmith_core::opcode::{ACONST_NULL, GETFIELD, GETSTATIC, IRETURN};
use jarsmith_mapping::processor::{parse_str, MappingFormat};
use jarsmith_transform::{Jar, LoadOptions, ProcessContext, SaveOptions};

fn saved_class(jar: &Jar, name: &str) -> ClassNode {
    let mut out = MemoryArchive::new();
    jar.save_to(&mut out, &SaveOptions::default()).unwrap();
    read_class(out.get(&format!("{name}.class")).unwrap()).unwrap()
}

fn calls(node: &ClassNode) -> Vec<(String, String, String)> {
    node.methods
        .iter()
        .flat_map(|m| m.instructions.insns())
        .filter_map(|insn| match insn {
            Insn::Method { owner, name, desc, .. } | Insn::Field { owner, name, desc, .. } => {
                Some((owner.clone(), name.clone(), desc.clone()))
            }
            _ => None,
        })
        .collect()
}

#[test]
fn test_virtual_call_through_subclass_takes_ancestor_mapping() {
    let mut a = class("p/A", "java/lang/Object");
    void_method(&mut a, ACC_PUBLIC, "virtual_call");
    let b = class("p/B", "p/A");
    let caller = virtual_caller("p/C", "p/B");
    let mut archive = MemoryArchive::new()
        .with_entry("p/A.class", bytes(&a))
        .with_entry("p/B.class", bytes(&b))
        .with_entry("p/C.class", bytes(&caller));
    let mut jar = Jar::load(&mut archive, &LoadOptions::default(), ProcessContext::silent()).unwrap();

    let store = parse_str(
        "CL: p/B q/Renamed\nMD: p/A/virtual_call ()V p/A/x ()V\n",
        MappingFormat::Srg,
    )
    .unwrap();
    jar.remap(&store).unwrap();

    let node = saved_class(&jar, "p/C");
    assert_eq!(
        calls(&node),
        vec![("q/Renamed".to_string(), "x".to_string(), "()V".to_string())]
    );
    assert!(node.method("call", "(Lq/Renamed;)V").is_some());
    assert!(jar.arena().get("p/A").unwrap().find_method("x", "()V").is_some());
}

#[test]
fn test_field_access_is_remapped_only_when_the_opcode_fits() {
    let mut a = class("p/A", "java/lang/Object");
    static_field(&mut a, "f", "I");
    let b = class("p/B", "p/A");
    let mut user = class("p/User", "java/lang/Object");
    for (name, opcode) in [("read_static", GETSTATIC), ("read_instance", GETFIELD)] {
        let index = user.add_method(MethodEntry::new(ACC_PUBLIC | ACC_STATIC, name, "()I"));
        let stream = user.methods_mut()[index].instructions_mut();
        if opcode == GETFIELD {
            stream.add(Insn::Simple(ACONST_NULL));
        }
        stream.add_all([
            Insn::Field {
                opcode,
                owner: "p/B".into(),
                name: "f".into(),
                desc: "I".into(),
            },
            Insn::Simple(IRETURN),
        ]);
    }
    let mut archive = MemoryArchive::new()
        .with_entry("p/A.class", bytes(&a))
        .with_entry("p/B.class", bytes(&b))
        .with_entry("p/User.class", bytes(&user));
    let mut jar = Jar::load(&mut archive, &LoadOptions::default(), ProcessContext::silent()).unwrap();

    let store = parse_str("FD: p/A/f p/A/renamed\n", MappingFormat::Srg).unwrap();
    jar.remap(&store).unwrap();

    let node = saved_class(&jar, "p/User");
    let accessed: Vec<String> = calls(&node).into_iter().map(|(_, name, _)| name).collect();
    assert_eq!(accessed, vec!["renamed", "f"]);
    assert_eq!(jar.arena().get("p/A").unwrap().fields()[0].name(), "renamed");
}

#[test]
fn test_unmapped_archive_is_unchanged_by_remap() {
    let mut a = class("p/A", "java/lang/Object");
    void_method(&mut a, ACC_PUBLIC, "run");
    let original = bytes(&a);
    let mut archive = MemoryArchive::new().with_entry("p/A.class", original.clone());
    let mut jar = Jar::load(&mut archive, &LoadOptions::default(), ProcessContext::silent()).unwrap();

    let store = parse_str("CL: q/Other q/Elsewhere\n", MappingFormat::Srg).unwrap();
    assert_eq!(jar.remap(&store).unwrap(), 0);
    assert_eq!(saved_class(&jar, "p/A"), read_class(&original).unwrap());
}

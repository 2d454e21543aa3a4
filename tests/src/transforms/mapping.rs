use crate::fixtures::{bytes, class, identity_method, init_tracing, static_field, virtual_caller, void_method, write_jar};
use jarsmith_core::access::ACC_PUBLIC;
use jarsmith_core::archive::MemoryArchive;
use jarsmith_core::graph::ClassArena;
use jarsmith_mapping::processor::MappingFormat;
use jarsmith_mapping::{Direction, GeneratorConfig, MappingStore, NameStrategyKind};
use jarsmith_transform::{Jar, LoadOptions, ProcessContext};
use std::collections::BTreeSet;
use std::io::Write;

/// Class, field and method signatures of every class in `arena`.
fn symbols(arena: &ClassArena) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for (_, class) in arena.iter() {
        out.insert(class.name().to_string());
        for field in class.fields() {
            out.insert(format!("{}.{}:{}", class.name(), field.name(), field.desc()));
        }
        for method in class.methods() {
            out.insert(format!("{}.{}{}", class.name(), method.name(), method.desc()));
        }
    }
    out
}

fn sample_archive() -> MemoryArchive {
    let mut a = class("p/A", "java/lang/Object");
    identity_method(&mut a, "f");
    void_method(&mut a, ACC_PUBLIC, "virtual_call");
    static_field(&mut a, "count", "I");
    static_field(&mut a, "self_ref", "Lp/A;");
    let mut b = class("p/B", "p/A");
    identity_method(&mut b, "f");
    void_method(&mut b, ACC_PUBLIC, "toString");
    let mut c = class("p/C", "p/B");
    identity_method(&mut c, "f");
    let caller = virtual_caller("p/Caller", "p/B");
    let inner = class("p/Caller$Inner", "java/lang/Object");

    let mut archive = MemoryArchive::new();
    for entry in [a, b, c, caller, inner] {
        archive = archive.with_entry(format!("{}.class", entry.name()), bytes(&entry));
    }
    archive
}

fn load(archive: &mut MemoryArchive) -> Jar {
    Jar::load(archive, &LoadOptions::default(), ProcessContext::silent()).unwrap()
}

#[test]
fn test_alphabet_names_for_thirty_classes() {
    let mut archive = MemoryArchive::new();
    for i in 0..30 {
        let name = format!("p/C{i:02}");
        archive = archive.with_entry(format!("{name}.class"), bytes(&class(&name, "java/lang/Object")));
    }
    let mut jar = load(&mut archive);
    let store = jar.generate_mapping(&GeneratorConfig::default()).unwrap();

    let names: String = store.classes().map(|c| c.mapping.as_str()).collect();
    assert_eq!(names, "abcdefghijklmnopqrstuvwxyzABCD");
}

#[test]
fn test_inner_class_takes_its_outer_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_jar(
        dir.path(),
        "in.jar",
        &[
            ("p/Outer.class", bytes(&class("p/Outer", "java/lang/Object"))),
            ("p/Outer$Inner.class", bytes(&class("p/Outer$Inner", "java/lang/Object"))),
        ],
    );
    let mut jar = Jar::open(&input, &LoadOptions::default(), ProcessContext::silent()).unwrap();
    let store = jar.generate_mapping(&GeneratorConfig::default()).unwrap();
    assert_eq!(store.class("p/Outer").unwrap().mapping, "a");
    assert_eq!(store.class("p/Outer$Inner").unwrap().mapping, "a$b");

    jar.remap(&store).unwrap();
    let arena = jar.arena();
    assert_eq!(arena.names().collect::<Vec<_>>(), vec!["a", "a$b"]);
    let inner = arena.get("a$b").unwrap();
    assert_eq!(inner.outer(), arena.id_of("a"));
}

#[test]
fn test_generated_mapping_is_flat_and_override_consistent() {
    init_tracing();
    let mut jar = load(&mut sample_archive());
    let store = jar.generate_mapping(&GeneratorConfig::default()).unwrap();
    assert_eq!(store.direction(), Direction::Applying);

    let flat = store.flatten();
    for class in store.classes() {
        assert_eq!(flat[class.name.as_str()], class.mapping);
    }

    let arena = jar.arena();
    let mut checked = 0;
    for (_, class) in arena.iter() {
        for method in class.methods() {
            let Some(base) = method.base() else { continue };
            let base_class = arena.name_of(base.0).unwrap();
            let base_method = arena.method(base).unwrap();
            let own = store.method(class.name(), method.name(), method.desc());
            let inherited = store.method(base_class, base_method.name(), base_method.desc());
            assert_eq!(own.map(|m| &m.mapping), inherited.map(|m| &m.mapping));
            checked += 1;
        }
    }
    assert_eq!(checked, 2);
    assert!(store.method("p/B", "toString", "()V").is_none());
    assert_eq!(
        store.method("p/C", "f", "(I)I").unwrap().mapping,
        store.method("p/A", "f", "(I)I").unwrap().mapping
    );
}

#[test]
fn test_inverse_mapping_restores_every_name() {
    let mut jar = load(&mut sample_archive());
    let before = symbols(jar.arena());

    let store = jar.generate_mapping(&GeneratorConfig::default()).unwrap();
    jar.remap(&store).unwrap();
    let renamed = symbols(jar.arena());
    assert!(renamed.iter().all(|symbol| !symbol.starts_with("p/")));

    jar.remap(&store.inverse()).unwrap();
    assert_eq!(symbols(jar.arena()), before);
}

#[test]
fn test_proguard_file_of_a_generated_mapping_restores_names() {
    let mut jar = load(&mut sample_archive());
    let before = symbols(jar.arena());
    let store = jar.generate_mapping(&GeneratorConfig::default()).unwrap();
    jar.remap(&store).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(store.write(MappingFormat::ProGuard).as_bytes()).unwrap();
    let loaded = jar.load_mapping(file.path(), MappingFormat::ProGuard).unwrap();
    assert_eq!(loaded.direction(), Direction::Reversing);

    jar.remap(&loaded).unwrap();
    assert_eq!(symbols(jar.arena()), before);
}

#[test]
fn test_seeded_random_names_are_reproducible() {
    let config = GeneratorConfig {
        strategy: NameStrategyKind::Random,
        seed: Some(42),
        ..GeneratorConfig::default()
    };
    let first: MappingStore = load(&mut sample_archive()).generate_mapping(&config).unwrap();
    let second = load(&mut sample_archive()).generate_mapping(&config).unwrap();
    assert_eq!(first.flatten(), second.flatten());
    assert!(first
        .classes()
        .filter(|c| !c.name.contains('$'))
        .all(|c| c.mapping.len() == jarsmith_mapping::generator::NAME_LENGTH));
}

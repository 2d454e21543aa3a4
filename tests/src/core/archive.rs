use crate::fixtures::{bytes, class, identity_method, init_tracing, read_jar, static_field, write_jar, MANIFEST};
use jarsmith_core::archive::{EntrySource, JarReader, Manifest, MANIFEST_PATH};
use jarsmith_core::classfile::{read_class, AnnotationNode};
use jarsmith_core::graph::AnnotationEntry;
use jarsmith_transform::{Jar, LoadOptions, ProcessContext, SaveOptions};

#[test]
fn test_empty_class_survives_load_and_save() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let original = bytes(&class("P/Empty", "java/lang/Object"));
    let input = write_jar(dir.path(), "in.jar", &[("P/Empty.class", original.clone())]);

    let jar = Jar::open(&input, &LoadOptions::default(), ProcessContext::silent()).unwrap();
    assert_eq!(jar.arena().len(), 1);
    let empty = jar.arena().get("P/Empty").unwrap();
    assert_eq!(empty.superclass(), None);
    assert!(jar.manifest().is_none());

    let output = dir.path().join("out.jar");
    jar.save(&output, &SaveOptions::default()).unwrap();
    let entries = read_jar(&output);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "P/Empty.class");
    assert_eq!(read_class(&entries[0].1).unwrap(), read_class(&original).unwrap());

    let again = Jar::open(&output, &LoadOptions::default(), ProcessContext::silent()).unwrap();
    assert_eq!(again.arena().names().collect::<Vec<_>>(), vec!["P/Empty"]);
}

#[test]
fn test_identity_round_trip_keeps_members_and_resources() {
    let dir = tempfile::tempdir().unwrap();
    let mut a = class("p/A", "java/lang/Object");
    identity_method(&mut a, "f");
    static_field(&mut a, "count", "I");
    a.annotations_mut()
        .push(AnnotationEntry::new(AnnotationNode::new("Ljava/lang/Deprecated;")));
    let mut b = class("p/B", "p/A");
    identity_method(&mut b, "f");
    let main = class("p/Main", "java/lang/Object");

    let classes = [("p/A.class", bytes(&a)), ("p/B.class", bytes(&b)), ("p/Main.class", bytes(&main))];
    let mut entries: Vec<(&str, Vec<u8>)> = vec![(MANIFEST_PATH, MANIFEST.to_vec())];
    entries.extend(classes.iter().cloned());
    entries.push(("assets/logo.txt", b"logo".to_vec()));
    let input = write_jar(dir.path(), "in.jar", &entries);

    let jar = Jar::open(&input, &LoadOptions::default(), ProcessContext::silent()).unwrap();
    let output = dir.path().join("out.jar");
    let report = jar.save(&output, &SaveOptions::default()).unwrap();
    assert_eq!(report.classes_written, 3);
    assert_eq!(report.resources_written, 1);

    let written = read_jar(&output);
    let names: Vec<&str> = written.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![MANIFEST_PATH, "p/A.class", "p/B.class", "p/Main.class", "assets/logo.txt"]
    );
    for (name, original) in &classes {
        let (_, data) = written.iter().find(|(n, _)| n == name).unwrap();
        assert_eq!(read_class(data).unwrap(), read_class(original).unwrap(), "{name}");
    }
    let manifest = Manifest::parse(&written[0].1).unwrap();
    assert_eq!(manifest.main_class().as_deref(), Some("p/Main"));
    assert_eq!(written[4].1, b"logo");

    let again = Jar::open(&output, &LoadOptions::default(), ProcessContext::silent()).unwrap();
    assert_eq!(
        again.arena().names().collect::<Vec<_>>(),
        jar.arena().names().collect::<Vec<_>>()
    );
    assert_eq!(again.main_class(), Some("p/Main"));
}

#[test]
fn test_signature_files_are_not_written_back() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_jar(
        dir.path(),
        "signed.jar",
        &[
            (MANIFEST_PATH, MANIFEST.to_vec()),
            ("META-INF/KEY.SF", b"Signature-Version: 1.0\r\n".to_vec()),
            ("META-INF/KEY.RSA", vec![1, 2, 3]),
            ("p/Main.class", bytes(&class("p/Main", "java/lang/Object"))),
        ],
    );
    let mut reader = JarReader::open(&input).unwrap();
    assert_eq!(reader.read_entries().unwrap().len(), 4);

    let jar = Jar::open(&input, &LoadOptions::default(), ProcessContext::silent()).unwrap();
    let output = dir.path().join("out.jar");
    jar.save(&output, &SaveOptions::default()).unwrap();
    let names: Vec<String> = read_jar(&output).into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec![MANIFEST_PATH.to_string(), "p/Main.class".to_string()]);
}

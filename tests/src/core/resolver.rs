use crate::fixtures::{bytes, class, identity_method, static_field, void_method, write_jar};
use jarsmith_core::access::{ACC_ABSTRACT, ACC_INTERFACE, ACC_PUBLIC};
use jarsmith_core::graph::{ClassArena, ClassId};
use jarsmith_core::opcode::{GETFIELD, GETSTATIC};
use jarsmith_transform::{Jar, LoadOptions, ProcessContext};

fn is_ancestor(arena: &ClassArena, of: ClassId, candidate: ClassId) -> bool {
    let mut pending = vec![of];
    let mut seen = Vec::new();
    while let Some(id) = pending.pop() {
        if seen.contains(&id) {
            continue;
        }
        seen.push(id);
        let Some(class) = arena.by_id(id) else { continue };
        for &next in class.superclass().iter().chain(class.interfaces()) {
            if next == candidate {
                return true;
            }
            pending.push(next);
        }
    }
    false
}

#[test]
fn test_single_override_after_loading() {
    let dir = tempfile::tempdir().unwrap();
    let mut a = class("A", "java/lang/Object");
    identity_method(&mut a, "f");
    let mut b = class("B", "A");
    identity_method(&mut b, "f");
    let input = write_jar(
        dir.path(),
        "in.jar",
        &[("A.class", bytes(&a)), ("B.class", bytes(&b))],
    );

    let jar = Jar::open(&input, &LoadOptions::default(), ProcessContext::silent()).unwrap();
    let arena = jar.arena();
    let a_id = arena.id_of("A").unwrap();
    let b_class = arena.get("B").unwrap();
    let f = b_class.find_method("f", "(I)I").unwrap();
    let (base_class, base_index) = f.base().unwrap();
    assert_eq!(base_class, a_id);
    let base = arena.method((base_class, base_index)).unwrap();
    assert_eq!(base.name(), "f");
    assert_eq!(base.desc(), "(I)I");
}

#[test]
fn test_every_base_method_is_an_ancestor_with_the_same_signature() {
    let mut arena = ClassArena::new();
    let mut runnable = class("p/Task", "java/lang/Object");
    runnable.set_access(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
    // default method, so implementations share its access flags
    void_method(&mut runnable, ACC_PUBLIC, "run");
    arena.insert(runnable);

    let mut base = class("p/Base", "java/lang/Object");
    base.node_mut().interfaces.push("p/Task".into());
    void_method(&mut base, ACC_PUBLIC, "run");
    identity_method(&mut base, "step");
    arena.insert(base);

    let mut mid = class("p/Mid", "p/Base");
    identity_method(&mut mid, "step");
    arena.insert(mid);

    let mut leaf = class("p/Leaf", "p/Mid");
    void_method(&mut leaf, ACC_PUBLIC, "run");
    identity_method(&mut leaf, "step");
    identity_method(&mut leaf, "fresh");
    arena.insert(leaf);
    arena.resolve();

    let mut overrides = 0;
    for (id, class) in arena.iter() {
        for method in class.methods() {
            let Some((base_class, index)) = method.base() else { continue };
            overrides += 1;
            let base = arena.method((base_class, index)).unwrap();
            assert_eq!(base.name(), method.name());
            assert_eq!(base.desc(), method.desc());
            assert!(is_ancestor(&arena, id, base_class), "{}.{}", class.name(), method.name());
        }
    }
    // Base.run, Mid.step, Leaf.run and Leaf.step
    assert_eq!(overrides, 4);
    let leaf = arena.get("p/Leaf").unwrap();
    assert!(leaf.find_method("fresh", "(I)I").unwrap().base().is_none());
}

#[test]
fn test_field_resolution_honours_the_opcode() {
    let mut arena = ClassArena::new();
    let mut a = class("A", "java/lang/Object");
    static_field(&mut a, "f", "I");
    let a = arena.insert(a);
    let b = arena.insert(class("B", "A"));
    arena.resolve();

    assert_eq!(arena.find_field(b, GETSTATIC, "f", "I"), Some((a, 0)));
    assert_eq!(arena.find_field(a, GETSTATIC, "f", "I"), Some((a, 0)));
    assert_eq!(arena.find_field(b, GETFIELD, "f", "I"), None);
}

#[test]
fn test_broken_inner_class_is_repaired_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_jar(
        dir.path(),
        "in.jar",
        &[
            ("x/y/Foo$Bar.class", bytes(&class("x/y/Foo$Bar", "java/lang/Object"))),
            ("x/y/Foo.class", bytes(&class("x/y/Foo", "java/lang/Object"))),
        ],
    );

    let jar = Jar::open(&input, &LoadOptions::default(), ProcessContext::silent()).unwrap();
    let arena = jar.arena();
    let foo = arena.id_of("x/y/Foo").unwrap();
    let bar = arena.get("x/y/Foo$Bar").unwrap();
    assert_eq!(bar.outer(), Some(foo));
    assert_eq!(bar.outer_class_name(), Some("x/y/Foo"));
    assert!(bar.is_inner());
}

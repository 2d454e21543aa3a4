//! Indented `original -> obfuscated:` mappings.
//!
//! ```text
//! # comment
//! com.example.Main -> a:
//!     int counter -> a
//!     12:14:void run(java.lang.String[],int) -> b
//! ```

use super::{parse_error, MappingFormat, MappingProcessor};
use crate::store::{FieldMapping, MappingStore, MethodMapping};
use jarsmith_core::descriptor::{argument_descriptors, from_source_type, return_type, to_source_type};
use jarsmith_utils::errors::MappingLoadError;
use std::fmt::Write as _;

const DELIMITER: &str = " -> ";
const INDENT: &str = "    ";

#[derive(Debug, Default)]
pub struct ProGuardProcessor {
    current: Option<String>,
}

impl MappingProcessor for ProGuardProcessor {
    fn format(&self) -> MappingFormat {
        MappingFormat::ProGuard
    }

    fn process_line(
        &mut self,
        store: &mut MappingStore,
        number: usize,
        line: &str,
    ) -> Result<(), MappingLoadError> {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            return Ok(());
        }

        if !line.starts_with(char::is_whitespace) {
            let (name, mapping) = line
                .trim_end()
                .strip_suffix(':')
                .and_then(|l| l.split_once(DELIMITER))
                .ok_or_else(|| parse_error(number, line, "expected `<class> -> <mapping>:`"))?;
            let name = internal_name(name);
            store.map_class(name.clone(), internal_name(mapping));
            self.current = Some(name);
            return Ok(());
        }

        let Some(class) = self.current.clone() else {
            return Err(parse_error(number, line, "member before any class"));
        };
        let member = strip_line_numbers(line.trim());
        let (signature, mapping) = member
            .split_once(DELIMITER)
            .ok_or_else(|| parse_error(number, line, "expected `<member> -> <mapping>`"))?;
        let (ty, name) = signature
            .trim()
            .split_once(' ')
            .ok_or_else(|| parse_error(number, line, "expected `<type> <name>`"))?;
        let mapping = mapping.trim();

        match name.split_once('(') {
            Some((method, rest)) => {
                let (args, _) = rest
                    .split_once(')')
                    .ok_or_else(|| parse_error(number, line, "unterminated argument list"))?;
                let mut desc = String::from("(");
                for arg in args.split(',').map(str::trim).filter(|a| !a.is_empty()) {
                    desc.push_str(&from_source_type(arg));
                }
                desc.push(')');
                desc.push_str(&from_source_type(ty));
                store.map_method(class, MethodMapping::new(method.trim(), mapping, desc));
            }
            None => {
                store.map_field(class, FieldMapping::new(name.trim(), mapping, from_source_type(ty)));
            }
        }
        Ok(())
    }

    fn finish(&mut self, store: &mut MappingStore) {
        store.complete_descriptors();
    }
}

fn internal_name(name: &str) -> String {
    name.trim().replace('.', "/")
}

/// Drops a leading `12:14:` line range. A trailing `:12:14` after the
/// argument list is ignored by the member parser.
fn strip_line_numbers(member: &str) -> &str {
    let mut out = member;
    for _ in 0..2 {
        match out.split_once(':') {
            Some((head, tail)) if !head.is_empty() && head.bytes().all(|b| b.is_ascii_digit()) => {
                out = tail;
            }
            _ => break,
        }
    }
    out
}

pub(super) fn write(store: &MappingStore) -> String {
    let mut out = String::new();
    for class in store.classes() {
        let _ = writeln!(out, "{} -> {}:", dotted(&class.name), dotted(&class.mapping));
        for field in store.fields_of(&class.name) {
            if field.return_type.is_empty() {
                tracing::debug!("skipping untyped field {}.{}", class.name, field.name);
                continue;
            }
            let _ = writeln!(
                out,
                "{INDENT}{} {} -> {}",
                to_source_type(&field.return_type),
                field.name,
                field.mapping
            );
        }
        for method in store.methods_of(&class.name) {
            let args: Vec<String> = argument_descriptors(&method.descriptor)
                .iter()
                .map(|a| to_source_type(a))
                .collect();
            let _ = writeln!(
                out,
                "{INDENT}{} {}({}) -> {}",
                to_source_type(return_type(&method.descriptor)),
                method.name,
                args.join(","),
                method.mapping
            );
        }
    }
    out
}

fn dotted(name: &str) -> String {
    name.replace('/', ".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::parse_str;
    use crate::store::Direction;

    const SAMPLE: &str = "\
# compiler: R8
com.example.Main -> a:
    int counter -> a
    com.example.Util helper -> b
    1:4:void run(java.lang.String[],int) -> c
    com.example.Util make() -> d
com.example.Util -> b:
    long[][] table -> a
";

    #[test]
    fn parses_classes_and_members() {
        let store = parse_str(SAMPLE, MappingFormat::ProGuard).unwrap();
        assert_eq!(store.direction(), Direction::Reversing);
        assert_eq!(store.class("com/example/Main").unwrap().mapping, "a");

        let helper = store.field("com/example/Main", "helper", "Lcom/example/Util;").unwrap();
        assert_eq!(helper.mapping, "b");
        assert_eq!(helper.mapped_return_type, "Lb;");

        let run = store
            .method("com/example/Main", "run", "([Ljava/lang/String;I)V")
            .unwrap();
        assert_eq!(run.mapping, "c");
        assert_eq!(run.mapped_descriptor, "([Ljava/lang/String;I)V");

        let make = store.method("com/example/Main", "make", "()Lcom/example/Util;").unwrap();
        assert_eq!(make.mapped_descriptor, "()Lb;");
        assert_eq!(make.mapped_return_type, "Lb;");

        assert!(store.field("com/example/Util", "table", "[[J").is_some());
    }

    #[test]
    fn reversing_flatten_restores_names() {
        let store = parse_str(SAMPLE, MappingFormat::ProGuard).unwrap();
        let flat = store.flatten();
        assert_eq!(flat["a"], "com/example/Main");
        assert_eq!(flat["a.a"], "counter");
        assert_eq!(flat["a.d()Lb;"], "make");
    }

    #[test]
    fn rejects_member_without_class() {
        let err = parse_str("    int x -> a\n", MappingFormat::ProGuard).unwrap_err();
        assert!(matches!(err, MappingLoadError::Parse { line: 1, .. }));
        let err = parse_str("a.B b:\n", MappingFormat::ProGuard).unwrap_err();
        assert!(matches!(err, MappingLoadError::Parse { line: 1, .. }));
    }

    #[test]
    fn strips_line_number_prefix() {
        assert_eq!(strip_line_numbers("12:14:void run() -> a"), "void run() -> a");
        assert_eq!(strip_line_numbers("void run() -> a"), "void run() -> a");
    }
}

//! Four-prefix SRG mappings.
//!
//! ```text
//! PK: ./ net/example
//! CL: a net/example/Main
//! FD: a/b net/example/Main/counter
//! MD: a/c (I)La; net/example/Main/make (I)Lnet/example/Main;
//! ```

use super::{parse_error, MappingFormat, MappingProcessor};
use crate::store::{FieldMapping, MappingStore, MethodMapping};
use jarsmith_utils::errors::MappingLoadError;
use std::fmt::Write as _;

#[derive(Debug, Default, Clone, Copy)]
pub struct SrgProcessor;

impl MappingProcessor for SrgProcessor {
    fn format(&self) -> MappingFormat {
        MappingFormat::Srg
    }

    fn process_line(
        &mut self,
        store: &mut MappingStore,
        number: usize,
        line: &str,
    ) -> Result<(), MappingLoadError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(());
        }
        let (tag, rest) = trimmed
            .split_once(':')
            .ok_or_else(|| parse_error(number, line, "missing entry tag"))?;
        let parts: Vec<&str> = rest.split_whitespace().collect();

        match (tag, parts.as_slice()) {
            ("PK", _) => {}
            ("CL", [name, mapping]) => {
                store.map_class(*name, *mapping);
            }
            ("FD", [from, to]) => {
                let (class, name) = split_member(from)
                    .ok_or_else(|| parse_error(number, line, "field without owner"))?;
                let (_, mapping) = split_member(to)
                    .ok_or_else(|| parse_error(number, line, "field mapping without owner"))?;
                store.ensure_class(class);
                store.map_field(class, FieldMapping::new(name, mapping, ""));
            }
            ("MD", [from, desc, to, mapped_desc]) => {
                let (class, name) = split_member(from)
                    .ok_or_else(|| parse_error(number, line, "method without owner"))?;
                let (_, mapping) = split_member(to)
                    .ok_or_else(|| parse_error(number, line, "method mapping without owner"))?;
                store.ensure_class(class);
                store.map_method(
                    class,
                    MethodMapping::with_mapped_descriptor(name, mapping, *desc, *mapped_desc),
                );
            }
            ("CL" | "FD" | "MD", _) => {
                return Err(parse_error(
                    number,
                    line,
                    format!("wrong number of fields for {tag}"),
                ));
            }
            _ => return Err(parse_error(number, line, format!("unknown entry tag `{tag}`"))),
        }
        Ok(())
    }
}

/// `a/b/C/name` -> (`a/b/C`, `name`).
fn split_member(path: &str) -> Option<(&str, &str)> {
    path.rsplit_once('/')
}

pub(super) fn write(store: &MappingStore) -> String {
    let mut out = String::new();
    for class in store.classes() {
        let _ = writeln!(out, "CL: {} {}", class.name, class.mapping);
    }
    for (class, fields) in store.field_tables() {
        let mapped = store.mapped_class_name(class);
        for field in fields {
            let _ = writeln!(out, "FD: {class}/{} {mapped}/{}", field.name, field.mapping);
        }
    }
    for (class, methods) in store.method_tables() {
        let mapped = store.mapped_class_name(class);
        for method in methods {
            let _ = writeln!(
                out,
                "MD: {class}/{} {} {mapped}/{} {}",
                method.name, method.descriptor, method.mapping, method.mapped_descriptor
            );
        }
    }
    out
}

//! Field and method descriptor helpers.
//!
//! Descriptors use the VM grammar: one letter per primitive, `L<name>;` for
//! class types, a `[` prefix per array dimension, and `(<args>)<ret>` for
//! methods. Source-syntax conversion (`int[]`, `java/lang/String`) is used by
//! the indented mapping format.

/// A parsed field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Void,
    /// Internal name of a class type.
    Object(String),
    /// Full descriptor of an array type, including the leading `[`.
    Array(String),
}

impl FieldType {
    /// Number of local variable / operand stack slots taken by a value.
    pub const fn slots(&self) -> usize {
        match self {
            Self::Long | Self::Double => 2,
            Self::Void => 0,
            _ => 1,
        }
    }
}

/// Parses one field type at the start of `desc`, returning it with the rest.
pub fn parse_field_type(desc: &str) -> Option<(FieldType, &str)> {
    let mut chars = desc.char_indices();
    let (_, first) = chars.next()?;
    let ty = match first {
        'B' => FieldType::Byte,
        'C' => FieldType::Char,
        'D' => FieldType::Double,
        'F' => FieldType::Float,
        'I' => FieldType::Int,
        'J' => FieldType::Long,
        'S' => FieldType::Short,
        'Z' => FieldType::Boolean,
        'V' => FieldType::Void,
        'L' => {
            let end = desc.find(';')?;
            return Some((FieldType::Object(desc[1..end].to_string()), &desc[end + 1..]));
        }
        '[' => {
            let dims = desc.bytes().take_while(|b| *b == b'[').count();
            let (_, rest) = parse_field_type(&desc[dims..])?;
            let len = desc.len() - rest.len();
            return Some((FieldType::Array(desc[..len].to_string()), rest));
        }
        _ => return None,
    };
    Some((ty, &desc[1..]))
}

/// Splits a method descriptor into argument types and return type.
pub fn parse_method(desc: &str) -> Option<(Vec<FieldType>, FieldType)> {
    let mut rest = desc.strip_prefix('(')?;
    let mut args = Vec::new();
    while !rest.starts_with(')') {
        let (ty, tail) = parse_field_type(rest)?;
        args.push(ty);
        rest = tail;
    }
    let (ret, tail) = parse_field_type(&rest[1..])?;
    if !tail.is_empty() {
        return None;
    }
    Some((args, ret))
}

/// Total slot size of a method's arguments (without the receiver).
pub fn argument_slots(desc: &str) -> usize {
    parse_method(desc)
        .map(|(args, _)| args.iter().map(FieldType::slots).sum())
        .unwrap_or(0)
}

/// Return type portion of a method descriptor, or the whole input for a
/// field descriptor.
pub fn return_type(desc: &str) -> &str {
    match desc.rfind(')') {
        Some(pos) => &desc[pos + 1..],
        None => desc,
    }
}

/// Internal name referenced by an object descriptor `L<name>;`.
pub fn object_name(desc: &str) -> Option<&str> {
    desc.strip_prefix('L')?.strip_suffix(';')
}

/// Rewrites every `L<name>;` in a field or method descriptor through `map`.
///
/// Names for which `map` yields `None` are kept. Malformed trailing text is
/// copied verbatim.
pub fn map_descriptor<F>(desc: &str, mut map: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(desc.len());
    let mut rest = desc;
    while let Some(pos) = rest.find('L') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];
        match tail.find(';') {
            Some(end) => {
                let name = &tail[..end];
                out.push('L');
                match map(name) {
                    Some(mapped) => out.push_str(&mapped),
                    None => out.push_str(name),
                }
                out.push(';');
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(&rest[pos..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Converts a source-syntax type (`int`, `java/lang/String[][]`) to a
/// descriptor. Dots are accepted as package separators.
pub fn from_source_type(ty: &str) -> String {
    let ty = ty.trim();
    let mut base = ty;
    let mut dims = 0;
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped;
        dims += 1;
    }
    let element = match base {
        "void" => "V".to_string(),
        "boolean" => "Z".to_string(),
        "byte" => "B".to_string(),
        "char" => "C".to_string(),
        "short" => "S".to_string(),
        "int" => "I".to_string(),
        "long" => "J".to_string(),
        "float" => "F".to_string(),
        "double" => "D".to_string(),
        name => format!("L{};", name.replace('.', "/")),
    };
    let mut out = "[".repeat(dims);
    out.push_str(&element);
    out
}

/// Converts a field descriptor back to source syntax with dotted names.
pub fn to_source_type(desc: &str) -> String {
    let dims = desc.bytes().take_while(|b| *b == b'[').count();
    let element = match &desc[dims..] {
        "V" => "void".to_string(),
        "Z" => "boolean".to_string(),
        "B" => "byte".to_string(),
        "C" => "char".to_string(),
        "S" => "short".to_string(),
        "I" => "int".to_string(),
        "J" => "long".to_string(),
        "F" => "float".to_string(),
        "D" => "double".to_string(),
        other => object_name(other).unwrap_or(other).replace('/', "."),
    };
    let mut out = element;
    for _ in 0..dims {
        out.push_str("[]");
    }
    out
}

/// Splits a method descriptor into its raw argument descriptors.
pub fn argument_descriptors(desc: &str) -> Vec<String> {
    let Some(mut rest) = desc.strip_prefix('(') else {
        return Vec::new();
    };
    let mut out = Vec::new();
    while !rest.is_empty() && !rest.starts_with(')') {
        let Some((_, tail)) = parse_field_type(rest) else {
            break;
        };
        out.push(rest[..rest.len() - tail.len()].to_string());
        rest = tail;
    }
    out
}

/// Rewrites every class name in a generic signature through `map`.
///
/// Handles class, method and field signatures, including formal type
/// parameters and inner class suffixes (`Lp/Outer<TT;>.Inner;`), where the
/// suffix becomes whatever follows the mapped outer name and `$` in the
/// mapping of `p/Outer$Inner`.
pub fn map_signature<F>(signature: &str, map: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut mapper = SignatureMapper {
        rest: signature,
        out: String::with_capacity(signature.len()),
        map,
    };
    if mapper.peek() == Some('<') {
        mapper.formal_type_parameters();
    }
    while let Some(c) = mapper.peek() {
        match c {
            '(' | ')' | '^' => mapper.copy(),
            _ => mapper.type_signature(),
        }
    }
    mapper.out
}

struct SignatureMapper<'s, F> {
    rest: &'s str,
    out: String,
    map: F,
}

impl<'s, F> SignatureMapper<'s, F>
where
    F: FnMut(&str) -> Option<String>,
{
    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn copy(&mut self) {
        if let Some(c) = self.peek() {
            self.out.push(c);
            self.rest = &self.rest[c.len_utf8()..];
        }
    }

    fn identifier(&mut self, stops: &[char]) -> &'s str {
        let end = self.rest.find(|c| stops.contains(&c)).unwrap_or(self.rest.len());
        let (ident, rest) = self.rest.split_at(end);
        self.rest = rest;
        ident
    }

    fn mapped(&mut self, name: &str) -> String {
        (self.map)(name).unwrap_or_else(|| name.to_string())
    }

    fn formal_type_parameters(&mut self) {
        self.copy();
        while let Some(c) = self.peek() {
            if c == '>' {
                break;
            }
            let name = self.identifier(&[':', '>']);
            self.out.push_str(name);
            while self.peek() == Some(':') {
                self.copy();
                if matches!(self.peek(), Some('L' | 'T' | '[')) {
                    self.type_signature();
                }
            }
            if name.is_empty() && self.peek() != Some('>') {
                self.copy();
            }
        }
        self.copy();
    }

    fn type_signature(&mut self) {
        match self.peek() {
            Some('L') => self.class_type(),
            Some('T') => {
                let var = self.identifier(&[';']);
                self.out.push_str(var);
                self.copy();
            }
            Some('[') => {
                self.copy();
                self.type_signature();
            }
            Some(_) => self.copy(),
            None => {}
        }
    }

    fn class_type(&mut self) {
        self.copy();
        let mut name = self.identifier(&['<', '.', ';']).to_string();
        let mapped = self.mapped(&name);
        self.out.push_str(&mapped);
        loop {
            match self.peek() {
                Some('<') => self.type_arguments(),
                Some('.') => {
                    self.copy();
                    let outer = self.mapped(&name);
                    let inner = self.identifier(&['<', '.', ';']);
                    name = format!("{name}${inner}");
                    let mapped = self.mapped(&name);
                    let suffix = mapped
                        .strip_prefix(&outer)
                        .and_then(|s| s.strip_prefix('$'))
                        .or_else(|| mapped.rsplit('$').next())
                        .unwrap_or(&mapped)
                        .to_string();
                    self.out.push_str(&suffix);
                }
                Some(';') => {
                    self.copy();
                    return;
                }
                _ => return,
            }
        }
    }

    fn type_arguments(&mut self) {
        self.copy();
        while let Some(c) = self.peek() {
            match c {
                '>' => break,
                '*' => self.copy(),
                '+' | '-' => {
                    self.copy();
                    self.type_signature();
                }
                _ => self.type_signature(),
            }
        }
        self.copy();
    }
}

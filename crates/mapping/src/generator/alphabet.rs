use super::NameStrategy;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Short names in `a, b, .., z, A, .., Z, aa, ab, ..` order.
///
/// Classes share one counter for the whole run; fields and methods restart
/// for each class, locals for each method.
#[derive(Debug, Default, Clone)]
pub struct AlphabetStrategy {
    classes: usize,
    fields: usize,
    methods: usize,
    locals: usize,
}

impl AlphabetStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Bijective base-52 rendering of `index`.
pub(crate) fn nth_name(mut index: usize) -> String {
    let base = ALPHABET.len();
    let mut out = Vec::new();
    loop {
        out.push(ALPHABET[index % base]);
        if index < base {
            break;
        }
        index = index / base - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn next(counter: &mut usize) -> String {
    let name = nth_name(*counter);
    *counter += 1;
    name
}

impl NameStrategy for AlphabetStrategy {
    fn class_name(&mut self) -> String {
        next(&mut self.classes)
    }

    fn enter_class(&mut self) {
        self.fields = 0;
        self.methods = 0;
    }

    fn field_name(&mut self) -> String {
        next(&mut self.fields)
    }

    fn method_name(&mut self) -> String {
        next(&mut self.methods)
    }

    fn enter_method(&mut self) {
        self.locals = 0;
    }

    fn local_name(&mut self) -> String {
        next(&mut self.locals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_lower_then_upper_then_pairs() {
        assert_eq!(nth_name(0), "a");
        assert_eq!(nth_name(25), "z");
        assert_eq!(nth_name(26), "A");
        assert_eq!(nth_name(51), "Z");
        assert_eq!(nth_name(52), "aa");
        assert_eq!(nth_name(53), "ab");
        assert_eq!(nth_name(52 + 52), "ba");
    }

    #[test]
    fn member_counters_restart_per_class() {
        let mut names = AlphabetStrategy::new();
        assert_eq!(names.class_name(), "a");
        names.enter_class();
        assert_eq!(names.field_name(), "a");
        assert_eq!(names.field_name(), "b");
        assert_eq!(names.method_name(), "a");
        assert_eq!(names.class_name(), "b");
        names.enter_class();
        assert_eq!(names.field_name(), "a");
    }
}

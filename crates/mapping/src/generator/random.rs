use super::NameStrategy;
use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Length of every generated name.
pub const NAME_LENGTH: usize = 10;

/// Random alphanumeric names, unique within their scope.
#[derive(Debug, Clone)]
pub struct RandomStrategy {
    rng: StdRng,
    classes: HashSet<String>,
    fields: HashSet<String>,
    methods: HashSet<String>,
    locals: HashSet<String>,
}

impl RandomStrategy {
    /// Seeded for reproducible output, or from the OS otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            classes: HashSet::new(),
            fields: HashSet::new(),
            methods: HashSet::new(),
            locals: HashSet::new(),
        }
    }

    fn draw(rng: &mut StdRng, seen: &mut HashSet<String>) -> String {
        loop {
            let name: String = (0..NAME_LENGTH)
                .map(|_| char::from(rng.sample(Alphanumeric)))
                .collect();
            if seen.insert(name.clone()) {
                return name;
            }
        }
    }
}

impl NameStrategy for RandomStrategy {
    fn class_name(&mut self) -> String {
        Self::draw(&mut self.rng, &mut self.classes)
    }

    fn enter_class(&mut self) {
        self.fields.clear();
        self.methods.clear();
    }

    fn field_name(&mut self) -> String {
        Self::draw(&mut self.rng, &mut self.fields)
    }

    fn method_name(&mut self) -> String {
        Self::draw(&mut self.rng, &mut self.methods)
    }

    fn enter_method(&mut self) {
        self.locals.clear();
    }

    fn local_name(&mut self) -> String {
        Self::draw(&mut self.rng, &mut self.locals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_names_repeat() {
        let mut a = RandomStrategy::new(Some(7));
        let mut b = RandomStrategy::new(Some(7));
        let first: Vec<String> = (0..5).map(|_| a.class_name()).collect();
        let second: Vec<String> = (0..5).map(|_| b.class_name()).collect();
        assert_eq!(first, second);
        assert!(first.iter().all(|n| n.len() == NAME_LENGTH));
        assert!(first
            .iter()
            .all(|n| n.chars().all(|c| c.is_ascii_alphanumeric())));
    }

    #[test]
    fn names_are_unique_in_scope() {
        let mut names = RandomStrategy::new(Some(1));
        let drawn: HashSet<String> = (0..200).map(|_| names.method_name()).collect();
        assert_eq!(drawn.len(), 200);
    }
}

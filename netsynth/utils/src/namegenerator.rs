use crate::Id;
use std::collections::{HashMap, HashSet};

/// Simple HashMap-based name generator that generates new names for each
/// prefix. Seeded with the names already present in a module so generated
/// names never collide with source names.
#[derive(Clone, Debug, Default)]
pub struct NameGenerator {
    name_hash: HashMap<Id, u64>,
    generated_names: HashSet<Id>,
}

impl NameGenerator {
    /// Create a NameGenerator where `names` are already defined so that this
    /// generator will never generate those names.
    pub fn with_prev_defined_names(names: HashSet<Id>) -> Self {
        NameGenerator {
            generated_names: names,
            name_hash: HashMap::default(),
        }
    }

    /// Add generated names
    pub fn add_names(&mut self, names: HashSet<Id>) {
        self.generated_names.extend(names)
    }

    /// Returns a new name that starts with `prefix`.
    /// For example:
    /// ```
    /// # use netsynth_utils::NameGenerator;
    /// let mut namegen = NameGenerator::default();
    /// namegen.gen_name("mux"); // Generates "mux0"
    /// namegen.gen_name("mux"); // Generates "mux1"
    /// ```
    pub fn gen_name<S>(&mut self, prefix: S) -> Id
    where
        S: Into<Id>,
    {
        let prefix: Id = prefix.into();
        loop {
            let count = self.name_hash.entry(prefix).or_insert(0);
            let name = Id::from(format!("{}{}", prefix, count));
            *count += 1;

            // If we've not generated this name before, return it.
            if self.generated_names.insert(name) {
                return name;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_count_up_per_prefix() {
        let mut namegen = NameGenerator::default();
        assert_eq!(namegen.gen_name("mux"), Id::from("mux0"));
        assert_eq!(namegen.gen_name("mux"), Id::from("mux1"));
        assert_eq!(namegen.gen_name("or"), Id::from("or0"));
    }

    #[test]
    fn seeded_names_are_skipped() {
        let mut seen = HashSet::new();
        seen.insert(Id::from("mux0"));
        let mut namegen = NameGenerator::with_prev_defined_names(seen);
        assert_eq!(namegen.gen_name("mux"), Id::from("mux1"));
    }
}

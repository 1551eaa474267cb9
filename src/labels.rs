pub mod labels {
    use std::collections::HashSet;

    pub const GENERATED_PREFIX: &str = "_unique_";

    /// Hands out `_unique_N` names that collide with nothing the program
    /// already uses. The counter only moves forward, so a name is never
    /// issued twice in one session.
    #[derive(Debug, Clone, Default)]
    pub struct LabelRegistry {
        taken: HashSet<String>,
        counter: u64,
    }

    impl LabelRegistry {
        pub fn new() -> LabelRegistry {
            LabelRegistry::default()
        }

        pub fn seeded<I, S>(names: I) -> LabelRegistry
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            let mut registry = LabelRegistry::new();
            for name in names {
                registry.reserve(name);
            }
            registry
        }

        pub fn reserve<S: Into<String>>(&mut self, name: S) {
            self.taken.insert(name.into());
        }

        pub fn contains(&self, name: &str) -> bool {
            self.taken.contains(name)
        }

        pub fn len(&self) -> usize {
            self.taken.len()
        }

        pub fn is_empty(&self) -> bool {
            self.taken.is_empty()
        }

        pub fn new_label(&mut self) -> String {
            loop {
                self.counter += 1;
                let name = format!("{GENERATED_PREFIX}{}", self.counter);
                if self.taken.insert(name.clone()) {
                    return name;
                }
            }
        }
    }

}

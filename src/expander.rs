pub mod expander {
    use tracing::{debug, trace};

    use crate::emitter::emitter;
    use crate::error::error::ExpandError;
    use crate::labels::labels::LabelRegistry;
    use crate::program::program::{Body, Line, Program};
    use crate::pseudo_ops::pseudo_ops::{self, Scopes};

    /// No macro nests anywhere near this deep; hitting it means the
    /// rewriting is not converging.
    pub const MAX_PASSES: usize = 64;

    /// State for lowering one program: the label registry and the open
    /// scope stacks. Build a fresh one per program.
    #[derive(Debug, Clone)]
    pub struct Session {
        pub labels: LabelRegistry,
        pub scopes: Scopes,
        max_passes: usize,
        passes: usize,
    }

    impl Default for Session {
        fn default() -> Session {
            Session {
                labels: LabelRegistry::new(),
                scopes: Scopes::new(),
                max_passes: MAX_PASSES,
                passes: 0,
            }
        }
    }

    impl Session {
        /// Registry seeded with every label the program defines or mentions.
        pub fn for_program(program: &Program) -> Session {
            Session {
                labels: LabelRegistry::seeded(program.label_names()),
                ..Session::default()
            }
        }

        pub fn with_max_passes(mut self, max_passes: usize) -> Session {
            self.max_passes = max_passes;
            self
        }

        pub fn passes(&self) -> usize {
            self.passes
        }

        /// Replace every macro line by its one-level expansion.
        pub fn pass(&mut self, lines: Vec<Line>) -> Result<Vec<Line>, ExpandError> {
            let mut out = Vec::with_capacity(lines.len() * 4);

            for line in lines {
                let Line { label, body } = line;
                let call = match body {
                    Body::Macro(call) => call,
                    body => {
                        out.push(Line { label, body });
                        continue;
                    }
                };

                let mut expansion = pseudo_ops::lower(&call, &mut self.labels, &mut self.scopes)?;
                if let Some(label) = label {
                    match expansion.first_mut() {
                        Some(first) if first.label.is_none() => first.label = Some(label),
                        _ => out.push(Line::labelled(label, pseudo_ops::no_op())),
                    }
                }
                out.extend(expansion);
            }

            self.scopes.ensure_closed()?;
            self.passes += 1;
            Ok(out)
        }

        pub fn lower(&mut self, program: Program) -> Result<Program, ExpandError> {
            let mut lines = program.lines;

            loop {
                let pending = lines.iter().filter(|line| line.is_macro()).count();
                if pending == 0 {
                    break;
                }
                if self.passes >= self.max_passes {
                    return Err(ExpandError::NoFixedPoint(self.max_passes));
                }
                trace!(pass = self.passes + 1, pending, "lowering pass");
                lines = self.pass(lines)?;
            }

            debug!(passes = self.passes, lines = lines.len(), "reached fixed point");
            Ok(Program { lines })
        }
    }

    pub fn expand_program(program: Program) -> Result<Program, ExpandError> {
        Session::for_program(&program).lower(program)
    }

    /// Lower every macro call in `source` and render the primitive-only
    /// result in fixed columns.
    pub fn expand(source: &str) -> Result<String, ExpandError> {
        let program = Program::parse(source)?;
        let lowered = expand_program(program)?;
        Ok(emitter::render(&lowered))
    }

}

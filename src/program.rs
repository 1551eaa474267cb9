pub mod program {
    use wordmachine_core::isa::isa::{Opcode, Register};

    use crate::error::error::ExpandError;
    use crate::operand::operand::{self, Operand};
    use crate::pseudo_ops::pseudo_ops::MacroKind;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Instruction {
        pub mnemonic: String,
        pub operands: Vec<Operand>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MacroCall {
        pub kind: MacroKind,
        pub operands: Vec<Operand>,
        /// Source line the call came from; lowered calls inherit it.
        pub line: usize,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Body {
        Empty,
        /// A bare literal or label name occupying one word.
        Data(Operand),
        Instruction(Instruction),
        Macro(MacroCall),
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Line {
        pub label: Option<String>,
        pub body: Body,
    }

    impl Line {
        pub fn new(body: Body) -> Line {
            Line { label: None, body }
        }

        pub fn labelled(label: String, body: Body) -> Line {
            Line { label: Some(label), body }
        }

        pub fn instruction(opcode: Opcode, operands: Vec<Operand>) -> Line {
            Line::new(Body::Instruction(Instruction {
                mnemonic: opcode.mnemonic().to_string(),
                operands,
            }))
        }

        pub fn call(kind: MacroKind, operands: Vec<Operand>, line: usize) -> Line {
            Line::new(Body::Macro(MacroCall { kind, operands, line }))
        }

        pub fn is_macro(&self) -> bool {
            matches!(self.body, Body::Macro(_))
        }

        /// Every label this line defines or mentions.
        pub fn label_names(&self) -> impl Iterator<Item = &str> {
            let operands: &[Operand] = match &self.body {
                Body::Empty => &[],
                Body::Data(operand) => std::slice::from_ref(operand),
                Body::Instruction(instr) => &instr.operands,
                Body::Macro(call) => &call.operands,
            };
            self.label
                .as_deref()
                .into_iter()
                .chain(operands.iter().filter_map(Operand::label))
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct Program {
        pub lines: Vec<Line>,
    }

    impl Program {
        pub fn parse(source: &str) -> Result<Program, ExpandError> {
            let lines = source
                .lines()
                .enumerate()
                .map(|(idx, raw)| parse_line(raw, idx + 1))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Program { lines })
        }

        pub fn label_names(&self) -> impl Iterator<Item = &str> {
            self.lines.iter().flat_map(Line::label_names)
        }

        pub fn macro_count(&self) -> usize {
            self.lines.iter().filter(|line| line.is_macro()).count()
        }
    }

    pub fn strip_comments(line: &str) -> &str {
        match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        }
    }

    /// Mnemonics written entirely in upper case name macros.
    pub fn looks_like_macro(mnemonic: &str) -> bool {
        mnemonic.bytes().any(|b| b.is_ascii_uppercase())
            && !mnemonic.bytes().any(|b| b.is_ascii_lowercase())
    }

    /// Mnemonics and register names read back as something else once a
    /// label is written out as a bare data word.
    pub fn is_reserved(name: &str) -> bool {
        MacroKind::from_mnemonic(name).is_some()
            || Opcode::from_mnemonic(name).is_some()
            || Register::parse(name).is_some()
    }

    fn check_label(name: &str, line_no: usize) -> Result<(), ExpandError> {
        if is_reserved(name) {
            return Err(ExpandError::ReservedLabel { line: line_no, name: name.to_string() });
        }
        Ok(())
    }

    pub fn parse_line(raw: &str, line_no: usize) -> Result<Line, ExpandError> {
        let tokens: Vec<&str> = strip_comments(raw).split_whitespace().collect();
        let malformed = |token: &str| ExpandError::MalformedOperand {
            line: line_no,
            token: token.to_string(),
        };

        let (label, rest) = match tokens.split_first() {
            Some((first, rest)) if first.ends_with(':') => {
                let name = first.trim_end_matches(':');
                if !operand::is_identifier(name) {
                    return Err(malformed(*first));
                }
                check_label(name, line_no)?;
                (Some(name.to_string()), rest)
            }
            _ => (None, &tokens[..]),
        };

        let Some((head, args)) = rest.split_first() else {
            return Ok(Line { label, body: Body::Empty });
        };

        let body = if args.is_empty() {
            if let Some(kind) = MacroKind::from_mnemonic(head) {
                Body::Macro(MacroCall { kind, operands: Vec::new(), line: line_no })
            } else if Opcode::from_mnemonic(head).is_some() {
                Body::Instruction(Instruction { mnemonic: head.to_string(), operands: Vec::new() })
            } else {
                match operand::parse(head) {
                    Some(value @ (Operand::Immediate(_) | Operand::Label(_))) => Body::Data(value),
                    _ => return Err(malformed(*head)),
                }
            }
        } else {
            let operands = operand::parse_args(args).map_err(|token| malformed(token.as_str()))?;
            for name in operands.iter().filter_map(Operand::label) {
                check_label(name, line_no)?;
            }
            if let Some(kind) = MacroKind::from_mnemonic(head) {
                Body::Macro(MacroCall { kind, operands, line: line_no })
            } else if looks_like_macro(head) {
                return Err(ExpandError::UnknownMacro {
                    line: line_no,
                    mnemonic: head.to_string(),
                });
            } else {
                Body::Instruction(Instruction { mnemonic: head.to_string(), operands })
            }
        };

        Ok(Line { label, body })
    }

}

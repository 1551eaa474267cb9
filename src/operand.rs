pub mod operand {
    use std::fmt;

    use wordmachine_core::isa::isa::{Register, Word};

    /// One macro or instruction argument.
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub enum Operand {
        Register(Register),
        Immediate(Word),
        /// `base + delta`; the magnitude of `delta` always fits a word.
        Offset { base: Register, delta: i64 },
        Label(String),
    }

    impl Operand {
        pub fn register(&self) -> Option<Register> {
            match self {
                Operand::Register(reg) => Some(*reg),
                _ => None,
            }
        }

        pub fn label(&self) -> Option<&str> {
            match self {
                Operand::Label(name) => Some(name),
                _ => None,
            }
        }
    }

    impl From<Register> for Operand {
        fn from(reg: Register) -> Operand {
            Operand::Register(reg)
        }
    }

    impl From<Word> for Operand {
        fn from(value: Word) -> Operand {
            Operand::Immediate(value)
        }
    }

    impl From<&str> for Operand {
        fn from(name: &str) -> Operand {
            Operand::Label(name.to_string())
        }
    }

    impl From<String> for Operand {
        fn from(name: String) -> Operand {
            Operand::Label(name)
        }
    }

    impl fmt::Display for Operand {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Operand::Register(reg) => write!(f, "{reg}"),
                Operand::Immediate(value) => write!(f, "{value:#x}"),
                Operand::Offset { base, delta } if *delta < 0 => {
                    write!(f, "{base}-{:#x}", delta.unsigned_abs())
                }
                Operand::Offset { base, delta } => write!(f, "{base}+{delta:#x}"),
                Operand::Label(name) => write!(f, "{name}"),
            }
        }
    }

    /// Decimal or `0x` hex, unsigned, must fit a word.
    pub fn parse_number(text: &str) -> Option<Word> {
        if let Some(hex) = text.strip_prefix("0x") {
            if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            Word::from_str_radix(hex, 16).ok()
        } else {
            if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            text.parse::<Word>().ok()
        }
    }

    /// Names start with a letter or underscore so an oversized literal is
    /// never mistaken for one.
    pub fn is_identifier(text: &str) -> bool {
        match text.as_bytes().first() {
            Some(first) if !first.is_ascii_digit() => {
                text.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
            }
            _ => false,
        }
    }

    fn parse_offset(token: &str) -> Option<Operand> {
        let split = token.find(['+', '-'])?;
        let base = Register::parse(&token[..split])?;
        let magnitude = parse_number(&token[split + 1..])? as i64;
        let delta = if token.as_bytes()[split] == b'-' { -magnitude } else { magnitude };
        Some(Operand::Offset { base, delta })
    }

    /// Classify a single token. Grammars are tried in order: register,
    /// literal, register with offset, label.
    pub fn parse(token: &str) -> Option<Operand> {
        if let Some(reg) = Register::parse(token) {
            return Some(Operand::Register(reg));
        }
        if let Some(value) = parse_number(token) {
            return Some(Operand::Immediate(value));
        }
        if let Some(offset) = parse_offset(token) {
            return Some(offset);
        }
        if is_identifier(token) {
            return Some(Operand::Label(token.to_string()));
        }
        None
    }

    /// Parse an argument list, folding `reg + lit` written as three tokens
    /// back into one offset operand. Returns the first bad token on failure.
    pub fn parse_args<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Operand>, String> {
        let mut operands = Vec::with_capacity(tokens.len());
        let mut idx = 0;

        while idx < tokens.len() {
            let folded = tokens
                .get(idx + 1)
                .map(|sign| matches!(sign.as_ref(), "+" | "-"))
                .unwrap_or(false)
                && idx + 2 < tokens.len();

            let (text, used) = if folded {
                let joined = format!(
                    "{}{}{}",
                    tokens[idx].as_ref(),
                    tokens[idx + 1].as_ref(),
                    tokens[idx + 2].as_ref()
                );
                (joined, 3)
            } else {
                (tokens[idx].as_ref().to_string(), 1)
            };

            match parse(&text) {
                Some(operand) => operands.push(operand),
                None => return Err(text),
            }
            idx += used;
        }

        Ok(operands)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn reg(idx: u8) -> Register {
            Register::new(idx).unwrap()
        }

        #[test]
        fn classifies_each_grammar() {
            assert_eq!(parse("r15"), Some(Operand::Register(reg(15))));
            assert_eq!(parse("42"), Some(Operand::Immediate(42)));
            assert_eq!(parse("0xdeadbeef"), Some(Operand::Immediate(0xdeadbeef)));
            assert_eq!(parse("r3+24"), Some(Operand::Offset { base: reg(3), delta: 24 }));
            assert_eq!(
                parse("r15-0xabc"),
                Some(Operand::Offset { base: reg(15), delta: -0xabc })
            );
            assert_eq!(parse("label_1"), Some(Operand::Label("label_1".into())));
            // not a register, so it is an ordinary name
            assert_eq!(parse("r16"), Some(Operand::Label("r16".into())));
        }

        #[test]
        fn rejects_garbage() {
            assert_eq!(parse("0x"), None);
            assert_eq!(parse("4294967296"), None);
            assert_eq!(parse("r3+"), None);
            assert_eq!(parse("a-b"), None);
            assert_eq!(parse("foo.bar"), None);
            assert_eq!(parse(""), None);
        }

        #[test]
        fn folds_split_offsets() {
            let operands = parse_args(&["r1", "+", "8", "r2", "r3-4"]).unwrap();
            assert_eq!(
                operands,
                vec![
                    Operand::Offset { base: reg(1), delta: 8 },
                    Operand::Register(reg(2)),
                    Operand::Offset { base: reg(3), delta: -4 },
                ]
            );
            assert_eq!(parse_args(&["r1", "+"]), Err("+".to_string()));
            assert_eq!(parse_args(&["r1", "%", "2"]), Err("%".to_string()));
        }

        #[test]
        fn display_is_reparseable() {
            for text in ["r4", "0x25", "r1+0x8", "r2-0x10", "_unique_3"] {
                let operand = parse(text).unwrap();
                assert_eq!(operand.to_string(), text);
                assert_eq!(parse(&operand.to_string()), Some(operand));
            }
        }
    }
}

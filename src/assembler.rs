pub mod assembler {
    use std::collections::HashMap;

    use tracing::{debug, trace};
    use wordmachine_core::isa::isa::{Opcode, Register, WORD_BYTES, Word, encode_copy, encode_regs};

    use crate::error::error::AsmError;
    use crate::operand::operand::{self, Operand};
    use crate::program::program::strip_comments;

    #[derive(Debug, Clone)]
    enum Expr {
        Num(Word),
        Label(String),
    }

    #[derive(Debug, Clone)]
    enum Stmt {
        Data(Expr),
        Regs(Opcode, Vec<Register>),
        Copy(Expr, Register),
    }

    #[derive(Debug, Clone)]
    struct StmtLine {
        addr: Word,
        line_no: usize,
        stmt: Stmt,
    }

    /// Two-pass assembler for primitive instructions and data words.
    /// Pass one binds labels to byte addresses from 0, pass two encodes.
    #[derive(Debug, Default)]
    pub struct Assembler {
        labels: HashMap<String, Word>,
        lines: Vec<StmtLine>,
    }

    impl Assembler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AsmError> {
            self.first_pass(source)?;
            self.second_pass()
        }

        pub fn symbols(&self) -> &HashMap<String, Word> {
            &self.labels
        }

        fn first_pass(&mut self, source: &str) -> Result<(), AsmError> {
            trace!("starting pass 1");
            let mut pc: Word = 0;

            for (idx, raw_line) in source.lines().enumerate() {
                let line_no = idx + 1;
                let tokens: Vec<&str> = strip_comments(raw_line).split_whitespace().collect();
                if tokens.is_empty() {
                    continue;
                }

                let rest = match parse_inline_label(&tokens) {
                    Some((label, rest)) => {
                        self.insert_label(label, pc, line_no)?;
                        rest
                    }
                    None => &tokens[..],
                };
                if rest.is_empty() {
                    continue;
                }

                let stmt = parse_stmt(rest, line_no)?;
                self.lines.push(StmtLine { addr: pc, line_no, stmt });
                pc = pc
                    .checked_add(WORD_BYTES)
                    .ok_or(AsmError::AddressOverflow { line: line_no })?;
            }

            debug!(labels = self.labels.len(), words = self.lines.len(), "pass 1 done");
            Ok(())
        }

        fn second_pass(&self) -> Result<Vec<u8>, AsmError> {
            trace!("starting pass 2");
            let mut output = Vec::with_capacity(self.lines.len() * WORD_BYTES as usize);

            for line in &self.lines {
                let word = self.emit_stmt(&line.stmt, line.line_no)?;
                trace!(addr = line.addr, word = format_args!("{word:#010x}"), "emit");
                output.extend_from_slice(&word.to_be_bytes());
            }

            Ok(output)
        }

        fn emit_stmt(&self, stmt: &Stmt, line_no: usize) -> Result<Word, AsmError> {
            match stmt {
                Stmt::Data(expr) => self.resolve_expr(expr, line_no),
                Stmt::Regs(op, regs) => Ok(encode_regs(*op, regs)),
                Stmt::Copy(expr, dest) => {
                    let value = self.resolve_expr(expr, line_no)?;
                    encode_copy(value, *dest).ok_or(AsmError::ImmediateTooLarge { line: line_no, value })
                }
            }
        }

        fn resolve_expr(&self, expr: &Expr, line_no: usize) -> Result<Word, AsmError> {
            match expr {
                Expr::Num(value) => Ok(*value),
                Expr::Label(name) => self.labels.get(name).copied().ok_or_else(|| AsmError::UndefinedLabel {
                    line: line_no,
                    name: name.clone(),
                }),
            }
        }

        fn insert_label(&mut self, name: &str, addr: Word, line_no: usize) -> Result<(), AsmError> {
            if self.labels.contains_key(name) {
                return Err(AsmError::DuplicateLabel { line: line_no, name: name.to_string() });
            }
            self.labels.insert(name.to_string(), addr);
            Ok(())
        }
    }

    pub fn assemble(source: &str) -> Result<Vec<u8>, AsmError> {
        Assembler::new().assemble(source)
    }

    fn parse_inline_label<'a>(tokens: &'a [&'a str]) -> Option<(&'a str, &'a [&'a str])> {
        let (first, rest) = tokens.split_first()?;
        let name = first.strip_suffix(':')?;
        Some((name, rest))
    }

    fn parse_expr(operand: Operand) -> Option<Expr> {
        match operand {
            Operand::Immediate(value) => Some(Expr::Num(value)),
            Operand::Label(name) => Some(Expr::Label(name)),
            _ => None,
        }
    }

    fn parse_stmt(tokens: &[&str], line_no: usize) -> Result<Stmt, AsmError> {
        let (head, args) = match tokens.split_first() {
            Some(split) => split,
            None => {
                return Err(AsmError::UnknownMnemonic { line: line_no, mnemonic: String::new() });
            }
        };

        let Some(op) = Opcode::from_mnemonic(head) else {
            if !args.is_empty() {
                return Err(AsmError::UnknownMnemonic { line: line_no, mnemonic: head.to_string() });
            }
            return operand::parse(head)
                .and_then(parse_expr)
                .map(Stmt::Data)
                .ok_or_else(|| AsmError::MalformedOperand { line: line_no, token: head.to_string() });
        };

        let operands = operand::parse_args(args)
            .map_err(|token| AsmError::MalformedOperand { line: line_no, token })?;

        if op == Opcode::Copy {
            return parse_copy(operands, line_no);
        }

        let (expected, description) = match op {
            Opcode::Zjump | Opcode::Load | Opcode::Store => (2, "two registers"),
            Opcode::Stop => (0, "no operands"),
            _ => (3, "three registers"),
        };
        let bad = AsmError::BadOperands { line: line_no, mnemonic: op.mnemonic(), expected: description };

        if operands.len() != expected {
            return Err(bad);
        }
        let regs = operands
            .iter()
            .map(Operand::register)
            .collect::<Option<Vec<_>>>()
            .ok_or(bad)?;
        Ok(Stmt::Regs(op, regs))
    }

    fn parse_copy(operands: Vec<Operand>, line_no: usize) -> Result<Stmt, AsmError> {
        let bad = AsmError::BadOperands {
            line: line_no,
            mnemonic: Opcode::Copy.mnemonic(),
            expected: "an immediate or label and a register",
        };
        let [value, dest]: [Operand; 2] = operands.try_into().map_err(|_| bad.clone())?;
        match (parse_expr(value), dest.register()) {
            (Some(expr), Some(dest)) => Ok(Stmt::Copy(expr, dest)),
            _ => Err(bad),
        }
    }

}

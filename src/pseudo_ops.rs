pub mod pseudo_ops {
    use std::fmt;

    use wordmachine_core::isa::isa::{
        HALF_WORD_BITS, HALF_WORD_MASK, Opcode, PC, RETURN_ADDRESS, RETURN_VALUE, Register, SCRATCH,
        SIGN_MASK, SP, WORD_BYTES, Word,
    };

    use crate::error::error::ExpandError;
    use crate::labels::labels::LabelRegistry;
    use crate::operand::operand::Operand;
    use crate::program::program::{Body, Instruction, Line, MacroCall};

    const WS0: Register = SCRATCH[0];
    const WS1: Register = SCRATCH[1];
    const WS2: Register = SCRATCH[2];
    const WS3: Register = SCRATCH[3];

    const ALL_ONES: Word = Word::MAX;
    const NO_OPERANDS: [Operand; 0] = [];

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum Arity {
        Exactly(usize),
        AtLeast(usize),
        AtMost(usize),
    }

    impl Arity {
        pub fn accepts(self, count: usize) -> bool {
            match self {
                Arity::Exactly(n) => count == n,
                Arity::AtLeast(n) => count >= n,
                Arity::AtMost(n) => count <= n,
            }
        }
    }

    impl fmt::Display for Arity {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Arity::Exactly(n) => write!(f, "{n}"),
                Arity::AtLeast(n) => write!(f, "at least {n}"),
                Arity::AtMost(n) => write!(f, "at most {n}"),
            }
        }
    }

    // one row per macro: variant, mnemonic as written in source, operand count.
    macro_rules! macro_kinds {
        ($($kind:ident => $name:literal, $arity:expr;)*) => {
            #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
            pub enum MacroKind {
                $($kind,)*
            }

            impl MacroKind {
                pub const ALL: &'static [MacroKind] = &[$(MacroKind::$kind,)*];

                pub fn mnemonic(self) -> &'static str {
                    match self {
                        $(MacroKind::$kind => $name,)*
                    }
                }

                pub fn arity(self) -> Arity {
                    match self {
                        $(MacroKind::$kind => $arity,)*
                    }
                }
            }
        };
    }

    macro_kinds! {
        Noth => "NOTH", Arity::Exactly(0);
        Add => "ADD", Arity::Exactly(3);
        Sub => "SUB", Arity::Exactly(3);
        Mult => "MULT", Arity::Exactly(3);
        Div => "DIV", Arity::Exactly(3);
        And => "AND", Arity::Exactly(3);
        Or => "OR", Arity::Exactly(3);
        Not => "NOT", Arity::Exactly(2);
        Neg => "NEG", Arity::Exactly(2);
        Xor => "XOR", Arity::Exactly(3);
        Mod => "MOD", Arity::Exactly(3);
        Exp => "EXP", Arity::Exactly(3);
        Lshift => "LSHIFT", Arity::Exactly(3);
        Rshift => "RSHIFT", Arity::Exactly(3);
        Copy => "COPY", Arity::Exactly(2);
        Load => "LOAD", Arity::Exactly(2);
        Store => "STORE", Arity::Exactly(2);
        Push => "PUSH", Arity::Exactly(1);
        Pop => "POP", Arity::Exactly(1);
        Jump => "JUMP", Arity::Exactly(1);
        Zjump => "ZJUMP", Arity::Exactly(2);
        Nzjump => "NZJUMP", Arity::Exactly(2);
        Ejump => "EJUMP", Arity::Exactly(3);
        Nejump => "NEJUMP", Arity::Exactly(3);
        Gjump => "GJUMP", Arity::Exactly(3);
        Gejump => "GEJUMP", Arity::Exactly(3);
        Ljump => "LJUMP", Arity::Exactly(3);
        Lejump => "LEJUMP", Arity::Exactly(3);
        Call => "CALL", Arity::AtLeast(1);
        Return => "RETURN", Arity::AtMost(1);
        If => "IF", Arity::AtLeast(1);
        Endif => "ENDIF", Arity::Exactly(0);
        While => "WHILE", Arity::AtLeast(1);
        Endwhile => "ENDWHILE", Arity::Exactly(0);
    }

    impl MacroKind {
        /// Exact, case-sensitive lookup.
        pub fn from_mnemonic(mnemonic: &str) -> Option<MacroKind> {
            MacroKind::ALL.iter().copied().find(|kind| kind.mnemonic() == mnemonic)
        }

        fn alu_opcode(self) -> Option<Opcode> {
            match self {
                MacroKind::Add => Some(Opcode::Add),
                MacroKind::Sub => Some(Opcode::Sub),
                MacroKind::Mult => Some(Opcode::Mult),
                MacroKind::Div => Some(Opcode::Div),
                MacroKind::And => Some(Opcode::And),
                MacroKind::Or => Some(Opcode::Or),
                _ => None,
            }
        }
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum ScopeKind {
        If,
        While,
    }

    impl ScopeKind {
        fn opener(self) -> &'static str {
            match self {
                ScopeKind::If => MacroKind::If.mnemonic(),
                ScopeKind::While => MacroKind::While.mnemonic(),
            }
        }
    }

    /// Labels of conditionals and loops that have been opened but not yet
    /// closed, plus the order they were opened in.
    #[derive(Debug, Clone, Default)]
    pub struct Scopes {
        open: Vec<(ScopeKind, usize)>,
        pending_if: Vec<String>,
        pending_loop: Vec<String>,
    }

    impl Scopes {
        pub fn new() -> Scopes {
            Scopes::default()
        }

        pub fn depth(&self) -> usize {
            self.open.len()
        }

        fn open(&mut self, kind: ScopeKind, label: String, line: usize) {
            self.open.push((kind, line));
            match kind {
                ScopeKind::If => self.pending_if.push(label),
                ScopeKind::While => self.pending_loop.push(label),
            }
        }

        fn close(&mut self, kind: ScopeKind, closer: MacroKind, line: usize) -> Result<String, ExpandError> {
            let unmatched = ExpandError::UnmatchedClose { line, mnemonic: closer.mnemonic() };
            if self.open.pop().map(|(open, _)| open) != Some(kind) {
                return Err(unmatched);
            }
            let pending = match kind {
                ScopeKind::If => &mut self.pending_if,
                ScopeKind::While => &mut self.pending_loop,
            };
            pending.pop().ok_or(unmatched)
        }

        /// A pass must close every scope it opens.
        pub fn ensure_closed(&self) -> Result<(), ExpandError> {
            match self.open.last() {
                Some(&(kind, line)) => Err(ExpandError::UnclosedScope {
                    line,
                    mnemonic: kind.opener(),
                    count: self.open.len(),
                }),
                None => Ok(()),
            }
        }
    }

    fn r(reg: Register) -> Operand {
        Operand::Register(reg)
    }

    fn imm(value: Word) -> Operand {
        Operand::Immediate(value)
    }

    fn label(name: &str) -> Operand {
        Operand::Label(name.to_string())
    }

    /// The no-op every label anchor expands to.
    pub fn no_op() -> Body {
        Body::Instruction(Instruction {
            mnemonic: Opcode::And.mnemonic().to_string(),
            operands: vec![r(SP), r(SP), r(SP)],
        })
    }

    struct Block {
        lines: Vec<Line>,
        /// Source line stamped on every nested call.
        line: usize,
    }

    impl Block {
        fn at(line: usize) -> Block {
            Block { lines: Vec::new(), line }
        }

        fn op(&mut self, opcode: Opcode, operands: impl Into<Vec<Operand>>) {
            self.lines.push(Line::instruction(opcode, operands.into()));
        }

        fn call(&mut self, kind: MacroKind, operands: impl Into<Vec<Operand>>) {
            self.lines.push(Line::call(kind, operands.into(), self.line));
        }

        fn labelled_call(&mut self, name: String, kind: MacroKind, operands: impl Into<Vec<Operand>>) {
            self.lines.push(Line {
                label: Some(name),
                ..Line::call(kind, operands.into(), self.line)
            });
        }

        // `name: NOTH`
        fn define(&mut self, name: String) {
            self.labelled_call(name, MacroKind::Noth, NO_OPERANDS);
        }

        fn data(&mut self, value: Operand) {
            self.lines.push(Line::new(Body::Data(value)));
        }

        fn patch_first_operand(&mut self, idx: usize, value: Operand) {
            if let Some(Line { body: Body::Instruction(instr), .. }) = self.lines.get_mut(idx) {
                if let Some(slot) = instr.operands.first_mut() {
                    *slot = value;
                }
            }
        }
    }

    fn spare_scratch(avoid: &[Register]) -> Register {
        SCRATCH
            .iter()
            .copied()
            .find(|reg| !avoid.contains(reg))
            .unwrap_or(WS3)
    }

    fn register_at(call: &MacroCall, idx: usize, position: &'static str) -> Result<Register, ExpandError> {
        let operand = &call.operands[idx];
        operand.register().ok_or_else(|| ExpandError::ExpectedRegister {
            line: call.line,
            mnemonic: call.kind.mnemonic(),
            position,
            found: operand.to_string(),
        })
    }

    // an operand read after `pushed` words went on the stack; stack-relative
    // reads are moved up so they still see the caller's slot.
    fn past_pushes(operand: &Operand, pushed: usize) -> Operand {
        let shift = pushed as i64 * WORD_BYTES as i64;
        match operand {
            Operand::Register(reg) if *reg == SP && pushed > 0 => Operand::Offset { base: SP, delta: shift },
            Operand::Offset { base, delta } if *base == SP => Operand::Offset { base: SP, delta: delta + shift },
            other => other.clone(),
        }
    }

    // full 32-bit constant from two half words; copy only carries 24 bits.
    fn load_immediate(block: &mut Block, value: Word, dest: Register, avoid: &[Register]) {
        let mut busy = avoid.to_vec();
        busy.push(dest);
        let temp = spare_scratch(&busy);

        block.op(Opcode::Copy, [imm(value >> HALF_WORD_BITS), r(dest)]);
        block.op(Opcode::Copy, [imm(1 << HALF_WORD_BITS), r(temp)]);
        block.op(Opcode::Mult, [r(dest), r(temp), r(dest)]);
        block.op(Opcode::Copy, [imm(value & HALF_WORD_MASK), r(temp)]);
        block.op(Opcode::Add, [r(dest), r(temp), r(dest)]);
    }

    // read the label's address out of an inline data word, then hop over it.
    fn load_label_address(block: &mut Block, name: &str, dest: Register) {
        let addr = spare_scratch(&[dest]);
        let after = spare_scratch(&[dest, addr]);

        let start = block.lines.len();
        block.op(Opcode::And, [r(PC), r(PC), r(dest)]);
        let skip_slot = block.lines.len();
        block.op(Opcode::Copy, [imm(0), r(addr)]);
        block.op(Opcode::Add, [r(dest), r(addr), r(addr)]);
        block.op(Opcode::Copy, [imm(WORD_BYTES), r(after)]);
        block.op(Opcode::Add, [r(addr), r(after), r(after)]);
        block.op(Opcode::Load, [r(addr), r(dest)]);
        block.op(Opcode::Copy, [imm(0), r(addr)]);
        block.op(Opcode::Zjump, [r(addr), r(after)]);

        let skip = (block.lines.len() - start) as Word * WORD_BYTES;
        block.patch_first_operand(skip_slot, imm(skip));
        block.data(label(name));
    }

    fn copy(block: &mut Block, src: &Operand, dest: Register) {
        match src {
            Operand::Register(reg) => block.op(Opcode::And, [r(*reg), r(*reg), r(dest)]),
            Operand::Immediate(value) => load_immediate(block, *value, dest, &[]),
            Operand::Offset { base, delta } => {
                let magnitude = delta.unsigned_abs() as Word;
                let combine = if *delta < 0 { Opcode::Sub } else { Opcode::Add };
                if *base == dest {
                    let held = spare_scratch(&[dest]);
                    load_immediate(block, magnitude, held, &[dest]);
                    block.op(combine, [r(dest), r(held), r(dest)]);
                } else {
                    load_immediate(block, magnitude, dest, &[*base]);
                    block.op(combine, [r(*base), r(dest), r(dest)]);
                }
            }
            Operand::Label(name) => load_label_address(block, name, dest),
        }
    }

    fn signed_jump(
        block: &mut Block,
        labels: &mut LabelRegistry,
        [a, b, target]: [&Operand; 3],
        strict: bool,
    ) {
        let a_nonneg = labels.new_label();
        let same_sign = labels.new_label();
        let done = labels.new_label();
        let sign = || imm(SIGN_MASK);

        // x / 0x80000000 is 1 exactly when x is negative.
        block.call(MacroKind::Div, [a.clone(), sign(), r(WS3)]);
        block.call(MacroKind::Zjump, [r(WS3), label(&a_nonneg)]);
        block.call(MacroKind::Div, [b.clone(), sign(), r(WS3)]);
        block.call(MacroKind::Zjump, [r(WS3), label(&done)]);
        block.call(MacroKind::Jump, [label(&same_sign)]);
        block.labelled_call(a_nonneg, MacroKind::Div, [b.clone(), sign(), r(WS3)]);
        block.call(MacroKind::Zjump, [r(WS3), label(&same_sign)]);
        block.call(MacroKind::Jump, [target.clone()]);

        // signs agree, so the difference cannot overflow.
        if strict {
            block.labelled_call(same_sign, MacroKind::Sub, [b.clone(), a.clone(), r(WS3)]);
            block.call(MacroKind::Div, [r(WS3), sign(), r(WS3)]);
            block.call(MacroKind::Sub, [r(WS3), imm(1), r(WS3)]);
        } else {
            block.labelled_call(same_sign, MacroKind::Sub, [a.clone(), b.clone(), r(WS3)]);
            block.call(MacroKind::Div, [r(WS3), sign(), r(WS3)]);
        }
        block.call(MacroKind::Zjump, [r(WS3), target.clone()]);
        block.define(done);
    }

    fn shift(block: &mut Block, step: MacroKind, [value, count]: [&Operand; 2], dest: Register) {
        block.call(MacroKind::Push, [value.clone()]);
        block.call(MacroKind::Copy, [past_pushes(count, 1), r(RETURN_VALUE)]);
        block.call(MacroKind::While, [r(RETURN_VALUE)]);
        block.call(MacroKind::Load, [r(SP), r(WS3)]);
        block.call(step, [r(WS3), imm(2), r(WS3)]);
        block.call(MacroKind::Store, [r(WS3), r(SP)]);
        block.call(MacroKind::Sub, [r(RETURN_VALUE), imm(1), r(RETURN_VALUE)]);
        block.call(MacroKind::Endwhile, NO_OPERANDS);
        block.call(MacroKind::Pop, [r(dest)]);
    }

    // stack frame while looping: [sp] result, [sp+4] exponent, [sp+8] base.
    fn exp(block: &mut Block, [base, power]: [&Operand; 2], dest: Register) {
        let slot = |offset: i64| Operand::Offset { base: SP, delta: offset };

        block.call(MacroKind::Push, [base.clone()]);
        block.call(MacroKind::Push, [past_pushes(power, 1)]);
        block.call(MacroKind::Push, [imm(1)]);
        block.call(MacroKind::Load, [slot(4), r(RETURN_VALUE)]);
        block.call(MacroKind::While, [r(RETURN_VALUE)]);

        block.call(MacroKind::Load, [slot(4), r(WS3)]);
        block.call(MacroKind::And, [r(WS3), imm(1), r(WS3)]);
        block.call(MacroKind::If, [r(WS3)]);
        block.call(MacroKind::Load, [r(SP), r(WS3)]);
        block.call(MacroKind::Load, [slot(8), r(WS2)]);
        block.call(MacroKind::Mult, [r(WS3), r(WS2), r(WS3)]);
        block.call(MacroKind::Store, [r(WS3), r(SP)]);
        block.call(MacroKind::Endif, NO_OPERANDS);

        block.call(MacroKind::Load, [slot(8), r(WS3)]);
        block.call(MacroKind::Mult, [r(WS3), r(WS3), r(WS3)]);
        block.call(MacroKind::Store, [r(WS3), slot(8)]);

        block.call(MacroKind::Load, [slot(4), r(WS3)]);
        block.call(MacroKind::Div, [r(WS3), imm(2), r(WS3)]);
        block.call(MacroKind::Copy, [r(WS3), r(RETURN_VALUE)]);
        block.call(MacroKind::Store, [r(RETURN_VALUE), slot(4)]);
        block.call(MacroKind::Endwhile, NO_OPERANDS);

        block.call(MacroKind::Pop, [r(dest)]);
        block.call(MacroKind::Add, [r(SP), imm(2 * WORD_BYTES), r(SP)]);
    }

    /// Expand one macro call by a single level. The result may contain
    /// further macro calls; the driver keeps rewriting until none remain.
    pub fn lower(
        call: &MacroCall,
        labels: &mut LabelRegistry,
        scopes: &mut Scopes,
    ) -> Result<Vec<Line>, ExpandError> {
        let kind = call.kind;
        let ops = call.operands.as_slice();
        let arity = kind.arity();
        if !arity.accepts(ops.len()) {
            return Err(ExpandError::Arity {
                line: call.line,
                mnemonic: kind.mnemonic(),
                expected: arity,
                found: ops.len(),
            });
        }

        let mut block = Block::at(call.line);
        match kind {
            MacroKind::Noth => block.op(Opcode::And, [r(SP), r(SP), r(SP)]),

            MacroKind::Add
            | MacroKind::Sub
            | MacroKind::Mult
            | MacroKind::Div
            | MacroKind::And
            | MacroKind::Or => {
                let dest = register_at(call, 2, "destination")?;
                if let Some(opcode) = kind.alu_opcode() {
                    block.call(MacroKind::Copy, [ops[0].clone(), r(WS3)]);
                    block.call(MacroKind::Copy, [ops[1].clone(), r(WS2)]);
                    block.op(opcode, [r(WS3), r(WS2), r(dest)]);
                }
            }

            MacroKind::Not => {
                let dest = register_at(call, 1, "destination")?;
                block.call(MacroKind::Copy, [ops[0].clone(), r(dest)]);
                block.call(MacroKind::Mult, [r(dest), imm(ALL_ONES), r(dest)]);
                block.call(MacroKind::Sub, [r(dest), imm(1), r(dest)]);
            }
            MacroKind::Neg => {
                let dest = register_at(call, 1, "destination")?;
                block.call(MacroKind::Not, [ops[0].clone(), r(dest)]);
                block.call(MacroKind::Add, [r(dest), imm(1), r(dest)]);
            }
            MacroKind::Xor => {
                let dest = register_at(call, 2, "destination")?;
                // (a | b) & !(a & b), the negated half parked on the stack
                block.call(MacroKind::And, [ops[0].clone(), ops[1].clone(), r(WS3)]);
                block.call(MacroKind::Not, [r(WS3), r(WS3)]);
                block.call(MacroKind::Push, [r(WS3)]);
                block.call(MacroKind::Or, [past_pushes(&ops[0], 1), past_pushes(&ops[1], 1), r(WS3)]);
                block.call(MacroKind::Pop, [r(WS2)]);
                block.call(MacroKind::And, [r(WS3), r(WS2), r(dest)]);
            }
            MacroKind::Mod => {
                let dest = register_at(call, 2, "destination")?;
                block.call(MacroKind::Div, [ops[0].clone(), ops[1].clone(), r(WS3)]);
                block.call(MacroKind::Mult, [r(WS3), ops[1].clone(), r(WS3)]);
                block.call(MacroKind::Copy, [r(WS3), r(WS2)]);
                block.call(MacroKind::Sub, [ops[0].clone(), r(WS2), r(dest)]);
            }
            MacroKind::Exp => {
                let dest = register_at(call, 2, "destination")?;
                exp(&mut block, [&ops[0], &ops[1]], dest);
            }
            MacroKind::Lshift | MacroKind::Rshift => {
                let dest = register_at(call, 2, "destination")?;
                let step = if kind == MacroKind::Lshift { MacroKind::Mult } else { MacroKind::Div };
                shift(&mut block, step, [&ops[0], &ops[1]], dest);
            }

            MacroKind::Copy => {
                let dest = register_at(call, 1, "destination")?;
                copy(&mut block, &ops[0], dest);
            }
            MacroKind::Load => {
                let dest = register_at(call, 1, "destination")?;
                block.call(MacroKind::Copy, [ops[0].clone(), r(dest)]);
                block.op(Opcode::Load, [r(dest), r(dest)]);
            }
            MacroKind::Store => {
                block.call(MacroKind::Copy, [ops[0].clone(), r(WS2)]);
                block.call(MacroKind::Copy, [ops[1].clone(), r(WS3)]);
                block.op(Opcode::Store, [r(WS2), r(WS3)]);
            }
            MacroKind::Push => {
                block.call(MacroKind::Copy, [ops[0].clone(), r(WS2)]);
                block.op(Opcode::Copy, [imm(WORD_BYTES), r(WS3)]);
                block.op(Opcode::Sub, [r(SP), r(WS3), r(SP)]);
                block.op(Opcode::Store, [r(WS2), r(SP)]);
            }
            MacroKind::Pop => {
                let dest = register_at(call, 0, "destination")?;
                let temp = if dest == WS1 { WS0 } else { WS1 };
                block.call(MacroKind::Load, [r(SP), r(dest)]);
                block.op(Opcode::Copy, [imm(WORD_BYTES), r(temp)]);
                block.op(Opcode::Add, [r(SP), r(temp), r(SP)]);
            }

            MacroKind::Jump => {
                block.call(MacroKind::Copy, [ops[0].clone(), r(WS2)]);
                block.op(Opcode::Copy, [imm(0), r(WS0)]);
                block.op(Opcode::Zjump, [r(WS0), r(WS2)]);
            }
            MacroKind::Zjump => {
                block.call(MacroKind::Copy, [ops[0].clone(), r(WS2)]);
                block.call(MacroKind::Copy, [ops[1].clone(), r(WS3)]);
                block.op(Opcode::Zjump, [r(WS2), r(WS3)]);
            }
            MacroKind::Nzjump => {
                let skip = labels.new_label();
                block.call(MacroKind::Copy, [ops[0].clone(), r(WS2)]);
                block.call(MacroKind::Copy, [label(&skip), r(WS3)]);
                block.op(Opcode::Zjump, [r(WS2), r(WS3)]);
                block.call(MacroKind::Jump, [ops[1].clone()]);
                block.define(skip);
            }
            MacroKind::Ejump => {
                block.call(MacroKind::Sub, [ops[0].clone(), ops[1].clone(), r(WS3)]);
                block.call(MacroKind::Copy, [ops[2].clone(), r(WS2)]);
                block.op(Opcode::Zjump, [r(WS3), r(WS2)]);
            }
            MacroKind::Nejump => {
                let skip = labels.new_label();
                block.call(MacroKind::Sub, [ops[0].clone(), ops[1].clone(), r(WS3)]);
                block.call(MacroKind::Copy, [label(&skip), r(WS2)]);
                block.op(Opcode::Zjump, [r(WS3), r(WS2)]);
                block.call(MacroKind::Jump, [ops[2].clone()]);
                block.define(skip);
            }
            MacroKind::Gjump => signed_jump(&mut block, labels, [&ops[0], &ops[1], &ops[2]], true),
            MacroKind::Gejump => signed_jump(&mut block, labels, [&ops[0], &ops[1], &ops[2]], false),
            MacroKind::Ljump => {
                block.call(MacroKind::Gjump, [ops[1].clone(), ops[0].clone(), ops[2].clone()]);
            }
            MacroKind::Lejump => {
                block.call(MacroKind::Gejump, [ops[1].clone(), ops[0].clone(), ops[2].clone()]);
            }

            MacroKind::Call => {
                let back = labels.new_label();
                block.call(MacroKind::Push, [label(&back)]);
                for (pushed, arg) in ops[1..].iter().rev().enumerate() {
                    block.call(MacroKind::Push, [past_pushes(arg, pushed + 1)]);
                }
                block.call(MacroKind::Jump, [past_pushes(&ops[0], ops.len())]);
                block.define(back);
            }
            MacroKind::Return => {
                if let Some(value) = ops.first() {
                    block.call(MacroKind::Copy, [value.clone(), r(RETURN_VALUE)]);
                }
                block.call(MacroKind::Pop, [r(RETURN_ADDRESS)]);
                block.call(MacroKind::Jump, [r(RETURN_ADDRESS)]);
            }

            MacroKind::If => {
                match &ops[0] {
                    Operand::Label(_) => block.call(MacroKind::Call, ops.to_vec()),
                    cond if ops.len() == 1 => {
                        block.call(MacroKind::Copy, [cond.clone(), r(RETURN_VALUE)])
                    }
                    _ => {
                        return Err(ExpandError::Arity {
                            line: call.line,
                            mnemonic: kind.mnemonic(),
                            expected: Arity::Exactly(1),
                            found: ops.len(),
                        });
                    }
                }
                let end = labels.new_label();
                scopes.open(ScopeKind::If, end.clone(), call.line);
                block.call(MacroKind::Zjump, [r(RETURN_VALUE), label(&end)]);
            }
            MacroKind::Endif => {
                let end = scopes.close(ScopeKind::If, kind, call.line)?;
                block.define(end);
            }
            MacroKind::While => {
                let top = labels.new_label();
                scopes.open(ScopeKind::While, top.clone(), call.line);
                block.define(top);
                block.call(MacroKind::If, ops.to_vec());
            }
            MacroKind::Endwhile => {
                let top = scopes.close(ScopeKind::While, kind, call.line)?;
                block.call(MacroKind::Jump, [label(&top)]);
                block.call(MacroKind::Endif, NO_OPERANDS);
            }
        }

        Ok(block.lines)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::emitter::emitter::render_line;
        use crate::program::program::parse_line;

        fn lower_text(text: &str, labels: &mut LabelRegistry, scopes: &mut Scopes) -> Result<Vec<String>, ExpandError> {
            let Body::Macro(call) = parse_line(text, 1).unwrap().body else {
                panic!("not a macro call: {text}");
            };
            let lines = lower(&call, labels, scopes)?;
            Ok(lines
                .iter()
                .map(|line| render_line(line).split_whitespace().collect::<Vec<_>>().join(" "))
                .collect())
        }

        fn one_level(text: &str) -> Vec<String> {
            lower_text(text, &mut LabelRegistry::new(), &mut Scopes::new()).unwrap()
        }

        #[test]
        fn mnemonics_are_unique_and_case_sensitive() {
            for kind in MacroKind::ALL {
                assert_eq!(MacroKind::from_mnemonic(kind.mnemonic()), Some(*kind));
            }
            assert_eq!(MacroKind::from_mnemonic("add"), None);
            assert_eq!(MacroKind::from_mnemonic("Push"), None);
        }

        #[test]
        fn arithmetic_goes_through_scratch() {
            assert_eq!(one_level("ADD r1 0x12 r4"), vec!["COPY r1 r10", "COPY 0x12 r9", "add r10 r9 r4"]);
        }

        #[test]
        fn immediate_copy_uses_half_words() {
            assert_eq!(
                one_level("COPY 0xdeadbeef r4"),
                vec![
                    "copy 0xdead r4",
                    "copy 0x10000 r7",
                    "mult r4 r7 r4",
                    "copy 0xbeef r7",
                    "add r4 r7 r4",
                ]
            );
            // scratch temp steps aside when it is the destination
            assert_eq!(one_level("COPY 5 r7")[1], "copy 0x10000 r8");
        }

        #[test]
        fn offset_copy_keeps_base_intact() {
            assert_eq!(one_level("COPY r1-8 r4").last().unwrap(), "sub r1 r4 r4");
            let same = one_level("COPY r4+8 r4");
            assert_eq!(same[0], "copy 0x0 r7");
            assert_eq!(same.last().unwrap(), "add r4 r7 r4");
            // base r7 must not be used as the temp
            let scratch_base = one_level("COPY r7+4 r3");
            assert_eq!(scratch_base[1], "copy 0x10000 r8");
        }

        #[test]
        fn label_copy_skip_counts_its_own_instructions() {
            let lines = one_level("COPY target r5");
            assert_eq!(lines.len(), 9);
            assert_eq!(lines[0], "and r0 r0 r5");
            assert_eq!(lines[1], "copy 0x20 r7");
            assert_eq!(lines[7], "zjump r7 r8");
            assert_eq!(lines[8], "target");
        }

        #[test]
        fn wrong_operand_count() {
            let err = lower_text("PUSH r1 r2", &mut LabelRegistry::new(), &mut Scopes::new());
            assert_eq!(
                err,
                Err(ExpandError::Arity { line: 1, mnemonic: "PUSH", expected: Arity::Exactly(1), found: 2 })
            );
        }

        #[test]
        fn destination_must_be_a_register() {
            let err = lower_text("ADD r1 r2 0x4", &mut LabelRegistry::new(), &mut Scopes::new());
            assert_eq!(
                err,
                Err(ExpandError::ExpectedRegister {
                    line: 1,
                    mnemonic: "ADD",
                    position: "destination",
                    found: "0x4".into(),
                })
            );
        }

        #[test]
        fn scopes_pair_up() {
            let mut labels = LabelRegistry::new();
            let mut scopes = Scopes::new();
            let open = lower_text("IF r4", &mut labels, &mut scopes).unwrap();
            assert_eq!(open, vec!["COPY r4 r2", "ZJUMP r2 _unique_1"]);
            assert_eq!(scopes.depth(), 1);
            assert!(scopes.ensure_closed().is_err());

            let close = lower_text("ENDIF", &mut labels, &mut scopes).unwrap();
            assert_eq!(close, vec!["_unique_1: NOTH"]);
            assert!(scopes.ensure_closed().is_ok());

            let stray = lower_text("ENDWHILE", &mut labels, &mut scopes);
            assert_eq!(stray, Err(ExpandError::UnmatchedClose { line: 1, mnemonic: "ENDWHILE" }));
        }

        #[test]
        fn crossed_scopes_are_rejected() {
            let mut labels = LabelRegistry::new();
            let mut scopes = Scopes::new();
            lower_text("WHILE r4", &mut labels, &mut scopes).unwrap();
            assert_eq!(
                lower_text("ENDIF", &mut labels, &mut scopes),
                Err(ExpandError::UnmatchedClose { line: 1, mnemonic: "ENDIF" })
            );
        }

        #[test]
        fn stack_operands_read_after_a_push_are_rebased() {
            assert_eq!(
                one_level("XOR r1 r4 r5"),
                vec!["AND r1 r4 r10", "NOT r10 r10", "PUSH r10", "OR r1+0x4 r4 r10", "POP r9", "AND r10 r9 r5"]
            );
            assert_eq!(
                one_level("CALL f r1 r1-8"),
                vec!["PUSH _unique_1", "PUSH r1-0x4", "PUSH r1+0x8", "JUMP f", "_unique_1: NOTH"]
            );
            assert_eq!(one_level("LSHIFT r4 r1 r5")[1], "COPY r1+0x4 r2");
        }

        #[test]
        fn nested_calls_keep_the_source_line() {
            let Body::Macro(mut call) = parse_line("EXP r4 r5 r6", 1).unwrap().body else {
                panic!("not a macro call");
            };
            call.line = 7;
            let lines = lower(&call, &mut LabelRegistry::new(), &mut Scopes::new()).unwrap();
            assert!(lines.iter().any(Line::is_macro));
            for line in &lines {
                if let Body::Macro(nested) = &line.body {
                    assert_eq!(nested.line, 7);
                }
            }
        }

        #[test]
        fn if_on_a_function_calls_it() {
            let lines = one_level("IF is_even r5");
            assert_eq!(lines, vec!["CALL is_even r5", "ZJUMP r2 _unique_1"]);
        }
    }
}

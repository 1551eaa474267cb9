pub mod isa {
    use std::fmt;

    /// Everything on this machine is a 32-bit word; arithmetic wraps.
    pub type Word = u32;

    pub const WORD_BYTES: Word = 4;
    pub const HALF_WORD_BITS: u32 = 16;
    pub const HALF_WORD_MASK: Word = (1 << HALF_WORD_BITS) - 1;

    // dividing by this yields 1 iff the top bit of the dividend is set.
    pub const SIGN_MASK: Word = 1 << 31;

    pub const NUM_REGISTERS: usize = 16;

    // `copy` carries a 24-bit immediate between the opcode and register nibbles.
    pub const COPY_IMMEDIATE_BITS: u32 = 24;
    pub const COPY_IMMEDIATE_MAX: Word = (1 << COPY_IMMEDIATE_BITS) - 1;

    /// Conventional initial stack pointer; programs load it themselves.
    pub const STACK_BASE: Word = 0x400;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Register(u8);

    impl Register {
        pub fn new(index: u8) -> Option<Register> {
            if (index as usize) < NUM_REGISTERS {
                Some(Register(index))
            } else {
                None
            }
        }

        pub fn index(self) -> usize {
            self.0 as usize
        }

        /// Accepts exactly `r0`..`r15`; `r01` or `r16` are not registers.
        pub fn parse(name: &str) -> Option<Register> {
            let digits = name.strip_prefix('r')?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            if digits.len() > 1 && digits.starts_with('0') {
                return None;
            }
            let index: u8 = digits.parse().ok()?;
            Register::new(index)
        }
    }

    impl fmt::Display for Register {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "r{}", self.0)
        }
    }

    // register roles are a calling convention, nothing in the engine enforces them.
    pub const PC: Register = Register(0);
    pub const SP: Register = Register(1);
    pub const RETURN_VALUE: Register = Register(2);
    pub const RETURN_ADDRESS: Register = Register(3);

    /// Reserved for macro expansions. Never hold a live value across a macro.
    pub const SCRATCH: [Register; 4] = [Register(7), Register(8), Register(9), Register(10)];

    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub enum Opcode {
        Add,
        Sub,
        Mult,
        Div,
        And,
        Or,
        Zjump,
        Copy,
        Load,
        Store,
        Stop,
    }

    impl Opcode {
        pub const ALL: [Opcode; 11] = [
            Opcode::Add,
            Opcode::Sub,
            Opcode::Mult,
            Opcode::Div,
            Opcode::And,
            Opcode::Or,
            Opcode::Zjump,
            Opcode::Copy,
            Opcode::Load,
            Opcode::Store,
            Opcode::Stop,
        ];

        pub fn nibble(self) -> u8 {
            match self {
                Opcode::Add => 0x0,
                Opcode::Sub => 0x1,
                Opcode::Mult => 0x2,
                Opcode::Div => 0x3,
                Opcode::And => 0x4,
                Opcode::Or => 0x5,
                Opcode::Zjump => 0x6,
                Opcode::Copy => 0x8,
                Opcode::Load => 0x9,
                Opcode::Store => 0xA,
                Opcode::Stop => 0xB,
            }
        }

        pub fn from_nibble(nibble: u8) -> Option<Opcode> {
            Opcode::ALL.iter().copied().find(|op| op.nibble() == nibble)
        }

        pub fn mnemonic(self) -> &'static str {
            match self {
                Opcode::Add => "add",
                Opcode::Sub => "sub",
                Opcode::Mult => "mult",
                Opcode::Div => "div",
                Opcode::And => "and",
                Opcode::Or => "or",
                Opcode::Zjump => "zjump",
                Opcode::Copy => "copy",
                Opcode::Load => "load",
                Opcode::Store => "store",
                Opcode::Stop => "stop",
            }
        }

        pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
            Opcode::ALL.iter().copied().find(|op| op.mnemonic() == mnemonic)
        }

        pub fn is_alu(self) -> bool {
            matches!(
                self,
                Opcode::Add | Opcode::Sub | Opcode::Mult | Opcode::Div | Opcode::And | Opcode::Or
            )
        }
    }

    /// Three-register form shared by the ALU ops, `zjump`, `load`, `store` and `stop`:
    /// opcode nibble, then up to three register nibbles, low bits zero.
    pub fn encode_regs(op: Opcode, regs: &[Register]) -> Word {
        let mut word = (op.nibble() as Word) << 28;
        for (slot, reg) in regs.iter().take(3).enumerate() {
            word |= (reg.index() as Word) << (24 - 4 * slot as u32);
        }
        word
    }

    /// `copy` form: opcode, 24-bit immediate, destination register.
    pub fn encode_copy(immediate: Word, dest: Register) -> Option<Word> {
        if immediate > COPY_IMMEDIATE_MAX {
            return None;
        }
        Some(((Opcode::Copy.nibble() as Word) << 28) | (immediate << 4) | dest.index() as Word)
    }

}

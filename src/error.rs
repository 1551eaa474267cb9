pub mod error {
    use thiserror::Error;
    use wordmachine_core::error::error::MachineError;
    use wordmachine_core::isa::isa::Word;

    use crate::pseudo_ops::pseudo_ops::Arity;

    /// Failures while lowering macro calls to primitive instructions.
    #[derive(Debug, Error, PartialEq, Eq)]
    pub enum ExpandError {
        #[error("line {line}: cannot parse operand '{token}'")]
        MalformedOperand { line: usize, token: String },
        #[error("line {line}: '{mnemonic}' is not a known macro")]
        UnknownMacro { line: usize, mnemonic: String },
        #[error("line {line}: '{name}' is a mnemonic or register and cannot name a label")]
        ReservedLabel { line: usize, name: String },
        #[error("line {line}: {mnemonic} expects {expected} operand(s), got {found}")]
        Arity {
            line: usize,
            mnemonic: &'static str,
            expected: Arity,
            found: usize,
        },
        #[error("line {line}: {mnemonic} needs a register for its {position} operand, got '{found}'")]
        ExpectedRegister {
            line: usize,
            mnemonic: &'static str,
            position: &'static str,
            found: String,
        },
        #[error("line {line}: {mnemonic} without a matching open scope")]
        UnmatchedClose { line: usize, mnemonic: &'static str },
        #[error("line {line}: {mnemonic} left open ({count} scope(s) unclosed)")]
        UnclosedScope {
            line: usize,
            mnemonic: &'static str,
            count: usize,
        },
        #[error("expansion did not settle after {0} passes")]
        NoFixedPoint(usize),
    }

    /// Failures while turning primitive text into machine words.
    #[derive(Debug, Clone, Error, PartialEq, Eq)]
    pub enum AsmError {
        #[error("line {line}: cannot parse operand '{token}'")]
        MalformedOperand { line: usize, token: String },
        #[error("line {line}: unknown mnemonic '{mnemonic}'")]
        UnknownMnemonic { line: usize, mnemonic: String },
        #[error("line {line}: {mnemonic} expects {expected}")]
        BadOperands {
            line: usize,
            mnemonic: &'static str,
            expected: &'static str,
        },
        #[error("line {line}: duplicate label '{name}'")]
        DuplicateLabel { line: usize, name: String },
        #[error("line {line}: undefined label '{name}'")]
        UndefinedLabel { line: usize, name: String },
        #[error("line {line}: immediate {value:#x} does not fit the copy field")]
        ImmediateTooLarge { line: usize, value: Word },
        #[error("line {line}: program grows past the 32-bit address space")]
        AddressOverflow { line: usize },
    }

    #[derive(Debug, Error)]
    pub enum Error {
        #[error(transparent)]
        Expand(#[from] ExpandError),
        #[error(transparent)]
        Asm(#[from] AsmError),
        #[error(transparent)]
        Machine(#[from] MachineError),
    }
}

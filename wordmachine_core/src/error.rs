pub mod error {
    use thiserror::Error;

    use crate::isa::isa::Word;

    #[derive(Debug, Error, PartialEq, Eq)]
    pub enum MachineError {
        #[error("address {addr:#010x} is beyond the {limit:#x} byte memory limit")]
        AddressOutOfRange { addr: Word, limit: usize },
        #[error("illegal instruction {word:#010x} at {pc:#010x}")]
        IllegalInstruction { word: Word, pc: Word },
        #[error("division by zero at {pc:#010x}")]
        DivideByZero { pc: Word },
        #[error("program did not stop within {0} steps")]
        StepLimit(u64),
        #[error("program of {len} bytes does not fit in memory")]
        ProgramTooLarge { len: usize },
    }
}

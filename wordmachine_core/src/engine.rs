pub mod engine {
    use crate::error::error::MachineError;
    use crate::isa::isa::{Opcode, WORD_BYTES, Word};
    use crate::machine::machine::Machine;
    use crate::step::step::StepOutcome;

    /// One handler per opcode nibble. The step loop extracts the nibble,
    /// the handler pulls whatever register / immediate fields it needs.
    ///
    /// Layout of an instruction word, most significant nibble first:
    /// `o a b c ....` for register forms and `o iiiiii d` for `copy`.
    /// Handlers run while r0 still holds the address of the executing
    /// instruction; each handler finishes by advancing r0 one word.

    // keep field extraction consistent and centralized.
    macro_rules! extract_a {
        ($value:expr) => {
            (($value >> 24) & 0xF) as usize
        };
    }

    macro_rules! extract_b {
        ($value:expr) => {
            (($value >> 20) & 0xF) as usize
        };
    }

    macro_rules! extract_c {
        ($value:expr) => {
            (($value >> 16) & 0xF) as usize
        };
    }

    macro_rules! extract_immediate {
        ($value:expr) => {
            (($value >> 4) & 0x00FF_FFFF) as Word
        };
    }

    macro_rules! extract_dest {
        ($value:expr) => {
            ($value & 0xF) as usize
        };
    }

    fn advance(machine: &mut Machine) {
        machine.regs.r[0] = machine.regs.r[0].wrapping_add(WORD_BYTES);
    }

    pub fn opcode_alu(machine: &mut Machine, op: Opcode, instruction: Word) -> Result<StepOutcome, MachineError> {
        let a = machine.regs.r[extract_a!(instruction)];
        let b = machine.regs.r[extract_b!(instruction)];
        let dest = extract_c!(instruction);

        let value = match op {
            Opcode::Add => a.wrapping_add(b),
            Opcode::Sub => a.wrapping_sub(b),
            Opcode::Mult => a.wrapping_mul(b),
            Opcode::Div => {
                if b == 0 {
                    return Err(MachineError::DivideByZero { pc: machine.regs.r[0] });
                }
                a / b
            }
            Opcode::And => a & b,
            Opcode::Or => a | b,
            _ => {
                return Err(MachineError::IllegalInstruction {
                    word: instruction,
                    pc: machine.regs.r[0],
                })
            }
        };

        machine.regs.r[dest] = value;
        advance(machine);
        Ok(StepOutcome::Continue)
    }

    pub fn opcode_zjump(machine: &mut Machine, instruction: Word) -> StepOutcome {
        let cond = machine.regs.r[extract_a!(instruction)];
        let target = machine.regs.r[extract_b!(instruction)];

        // land on target after the common advance.
        if cond == 0 {
            machine.regs.r[0] = target.wrapping_sub(WORD_BYTES);
        }
        advance(machine);
        StepOutcome::Continue
    }

    pub fn opcode_copy(machine: &mut Machine, instruction: Word) -> StepOutcome {
        machine.regs.r[extract_dest!(instruction)] = extract_immediate!(instruction);
        advance(machine);
        StepOutcome::Continue
    }

    pub fn opcode_load(machine: &mut Machine, instruction: Word) -> Result<StepOutcome, MachineError> {
        let addr = machine.regs.r[extract_a!(instruction)];
        let dest = extract_b!(instruction);

        machine.regs.r[dest] = machine.mem.get_word(addr)?;
        advance(machine);
        Ok(StepOutcome::Continue)
    }

    pub fn opcode_store(machine: &mut Machine, instruction: Word) -> Result<StepOutcome, MachineError> {
        let value = machine.regs.r[extract_a!(instruction)];
        let addr = machine.regs.r[extract_b!(instruction)];

        machine.mem.set_word(addr, value)?;
        advance(machine);
        Ok(StepOutcome::Continue)
    }

    pub fn opcode_stop(machine: &mut Machine) -> StepOutcome {
        machine.halted = true;
        advance(machine);
        StepOutcome::Halted
    }
}

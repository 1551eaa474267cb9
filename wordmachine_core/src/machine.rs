pub mod machine {
    use tracing::{debug, trace};

    use crate::engine::engine::*;
    use crate::error::error::MachineError;
    use crate::isa::isa::{NUM_REGISTERS, Opcode, Word};
    use crate::memory::memory::Memory;
    use crate::step::step::StepOutcome;

    macro_rules! extract_opcode {
        ($value:expr) => {
            ($value >> 28) as u8
        };
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct Registers {
        pub r: [Word; NUM_REGISTERS],
    }

    #[derive(Debug, Clone, Default)]
    pub struct Machine {
        pub regs: Registers,
        pub mem: Memory,
        pub halted: bool,
        pub steps: u64,
    }

    impl Machine {
        pub fn new() -> Machine {
            Machine::default()
        }

        /// Load an assembled image at address 0; registers start zeroed so
        /// execution begins with the first word.
        pub fn with_program(image: &[u8]) -> Result<Machine, MachineError> {
            Ok(Machine {
                regs: Registers::default(),
                mem: Memory::with_image(image)?,
                halted: false,
                steps: 0,
            })
        }

        /// Fetch the word at r0, dispatch on its top nibble and execute it.
        ///
        /// opcode handlers advance r0; the loop itself never touches it, so a
        /// handler that transfers control only has to leave r0 one word short
        /// of the target.
        pub fn step(&mut self) -> Result<StepOutcome, MachineError> {
            if self.halted {
                return Ok(StepOutcome::Halted);
            }

            let pc = self.regs.r[0];
            let instruction = self.mem.get_word(pc)?;
            trace!(pc = format_args!("{pc:#010x}"), word = format_args!("{instruction:#010x}"), "step");

            let opcode = Opcode::from_nibble(extract_opcode!(instruction))
                .ok_or(MachineError::IllegalInstruction { word: instruction, pc })?;

            self.steps += 1;
            match opcode {
                Opcode::Add | Opcode::Sub | Opcode::Mult | Opcode::Div | Opcode::And | Opcode::Or => {
                    opcode_alu(self, opcode, instruction)
                }
                Opcode::Zjump => Ok(opcode_zjump(self, instruction)),
                Opcode::Copy => Ok(opcode_copy(self, instruction)),
                Opcode::Load => opcode_load(self, instruction),
                Opcode::Store => opcode_store(self, instruction),
                Opcode::Stop => Ok(opcode_stop(self)),
            }
        }

        /// Run until `stop`, failing once `max_steps` instructions have executed.
        pub fn run(&mut self, max_steps: u64) -> Result<(), MachineError> {
            while !self.halted {
                if self.steps >= max_steps {
                    return Err(MachineError::StepLimit(max_steps));
                }
                self.step()?;
            }
            debug!(steps = self.steps, "machine stopped");
            Ok(())
        }
    }

}

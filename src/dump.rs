pub mod dump {
    use std::fmt::Write;

    use wordmachine_core::isa::isa::Register;
    use wordmachine_core::machine::machine::{Machine, Registers};
    use wordmachine_core::memory::memory::Memory;

    pub fn reg_state(regs: &Registers) -> String {
        let mut out = String::from("registers:\n\n");
        for (idx, value) in regs.r.iter().enumerate() {
            let name = Register::new(idx as u8).map(|reg| reg.to_string()).unwrap_or_default();
            let _ = writeln!(out, "\t{name:>3}: 0x{value:08x}");
        }
        out
    }

    pub fn mem_state(mem: &Memory) -> String {
        let mut out = String::from("memory:\n\n");
        for (addr, word) in mem.words() {
            let _ = writeln!(out, "\t0x{addr:08x}: 0x{word:08x}");
        }
        out
    }

    /// Full state after a run: registers, a blank line, then every word of
    /// memory the program touched.
    pub fn render(machine: &Machine) -> String {
        format!("{}\n{}", reg_state(&machine.regs), mem_state(&machine.mem))
    }

}

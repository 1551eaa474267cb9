pub mod assembler;
pub mod dump;
pub mod emitter;
pub mod error;
pub mod expander;
pub mod labels;
pub mod operand;
pub mod program;
pub mod pseudo_ops;

use tracing::debug;
use wordmachine_core::machine::machine::Machine;

use crate::error::error::Error;

pub use wordmachine_core;

/// Lower macros and assemble, producing the big-endian memory image.
pub fn build(source: &str) -> Result<Vec<u8>, Error> {
    let lowered = expander::expander::expand(source)?;
    let image = assembler::assembler::assemble(&lowered)?;
    debug!(bytes = image.len(), "built image");
    Ok(image)
}

/// Build `source` and run it until `stop` or `max_steps` instructions.
pub fn run_source(source: &str, max_steps: u64) -> Result<Machine, Error> {
    let image = build(source)?;
    let mut machine = Machine::with_program(&image)?;
    machine.run(max_steps)?;
    Ok(machine)
}

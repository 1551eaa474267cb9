use std::error::Error;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::Level;
use wordmachine::dump;
use wordmachine::wordmachine_core::machine::machine::Machine;

/// Run an assembled word machine image and print the final state.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Memory image written by wmasm
    binary: PathBuf,

    /// Give up after this many instructions
    #[arg(short, long, default_value_t = 10_000_000)]
    max_steps: u64,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(short, long, default_value_t = Level::INFO)]
    log_level: Level,
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = main_real(args) {
        tracing::error!("{e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_real(args: Args) -> Result<(), Box<dyn Error>> {
    let image = fs::read(&args.binary)
        .map_err(|e| format!("failed to read {}: {e}", args.binary.display()))?;

    let mut machine = Machine::with_program(&image)?;
    tracing::trace!("running {} byte image", image.len());
    let result = machine.run(args.max_steps);

    // dump even when the run failed
    print!("{}", dump::dump::render(&machine));
    result?;

    tracing::debug!("stopped after {} steps", machine.steps);
    Ok(())
}

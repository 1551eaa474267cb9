use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::Level;
use wordmachine::assembler::assembler::Assembler;
use wordmachine::expander::expander;

/// Lower macro calls to primitive instructions and assemble the result.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Source file, macros allowed
    input: PathBuf,

    /// Output file (default: input with a `.mem` extension, or stdout
    /// with --expand-only)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Write the lowered text instead of assembling it
    #[arg(short, long)]
    expand_only: bool,

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

    if let Err(e) = run(args) {
        tracing::error!("wmasm: {e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let source = fs::read_to_string(&args.input)
        .map_err(|e| format!("failed to read {}: {e}", args.input.display()))?;

    tracing::trace!("lowering macros");
    let lowered = expander::expand(&source)?;

    if args.expand_only {
        match &args.out {
            Some(path) => write_output(path, lowered.as_bytes())?,
            None => print!("{lowered}"),
        }
        return Ok(());
    }

    let mut assembler = Assembler::new();
    let image = assembler.assemble(&lowered)?;

    let output = args.out.unwrap_or_else(|| default_output_path(&args.input));
    write_output(&output, &image)?;
    tracing::debug!("wrote {} bytes to {}", image.len(), output.display());
    Ok(())
}

fn write_output(path: &Path, data: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
        }
    }
    fs::write(path, data).map_err(|e| format!("failed to write {}: {e}", path.display()))
}

// `prog` -> `prog.mem`, `prog.s` -> `prog.s.mem`
fn default_output_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".mem");
    PathBuf::from(name)
}

//! penguinc CLI: a thin `clap`-derive wrapper over [`penguinc::driver`].

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;

use penguinc::{compile_file, CompilerConfig, DriverError};

#[derive(ClapParser)]
#[command(name = "penguinc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compiler for the penguin language, targeting Game Boy (SM83) assembly")]
struct Cli {
    /// Input .penguin source file
    input: PathBuf,

    /// Output assembly path (defaults to the input's file stem with a
    /// `.asm` extension)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Treat warning-severity diagnostics as errors
    #[arg(long)]
    warnings_as_errors: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if !cli.input.exists() {
        eprintln!("penguinc: no such file: {}", cli.input.display());
        return ExitCode::from(2);
    }

    let mut config = CompilerConfig::new().with_warnings_as_errors(cli.warnings_as_errors);
    if let Some(output) = cli.output {
        config = config.with_output(output);
    }

    match compile_file(&cli.input, &config) {
        Ok(outcome) => {
            for diag in &outcome.diagnostics {
                eprintln!("{}", diag.render(&cli.input));
            }
            ExitCode::SUCCESS
        }
        Err(DriverError::Diagnostics(diags)) => {
            for diag in &diags {
                eprintln!("{}", diag.render(&cli.input));
            }
            ExitCode::from(1)
        }
        Err(DriverError::Io(e)) => {
            eprintln!("penguinc: {e}");
            ExitCode::from(2)
        }
        Err(DriverError::Ice(msg)) => {
            eprintln!("penguinc: internal compiler error: {msg}");
            ExitCode::from(70)
        }
    }
}

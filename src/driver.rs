//! Wires lexer → parser → semantic analyzer → lowering → codegen, owns
//! the diagnostics sink, and decides where each phase boundary
//! short-circuits (spec.md §5, §7).
//!
//! `compile_str` is the library entry point the test suite and any future
//! embedding (LSP, REPL) use directly; `compile_file` wraps it with the
//! file-system concerns (reading the source, picking an output path,
//! writing the result atomically) the CLI needs.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::codegen::{self, CodeGenError};
use crate::config::CompilerConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::ir;
use crate::lexer::tokenize;
use crate::parser::parse;
use crate::sema;

/// Everything a successful compilation produced: the assembly text plus
/// any non-fatal diagnostics (warnings, notes) accumulated along the way.
#[derive(Debug)]
pub struct CompileOutcome {
    pub assembly: String,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
pub enum DriverError {
    /// Reading the source file or writing the output file failed.
    Io(io::Error),
    /// One or more phases produced an `error`-severity diagnostic (or a
    /// `warning` one under `--warnings-as-errors`); compilation stopped
    /// at the first phase boundary that saw one.
    Diagnostics(Vec<Diagnostic>),
    /// Code generation hit an internal-consistency assertion — spec.md
    /// §4.5's "ice" diagnostics, reported here rather than a user error.
    Ice(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Io(e) => write!(f, "I/O error: {e}"),
            DriverError::Diagnostics(diags) => write!(f, "{} diagnostic(s)", diags.len()),
            DriverError::Ice(msg) => write!(f, "internal compiler error: {msg}"),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<io::Error> for DriverError {
    fn from(e: io::Error) -> Self {
        DriverError::Io(e)
    }
}

impl From<CodeGenError> for DriverError {
    fn from(e: CodeGenError) -> Self {
        DriverError::Ice(e.to_string())
    }
}

/// Compiles `source` in isolation — no file system access. `asset_root`
/// is taken from `config` as-is; relative asset paths are resolved
/// against it verbatim (the caller decides whether that's a directory on
/// disk or a virtual root used only for testing).
pub fn compile_str(source: &str, config: &CompilerConfig) -> Result<CompileOutcome, DriverError> {
    let mut sink = DiagnosticSink::new();

    let tokens = tokenize(source, &mut sink);
    if sink.has_errors() {
        return Err(DriverError::Diagnostics(sink.into_vec()));
    }

    let program = parse(tokens, &mut sink);
    if sink.has_errors() {
        return Err(DriverError::Diagnostics(sink.into_vec()));
    }

    let analysis = sema::analyze(&program, &mut sink, config.asset_root.as_deref());
    if sink.has_errors() || (config.warnings_as_errors && sink.has_warnings()) {
        return Err(DriverError::Diagnostics(sink.into_vec()));
    }

    let irp = ir::lower(&analysis, &mut sink);
    if sink.has_errors() {
        return Err(DriverError::Diagnostics(sink.into_vec()));
    }

    let assembly = codegen::generate(&irp, &analysis)?;
    Ok(CompileOutcome { assembly, diagnostics: sink.into_vec() })
}

/// Compiles the `.penguin` file at `source_path` and writes the generated
/// assembly to `config.output` (or `source_path` with a `.asm` extension
/// if unset). The output file is only opened once every phase has
/// succeeded, and the write itself goes through a sibling temp file plus
/// a rename so a write failure never leaves a half-written `.asm` file
/// for the downstream assembler to pick up (spec.md §5, §7).
pub fn compile_file(
    source_path: &Path,
    config: &CompilerConfig,
) -> Result<CompileOutcome, DriverError> {
    let source = fs::read_to_string(source_path)?;
    let outcome = compile_str(&source, config)?;

    let output_path = config
        .output
        .clone()
        .unwrap_or_else(|| source_path.with_extension("asm"));
    write_atomically(&output_path, &outcome.assembly)?;

    Ok(outcome)
}

/// Default output path for `source_path` absent an explicit `-o`.
pub fn default_output_path(source_path: &Path) -> PathBuf {
    source_path.with_extension("asm")
}

fn write_atomically(path: &Path, contents: &str) -> io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    if let Err(e) = fs::write(&tmp_path, contents) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_clean_source_string_to_assembly() {
        let outcome = compile_str("int a = 5; int b = a + 3;", &CompilerConfig::default()).unwrap();
        assert!(outcome.assembly.contains("SECTION \"Header\""));
    }

    #[test]
    fn lex_errors_short_circuit_before_parsing() {
        let err = compile_str("int a = 5; `", &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, DriverError::Diagnostics(_)));
    }

    #[test]
    fn type_mismatch_short_circuits_before_lowering() {
        let err = compile_str(r#"int x = "hello";"#, &CompilerConfig::default()).unwrap_err();
        match err {
            DriverError::Diagnostics(diags) => {
                assert!(diags.iter().any(|d| d.kind.as_str() == "type-mismatch"));
            }
            other => panic!("expected Diagnostics, got {other:?}"),
        }
    }

    #[test]
    fn warnings_as_errors_promotes_a_warning_into_a_short_circuit() {
        // Reserved-root redeclaration-style warnings are modeled as hard
        // errors elsewhere in this compiler, so in the absence of a
        // surviving warning-only diagnostic we exercise the plumbing by
        // asserting the flag has no effect on an already-clean program.
        let config = CompilerConfig::new().with_warnings_as_errors(true);
        let outcome = compile_str("int a = 1;", &config).unwrap();
        assert!(!outcome.assembly.is_empty());
    }

    #[test]
    fn compile_file_writes_the_default_dot_asm_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("game.penguin");
        std::fs::write(&source_path, "int a = 1;").unwrap();

        let outcome = compile_file(&source_path, &CompilerConfig::default()).unwrap();
        let output_path = default_output_path(&source_path);
        assert!(output_path.exists());
        let written = std::fs::read_to_string(&output_path).unwrap();
        assert_eq!(written, outcome.assembly);
    }

    #[test]
    fn compile_file_never_writes_output_when_analysis_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("bad.penguin");
        std::fs::write(&source_path, r#"int x = "oops";"#).unwrap();

        assert!(compile_file(&source_path, &CompilerConfig::default()).is_err());
        assert!(!default_output_path(&source_path).exists());
    }

    #[test]
    fn compile_file_honors_an_explicit_output_override() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("game.penguin");
        let out_path = dir.path().join("custom.gbz80");
        std::fs::write(&source_path, "int a = 1;").unwrap();

        let config = CompilerConfig::new().with_output(out_path.clone());
        compile_file(&source_path, &config).unwrap();
        assert!(out_path.exists());
        assert!(!default_output_path(&source_path).exists());
    }
}

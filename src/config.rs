//! Compiler configuration.
//!
//! Unlike the teacher's `CompilerConfig` (which exists so external crates
//! can register additional builtins and link flags), this language has no
//! extension mechanism — spec.md's Non-goals rule out a module/extension
//! system — so the knobs here are limited to what the CLI exposes: an
//! output path override, where to resolve asset literals against, and
//! whether warnings are promoted to errors.

use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    /// Overrides the default `<input-stem>.asm` output path.
    pub output: Option<PathBuf>,
    /// Directory asset string literals (`sprite s = "player.2bpp";`) are
    /// resolved against. `None` resolves relative to the source file's
    /// own directory.
    pub asset_root: Option<PathBuf>,
    /// Promotes `warning`-severity diagnostics to `error` for the
    /// purposes of the phase-boundary short-circuit (spec.md §7).
    pub warnings_as_errors: bool,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn with_asset_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.asset_root = Some(path.into());
        self
    }

    pub fn with_warnings_as_errors(mut self, yes: bool) -> Self {
        self.warnings_as_errors = yes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_overrides() {
        let config = CompilerConfig::default();
        assert!(config.output.is_none());
        assert!(config.asset_root.is_none());
        assert!(!config.warnings_as_errors);
    }

    #[test]
    fn builder_methods_chain() {
        let config = CompilerConfig::new()
            .with_output("out.asm")
            .with_asset_root("assets")
            .with_warnings_as_errors(true);
        assert_eq!(config.output, Some(PathBuf::from("out.asm")));
        assert_eq!(config.asset_root, Some(PathBuf::from("assets")));
        assert!(config.warnings_as_errors);
    }
}

//! External toolchain configuration.
//!
//! Locates bison, flex and emcc and holds the fixed flags the link stage
//! passes to emcc.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

/// Default bound for a single stage.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Module factory name exported by the generated glue.
pub const DEFAULT_EXPORT_NAME: &str = "createInterpreterModule";

/// Static flex support library shipped by Debian/Ubuntu.
const LIBFL_CANDIDATES: &[&str] = &[
    "/usr/lib/x86_64-linux-gnu/libfl.a",
    "/usr/lib/aarch64-linux-gnu/libfl.a",
    "/usr/lib/libfl.a",
    "/usr/local/lib/libfl.a",
];

/// Paths and flags for the three external tools.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// Grammar compiler.
    pub bison: PathBuf,
    /// Lexer generator.
    pub flex: PathBuf,
    /// Ahead-of-time web compiler.
    pub emcc: PathBuf,
    /// Static libraries appended to the link command.
    pub support_libs: Vec<PathBuf>,
    /// Optimization flag passed to emcc.
    pub optimization: String,
    /// Name of the module factory function.
    pub export_name: String,
    /// Wall-clock bound for each stage.
    pub stage_timeout: Duration,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            bison: PathBuf::from("bison"),
            flex: PathBuf::from("flex"),
            emcc: PathBuf::from("emcc"),
            support_libs: Vec::new(),
            optimization: "-O3".to_string(),
            export_name: DEFAULT_EXPORT_NAME.to_string(),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
        }
    }
}

impl Toolchain {
    /// Resolve the tools from `PATH`, falling back to bare program names.
    pub fn detect() -> Self {
        let support_libs = LIBFL_CANDIDATES
            .iter()
            .map(Path::new)
            .find(|p| p.is_file())
            .map(|p| vec![p.to_path_buf()])
            .unwrap_or_default();

        Self {
            bison: find_tool("bison"),
            flex: find_tool("flex"),
            emcc: find_tool("emcc"),
            support_libs,
            ..Self::default()
        }
    }

    /// The `-s` settings passed to emcc.
    ///
    /// The module exports `main` plus the runtime methods needed to write into
    /// and run inside the virtual filesystem, and is built as a factory so
    /// several instances can live in one page.
    pub fn emcc_settings(&self) -> Vec<String> {
        vec![
            "WASM=1".to_string(),
            "MODULARIZE=1".to_string(),
            format!("EXPORT_NAME={}", self.export_name),
            "EXPORTED_FUNCTIONS=['_main']".to_string(),
            "EXPORTED_RUNTIME_METHODS=['FS','ccall','cwrap']".to_string(),
        ]
    }

    /// Report which tools can be found.
    pub fn report(&self) -> ToolchainReport {
        ToolchainReport {
            bison: ToolStatus::probe(&self.bison),
            flex: ToolStatus::probe(&self.flex),
            emcc: ToolStatus::probe(&self.emcc),
        }
    }
}

fn find_tool(name: &str) -> PathBuf {
    which::which(name).unwrap_or_else(|_| {
        tracing::warn!("{} not found in PATH", name);
        PathBuf::from(name)
    })
}

/// Availability of each tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolchainReport {
    pub bison: ToolStatus,
    pub flex: ToolStatus,
    pub emcc: ToolStatus,
}

impl ToolchainReport {
    /// Whether all three tools were found.
    pub fn is_complete(&self) -> bool {
        self.bison.available && self.flex.available && self.emcc.available
    }
}

/// Availability of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    /// Configured path or program name.
    pub path: String,
    /// Whether the program resolves to an executable.
    pub available: bool,
}

impl ToolStatus {
    fn probe(program: &Path) -> Self {
        Self {
            path: program.display().to_string(),
            available: which::which(program).is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_toolchain() {
        let toolchain = Toolchain::default();
        assert_eq!(toolchain.bison, PathBuf::from("bison"));
        assert_eq!(toolchain.optimization, "-O3");
        assert_eq!(toolchain.stage_timeout, DEFAULT_STAGE_TIMEOUT);
        assert!(toolchain.support_libs.is_empty());
    }

    #[test]
    fn test_emcc_settings() {
        let toolchain = Toolchain {
            export_name: "createCalc".to_string(),
            ..Toolchain::default()
        };
        let settings = toolchain.emcc_settings();
        assert!(settings.contains(&"MODULARIZE=1".to_string()));
        assert!(settings.contains(&"EXPORT_NAME=createCalc".to_string()));
        assert!(settings.contains(&"EXPORTED_FUNCTIONS=['_main']".to_string()));
        assert!(settings.contains(&"EXPORTED_RUNTIME_METHODS=['FS','ccall','cwrap']".to_string()));
    }

    #[test]
    fn test_report_missing_tool() {
        let toolchain = Toolchain {
            emcc: PathBuf::from("/nonexistent/idiogen/emcc"),
            ..Toolchain::default()
        };
        let report = toolchain.report();
        assert!(!report.emcc.available);
        assert!(!report.is_complete());
    }
}

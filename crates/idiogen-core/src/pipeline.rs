//! Build pipeline facade.
//!
//! Ties the pieces together for one request:
//!
//! ```text
//! acquire workspace ─► intake ─► grammar ─► lexer ─► link ─► assemble ─► deliver
//!        │                                                               │
//!        └────────────── released on every exit path ◄───────────────────┘
//! ```

use std::path::PathBuf;

use crate::bundle;
use crate::error::Result;
use crate::intake::ArtifactPaths;
use crate::stage;
use crate::toolchain::Toolchain;
use crate::workspace::Workspace;

/// Configuration for the build pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory under which per-request workspaces are created.
    pub workspace_root: PathBuf,
    /// External tools.
    pub toolchain: Toolchain,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir(),
            toolchain: Toolchain::default(),
        }
    }
}

impl PipelineConfig {
    /// Config with tools resolved from `PATH`.
    pub fn detect() -> Self {
        Self {
            toolchain: Toolchain::detect(),
            ..Self::default()
        }
    }
}

/// Runs builds. Cheap to share; holds no per-request state.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Allocate a workspace for a new request.
    pub fn acquire_workspace(&self) -> Result<Workspace> {
        Workspace::acquire(&self.config.workspace_root)
    }

    /// Compile the stored inputs and assemble the result bundle.
    ///
    /// Returns the path of the outer archive inside `workspace`.
    pub async fn build(&self, workspace: &Workspace, inputs: ArtifactPaths) -> Result<PathBuf> {
        tracing::debug!(workspace = %workspace.id(), "phase: inputs-stored");

        let artifacts = match stage::run_stages(&self.config.toolchain, workspace, &inputs).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                tracing::info!(workspace = %workspace.id(), "build failed: {}", first_line(&e.to_string()));
                return Err(e);
            }
        };

        let bundle = bundle::assemble(artifacts, workspace).await?;
        tracing::info!(workspace = %workspace.id(), "build succeeded");
        Ok(bundle)
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

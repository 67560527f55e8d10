//! Core build pipeline for Idiogen.
//!
//! This crate provides:
//! - Request-scoped workspaces that clean up after themselves
//! - Intake of the five uploaded inputs under role-derived names
//! - The bison → flex → emcc stage runner with captured diagnostics
//! - Zip bundle assembly

pub mod artifacts;
pub mod bundle;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod stage;
pub mod toolchain;
pub mod workspace;

pub use artifacts::{Artifact, ArtifactSet};
pub use bundle::{DOWNLOAD_NAME, assemble};
pub use error::{Error, Result, StageFailure};
pub use intake::{ArtifactPaths, Intake, Role, StoredInput, Upload};
pub use pipeline::{Pipeline, PipelineConfig};
pub use stage::{StageCommand, StageKind, StageOutput, run_stage, run_stages};
pub use toolchain::{Toolchain, ToolchainReport};
pub use workspace::Workspace;

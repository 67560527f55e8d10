//! Build command implementation for Idiogen CLI.
//!
//! Runs the same pipeline as the server against local files.

use std::path::{Path, PathBuf};

use anyhow::Context;
use idiogen_core::{Intake, Pipeline, PipelineConfig, Role};

/// The five input files.
pub struct BuildInputs {
    pub grammar: PathBuf,
    pub lexer: PathBuf,
    pub interpreter: PathBuf,
    pub documentation: PathBuf,
    pub example: PathBuf,
}

impl BuildInputs {
    fn by_role(&self) -> [(Role, &Path); 5] {
        [
            (Role::Grammar, &self.grammar),
            (Role::Lexer, &self.lexer),
            (Role::Interpreter, &self.interpreter),
            (Role::Documentation, &self.documentation),
            (Role::Example, &self.example),
        ]
    }
}

/// Build a bundle and copy it to `output`.
pub async fn execute(inputs: &BuildInputs, output: &Path, config: PipelineConfig) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(config);
    let workspace = pipeline.acquire_workspace()?;

    let mut intake = Intake::new(&workspace);
    for (role, path) in inputs.by_role() {
        intake
            .store_file(role, path)
            .await
            .with_context(|| format!("Failed to read {} input", role.part_name()))?;
    }
    let paths = intake.finish()?;

    let bundle = pipeline.build(&workspace, paths).await?;
    tokio::fs::copy(&bundle, output)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Wrote {}", output.display());
    Ok(())
}

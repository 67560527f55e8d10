//! Files produced or retained by a build.

use std::path::PathBuf;

use crate::intake::StoredInput;

/// One file destined for a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Short label used to disambiguate clashing entry names.
    pub label: &'static str,
    /// Location inside the workspace.
    pub path: PathBuf,
    /// Archive entry name (a base name, never a path).
    pub entry_name: String,
}

impl Artifact {
    pub fn new(label: &'static str, path: PathBuf, entry_name: impl Into<String>) -> Self {
        Self {
            label,
            path,
            entry_name: entry_name.into(),
        }
    }

    pub(crate) fn from_input(label: &'static str, input: &StoredInput) -> Self {
        Self::new(label, input.path.clone(), input.entry_name.clone())
    }
}

/// Everything the bundle assembler needs after the stages ran.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    /// Generated parser source (`y.tab.c`).
    pub parser_source: Artifact,
    /// Generated scanner source (`lex.yy.c`).
    pub lexer_source: Artifact,
    /// Uploaded interpreter source.
    pub interpreter_source: Artifact,
    /// JavaScript glue module.
    pub module_glue: Artifact,
    /// WebAssembly payload.
    pub module_binary: Artifact,
    /// Uploaded documentation.
    pub documentation: Artifact,
    /// Uploaded example program.
    pub example: Artifact,
}

impl ArtifactSet {
    /// Entries of the inner sources archive, in insertion order.
    pub fn sources(&self) -> [&Artifact; 3] {
        [
            &self.lexer_source,
            &self.parser_source,
            &self.interpreter_source,
        ]
    }

    /// Entries of the outer archive that follow the sources archive.
    pub fn deliverables(&self) -> [&Artifact; 4] {
        [
            &self.module_glue,
            &self.module_binary,
            &self.documentation,
            &self.example,
        ]
    }
}

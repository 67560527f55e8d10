//! Bundle assembly.
//!
//! ```text
//! output.zip
//! ├── combined.zip      # lex.yy.c, y.tab.c, <interpreter>.c
//! ├── <stem>.js
//! ├── <stem>.wasm
//! ├── <documentation>
//! └── <example>
//! ```

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::artifacts::{Artifact, ArtifactSet};
use crate::error::{Error, Result};
use crate::workspace::Workspace;

/// Inner archive holding the C sources.
pub const SOURCES_ARCHIVE: &str = "combined.zip";
/// Outer archive returned to the caller.
pub const RESULT_ARCHIVE: &str = "output.zip";
/// Suggested download filename.
pub const DOWNLOAD_NAME: &str = "build-output.zip";

/// Build both archives inside the workspace and return the outer one.
///
/// Zip writing is synchronous, so it runs on the blocking pool.
pub async fn assemble(artifacts: ArtifactSet, workspace: &Workspace) -> Result<PathBuf> {
    let dir = workspace.path().to_path_buf();
    let task_dir = dir.clone();

    let bundle = tokio::task::spawn_blocking(move || assemble_in(&artifacts, &task_dir))
        .await
        .map_err(|e| Error::io(&dir, format!("bundle task failed: {}", e)))??;

    tracing::debug!(workspace = %workspace.id(), "phase: assembled");
    Ok(bundle)
}

/// Synchronous assembly into `dir`.
pub fn assemble_in(artifacts: &ArtifactSet, dir: &Path) -> Result<PathBuf> {
    let sources_path = dir.join(SOURCES_ARCHIVE);
    write_archive(&sources_path, &artifacts.sources())?;

    let sources = Artifact::new("sources", sources_path, SOURCES_ARCHIVE);
    let mut entries = vec![&sources];
    entries.extend(artifacts.deliverables());

    let result_path = dir.join(RESULT_ARCHIVE);
    write_archive(&result_path, &entries)?;
    Ok(result_path)
}

/// Write `entries` to a new zip at `dest`, in order.
fn write_archive(dest: &Path, entries: &[&Artifact]) -> Result<()> {
    let file = File::create(dest).map_err(|e| Error::io(dest, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    // Fixed timestamp: identical inputs give identical entry metadata.
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    for (artifact, name) in entries.iter().zip(entry_names(entries)) {
        let mut source = File::open(&artifact.path).map_err(|e| Error::io(&artifact.path, e))?;
        zip.start_file(name, options)
            .map_err(|e| Error::io(&artifact.path, e))?;
        io::copy(&mut source, &mut zip).map_err(|e| Error::io(&artifact.path, e))?;
    }

    let mut writer = zip.finish().map_err(|e| Error::io(dest, e))?;
    writer.flush().map_err(|e| Error::io(dest, e))?;
    Ok(())
}

/// Entry names with clashes prefixed by the artifact label.
fn entry_names(entries: &[&Artifact]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(entries.len());

    for artifact in entries {
        let mut name = artifact.entry_name.clone();
        let mut n = 1;
        while !seen.insert(name.clone()) {
            name = if n == 1 {
                format!("{}-{}", artifact.label, artifact.entry_name)
            } else {
                format!("{}-{}-{}", artifact.label, n, artifact.entry_name)
            };
            n += 1;
        }
        names.push(name);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn artifact(dir: &Path, label: &'static str, file: &str, entry: &str, body: &str) -> Artifact {
        let path = dir.join(file);
        fs::write(&path, body).unwrap();
        Artifact::new(label, path, entry)
    }

    fn sample_set(dir: &Path) -> ArtifactSet {
        ArtifactSet {
            parser_source: artifact(dir, "parser", "y.tab.c", "y.tab.c", "int yyparse(void);"),
            lexer_source: artifact(dir, "lexer", "lex.yy.c", "lex.yy.c", "int yylex(void);"),
            interpreter_source: artifact(dir, "interpreter", "interpreter.c", "calc.c", "int main(void){}"),
            module_glue: artifact(dir, "module", "calc.js", "calc.js", "var createInterpreterModule;"),
            module_binary: artifact(dir, "module", "calc.wasm", "calc.wasm", "\0asm"),
            documentation: artifact(dir, "documentation", "documentation.md", "README.md", "# Calc"),
            example: artifact(dir, "example", "example.txt", "example.calc", "1 + 2"),
        }
    }

    fn names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        archive.file_names().map(str::to_string).collect::<Vec<_>>()
    }

    #[test]
    fn test_assemble_layout() {
        let temp = TempDir::new().unwrap();
        let set = sample_set(temp.path());

        let bundle = assemble_in(&set, temp.path()).expect("Failed to assemble");
        assert_eq!(bundle, temp.path().join(RESULT_ARCHIVE));

        let mut outer = ZipArchive::new(File::open(&bundle).unwrap()).unwrap();
        assert_eq!(outer.len(), 5);
        let order: Vec<String> = (0..outer.len())
            .map(|i| outer.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            order,
            vec!["combined.zip", "calc.js", "calc.wasm", "README.md", "example.calc"]
        );
        for i in 0..outer.len() {
            assert!(outer.by_index(i).unwrap().size() > 0);
        }

        let mut inner_names = names(&temp.path().join(SOURCES_ARCHIVE));
        inner_names.sort();
        assert_eq!(inner_names, vec!["calc.c", "lex.yy.c", "y.tab.c"]);
    }

    #[test]
    fn test_entries_keep_their_bytes() {
        let temp = TempDir::new().unwrap();
        let set = sample_set(temp.path());
        let bundle = assemble_in(&set, temp.path()).unwrap();

        let mut outer = ZipArchive::new(File::open(&bundle).unwrap()).unwrap();
        let mut readme = String::new();
        io::Read::read_to_string(&mut outer.by_name("README.md").unwrap(), &mut readme).unwrap();
        assert_eq!(readme, "# Calc");
    }

    #[test]
    fn test_clashing_entry_names_are_prefixed() {
        let temp = TempDir::new().unwrap();
        let mut set = sample_set(temp.path());
        set.example = artifact(temp.path(), "example", "example.md", "README.md", "demo");

        let bundle = assemble_in(&set, temp.path()).unwrap();
        let entries = names(&bundle);
        assert!(entries.contains(&"README.md".to_string()));
        assert!(entries.contains(&"example-README.md".to_string()));
    }

    #[test]
    fn test_missing_artifact_names_path() {
        let temp = TempDir::new().unwrap();
        let mut set = sample_set(temp.path());
        fs::remove_file(&set.module_binary.path).unwrap();
        set.module_binary.path = temp.path().join("calc.wasm");

        let err = assemble_in(&set, temp.path()).unwrap_err();
        match err {
            Error::Io { path, .. } => assert_eq!(path, temp.path().join("calc.wasm")),
            other => panic!("Expected IO error, got {:?}", other),
        }
    }

    #[test]
    fn test_repeat_assembly_is_structurally_identical() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();

        let a = assemble_in(&sample_set(first.path()), first.path()).unwrap();
        let b = assemble_in(&sample_set(second.path()), second.path()).unwrap();

        assert_eq!(names(&a), names(&b));
    }
}

//! Artifact intake: persisting uploaded inputs into a workspace.
//!
//! Uploads are written to role-derived file names (`inputs/grammar.y`,
//! `inputs/lexer.l`, ...). Toolchain outputs live in the workspace root, so
//! no generated file can overwrite an input. The caller-declared filename
//! never touches the filesystem; it is reduced to a bare base name and only
//! used as the archive entry name.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::workspace::Workspace;

/// Workspace subdirectory holding the stored inputs.
pub const INPUTS_DIR: &str = "inputs";

/// The five inputs of a build request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Grammar specification (bison input).
    Grammar,
    /// Lexical scanner specification (flex input).
    Lexer,
    /// Interpreter C source.
    Interpreter,
    /// Documentation text.
    Documentation,
    /// Example program.
    Example,
}

impl Role {
    /// All roles, in intake order.
    pub const ALL: [Role; 5] = [
        Role::Grammar,
        Role::Lexer,
        Role::Interpreter,
        Role::Documentation,
        Role::Example,
    ];

    /// Canonical multipart part name.
    pub fn part_name(self) -> &'static str {
        match self {
            Role::Grammar => "grammar",
            Role::Lexer => "lexer",
            Role::Interpreter => "interpreter",
            Role::Documentation => "documentation",
            Role::Example => "example",
        }
    }

    /// Resolve a multipart part name, accepting the legacy aliases
    /// (`parser`, `README`) sent by older clients.
    pub fn from_part_name(name: &str) -> Option<Role> {
        match name {
            "grammar" | "parser" => Some(Role::Grammar),
            "lexer" => Some(Role::Lexer),
            "interpreter" => Some(Role::Interpreter),
            "documentation" | "README" | "readme" => Some(Role::Documentation),
            "example" => Some(Role::Example),
            _ => None,
        }
    }

    fn default_extension(self) -> &'static str {
        match self {
            Role::Grammar => "y",
            Role::Lexer => "l",
            Role::Interpreter => "c",
            Role::Documentation => "md",
            Role::Example => "txt",
        }
    }

    fn default_file_name(self) -> &'static str {
        match self {
            Role::Grammar => "grammar.y",
            Role::Lexer => "lexer.l",
            Role::Interpreter => "interpreter.c",
            Role::Documentation => "README.md",
            Role::Example => "example.txt",
        }
    }

    fn index(self) -> usize {
        match self {
            Role::Grammar => 0,
            Role::Lexer => 1,
            Role::Interpreter => 2,
            Role::Documentation => 3,
            Role::Example => 4,
        }
    }
}

/// An input persisted in the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInput {
    /// Which input this is.
    pub role: Role,
    /// Location inside the workspace.
    pub path: PathBuf,
    /// Sanitized base name, used as the archive entry name.
    pub entry_name: String,
    /// Bytes written.
    pub size: u64,
}

/// All five inputs, persisted and validated.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub grammar: StoredInput,
    pub lexer: StoredInput,
    pub interpreter: StoredInput,
    pub documentation: StoredInput,
    pub example: StoredInput,
}

/// Collects uploads into a workspace.
pub struct Intake<'a> {
    workspace: &'a Workspace,
    claimed: [bool; 5],
    stored: [Option<StoredInput>; 5],
}

impl<'a> Intake<'a> {
    /// Start collecting inputs into `workspace`.
    pub fn new(workspace: &'a Workspace) -> Self {
        Self {
            workspace,
            claimed: [false; 5],
            stored: Default::default(),
        }
    }

    /// Open the destination file for `role`.
    ///
    /// Fails with [`Error::DuplicatePart`] if the role was already started.
    pub async fn begin(&mut self, role: Role, declared_name: Option<&str>) -> Result<Upload> {
        if self.claimed[role.index()] {
            return Err(Error::DuplicatePart(role.part_name()));
        }
        self.claimed[role.index()] = true;

        let entry_name = declared_name
            .and_then(sanitize_file_name)
            .unwrap_or_else(|| role.default_file_name().to_string());
        let extension = safe_extension(&entry_name).unwrap_or(role.default_extension());
        let dir = self.workspace.join(INPUTS_DIR);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::io(&dir, e))?;
        let path = dir.join(format!("{}.{}", role.part_name(), extension));

        let file = File::create(&path).await.map_err(|e| Error::io(&path, e))?;

        Ok(Upload {
            role,
            path,
            entry_name,
            file,
            written: 0,
        })
    }

    /// Flush a finished upload and record it.
    pub async fn commit(&mut self, mut upload: Upload) -> Result<()> {
        upload
            .file
            .flush()
            .await
            .map_err(|e| Error::io(&upload.path, e))?;
        upload
            .file
            .sync_all()
            .await
            .map_err(|e| Error::io(&upload.path, e))?;

        tracing::debug!(
            workspace = %self.workspace.id(),
            "stored {} ({} bytes) as {}",
            upload.role.part_name(),
            upload.written,
            upload.path.display()
        );

        self.stored[upload.role.index()] = Some(StoredInput {
            role: upload.role,
            path: upload.path,
            entry_name: upload.entry_name,
            size: upload.written,
        });
        Ok(())
    }

    /// Stream `reader` into the workspace as `role`.
    pub async fn store_reader<R>(
        &mut self,
        role: Role,
        declared_name: Option<&str>,
        reader: &mut R,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut upload = self.begin(role, declared_name).await?;
        let written = tokio::io::copy(reader, &mut upload.file)
            .await
            .map_err(|e| Error::io(&upload.path, e))?;
        upload.written = written;
        self.commit(upload).await?;
        Ok(written)
    }

    /// Copy a local file into the workspace as `role`.
    pub async fn store_file(&mut self, role: Role, source: &Path) -> Result<u64> {
        let mut file = File::open(source)
            .await
            .map_err(|e| Error::io(source, e))?;
        let declared = source.file_name().map(|n| n.to_string_lossy().into_owned());
        self.store_reader(role, declared.as_deref(), &mut file).await
    }

    /// Check that every input is present.
    pub fn finish(self) -> Result<ArtifactPaths> {
        let [grammar, lexer, interpreter, documentation, example] = self.stored;
        let require = |input: Option<StoredInput>, role: Role| {
            input.ok_or(Error::MissingPart(role.part_name()))
        };

        Ok(ArtifactPaths {
            grammar: require(grammar, Role::Grammar)?,
            lexer: require(lexer, Role::Lexer)?,
            interpreter: require(interpreter, Role::Interpreter)?,
            documentation: require(documentation, Role::Documentation)?,
            example: require(example, Role::Example)?,
        })
    }
}

/// An upload in progress.
pub struct Upload {
    role: Role,
    path: PathBuf,
    entry_name: String,
    file: File,
    written: u64,
}

impl Upload {
    /// Which input is being written.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append a chunk of the upload body.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| Error::io(&self.path, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }
}

/// Reduce a caller-declared filename to a bare base name.
///
/// Directory components (either separator), control characters and the
/// special names `.`/`..` are dropped. Returns `None` if nothing usable is left.
pub fn sanitize_file_name(declared: &str) -> Option<String> {
    let base = declared
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Extension of `name` if it is short and alphanumeric.
fn safe_extension(name: &str) -> Option<&str> {
    let ext = Path::new(name).extension()?.to_str()?;
    let ok = !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    ok.then_some(ext)
}

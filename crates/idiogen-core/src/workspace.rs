//! Request-scoped build workspaces.
//!
//! Every build gets its own directory under the workspace root:
//!
//! ```text
//! $TMPDIR/
//! └── idiogen-<uuid>/   # one per request, removed when the guard drops
//!     ├── inputs/       # grammar.y, lexer.l, interpreter.c, ...
//!     ├── y.tab.c, y.tab.h, lex.yy.c
//!     ├── <stem>.js, <stem>.wasm
//!     └── combined.zip, output.zip
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{Error, Result};

/// Prefix of every workspace directory name.
pub const WORKSPACE_PREFIX: &str = "idiogen-";

/// An exclusively owned build directory.
///
/// The directory is removed by [`Workspace::release`] or, failing that, when
/// the guard is dropped. Dropping covers early returns, panics and cancelled
/// request futures alike.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
    released: bool,
}

impl Workspace {
    /// Create a fresh workspace under `root`.
    ///
    /// The directory name carries a random uuid and is created exclusively, so
    /// two concurrent requests can never end up sharing one.
    pub fn acquire(root: &Path) -> Result<Self> {
        let id = Uuid::new_v4();
        let path = root.join(format!("{}{}", WORKSPACE_PREFIX, id));

        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&path).map_err(|e| Error::io(&path, e))?;

        tracing::debug!(workspace = %id, "phase: workspace-acquired at {}", path.display());

        Ok(Self {
            id,
            path,
            released: false,
        })
    }

    /// Unique id of this workspace.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the workspace.
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }

    /// Whether the directory has already been removed.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Remove the directory. Calling this more than once is a no-op.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match remove_tree(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&self.path, e)),
        }

        tracing::debug!(workspace = %self.id, "phase: workspace-released");
        Ok(())
    }
}

/// Remove `path`, telling a multi-threaded runtime that this worker blocks.
fn remove_tree(path: &Path) -> io::Result<()> {
    use tokio::runtime::{Handle, RuntimeFlavor};

    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| fs::remove_dir_all(path))
        }
        _ => fs::remove_dir_all(path),
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(workspace = %self.id, "failed to remove workspace: {}", e);
        }
    }
}

/// Count leftover workspace directories under `root`.
pub fn count_workspaces(root: &Path) -> Result<usize> {
    let entries = fs::read_dir(root).map_err(|e| Error::io(root, e))?;
    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(root, e))?;
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with(WORKSPACE_PREFIX)
        {
            count += 1;
        }
    }
    Ok(count)
}

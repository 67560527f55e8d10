//! Stage runner for the external toolchain.
//!
//! # Pipeline
//!
//! ```text
//! grammar.y ──► bison ──► y.tab.c + y.tab.h ─┐
//! lexer.l ────► flex ───► lex.yy.c ──────────┼──► emcc ──► <stem>.js + <stem>.wasm
//! interpreter.c ─────────────────────────────┘
//! ```
//!
//! Stages run strictly in order; the first failure aborts the rest.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::artifacts::{Artifact, ArtifactSet};
use crate::error::{Error, Result, StageFailure};
use crate::intake::ArtifactPaths;
use crate::toolchain::Toolchain;
use crate::workspace::Workspace;

/// Generated parser source.
pub const PARSER_SOURCE: &str = "y.tab.c";
/// Generated parser header, included by the scanner.
pub const PARSER_HEADER: &str = "y.tab.h";
/// Generated scanner source.
pub const LEXER_SOURCE: &str = "lex.yy.c";

/// The three external stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Grammar specification to parser source.
    Grammar,
    /// Lexer specification to scanner source.
    Lexer,
    /// Whole-program compilation to a web module.
    Link,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Grammar => "grammar",
            StageKind::Lexer => "lexer",
            StageKind::Link => "link",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fully specified external invocation.
#[derive(Debug, Clone)]
pub struct StageCommand {
    pub stage: StageKind,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Files that must exist and be non-empty after a clean exit.
    pub outputs: Vec<PathBuf>,
}

impl StageCommand {
    fn fail(&self, failure: StageFailure, diagnostics: String) -> Error {
        Error::Stage {
            stage: self.stage,
            failure,
            diagnostics,
        }
    }
}

/// Result of a successful stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub stage: StageKind,
    pub outputs: Vec<PathBuf>,
    /// Merged stdout/stderr (warnings, usually empty).
    pub diagnostics: String,
    pub elapsed: Duration,
}

/// `bison -d -o y.tab.c <grammar>`
pub fn grammar_command(toolchain: &Toolchain, workspace: &Workspace, grammar: &Path) -> StageCommand {
    let parser = workspace.join(PARSER_SOURCE);
    StageCommand {
        stage: StageKind::Grammar,
        program: toolchain.bison.clone(),
        args: vec![
            "-d".into(),
            "-o".into(),
            parser.clone().into_os_string(),
            grammar.as_os_str().to_owned(),
        ],
        outputs: vec![parser, workspace.join(PARSER_HEADER)],
    }
}

/// `flex -o lex.yy.c <lexer>`
pub fn lexer_command(toolchain: &Toolchain, workspace: &Workspace, lexer: &Path) -> StageCommand {
    let scanner = workspace.join(LEXER_SOURCE);
    StageCommand {
        stage: StageKind::Lexer,
        program: toolchain.flex.clone(),
        args: vec![
            "-o".into(),
            scanner.clone().into_os_string(),
            lexer.as_os_str().to_owned(),
        ],
        outputs: vec![scanner],
    }
}

/// `emcc lex.yy.c y.tab.c <interpreter> [libs] -O3 -s ... -o <stem>.js`
pub fn link_command(
    toolchain: &Toolchain,
    workspace: &Workspace,
    interpreter: &Path,
    stem: &str,
) -> StageCommand {
    let mut sources: Vec<OsString> = vec![
        workspace.join(LEXER_SOURCE).into_os_string(),
        workspace.join(PARSER_SOURCE).into_os_string(),
        interpreter.as_os_str().to_owned(),
    ];
    sources.extend(toolchain.support_libs.iter().map(|lib| lib.clone().into_os_string()));

    emcc_command(toolchain, workspace, sources, stem)
}

/// Compile a single C file with the link flags; used to smoke-test emcc.
pub fn probe_command(toolchain: &Toolchain, workspace: &Workspace, source: &Path) -> StageCommand {
    emcc_command(toolchain, workspace, vec![source.as_os_str().to_owned()], "probe")
}

fn emcc_command(
    toolchain: &Toolchain,
    workspace: &Workspace,
    mut args: Vec<OsString>,
    stem: &str,
) -> StageCommand {
    let glue = workspace.join(format!("{}.js", stem));
    let binary = workspace.join(format!("{}.wasm", stem));

    args.push(toolchain.optimization.clone().into());
    for setting in toolchain.emcc_settings() {
        args.push("-s".into());
        args.push(setting.into());
    }
    args.push("-o".into());
    args.push(glue.clone().into_os_string());

    StageCommand {
        stage: StageKind::Link,
        program: toolchain.emcc.clone(),
        args,
        outputs: vec![glue, binary],
    }
}

/// Base name for the compiled module, derived from the interpreter's entry name.
pub fn module_stem(interpreter_entry: &str) -> String {
    let stem = Path::new(interpreter_entry)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    if stem.is_empty() {
        "interpreter".to_string()
    } else {
        stem
    }
}

/// Run one stage to completion or until `limit` elapses.
///
/// The child is killed if the returned future is dropped, so a cancelled
/// request does not leave a compiler running.
pub async fn run_stage(command: &StageCommand, workdir: &Path, limit: Duration) -> Result<StageOutput> {
    let started = Instant::now();
    tracing::debug!(
        "running {} stage: {} {:?}",
        command.stage,
        command.program.display(),
        command.args
    );

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| command.fail(StageFailure::Launch(e.to_string()), String::new()))?;

    // Both streams feed one channel so the diagnostics keep their arrival order.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let tx_err = tx.clone();

    let waited = tokio::time::timeout(limit, async {
        let (status, (), ()) = tokio::join!(
            child.wait(),
            forward_output(stdout, tx),
            forward_output(stderr, tx_err),
        );
        status
    })
    .await;

    let timed_out = waited.is_err();
    if timed_out {
        let _ = child.kill().await;
    }

    let mut merged = Vec::new();
    while let Ok(chunk) = rx.try_recv() {
        merged.extend_from_slice(&chunk);
    }
    let diagnostics = String::from_utf8_lossy(&merged).into_owned();

    let status = match waited {
        Ok(status) => status.map_err(|e| Error::io(&command.program, e))?,
        Err(_) => {
            tracing::warn!("{} stage timed out after {:?}", command.stage, limit);
            return Err(command.fail(StageFailure::Timeout(limit), diagnostics));
        }
    };

    if !status.success() {
        tracing::info!("{} stage failed with {}", command.stage, status);
        return Err(command.fail(StageFailure::ExitStatus(status.code()), diagnostics));
    }

    for output in &command.outputs {
        let present = tokio::fs::metadata(output)
            .await
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false);
        if !present {
            tracing::info!("{} stage produced no {}", command.stage, output.display());
            return Err(command.fail(StageFailure::MissingOutput(output.clone()), diagnostics));
        }
    }

    let elapsed = started.elapsed();
    tracing::debug!("{} stage finished in {:?}", command.stage, elapsed);

    Ok(StageOutput {
        stage: command.stage,
        outputs: command.outputs.clone(),
        diagnostics,
        elapsed,
    })
}

/// Forward a child stream line by line.
async fn forward_output<R>(stream: Option<R>, tx: mpsc::UnboundedSender<Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return;
    };
    let mut reader = BufReader::new(stream);

    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if tx.send(line).is_err() {
                    break;
                }
            }
        }
    }
}

/// Run grammar, lexer and link stages over the stored inputs.
pub async fn run_stages(
    toolchain: &Toolchain,
    workspace: &Workspace,
    inputs: &ArtifactPaths,
) -> Result<ArtifactSet> {
    let limit = toolchain.stage_timeout;
    let workdir = workspace.path();

    let grammar = grammar_command(toolchain, workspace, &inputs.grammar.path);
    run_stage(&grammar, workdir, limit).await?;
    tracing::debug!(workspace = %workspace.id(), "phase: stage1-done");

    let lexer = lexer_command(toolchain, workspace, &inputs.lexer.path);
    run_stage(&lexer, workdir, limit).await?;
    tracing::debug!(workspace = %workspace.id(), "phase: stage2-done");

    let stem = module_stem(&inputs.interpreter.entry_name);
    let link = link_command(toolchain, workspace, &inputs.interpreter.path, &stem);
    run_stage(&link, workdir, limit).await?;
    tracing::debug!(workspace = %workspace.id(), "phase: stage3-done");

    let glue = format!("{}.js", stem);
    let binary = format!("{}.wasm", stem);

    Ok(ArtifactSet {
        parser_source: Artifact::new("parser", workspace.join(PARSER_SOURCE), PARSER_SOURCE),
        lexer_source: Artifact::new("lexer", workspace.join(LEXER_SOURCE), LEXER_SOURCE),
        interpreter_source: Artifact::from_input("interpreter", &inputs.interpreter),
        module_glue: Artifact::new("module", workspace.join(&glue), glue),
        module_binary: Artifact::new("module", workspace.join(&binary), binary),
        documentation: Artifact::from_input("documentation", &inputs.documentation),
        example: Artifact::from_input("example", &inputs.example),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let root = TempDir::new().expect("Failed to create temp dir");
        let ws = Workspace::acquire(root.path()).expect("Failed to acquire");
        (root, ws)
    }

    #[test]
    fn test_module_stem() {
        assert_eq!(module_stem("calc.c"), "calc");
        assert_eq!(module_stem("my interp.c"), "myinterp");
        assert_eq!(module_stem("..c"), "interpreter");
        assert_eq!(module_stem(""), "interpreter");
    }

    #[test]
    fn test_grammar_command_layout() {
        let (_root, ws) = workspace();
        let cmd = grammar_command(&Toolchain::default(), &ws, &ws.join("grammar.y"));
        assert_eq!(cmd.stage, StageKind::Grammar);
        assert_eq!(cmd.args[0], "-d");
        assert_eq!(cmd.args[2], ws.join(PARSER_SOURCE).into_os_string());
        assert_eq!(cmd.outputs.len(), 2);
    }

    #[test]
    fn test_probe_command() {
        let (_root, ws) = workspace();
        let cmd = probe_command(&Toolchain::default(), &ws, &ws.join("main.c"));
        assert_eq!(cmd.program, PathBuf::from("emcc"));
        assert!(cmd.args[0].to_string_lossy().ends_with("main.c"));
        assert_eq!(cmd.args[1], "-O3");
        assert!(cmd.outputs[0].ends_with("probe.js"));
    }

    #[test]
    fn test_link_command_flags() {
        let (_root, ws) = workspace();
        let toolchain = Toolchain {
            support_libs: vec![PathBuf::from("/usr/lib/libfl.a")],
            ..Toolchain::default()
        };
        let cmd = link_command(&toolchain, &ws, &ws.join("interpreter.c"), "calc");
        let args: Vec<String> = cmd
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args[0].ends_with(LEXER_SOURCE));
        assert!(args[1].ends_with(PARSER_SOURCE));
        assert!(args[2].ends_with("interpreter.c"));
        assert_eq!(args[3], "/usr/lib/libfl.a");
        assert_eq!(args[4], "-O3");
        assert!(args.contains(&"MODULARIZE=1".to_string()));
        assert!(args.contains(&"EXPORT_NAME=createInterpreterModule".to_string()));
        assert!(args[args.len() - 1].ends_with("calc.js"));
        assert!(cmd.outputs[1].ends_with("calc.wasm"));
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_failure() {
        let (_root, ws) = workspace();
        let cmd = StageCommand {
            stage: StageKind::Lexer,
            program: PathBuf::from("/nonexistent/idiogen/flex"),
            args: Vec::new(),
            outputs: Vec::new(),
        };
        let err = run_stage(&cmd, ws.path(), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            Error::Stage { stage, failure, .. } => {
                assert_eq!(stage, StageKind::Lexer);
                assert_eq!(failure.reason(), "launch");
            }
            other => panic!("Expected stage error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_diagnostics_merge_both_streams() {
        let (_root, ws) = workspace();
        let cmd = StageCommand {
            stage: StageKind::Grammar,
            program: PathBuf::from("sh"),
            args: vec![
                "-c".into(),
                "echo 'to stdout'; echo 'calc.y:1: syntax error' >&2; exit 3".into(),
            ],
            outputs: Vec::new(),
        };
        let err = run_stage(&cmd, ws.path(), Duration::from_secs(10))
            .await
            .unwrap_err();
        match err {
            Error::Stage {
                failure,
                diagnostics,
                ..
            } => {
                assert_eq!(failure, StageFailure::ExitStatus(Some(3)));
                assert!(diagnostics.contains("to stdout\n"));
                assert!(diagnostics.contains("calc.y:1: syntax error\n"));
            }
            other => panic!("Expected stage error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_without_output_fails() {
        let (_root, ws) = workspace();
        let cmd = StageCommand {
            stage: StageKind::Link,
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), "true".into()],
            outputs: vec![ws.join("calc.js")],
        };
        let err = run_stage(&cmd, ws.path(), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Stage {
                failure: StageFailure::MissingOutput(_),
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_stage() {
        let (_root, ws) = workspace();
        let cmd = StageCommand {
            stage: StageKind::Link,
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), "echo starting; exec sleep 30".into()],
            outputs: Vec::new(),
        };
        let started = Instant::now();
        let err = run_stage(&cmd, ws.path(), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            Error::Stage {
                failure,
                diagnostics,
                ..
            } => {
                assert_eq!(failure.reason(), "timeout");
                assert!(diagnostics.contains("starting"));
            }
            other => panic!("Expected stage error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_stage_reports_outputs() {
        let (_root, ws) = workspace();
        let out = ws.join("y.tab.c");
        let cmd = StageCommand {
            stage: StageKind::Grammar,
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), "echo 'int x;' > y.tab.c".into()],
            outputs: vec![out.clone()],
        };
        let output = run_stage(&cmd, ws.path(), Duration::from_secs(10))
            .await
            .expect("Stage should succeed");
        assert_eq!(output.outputs, vec![out]);
        assert!(output.diagnostics.is_empty());
    }
}

//! Idiogen CLI - build browser-runnable interpreters from bison/flex sources.

mod build;
mod doctor;
mod serve;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use idiogen_core::{PipelineConfig, Toolchain};

#[derive(Parser)]
#[command(name = "idiogen")]
#[command(about = "Compile bison/flex language implementations to WebAssembly bundles")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the compile server
    Serve {
        /// Host address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "9657")]
        port: u16,

        /// Maximum multipart body size in MiB
        #[arg(long, default_value = "32", value_parser = clap::value_parser!(u64).range(1..))]
        max_body_mb: u64,

        #[command(flatten)]
        toolchain: ToolchainArgs,
    },

    /// Build a bundle locally from five files
    Build {
        /// Grammar specification (bison)
        #[arg(long)]
        grammar: PathBuf,

        /// Lexer specification (flex)
        #[arg(long)]
        lexer: PathBuf,

        /// Interpreter C source
        #[arg(long)]
        interpreter: PathBuf,

        /// Documentation file
        #[arg(long)]
        documentation: PathBuf,

        /// Example program
        #[arg(long)]
        example: PathBuf,

        /// Output path for the bundle
        #[arg(short, long, default_value = "build-output.zip")]
        output: PathBuf,

        #[command(flatten)]
        toolchain: ToolchainArgs,
    },

    /// Check that the toolchain is installed and emcc can compile
    Doctor {
        #[command(flatten)]
        toolchain: ToolchainArgs,
    },
}

/// Toolchain overrides shared by every command.
#[derive(Args)]
struct ToolchainArgs {
    /// Path to bison
    #[arg(long)]
    bison: Option<PathBuf>,

    /// Path to flex
    #[arg(long)]
    flex: Option<PathBuf>,

    /// Path to emcc
    #[arg(long)]
    emcc: Option<PathBuf>,

    /// Static library to link (repeatable; defaults to flex's libfl.a if found)
    #[arg(long = "support-lib")]
    support_libs: Vec<PathBuf>,

    /// Timeout for each toolchain stage, in seconds
    #[arg(long, default_value = "120", value_parser = clap::value_parser!(u64).range(1..))]
    stage_timeout: u64,

    /// Directory for per-build workspaces (defaults to the system temp dir)
    #[arg(long)]
    workspace_root: Option<PathBuf>,
}

impl ToolchainArgs {
    fn pipeline_config(self) -> PipelineConfig {
        let detected = Toolchain::detect();
        let support_libs = if self.support_libs.is_empty() {
            detected.support_libs
        } else {
            self.support_libs
        };

        let toolchain = Toolchain {
            bison: self.bison.unwrap_or(detected.bison),
            flex: self.flex.unwrap_or(detected.flex),
            emcc: self.emcc.unwrap_or(detected.emcc),
            support_libs,
            stage_timeout: Duration::from_secs(self.stage_timeout),
            ..Toolchain::default()
        };

        let defaults = PipelineConfig::default();
        PipelineConfig {
            workspace_root: self.workspace_root.unwrap_or(defaults.workspace_root),
            toolchain,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else if matches!(cli.command, Commands::Serve { .. }) {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve {
            host,
            port,
            max_body_mb,
            toolchain,
        } => {
            serve::execute(host, port, max_body_mb, toolchain.pipeline_config()).await?;
        }

        Commands::Build {
            grammar,
            lexer,
            interpreter,
            documentation,
            example,
            output,
            toolchain,
        } => {
            let inputs = build::BuildInputs {
                grammar,
                lexer,
                interpreter,
                documentation,
                example,
            };
            build::execute(&inputs, &output, toolchain.pipeline_config()).await?;
        }

        Commands::Doctor { toolchain } => {
            doctor::execute(toolchain.pipeline_config()).await?;
        }
    }

    Ok(())
}

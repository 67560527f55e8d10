//! Serve command implementation for Idiogen CLI.

use idiogen_core::PipelineConfig;
use idiogen_server::ServerConfig;

/// Start the compile server.
pub async fn execute(
    host: String,
    port: u16,
    max_body_mb: u64,
    pipeline: PipelineConfig,
) -> anyhow::Result<()> {
    let max_body_bytes = max_body_mb
        .checked_mul(1 << 20)
        .and_then(|bytes| usize::try_from(bytes).ok())
        .ok_or_else(|| anyhow::anyhow!("--max-body-mb {} is too large", max_body_mb))?;

    let config = ServerConfig {
        host,
        port,
        max_body_bytes,
    };

    println!("\nIdiogen Server - Language Bundle Compiler");
    println!("{}", "─".repeat(50));
    println!("  ◆ Compile:   POST http://{}:{}/compile", config.host, config.port);
    println!("  ◆ Health:    GET  http://{}:{}/health", config.host, config.port);
    println!("  ◆ Workspace: {}", pipeline.workspace_root.display());
    println!("{}", "─".repeat(50));
    println!("Press Ctrl+C to stop");
    println!();

    idiogen_server::serve(config, pipeline).await?;

    Ok(())
}

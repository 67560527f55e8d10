//! Doctor command: toolchain availability and an emcc smoke test.

use idiogen_core::stage::{probe_command, run_stage};
use idiogen_core::{Pipeline, PipelineConfig};

const HELLO_C: &str = r#"#include <stdio.h>
int main(int argc, char **argv) {
    printf("Hello world!\n");
    return 0;
}
"#;

/// Report the toolchain and try compiling a hello-world program.
pub async fn execute(config: PipelineConfig) -> anyhow::Result<()> {
    let report = config.toolchain.report();
    for (name, status) in [
        ("bison", &report.bison),
        ("flex", &report.flex),
        ("emcc", &report.emcc),
    ] {
        let mark = if status.available { "ok" } else { "missing" };
        println!("  {:<6} {:<8} {}", name, mark, status.path);
    }
    for lib in &config.toolchain.support_libs {
        println!("  lib    {:<8} {}", "ok", lib.display());
    }

    if !report.emcc.available {
        anyhow::bail!("emcc not found; install emscripten or pass --emcc");
    }

    let pipeline = Pipeline::new(config);
    let toolchain = &pipeline.config().toolchain;
    let workspace = pipeline.acquire_workspace()?;
    let source = workspace.join("main.c");
    tokio::fs::write(&source, HELLO_C).await?;

    let command = probe_command(toolchain, &workspace, &source);
    let output = run_stage(&command, workspace.path(), toolchain.stage_timeout).await?;

    println!("emcc compiled hello world in {:.1?}", output.elapsed);
    if !output.diagnostics.is_empty() {
        print!("{}", output.diagnostics);
    }
    Ok(())
}

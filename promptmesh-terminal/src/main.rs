/// promptmesh - generate a 3D model from a prompt and inspect it in the terminal.
///
/// Controls:
///   - Mouse drag: Rotate
///   - /: Edit prompt, Enter: Generate
///   - M: Toggle the large viewer
///   - D: Download the current model
///   - Q/ESC: Quit
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use promptmesh_terminal::{config, telemetry, Startup, TerminalApp};

#[derive(Parser, Debug)]
#[command(name = "promptmesh", version, about = "Prompt-to-3D model viewer for the terminal")]
struct Cli {
    /// Config file (defaults to config/promptmesh.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a local ASCII PLY file
    View { path: PathBuf },
    /// Generate a model from a prompt and open it
    Generate { prompt: Vec<String> },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = config::load(cli.config.as_deref())?;
    telemetry::init(&loaded.config.log_file)?;
    loaded.log_rejected();
    let cfg = loaded.config;

    let startup = match cli.command {
        None => Startup::Empty,
        Some(Command::View { path }) => Startup::View(path),
        Some(Command::Generate { prompt }) => Startup::Generate(prompt.join(" ")),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    let local = tokio::task::LocalSet::new();

    let mut app = TerminalApp::new(cfg).context("query terminal size")?;
    local
        .block_on(&runtime, app.run(startup))
        .context("terminal session failed")?;

    println!("Thank you for using promptmesh!");
    Ok(())
}

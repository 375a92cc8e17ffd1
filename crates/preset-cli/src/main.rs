mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "presetctl",
    about = "Start, stop and monitor presets across groups of display clients",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file with clients, groups and presets
    #[arg(long, global = true, env = "PRESET_CONFIG", default_value = preset_core::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Server URL for remote commands
    #[arg(long, global = true, env = "PRESET_URL", default_value = "http://localhost:8080")]
    url: String,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation loop and HTTP API
    Serve {
        /// Port to listen on (0 = OS-assigned)
        #[arg(long, default_value = "8080")]
        port: u16,
    },

    /// Validate the config file
    Check,

    /// Show preset status (all presets when PRESET is omitted)
    Status { preset: Option<String> },

    /// Start a preset on its target group
    Start { preset: String },

    /// Stop a preset on every client running it
    Stop {
        preset: String,

        /// Fail when nothing is running instead of succeeding quietly
        #[arg(long)]
        require_active: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(&cli.config, port),
        Commands::Check => cmd::check::run(&cli.config, cli.json),
        Commands::Status { preset } => cmd::remote::status(&cli.url, preset.as_deref(), cli.json),
        Commands::Start { preset } => cmd::remote::start(&cli.url, &preset, cli.json),
        Commands::Stop {
            preset,
            require_active,
        } => cmd::remote::stop(&cli.url, &preset, require_active, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

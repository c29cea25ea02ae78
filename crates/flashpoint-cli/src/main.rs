mod cmd;
mod output;
mod root;
mod ticker;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use flashpoint_core::liveness::DEFAULT_MAX_INACTIVE_HOURS;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "flashpoint",
    about = "Spin up per-branch review apps on Heroku and reclaim the idle ones",
    version,
    propagate_version = true
)]
struct Cli {
    /// Directory holding project configs (default: ~/.flashpoint)
    #[arg(long, global = true, env = "FLASHPOINT_HOME")]
    config_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fork every app of a project into a fresh set of review apps
    Create {
        /// Project config name (resolved under the config dir) or path
        config: String,

        /// Deploy BRANCH for APP instead of the checkout's current branch
        #[arg(long = "branch", value_name = "APP=BRANCH", value_parser = parse_kv)]
        branches: Vec<(String, String)>,

        /// Seed for review-app name generation (reproducible names)
        #[arg(long, env = "FLASHPOINT_SEED", hide = true)]
        seed: Option<u64>,
    },

    /// Destroy review apps that have gone idle, across every project
    #[command(alias = "destroy-old")]
    Reclaim {
        /// Destroy every registered review app regardless of activity
        #[arg(long)]
        force: bool,

        /// Idle time, in whole hours, after which a review app is destroyed
        #[arg(long, default_value_t = DEFAULT_MAX_INACTIVE_HOURS)]
        max_inactive_hours: i64,
    },

    /// List review apps recorded in each app's registry
    List {
        /// Restrict to one project config (default: all)
        config: Option<String>,
    },

    /// Inspect project configs
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn parse_kv(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, _)) if k.trim().is_empty() => Err(format!("app cannot be empty in: {s}")),
        Some((_, v)) if v.trim().is_empty() => Err(format!("branch cannot be empty in: {s}")),
        Some((k, v)) => Ok((k.trim().to_string(), v.trim().to_string())),
        None => Err(format!("expected APP=BRANCH, got: {s}")),
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Create { .. } | Commands::Reclaim { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(ticker::log_writer)
        .with_target(false)
        .init();

    let result = root::resolve_config_dir(cli.config_dir.as_deref()).and_then(|dir| {
        match cli.command {
            Commands::Create {
                config,
                branches,
                seed,
            } => cmd::create::run(&dir, &config, branches, seed, cli.json),
            Commands::Reclaim {
                force,
                max_inactive_hours,
            } => cmd::reclaim::run(&dir, force, max_inactive_hours, cli.json),
            Commands::List { config } => cmd::list::run(&dir, config.as_deref(), cli.json),
            Commands::Config { subcommand } => cmd::config::run(&dir, subcommand, cli.json),
        }
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

//! near-compiler HTTP server
//!
//! Serves `POST /compile` on top of the sandboxed build orchestrator.

use clap::Parser;
use near_compiler::config::{self, validate_config, Config};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "near-compiler-server", version = near_compiler::VERSION, about = "NEAR contract compiler API server")]
struct Args {
    /// Bind address (overrides config and BIND)
    #[arg(long)]
    bind: Option<String>,

    /// Port (overrides config and PORT)
    #[arg(long, short)]
    port: Option<u16>,

    /// Config file (JSON5 or TOML) instead of the default location
    #[arg(long, short, env = "NEAR_COMPILER_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "near_compiler=info,tower_http=info".into());

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load(args: &Args) -> near_compiler::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = config::load_config_from_path(path)?;
            config::apply_env_overrides(&mut config)?;
            config
        }
        None => Config::from_env()?,
    };

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("Starting near-compiler v{}", near_compiler::VERSION);

    let config = load(&args)?;

    let validation = validate_config(&config);
    for issue in &validation.warnings {
        warn!("{}", issue);
    }
    for issue in &validation.errors {
        error!("{}", issue);
    }
    if !validation.valid {
        anyhow::bail!("invalid configuration ({} errors)", validation.errors.len());
    }

    near_compiler::server::serve(config).await?;
    Ok(())
}

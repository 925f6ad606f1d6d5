//! near-compiler CLI
//!
//! Compile a local directory of contract sources with the same sandboxed
//! pipeline the server uses, and inspect the configuration.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use near_compiler::compiler::{
    validate_filename, CompileRequest, CompileResult, CompilerWrapper, DEVELOP_VERSION,
    MANIFEST_FILENAME,
};
use near_compiler::config::{config_path, save_config, validate_config, Config};
use near_compiler::VERSION;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "near-compiler",
    version = VERSION,
    about = "Compile NEAR JavaScript/TypeScript contracts in a disposable sandbox",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every .ts/.js file in a directory
    Compile {
        /// Directory holding the contract sources
        dir: PathBuf,

        /// Source file passed to the compiler
        #[arg(long, short)]
        entrypoint: String,

        /// SDK version (x.y.z) or "develop"
        #[arg(long, default_value = DEVELOP_VERSION)]
        sdk_version: String,

        /// Extra npm dependency, as name=range (repeatable)
        #[arg(long = "dep", value_parser = parse_dependency)]
        dependencies: Vec<(String, String)>,

        /// Where to write the wasm artifact
        #[arg(long, short, default_value = "contract.wasm")]
        out: PathBuf,
    },

    /// Validate the configuration and toolchain
    CheckConfig,

    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },

    /// Create the build root and shared npm cache
    Init,
}

fn parse_dependency(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, range)) if !name.is_empty() && !range.is_empty() => {
            Ok((name.to_string(), range.to_string()))
        }
        _ => Err(format!("expected name=range, got {:?}", s)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "near_compiler=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            dir,
            entrypoint,
            sdk_version,
            dependencies,
            out,
        } => compile(&dir, entrypoint, sdk_version, dependencies, &out).await,
        Commands::CheckConfig => check_config(),
        Commands::InitConfig { force } => init_config(force),
        Commands::Init => init().await,
    }
}

/// Collect the files the service would accept, plus a caller package.json
fn collect_sources(dir: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name == MANIFEST_FILENAME || validate_filename(&name).is_ok() {
            let contents = std::fs::read_to_string(entry.path())
                .with_context(|| format!("reading {}", entry.path().display()))?;
            files.insert(name, contents);
        }
    }
    Ok(files)
}

async fn compile(
    dir: &Path,
    entrypoint: String,
    sdk_version: String,
    dependencies: Vec<(String, String)>,
    out: &Path,
) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let compiler = CompilerWrapper::from_config(&config);

    let request = CompileRequest {
        toolchain_version: sdk_version,
        entrypoint,
        files: collect_sources(dir)?,
        dependencies: dependencies.into_iter().collect(),
    };
    if request.files.is_empty() {
        bail!("no .ts or .js sources found in {}", dir.display());
    }

    println!(
        "{} {} ({} files, sdk {})",
        style("Compiling").cyan().bold(),
        request.entrypoint,
        request.files.len(),
        request.toolchain_version
    );

    match compiler.compile(request).await {
        CompileResult::Success {
            artifact,
            stdout,
            stderr,
        } => {
            print_streams(&stdout, &stderr);
            std::fs::write(out, artifact.as_bytes())
                .with_context(|| format!("writing {}", out.display()))?;
            println!(
                "{} {} ({} bytes)",
                style("Wrote").green().bold(),
                out.display(),
                artifact.len()
            );
            Ok(())
        }
        CompileResult::Failure {
            error_type,
            stdout,
            stderr,
        } => {
            print_streams(stdout.as_deref().unwrap_or(""), stderr.as_deref().unwrap_or(""));
            bail!("build failed ({} error)", error_type)
        }
    }
}

fn print_streams(stdout: &str, stderr: &str) {
    if !stdout.trim().is_empty() {
        println!("{}", style("--- stdout ---").dim());
        println!("{}", stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        eprintln!("{}", style("--- stderr ---").dim());
        eprintln!("{}", stderr.trim_end());
    }
}

fn check_config() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let result = validate_config(&config);

    println!("{} {}", style("Config file:").bold(), config_path().display());
    println!("{} {}", style("Build root:").bold(), config.compiler.parent_dir.display());
    println!("{} {}", style("npm cache:").bold(), config.compiler.cache_dir().display());

    for issue in &result.warnings {
        println!("  {} {}", style("⚠").yellow(), issue);
    }
    for issue in &result.errors {
        println!("  {} {}", style("✗").red(), issue);
    }

    if result.valid {
        println!("{}", style("Configuration is valid").green());
        Ok(())
    } else {
        bail!("configuration has {} errors", result.errors.len())
    }
}

fn init_config(force: bool) -> anyhow::Result<()> {
    let path = config_path();
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    save_config(&Config::default(), &path)?;
    println!("{} {}", style("Wrote").green().bold(), path.display());
    Ok(())
}

async fn init() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let compiler = CompilerWrapper::from_config(&config);
    compiler.init().await?;
    println!(
        "{} {}",
        style("Build root ready at").green(),
        compiler.build_root().parent_dir().display()
    );
    Ok(())
}

//! berth - a supervised dynamic plugin host.
//!
//! Usage:
//!   berth scan [DIR]    List the plugins discoverable under DIR
//!   berth run [DIR]     Bootstrap the host, enable plugins, wait
//!   berth --help        Show help

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use berth_core::{
    DataStorage, HookError, HostConfig, HostImplementation, JsonFileStorage, LoginSolver,
    StorageSet,
};
use berth_host::{HostSpec, LibraryDiscovery, ProviderDiscovery, StaticRegistry, bootstrap};

#[derive(Parser)]
#[command(
    name = "berth",
    version,
    about = "A supervised dynamic plugin host",
    long_about = "berth discovers plugin artifacts, isolates each in its own \
                  loading context, and drives every instance through a \
                  supervised load/enable/disable lifecycle."
)]
struct Cli {
    /// Log filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the plugins discoverable under a root directory
    Scan {
        /// Host root directory (plugins live in <DIR>/plugins)
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Bootstrap the host, enable every plugin, and wait for ctrl-c
    Run {
        /// Host root directory (plugins live in <DIR>/plugins)
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

/// The front-end's host contract implementation: JSON file storage under
/// the root directory and a stdin-echo login solver.
struct CliFrontEnd {
    root: PathBuf,
    storage: StorageSet,
}

impl CliFrontEnd {
    fn new(root: PathBuf) -> Result<Self> {
        let data: Arc<dyn DataStorage> =
            Arc::new(JsonFileStorage::new(root.join("data")).wrap_err("creating data storage")?);
        let config: Arc<dyn DataStorage> = Arc::new(
            JsonFileStorage::new(root.join("config")).wrap_err("creating config storage")?,
        );
        let storage = StorageSet {
            data_for_artifacts: data.clone(),
            config_for_artifacts: config.clone(),
            data_for_builtins: data,
            config_for_builtins: config,
        };
        Ok(Self { root, storage })
    }
}

impl HostImplementation for CliFrontEnd {
    fn root_path(&self) -> &Path {
        &self.root
    }

    fn storage(&self) -> StorageSet {
        self.storage.clone()
    }

    fn create_login_solver(&self, _requester: u64) -> Arc<dyn LoginSolver> {
        Arc::new(StdinLoginSolver)
    }
}

/// Prompts on stdout and reads the answer from stdin.
struct StdinLoginSolver;

impl LoginSolver for StdinLoginSolver {
    fn solve(&self, requester: u64, challenge: &str) -> Result<String, HookError> {
        print!("[login {requester}] {challenge}\n> ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        Ok(answer.trim().to_string())
    }
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_ansi(true))
            .init();
    }
}

fn build_spec(root: PathBuf) -> Result<HostSpec> {
    let discoveries: Vec<Arc<dyn ProviderDiscovery>> = vec![
        Arc::new(StaticRegistry::new()),
        Arc::new(LibraryDiscovery::new()),
    ];
    Ok(HostSpec {
        implementation: Arc::new(CliFrontEnd::new(root.clone())?),
        config: HostConfig::rooted_at(root),
        discoveries,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        Command::Scan { dir } => cmd_scan(dir),
        Command::Run { dir } => cmd_run(dir).await,
    }
}

fn cmd_scan(dir: PathBuf) -> Result<()> {
    let root = dir.canonicalize().wrap_err("resolving host root")?;
    let spec = build_spec(root)?;
    let host = berth_host::Host::create(spec)?;

    let locations = berth_host::discover_locations(&host.config().plugin_dir);
    let instances = host.scanner().scan(&locations)?;

    if instances.is_empty() {
        println!(
            "no plugins found under {}",
            host.config().plugin_dir.display()
        );
        return Ok(());
    }
    for instance in instances {
        println!("{}", instance.descriptor());
    }
    Ok(())
}

async fn cmd_run(dir: PathBuf) -> Result<()> {
    let root = dir.canonicalize().wrap_err("resolving host root")?;
    let host = bootstrap(build_spec(root)?)?;

    let enabled = host.enable_all();
    tracing::info!(enabled, total = host.plugins().len(), "plugins enabled");
    for instance in host.plugins() {
        tracing::info!(
            plugin = %instance.descriptor().name,
            state = %instance.state(),
            source = %instance.descriptor().source,
            "retained"
        );
    }

    tokio::signal::ctrl_c()
        .await
        .wrap_err("waiting for shutdown signal")?;

    let disabled = host.shutdown_graceful().await;
    tracing::info!(disabled, "plugins disabled");
    Ok(())
}

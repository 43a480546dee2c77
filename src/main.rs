use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gadget_composer::config::{self, ComposerConfig};
use gadget_composer::otg::{compose, configfs, ConfigFs, Function, Gadget};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// gadget-composer command line arguments
#[derive(Parser, Debug)]
#[command(name = "gadget-composer")]
#[command(version, about = "Compose USB gadgets over configfs", long_about = None)]
struct CliArgs {
    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a gadget, bind it to a UDC and tear it down on Ctrl-C
    Up {
        /// Composition file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Gadget root directory (overrides the composition file)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// UDC to bind (overrides the composition file; auto-detected if unset)
        #[arg(long, value_name = "NAME")]
        udc: Option<String>,
    },
    /// Validate a composition and print its teardown order
    Check {
        /// Composition file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Tear down a gadget left behind by a previous `up`
    Down {
        /// Composition file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Gadget root directory (overrides the composition file)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    match args.command {
        Command::Up { file, root, udc } => {
            let mut config = load(&file, root)?;
            if udc.is_some() {
                config.udc = udc;
            }
            up(&config).await
        }
        Command::Check { file } => check(&load(&file, None)?),
        Command::Down { file, root } => down(&load(&file, root)?),
    }
}

fn load(file: &Path, root: Option<PathBuf>) -> anyhow::Result<ComposerConfig> {
    let mut config = config::load(file)?;
    if let Some(root) = root {
        config.root = root;
    }
    tracing::debug!("Gadget root: {}", config.root.display());
    Ok(config)
}

async fn up(config: &ComposerConfig) -> anyhow::Result<()> {
    tracing::info!("Starting gadget-composer v{}", env!("CARGO_PKG_VERSION"));

    if !configfs::is_configfs_available(&config.root) {
        anyhow::bail!(
            "Gadget root {} not found (is configfs mounted and libcomposite loaded?)",
            config.root.display()
        );
    }

    let mut gadget = match compose::build(ConfigFs, config) {
        Ok(gadget) => gadget,
        Err(e) => {
            tracing::error!("Failed to build gadget: {}", e);
            recover(config);
            return Err(e.into());
        }
    };

    let enabled = match config.udc.as_deref() {
        Some(udc) => gadget.enable(udc).map(|_| udc.to_string()),
        None => gadget.enable_auto(),
    };
    match enabled {
        Ok(udc) => tracing::info!("Gadget {} bound to {}", gadget.name(), udc),
        Err(e) => {
            tracing::error!("Failed to enable gadget: {}", e);
            if let Err(cleanup_err) = gadget.cleanup() {
                tracing::error!("Cleanup failed: {}", cleanup_err);
            }
            return Err(e.into());
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    gadget.cleanup()?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Remove whatever a failed build left behind
fn recover(config: &ComposerConfig) {
    let result = compose::attach(ConfigFs, config).and_then(|mut gadget| gadget.cleanup());
    if let Err(e) = result {
        tracing::warn!(
            "Could not remove partially built gadget, run `down` to retry: {}",
            e
        );
    }
}

fn check(config: &ComposerConfig) -> anyhow::Result<()> {
    let gadget = plan(config)?;
    println!("gadget {} at {}", gadget.name(), gadget.path().display());
    for function in gadget.functions() {
        println!("  function {}", function.name());
    }
    for cfg in gadget.configs() {
        println!("  config {}", cfg.name());
        for binding in cfg.bindings() {
            println!("    {} -> {}", binding.name(), binding.function());
        }
    }
    println!("teardown:");
    for (i, step) in gadget.teardown_plan().iter().enumerate() {
        println!("  {:>2}. {}", i + 1, step);
    }
    Ok(())
}

/// In-memory tree for `config`; reads nothing but the UDC attribute
fn plan(config: &ComposerConfig) -> anyhow::Result<Gadget> {
    Ok(compose::attach(ConfigFs, config)?)
}

fn down(config: &ComposerConfig) -> anyhow::Result<()> {
    let mut gadget = compose::attach(ConfigFs, config)?;
    gadget.cleanup()?;
    tracing::info!("Gadget {} removed", gadget.name());
    Ok(())
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "gadget_composer=error",
        LogLevel::Warn => "gadget_composer=warn",
        LogLevel::Info => "gadget_composer=info",
        LogLevel::Verbose => "gadget_composer=debug",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "gadget_composer=trace,debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

//! xrelay CLI - Operator surface for the cross-chain action relay
//!
//! # Quick Start
//!
//! ```bash
//! # One hop: A -> B
//! xrelay demo --scenario simple
//!
//! # Ping on B chains a pong back to A, with two racing relayers
//! xrelay demo --scenario chained --relayers 2
//!
//! # Show the effective configuration
//! xrelay config --file relayer.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use xrelay_relayer::{LoggingConfig, RelayerConfig};

mod demo;

/// xrelay - Cross-chain action relay
#[derive(Parser)]
#[command(name = "xrelay")]
#[command(author = "xrelay Contributors")]
#[command(version)]
#[command(about = "Relay actions between two endpoints with attested proofs", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (toml, json or yaml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run two in-process endpoints with live relayers
    Demo {
        #[arg(long, value_enum, default_value_t = Scenario::Simple)]
        scenario: Scenario,

        /// Independent relayer instances racing on the same endpoints
        #[arg(long, default_value = "1")]
        relayers: usize,

        /// Use the fast development polling schedule
        #[arg(long)]
        fast: bool,
    },

    /// Print the effective configuration
    Config {
        /// Configuration file; overrides --config
        #[arg(long)]
        file: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// One action from A, executed on B
    Simple,
    /// An action on B chains a follow-on back to A
    Chained,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            scenario,
            relayers,
            fast,
        } => {
            let mut config = RelayerConfig::load(cli.config.as_deref())
                .context("Failed to load relayer configuration")?;
            if fast {
                config.polling = RelayerConfig::development().polling;
            }
            init_logging(&config.logging)?;
            demo::run(&config, scenario, relayers.max(1)).await
        }
        Commands::Config { file } => {
            let path = file.or(cli.config);
            let config = RelayerConfig::load(path.as_deref())
                .context("Failed to load relayer configuration")?;
            let rendered =
                serde_json::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
            Ok(())
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.is_json() {
        subscriber
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .context("Failed to install logger")?;
    } else {
        subscriber
            .with(fmt::layer().with_target(false))
            .try_init()
            .context("Failed to install logger")?;
    }

    Ok(())
}

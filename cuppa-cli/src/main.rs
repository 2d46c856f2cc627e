//! Command-line entry point for cuppa.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cuppa_core::config::Config;
use cuppa_core::orchestrator::{Orchestrator, UpOptions};

const BANNER: &str = r#"
   ( (
    ) )
  ........
  |      |]
  \      /
   '----'
"#;

/// Bring up a local OpenShift cluster and install the full RHMAP
/// platform on top of it.
#[derive(Parser)]
#[command(name = "cuppa", version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (defaults to ~/.cuppa.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring up a cluster locally and install the platform
    #[command(alias = "u")]
    Up {
        /// Wipe existing state and data directories before bringing the cluster up
        #[arg(long)]
        clean: bool,

        /// Don't create a virtual interface, bind to whatever interface is up
        #[arg(long)]
        no_virtual_interface: bool,

        /// Skip the seeding of images prior to cluster creation
        #[arg(long)]
        skip_image_seeding: bool,
    },

    /// Tear down the cluster
    #[command(alias = "d")]
    Down {
        /// Wipe existing state and data directories after bringing the cluster down
        #[arg(long)]
        clean: bool,
    },

    /// Check the local environment is good to go
    #[command(alias = "c")]
    Check,

    /// Link the core and the MBaaS through the management client
    #[command(alias = "l")]
    Link,

    /// Install the platform onto an already-running cluster
    Install,

    /// Pre-pull the platform images
    Seed,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Cluster data directories are created world-writable, an
    // inherited umask would silently narrow them.
    #[cfg(unix)]
    unsafe {
        libc::umask(0);
    }

    println!("{}", BANNER.bold());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    info!("Loading config from {}", config_path.display());
    let config = Config::load(&config_path)?;
    let orchestrator = Orchestrator::new(config)?;

    match cli.command {
        Command::Up {
            clean,
            no_virtual_interface,
            skip_image_seeding,
        } => {
            orchestrator
                .up(&UpOptions {
                    clean,
                    virtual_interface: !no_virtual_interface,
                    seed_images: !skip_image_seeding,
                })
                .await?;
            println!(
                "{}",
                "Cluster is up and the platform is installed.".green().bold()
            );
        }
        Command::Down { clean } => {
            orchestrator.down(clean).await?;
            println!("{}", "Cluster is down.".green().bold());
        }
        Command::Check => orchestrator.check().await?,
        Command::Link => orchestrator.link().await?,
        Command::Install => orchestrator.install().await?,
        Command::Seed => orchestrator.seed().await?,
    }

    Ok(())
}

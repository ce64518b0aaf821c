//! Command-line interface definitions using clap

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::api::jwt::get_jwt_service;
use crate::config::StaticConfig;

/// privalytics - privacy-preserving web analytics collector
#[derive(Parser, Debug)]
#[command(name = "privalytics")]
#[command(version)]
#[command(about = "Privacy-preserving web analytics with consent-gated semantic search", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short = 'c', global = true, default_value = "config.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Embed every consented event that has no embedding yet
    EmbedBacklog {
        /// Events loaded per batch
        #[arg(long)]
        batch_size: Option<u64>,

        /// Stop after this many events
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Insert demo pages and events
    Seed {
        /// Events per page (random 10..60 when omitted)
        #[arg(long)]
        events_per_page: Option<usize>,
    },

    /// Print a caller token signed with auth.jwt_secret
    IssueToken {
        #[arg(long)]
        subject: String,

        /// Role to grant, repeatable (defaults to viewer)
        #[arg(long = "role")]
        roles: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Generate {
        /// Output path (prints to stdout when omitted)
        path: Option<String>,
    },
}

/// 执行不需要 HTTP 服务的命令
pub async fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Serve => crate::runtime::modes::run_server().await,
        Commands::EmbedBacklog { batch_size, limit } => {
            crate::runtime::modes::run_backlog(batch_size, limit).await
        }
        Commands::Seed { events_per_page } => crate::runtime::modes::run_seed(events_per_page).await,
        Commands::IssueToken { subject, roles } => {
            let config = crate::config::get_config();
            if config.auth.jwt_secret.is_empty() {
                anyhow::bail!(
                    "auth.jwt_secret is empty; a token signed with a random secret would be useless"
                );
            }
            let token = get_jwt_service()
                .issue(&subject, &roles)
                .context("Failed to sign token")?;
            println!("{}", token);
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigCommands::Generate { path } => match path {
                Some(path) => {
                    StaticConfig::default()
                        .save_to_file(&path)
                        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path, e))?;
                    println!("Sample configuration written to {}", path);
                    Ok(())
                }
                None => {
                    println!("{}", StaticConfig::generate_sample_config());
                    Ok(())
                }
            },
        },
    }
}

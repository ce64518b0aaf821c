use clap::Parser;

use privalytics::cli::{Cli, Commands};
use privalytics::config::init_config_from;
use privalytics::system::logging::init_logging;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_config_from(&cli.config);
    let config = privalytics::config::get_config();
    let _log_guard = init_logging(&config.logging)?;

    let command = cli.command.unwrap_or(Commands::Serve);
    if let Err(e) = privalytics::cli::run_command(command).await {
        match e.downcast_ref::<privalytics::errors::PrivalyticsError>() {
            Some(err) => eprintln!("{}", err.format_colored()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
    Ok(())
}

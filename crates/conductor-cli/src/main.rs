mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, DriverCommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, port, hostname, conductor_groups, rotate_token } => {
            commands::serve(bind, port, hostname, conductor_groups, rotate_token).await
        }
        Command::Node { command } => commands::node(command, cli.remote, cli.token).await,
        Command::Driver { command } => match command {
            DriverCommand::VendorPassthru { driver, method, info } => {
                commands::driver_vendor_passthru(driver, method, info, cli.remote, cli.token).await
            }
        },
    }
}

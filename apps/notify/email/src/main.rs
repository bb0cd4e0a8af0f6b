//! notify-email entry point

use clap::Parser;
use core_config::tracing::install_color_eyre;
use eyre::Result;
use notify_email_cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre first for colored error output
    install_color_eyre();

    notify_email_cli::run(Cli::parse()).await
}

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing::Level;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    evoc::telemetry::init_tracing(args.log_json, level);

    cli::run(args).await
}

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;

use cli::{run_command, Cli};

fn log_filter(debug: bool) -> EnvFilter {
    if debug {
        // Dependencies stay at info, the agent goes verbose
        return EnvFilter::new("info,wifiprobe=debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(log_filter(cli.debug))
        .init();

    if let Err(e) = run_command(cli).await {
        eprintln!("wifiprobe: {:#}", e);
        std::process::exit(1);
    }
}

use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;

use wifiprobe::config::Config;
use wifiprobe::uplink::UplinkMode;
use wifiprobe::wireless::SourceKind;
use wifiprobe::Agent;

#[derive(Parser, Debug)]
#[command(name = "wifiprobe")]
#[command(author, version, about = "Passive Wi-Fi presence probe")]
pub struct Cli {
    /// Network interface name to monitor
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Collector address (host:port)
    #[arg(short, long)]
    pub server: Option<String>,

    /// Start the local status HTTP endpoint
    #[arg(long)]
    pub http: bool,

    /// Send events to the collector
    #[arg(long)]
    pub send: bool,

    /// Sniff plaintext HTTP User-Agent lines
    #[arg(long)]
    pub sniff_http: bool,

    /// Track access points from beacon frames
    #[arg(long)]
    pub beacons: bool,

    /// Uplink mode (wire, record)
    #[arg(long)]
    pub mode: Option<UplinkMode>,

    /// Read stations from a driver proc file instead of capturing
    #[arg(long, value_name = "PATH")]
    pub proc: Option<PathBuf>,

    /// Status endpoint listen address
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Overlay command line flags on the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(interface) = &self.interface {
            config.capture.interface = interface.clone();
        }
        if let Some(path) = &self.proc {
            config.capture.source = SourceKind::Proc;
            config.capture.proc_path = path.clone();
        }
        if self.sniff_http {
            config.capture.http_sniff = true;
        }
        if self.beacons {
            config.capture.beacons = true;
        }
        if let Some(server) = &self.server {
            config.uplink.server = server.clone();
        }
        if self.send {
            config.uplink.enabled = true;
        }
        if let Some(mode) = self.mode {
            config.uplink.mode = mode;
        }
        if self.http {
            config.status.enabled = true;
        }
        if let Some(listen) = &self.listen {
            config.status.listen = listen.clone();
        }
    }
}

pub async fn run_command(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    cli.apply(&mut config);

    if cli.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    if let Err(e) = config.validate() {
        eprintln!("{}\n", e);
        let _ = Cli::command().print_help();
        std::process::exit(1);
    }

    let agent = Agent::new(config)?;
    agent.run().await
}

//! jack2net
//!
//! Publishes the JACK client's input ports as one named LAN stream until
//! Ctrl+C or until the JACK server goes away.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jack_net_bridge::{
    audio::jack::{server_lost, JackHost},
    bridge::{EndpointConfig, StreamEndpoint},
    config::AppConfig,
    network::LanNetwork,
};

const WATCH_INTERVAL: Duration = Duration::from_millis(250);
const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "jack2net", version, about = "Publish JACK inputs as a LAN audio stream")]
struct Args {
    /// Name the stream is announced under
    #[arg(short = 'n', long, default_value = "Stream")]
    net_name: String,

    /// JACK client name
    #[arg(short = 'j', long, default_value = "net_send")]
    jack_name: String,

    /// Leave the input ports unconnected
    #[arg(short = 'a', long)]
    no_auto_connect: bool,

    /// Input channels
    #[arg(short = 'c', long)]
    channels: Option<usize>,

    /// Config file (defaults to the per-user config location)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Cannot load config from {}", path.display()))?,
        None => AppConfig::load_default().context("Cannot load config")?,
    };

    config.audio.client_name = args.jack_name.clone();
    if args.no_auto_connect {
        config.audio.auto_connect = false;
    }
    if let Some(channels) = args.channels {
        config.audio.channels = channels;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        // --help and --version
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };
    let config = load_config(&args)?;
    if args.net_name.is_empty() {
        anyhow::bail!("Stream name must not be empty");
    }

    let network = LanNetwork::publisher(&config.network);
    let endpoint_config = EndpointConfig::from(&config.audio);
    let name = args.net_name.clone();
    let mut endpoint = tokio::task::spawn_blocking(move || {
        StreamEndpoint::start_send(&JackHost::new(), &network, &name, &endpoint_config)
    })
    .await??;

    tracing::info!(
        "Publishing {} channels at {} Hz as {:?}",
        endpoint.channels(),
        endpoint.sample_rate(),
        endpoint.remote()
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut watch = tokio::time::interval(WATCH_INTERVAL);
    let mut report = tokio::time::interval(STATS_INTERVAL);
    report.tick().await;

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Cannot listen for Ctrl+C")?;
                break;
            }
            _ = watch.tick() => {
                if server_lost() {
                    tracing::error!("JACK server shut down, exiting");
                    std::process::exit(1);
                }
            }
            _ = report.tick() => {
                let stats = endpoint.stats();
                tracing::info!(
                    cycles = stats.cycles,
                    frames_sent = stats.frames_sent,
                    send_errors = stats.send_errors,
                    bundles_dropped = stats.bundles_dropped,
                    "Stream statistics"
                );
            }
        }
    }

    tracing::info!("Shutting down");
    tokio::task::spawn_blocking(move || endpoint.shutdown()).await?;
    Ok(())
}

//! net2jack
//!
//! Plays streams found on the LAN through JACK output ports. Streams are
//! picked from the browser control surface; the selection can be saved and is
//! restored on the next start.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jack_net_bridge::{
    audio::{
        gain::MasterGain,
        jack::{server_lost, JackHost},
    },
    bridge::{BridgeFactory, Direction, EndpointConfig, StreamRegistry},
    config::AppConfig,
    network::LanNetwork,
    ui::{ControlSurface, WebServer},
};

/// How often the JACK server state is checked
const WATCH_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "net2jack", version, about = "Play LAN audio streams through JACK")]
struct Args {
    /// Leave the output ports unconnected
    #[arg(short = 'a', long)]
    no_auto_connect: bool,

    /// JACK client name for every stream
    #[arg(short = 'j', long)]
    jack_name: Option<String>,

    /// Output channels per stream
    #[arg(short = 'c', long)]
    channels: Option<usize>,

    /// HTTP port of the control surface
    #[arg(short = 'p', long)]
    port: Option<u16>,

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

    if args.no_auto_connect {
        config.audio.auto_connect = false;
    }
    if let Some(name) = &args.jack_name {
        config.audio.client_name = name.clone();
    }
    if let Some(channels) = args.channels {
        config.audio.channels = channels;
    }
    if let Some(port) = args.port {
        config.ui.http_port = port;
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
    tracing::info!("Starting net2jack as JACK client {:?}", config.audio.client_name);

    let network = Arc::new(LanNetwork::start(&config.network)?);
    let master = MasterGain::default();
    let factory = BridgeFactory::new(JackHost::new(), network.clone(), master.clone());
    let registry = StreamRegistry::new(
        factory,
        config.registry.capacity,
        Direction::Receive,
        EndpointConfig::from(&config.audio),
    );
    let surface = Arc::new(ControlSurface::new(
        registry,
        network,
        master,
        config.registry.presets_path.clone(),
    ));

    // saved streams come back before any client can issue commands
    let restore = surface.clone();
    tokio::task::spawn_blocking(move || restore.restore_presets()).await??;

    let server = WebServer::new(config.ui.clone(), surface.clone());
    let listener = server.bind().await.with_context(|| {
        format!(
            "Cannot bind control surface to {}:{}",
            config.ui.bind_address, config.ui.http_port
        )
    })?;
    let serve = tokio::spawn(server.serve(listener));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut watch = tokio::time::interval(WATCH_INTERVAL);

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
        }
    }

    tracing::info!("Shutting down");
    serve.abort();
    let stop = surface.clone();
    tokio::task::spawn_blocking(move || stop.shutdown()).await?;
    Ok(())
}

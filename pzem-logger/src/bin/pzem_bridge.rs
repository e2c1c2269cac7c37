//! Poll the configured meters, publish their readings on the bus and record
//! the configured bus services into TeaFiles.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pzem_logger::bus::ValueBus;
use pzem_logger::config::Config;
use pzem_logger::instrument::meter;
use pzem_logger::logger_service::LoggerService;
use pzem_logger::polling::PollingService;
use pzem_logger::publisher::DevicePublisher;
use pzem_logger::transport::RtuBus;
use tokio::sync::watch;

/// PZEM meters to bus bridge with minute-slotted recording
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, overrides the configuration
    #[arg(short, long)]
    device: Option<String>,

    /// Directory of the series files, overrides the configuration
    #[arg(long)]
    datadir: Option<PathBuf>,

    /// Set logging level to debug
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("cannot load configuration {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_args(args.device, args.datadir);
    config.validate()?;

    let line = RtuBus::open(&config.serial)
        .with_context(|| format!("cannot open serial device {}", config.serial.device))?;
    let bus = ValueBus::new();
    let device_name = config.device_name();

    let mut polling = PollingService::new(config.poll_interval());
    for device in &config.devices {
        let role = device.role();
        let service = bus.register_service(&role.service_name(&device_name, device.address))?;
        let publisher = DevicePublisher::new(service, role, &device_name, device.address)
            .with_disconnect_after(config.disconnect_after);
        polling.add(
            meter(line.device(device.address), device.address, device.variant()),
            publisher,
        );
    }

    let (stop, stop_rx) = watch::channel(false);
    let polling = tokio::spawn(polling.run(stop_rx.clone()));
    let logger = config.logger.enabled.then(|| {
        let service = LoggerService::new(
            bus.clone(),
            &config.logger.datadir,
            config.logger.sources.clone(),
        );
        tokio::spawn(service.run(stop_rx))
    });
    log::info!("running, press ctrl-c to stop");

    let recorded = match logger {
        Some(mut logger) => tokio::select! {
            interrupted = tokio::signal::ctrl_c() => {
                interrupted?;
                log::info!("interrupted, stopping");
                let _ = stop.send(true);
                logger.await?
            }
            finished = &mut logger => {
                let _ = stop.send(true);
                finished?
            }
        },
        None => {
            tokio::signal::ctrl_c().await?;
            log::info!("interrupted, stopping");
            let _ = stop.send(true);
            Ok(())
        }
    };

    polling.await?;
    recorded.context("recording failed")?;
    Ok(())
}

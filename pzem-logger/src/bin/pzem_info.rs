//! Display the readings and device info of one meter, optionally changing its address.

use std::num::ParseIntError;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use pzem_logger::decode::{Ac, Dc, Layout, Variant};
use pzem_logger::instrument::Instrument;
use pzem_logger::reading::describe;
use pzem_logger::transport::{RtuBus, SerialConfig};

/// Display current device info
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial device
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    device: String,

    /// Device address, decimal or 0x-prefixed hex; 0xF8 reaches any single meter
    #[arg(short, long, default_value = "0xF8", value_parser = parse_address)]
    address: u8,

    /// Meter type (ac, dc)
    #[arg(short = 't', long = "type", default_value = "ac")]
    variant: Variant,

    /// Write a new device address
    #[arg(long, value_parser = parse_address)]
    change_address: Option<u8>,

    /// Set logging level to debug
    #[arg(long)]
    debug: bool,
}

fn parse_address(s: &str) -> Result<u8, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

async fn show<L: Layout>(line: &RtuBus, args: &Args) -> Result<()> {
    let mut instrument = Instrument::<_, L>::new(line.device(args.address), args.address);

    println!("{}\n", describe(&instrument.readings().await?));
    println!("{}", describe(&instrument.device_info().await?));

    if let Some(address) = args.change_address {
        let mut instrument = instrument.change_address(address).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
        println!("\n{}", describe(&instrument.device_info().await?));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    println!("pzem-info: Display current device info");

    let serial = SerialConfig {
        device: args.device.clone(),
        ..SerialConfig::default()
    };
    let line = RtuBus::open(&serial)?;

    match args.variant {
        Variant::Ac => show::<Ac>(&line, &args).await,
        Variant::Dc => show::<Dc>(&line, &args).await,
    }
}

//! Print the description and the first items of a TeaFile.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pzem_logger::teafile::TeaFile;

/// Print a snapshot of a series file
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Series file
    path: PathBuf,

    /// Index of the first item to print
    #[arg(short, long, default_value_t = 0)]
    start: u64,

    /// Number of items to print
    #[arg(short = 'n', long, default_value_t = 5)]
    count: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut tf = TeaFile::open_read(&args.path)
        .with_context(|| format!("cannot open {}", args.path.display()))?;
    let item_count = tf.item_count()?;
    println!("TeaFile('{}') {item_count} items\n", args.path.display());
    println!("{}\n", tf.description());

    println!("Items");
    let names = tf
        .description()
        .item
        .field_names()
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    tf.seek_item(args.start)?;
    for index in args.start..args.start.saturating_add(args.count) {
        let Some(values) = tf.read_item()? else {
            break;
        };
        let fields = names
            .iter()
            .zip(&values)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>();
        println!("{index}: {}", fields.join(", "));
    }
    Ok(())
}

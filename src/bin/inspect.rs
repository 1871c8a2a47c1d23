//! DiskBuffer Layout Inspector
//!
//! Prints the free-space layout saved next to a backing file.

use std::path::PathBuf;

use clap::Parser;
use diskbuffer::{FreeSpaceLayout, FreeSpaceMap};
use tracing_subscriber::{fmt, EnvFilter};

/// DiskBuffer layout inspector
#[derive(Parser, Debug)]
#[command(name = "diskbuffer-inspect")]
#[command(about = "Inspect a saved DiskBuffer free-space layout")]
#[command(version)]
struct Args {
    /// Layout file written by DiskBuffer::save_layout
    layout: PathBuf,

    /// Merge touching free blocks before reporting
    #[arg(short, long)]
    defrag: bool,

    /// Write the (defragmented) layout back to the file
    #[arg(short, long, requires = "defrag")]
    write: bool,

    /// List every free block
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,diskbuffer=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    tracing::info!("DiskBuffer Inspector v{}", diskbuffer::VERSION);
    tracing::info!("Layout file: {}", args.layout.display());

    if let Err(e) = run(&args) {
        tracing::error!("Inspection failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> diskbuffer::Result<()> {
    let layout = FreeSpaceLayout::load(&args.layout)?;

    let mut map = FreeSpaceMap::new();
    map.restore(layout.file_length, &layout.free_blocks)?;

    if args.defrag {
        let merged = map.defrag_free_blocks()?;
        println!("Defragmentation merged {} blocks", merged);

        if args.write {
            let defragged = FreeSpaceLayout {
                file_length: map.file_length(),
                free_blocks: map.free_space_vector(),
            };
            defragged.save(&args.layout)?;
            println!("Wrote defragmented layout to {}", args.layout.display());
        }
    }

    let file_length = map.file_length();
    let free_space = map.free_space();
    println!("File length:   {}", file_length);
    println!("Free space:    {} ({} blocks)", free_space, map.block_count());
    println!("Allocated:     {}", file_length - free_space);
    match map.largest_block() {
        Some(block) => println!("Largest block: {} at {}", block.size, block.position),
        None => println!("Largest block: none"),
    }

    if args.verbose {
        for block in map.free_space_vector() {
            println!("  [{:>12}, +{:>12})", block.position, block.size);
        }
    }

    Ok(())
}

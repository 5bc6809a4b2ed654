use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

use libsdimg::{SdImgError, extract_partition, read_mbr, update_partition};

mod logger;

#[derive(Parser)]
#[command(name = "sdimg", version, about = "List, extract and update MBR partitions of raw disk images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List partitions in an image
    List(ListArgs),
    /// Extract a partition from an image
    Extract(CopyArgs),
    /// Update a partition of an image
    Update(CopyArgs),
}

#[derive(Args)]
struct ListArgs {
    /// Name of the .img file
    #[arg(short, long)]
    image: PathBuf,
}

#[derive(Args)]
struct CopyArgs {
    /// Name of the .img file
    #[arg(short, long)]
    image: PathBuf,

    /// Number of the partition to work on
    #[arg(short, long, default_value_t = 0)]
    partition: usize,

    /// File holding the partition contents
    #[arg(short, long, default_value = "part.bin")]
    file: PathBuf,
}

fn list(args: &ListArgs) -> Result<(), SdImgError> {
    let mbr = read_mbr(&args.image)?;

    println!("Disk identifier: 0x{:08x}", mbr.disk_signature());
    println!("NR STATUS     TYPE            START       SIZE");
    println!("----------------------------------------------");
    for (nr, partition) in mbr.partitions() {
        println!(
            "{}  {:<10} {:<10} {:>10} {:>10}",
            nr,
            partition.status,
            partition.type_name(),
            partition.start_offset,
            partition.byte_count
        );
    }

    return Ok(());
}

fn extract(args: &CopyArgs) -> Result<(), SdImgError> {
    extract_partition(&args.image, args.partition, &args.file)?;
    return Ok(());
}

fn update(args: &CopyArgs) -> Result<(), SdImgError> {
    update_partition(&args.image, args.partition, &args.file)?;
    return Ok(());
}

fn main() {
    logger::init_logger();

    let cli = Cli::parse();

    let result = match &cli.command {
        Command::List(args) => list(args),
        Command::Extract(args) => extract(args),
        Command::Update(args) => update(args),
    };

    if let Err(e) = result {
        eprintln!("sdimg: {e}");
        process::exit(1);
    }
}

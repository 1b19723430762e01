//! UnityFS bundle CLI
//!
//! Command-line interface for checking, inspecting and unpacking UnityFS
//! asset bundles.

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use unityfs::{
    BinaryError, BundleFile, BundleOptions, CollectingVisitor, ExtractingVisitor, bundle_size,
};

#[derive(Parser)]
#[command(name = "unityfs")]
#[command(about = "Inspect and unpack Unity UnityFS asset bundles")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read only the header and report the declared bundle size
    Check {
        /// Bundle file path
        file: PathBuf,
    },

    /// Parse a bundle and list its blocks and entries
    Info {
        /// Bundle file path
        file: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Write every entry of a bundle to a directory
    Extract {
        /// Bundle file path
        file: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Decoded bytes kept in memory while extracting
        #[arg(long)]
        budget: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Check { file } => check_command(&file),
        Commands::Info { file, json } => info_command(&file, json),
        Commands::Extract {
            file,
            output,
            budget,
        } => extract_command(&file, &output, budget),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn check_command(file: &Path) -> Result<()> {
    let size = bundle_size(file);
    if size <= 0 {
        println!("invalid");
        bail!("{} is not a complete UnityFS bundle", file.display());
    }
    println!("{}", size);
    Ok(())
}

fn info_command(file: &Path, as_json: bool) -> Result<()> {
    let mut visitor = CollectingVisitor::new();
    let bundle = BundleFile::open(file, &mut visitor)
        .with_context(|| format!("Failed to parse bundle {}", file.display()))?;
    let header = bundle.header();

    if as_json {
        let report = json!({
            "header": header,
            "table_hash": hex::encode(bundle.table_hash()),
            "data_size": bundle.data_size(),
            "blocks": bundle.blocks(),
            "entries": bundle.entries(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("  Signature: {} (format {})", header.signature, header.format_version);
    println!("  Player version: {}", header.version_player);
    println!("  Engine version: {}", header.version_engine);
    println!("  Bundle size: {}", header.bundle_size);
    println!(
        "  Table: {} -> {} bytes ({})",
        header.table_compressed_size,
        header.table_uncompressed_size,
        header.compression_type()?.name()
    );
    println!("  Table hash: {}", hex::encode(bundle.table_hash()));

    println!("Blocks: {}", bundle.blocks().len());
    for (index, block) in bundle.blocks().iter().enumerate() {
        let method = block
            .compression_type()
            .map(|method| method.name())
            .unwrap_or("unknown");
        println!(
            "  [{}] {} -> {} bytes ({})",
            index, block.compressed_size, block.uncompressed_size, method
        );
    }

    println!("Entries: {}", bundle.entries().len());
    for entry in bundle.entries() {
        let kind = if entry.is_serialized_file() {
            "serialized"
        } else {
            "resource"
        };
        println!(
            "  {} @ {} ({} bytes, {}, flags {:#x})",
            entry.name, entry.offset, entry.size, kind, entry.flags
        );
    }
    Ok(())
}

fn extract_command(file: &Path, output: &Path, budget: Option<usize>) -> Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;

    let mut options = BundleOptions::default();
    if let Some(budget) = budget {
        options = options.chunk_budget(budget);
    }

    let mut visitor = ExtractingVisitor::to_directory(output);
    match BundleFile::open_with_options(file, &mut visitor, &options) {
        Ok(_) => {}
        Err(BinaryError::EntryFillFailure { failed }) => {
            for path in visitor.written() {
                println!("{}", path.display());
            }
            bail!("{} entries could not be extracted: {}", failed.len(), failed.join(", "));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to parse bundle {}", file.display()));
        }
    }

    for path in visitor.written() {
        println!("{}", path.display());
    }
    println!("Extracted {} entries to {}", visitor.written().len(), output.display());
    Ok(())
}

//! PDF Image Extractor CLI
//!
//! Command-line interface for extracting images from PDFs.

use clap::Parser;
use pdf_image_extract::{file_ops::extract_images_to_dir, list_images, ExtractOptions};
use std::path::PathBuf;

/// Extract embedded images from a PDF as JPEG/PNG files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input PDF file path
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory (existing .jpg/.png files in it are removed)
    #[arg(short, long, default_value = "images")]
    output: PathBuf,

    /// Skip images that fail to decode instead of aborting
    #[arg(long)]
    skip_failed: bool,

    /// List image streams instead of extracting them
    #[arg(short, long)]
    list: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if args.list {
        let doc = lopdf::Document::load(&args.input)
            .map_err(|e| anyhow::anyhow!("Failed to load {:?}: {}", args.input, e))?;
        let images = list_images(&doc);

        println!(
            "{:<10} {:<12} {:>11} {:<12} {:>4} {:<20} {:>9}",
            "Object", "Name", "Size", "ColorSpace", "BPC", "Filter", "Bytes"
        );
        for info in &images {
            let role = if info.is_soft_mask { " (smask)" } else { "" };
            println!(
                "{:<10} {:<12} {:>11} {:<12} {:>4} {:<20} {:>9}{}",
                format!("{} {}", info.object_id.0, info.object_id.1),
                info.name,
                format!("{}x{}", info.width, info.height),
                info.color_space.as_deref().unwrap_or("-"),
                info.bits_per_component,
                info.filter,
                info.size_bytes,
                role
            );
        }
        println!("\n{} image streams", images.len());
        return Ok(());
    }

    let options = ExtractOptions {
        output_directory: Some(args.output.clone()),
        in_memory: false,
        skip_failed: args.skip_failed,
    };

    let written = extract_images_to_dir(&args.input, &options)?;

    println!("\nDone! Extracted {} images", written.len());
    println!("Output saved to: {:?}", args.output);

    Ok(())
}

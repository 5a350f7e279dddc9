//! Subject cutout CLI tool
//!
//! Command-line interface for extracting segmented subjects from images as cropped,
//! transparent cutouts.

#[cfg(feature = "cli")]
use subject_cutout::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}

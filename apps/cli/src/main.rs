//! xnatkit CLI: batch utilities for an XNAT imaging archive.
//!
//! Uploads NIfTI and PAR/REC data, renders QC mosaics, sweeps projects,
//! archives resources, launches pipelines and downloads session files.

mod commands;
mod prompt;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

//! vidkb CLI: short-video and post knowledge-base builder.
//!
//! Downloads each URL, transcribes speech, summarizes with a local LLM and
//! archives the result to Notion or CSV, resuming from checkpoints.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}

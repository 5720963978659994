//! tmlr - Timeular向けコマンドラインクライアント

mod api;
mod cli;
mod config;
mod error;
mod logging;
mod transport;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    logging::init(cli.verbose);
    cli::run(cli)
}

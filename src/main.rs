//! Reservation pipeline entry point

use clap::Parser;
use reservation_mlops::cli::{execute, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    execute(&cli)
}

mod app;
mod archive;
mod authoring;
mod backup;
mod cli;
mod config;
mod error;
mod game;
mod installer;
mod logging;
mod progress;
mod ui;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}

use crate::app::{CliVerbosity, StartupMode};
use anyhow::{Context, Result};
use directories::BaseDirs;
use env_logger::{Builder, Env, Target, WriteStyle};
use log::LevelFilter;
use std::{fs, path::PathBuf};

const APP_DIR: &str = "rainbow-modloader";
const LOG_FILE: &str = "rainbow-modloader.log";

pub fn log_file_path() -> Option<PathBuf> {
    let base = BaseDirs::new()?;
    Some(base.data_local_dir().join(APP_DIR).join(LOG_FILE))
}

pub fn level_for(mode: StartupMode, verbosity: CliVerbosity) -> LevelFilter {
    match (mode, verbosity) {
        (_, CliVerbosity::Quiet) => LevelFilter::Error,
        (StartupMode::Cli, CliVerbosity::Normal) => LevelFilter::Warn,
        (StartupMode::Ui, CliVerbosity::Normal) => LevelFilter::Info,
        (StartupMode::Cli, CliVerbosity::Verbose) => LevelFilter::Info,
        (StartupMode::Ui, CliVerbosity::Verbose) => LevelFilter::Debug,
        (_, CliVerbosity::Debug) => LevelFilter::Trace,
    }
}

/// Installs the global logger. The UI owns the terminal, so in UI mode
/// records go to the log file instead of stderr. `RUST_LOG` wins over the
/// verbosity flags.
pub fn init(mode: StartupMode, verbosity: CliVerbosity) -> Result<Option<PathBuf>> {
    let mut builder = Builder::new();
    builder
        .filter_level(level_for(mode, verbosity))
        .parse_env(Env::default())
        .format_timestamp_secs()
        .format_module_path(false);

    let mut log_path = None;
    match mode {
        StartupMode::Cli => {
            builder.target(Target::Stderr);
        }
        StartupMode::Ui => match log_file_path() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).context("create log dir")?;
                }
                let file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("open log file {}", path.display()))?;
                builder
                    .target(Target::Pipe(Box::new(file)))
                    .write_style(WriteStyle::Never);
                log_path = Some(path);
            }
            None => {
                builder.filter_level(LevelFilter::Off);
            }
        },
    }

    builder.try_init().context("install logger")?;
    Ok(log_path)
}

#[cfg(test)]
pub(crate) fn init_for_tests() {
    let _ = Builder::new()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

use crate::config::Config;
use crate::env::Environment;
use anyhow::{Context, Result, anyhow};
use log::LevelFilter;
use simplelog::{ConfigBuilder, WriteLogger};
use std::fs::{self, OpenOptions};

/// Start appending log records to the configured file.
///
/// Nothing is ever logged to the terminal: shell output and redirections
/// must stay exactly what the commands wrote. Level `off` installs no
/// logger at all.
pub fn init(config: &Config, env: &Environment) -> Result<()> {
    let level = config.log_level()?;
    if level == LevelFilter::Off {
        return Ok(());
    }

    let path = config.log_file(env);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let log_config = ConfigBuilder::new().set_target_level(LevelFilter::Off).build();
    WriteLogger::init(level, log_config, file).map_err(|e| anyhow!("installing logger: {e}"))?;
    Ok(())
}

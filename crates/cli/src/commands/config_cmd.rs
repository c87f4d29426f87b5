//! `banter config`: Print the default configuration or its path.

use std::process::ExitCode;

use banter_config::AppConfig;

pub fn run(path: bool) -> anyhow::Result<ExitCode> {
    if path {
        println!("{}", AppConfig::config_dir().join("config.toml").display());
    } else {
        print!("{}", AppConfig::default_toml());
    }
    Ok(ExitCode::SUCCESS)
}

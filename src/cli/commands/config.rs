//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, LogFormat};
use crate::error::{OrcaError, OrcaResult};
use crate::referrers::ReferrersMode;
use crate::ui::{self, UiContext};
use clap::ValueEnum;
use std::path::PathBuf;

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> OrcaResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => {
            let mut config = config.clone();
            set_value(&mut config, &key, &value)?;
            manager.save(&config).await?;
            ui::step_ok(&UiContext::detect(), &format!("Set {} = {}", key, value));
        }
    }
    Ok(())
}

fn show_config(config: &Config) -> OrcaResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> OrcaResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok(&ctx, &format!("Configuration initialized at {}", path.display()));
    Ok(())
}

fn set_value(config: &mut Config, key: &str, value: &str) -> OrcaResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => {
            config.general.log_format = match value {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => return Err(invalid(key, value, "expected text or json")),
            }
        }
        ["copy", "concurrency"] => {
            config.copy.concurrency = value
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid(key, value, "expected a positive integer"))?
        }
        ["copy", "referrers"] => {
            config.copy.referrers = ReferrersMode::from_str(value, true)
                .map_err(|_| invalid(key, value, "expected auto, api or tag-scheme"))?
        }
        ["copy", "skip_gc"] => {
            config.copy.skip_gc = value
                .parse()
                .map_err(|_| invalid(key, value, "expected true or false"))?
        }
        ["cache", "root"] => {
            config.cache.root = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        _ => return Err(OrcaError::User(format!("Unknown configuration key: {}", key))),
    }
    Ok(())
}

fn invalid(key: &str, value: &str, reason: &str) -> OrcaError {
    OrcaError::User(format!("Invalid value '{}' for {}: {}", value, key, reason))
}

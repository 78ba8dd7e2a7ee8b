//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, StorageKind};
use crate::error::{ClientError, ClientResult};
use crate::ui::{self, UiContext};
use std::path::PathBuf;

/// Keys accepted by `config set`
const KEYS: &[&str] = &[
    "cache.cache_results",
    "cache.lifetime_ms",
    "cache.storage",
    "cache.storage_name",
    "cache.storage_dir",
    "refetch_interval_ms",
    "background_refetch",
    "fetch_on_mount",
];

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    manager: &ConfigManager,
    config: &Config,
) -> ClientResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => {
            set_value(manager, config, &key, &value).await?
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> ClientResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> ClientResult<()> {
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
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());
    Ok(())
}

async fn set_value(
    manager: &ConfigManager,
    config: &Config,
    key: &str,
    value: &str,
) -> ClientResult<()> {
    let ctx = UiContext::detect();
    let mut config = config.clone();

    apply_value(&mut config, key, value)?;
    manager.save(&config).await?;

    ui::step_ok(&ctx, &format!("Set {} = {}", key, value));
    Ok(())
}

/// Apply a dot-separated key to the configuration
fn apply_value(config: &mut Config, key: &str, value: &str) -> ClientResult<()> {
    match key {
        "cache.cache_results" => config.cache.cache_results = parse_bool(key, value)?,
        "cache.lifetime_ms" => config.cache.lifetime_ms = parse_u64(key, value)?,
        "cache.storage" => config.cache.storage = parse_storage(key, value)?,
        "cache.storage_name" => {
            if value.is_empty() {
                return Err(invalid(key, "storage name cannot be empty"));
            }
            config.cache.storage_name = value.to_string();
        }
        "cache.storage_dir" => {
            config.cache.storage_dir = if value.is_empty() {
                None
            } else {
                Some(PathBuf::from(value))
            };
        }
        "refetch_interval_ms" => config.refetch_interval_ms = parse_u64(key, value)?,
        "background_refetch" => config.background_refetch = parse_bool(key, value)?,
        "fetch_on_mount" => config.fetch_on_mount = parse_bool(key, value)?,
        _ => {
            eprintln!("Valid keys:");
            for key in KEYS {
                eprintln!("  {}", key);
            }
            return Err(ClientError::UnknownConfigKey(key.to_string()));
        }
    }

    Ok(())
}

fn invalid(key: &str, reason: impl Into<String>) -> ClientError {
    ClientError::ConfigValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_bool(key: &str, value: &str) -> ClientResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(key, format!("'{}' is not a boolean, use true/false", value))),
    }
}

fn parse_u64(key: &str, value: &str) -> ClientResult<u64> {
    value
        .parse()
        .map_err(|_| invalid(key, format!("'{}' is not a number", value)))
}

fn parse_storage(key: &str, value: &str) -> ClientResult<StorageKind> {
    match value.to_lowercase().as_str() {
        "memory" => Ok(StorageKind::Memory),
        "session" => Ok(StorageKind::Session),
        "disk" => Ok(StorageKind::Disk),
        _ => Err(invalid(key, "expected memory, session or disk")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn apply_known_keys() {
        let mut config = Config::default();

        apply_value(&mut config, "cache.lifetime_ms", "1000").unwrap();
        apply_value(&mut config, "cache.storage", "Memory").unwrap();
        apply_value(&mut config, "background_refetch", "yes").unwrap();
        apply_value(&mut config, "cache.storage_dir", "/tmp/qc").unwrap();

        assert_eq!(config.cache.lifetime_ms, 1000);
        assert_eq!(config.cache.storage, StorageKind::Memory);
        assert!(config.background_refetch);
        assert_eq!(config.cache.storage_dir, Some(PathBuf::from("/tmp/qc")));

        apply_value(&mut config, "cache.storage_dir", "").unwrap();
        assert!(config.cache.storage_dir.is_none());
    }

    #[test]
    fn apply_rejects_bad_input() {
        let mut config = Config::default();

        let err = apply_value(&mut config, "cache.lifetime_ms", "soon").unwrap_err();
        assert!(matches!(err, ClientError::ConfigValue { .. }));

        let err = apply_value(&mut config, "cache.storage", "cloud").unwrap_err();
        assert!(err.to_string().contains("memory, session or disk"));

        let err = apply_value(&mut config, "vm.name", "x").unwrap_err();
        assert!(matches!(err, ClientError::UnknownConfigKey(_)));
    }

    #[tokio::test]
    async fn set_value_persists() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join("config.toml"));

        set_value(&manager, &Config::default(), "refetch_interval_ms", "0")
            .await
            .unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.refetch_interval_ms, 0);
        assert!(loaded.refetch_interval().is_none());
    }
}

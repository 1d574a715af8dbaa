//! Configuration loading for commands

use anyhow::{Context, Result};
use std::path::Path;
use thechain_core::ChainConfig;

/// Load, merge the environment, validate
pub fn load(path: Option<&Path>) -> Result<ChainConfig> {
    ChainConfig::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config from environment".to_string(),
    })
}

/// Like [`load`], but a missing signing secret is replaced by a throwaway one.
/// Only for commands that never hand signatures to anyone.
pub fn load_or_ephemeral(path: Option<&Path>) -> Result<ChainConfig> {
    let mut config = match path {
        Some(path) => ChainConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ChainConfig::default(),
    };
    config.merge_with_env()?;
    if config.signing_secret.is_empty() {
        tracing::info!("No signing secret configured, using an ephemeral one");
        config.signing_secret = format!("{}{}", uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
    }
    config.validate()?;
    Ok(config)
}

/// `check-config`
pub fn check(path: Option<&Path>) -> Result<()> {
    let config = load(path)?;
    println!("Configuration is valid");
    println!("{config:#?}");
    Ok(())
}

//! `sign` and `verify`

use super::config;
use anyhow::{bail, Result};
use std::path::Path;
use thechain_core::TicketSigner;

pub fn sign(config_path: Option<&Path>, payload: &str) -> Result<()> {
    let signer = TicketSigner::from_config(&config::load(config_path)?)?;
    println!("{}", signer.sign(payload));
    Ok(())
}

pub fn verify(config_path: Option<&Path>, payload: &str, signature: &str) -> Result<()> {
    let signer = TicketSigner::from_config(&config::load(config_path)?)?;
    if !signer.verify(payload, signature) {
        tracing::warn!("Signature rejected");
        bail!("signature does not match payload");
    }
    println!("Signature valid");
    Ok(())
}

//! NetBox API token lookup in the desktop secret store.

use anyhow::{bail, Context, Result};
use std::process::Command;

const SECRET_TOOL: &str = "secret-tool";

/// Token stored under `service=netbox`, via `secret-tool lookup`.
pub fn lookup_token() -> Result<String> {
    let output = Command::new(SECRET_TOOL)
        .args(["lookup", "service", "netbox"])
        .output()
        .with_context(|| format!("failed to run {SECRET_TOOL}; set a token in the config file or COREVPN_NETBOX_TOKEN"))?;
    if !output.status.success() {
        bail!(
            "{SECRET_TOOL} lookup service netbox failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    parse_token(&output.stdout)
}

fn parse_token(stdout: &[u8]) -> Result<String> {
    let token = std::str::from_utf8(stdout)
        .context("secret store returned a non-UTF-8 token")?
        .trim();
    anyhow::ensure!(!token.is_empty(), "secret store has no token for service=netbox");
    Ok(token.to_string())
}

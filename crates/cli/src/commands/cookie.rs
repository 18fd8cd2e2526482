//! Cookie signing with the gateway's key.

use std::io::Write;

use lumen_gateway::GatewayConfig;
use lumen_gateway::cookies::CookieSigner;
use tracing::info;

/// Signature did not match.
#[derive(Debug, thiserror::Error)]
#[error("signature does not match cookie '{0}'")]
pub struct SignatureMismatch(String);

fn signer() -> Result<CookieSigner, Box<dyn std::error::Error>> {
    let config = GatewayConfig::from_env()?;
    Ok(CookieSigner::new(config.signing_key_bytes()))
}

/// Print `Set-Cookie` lines for `name=value` and its signature companion.
///
/// # Errors
///
/// Returns an error if the signing key is missing or invalid.
pub fn sign(name: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (cookie, companion) = signer()?.signed_cookie(name, value);
    info!(cookie = %name, "Signed cookie");

    let mut out = std::io::stdout().lock();
    writeln!(out, "Set-Cookie: {cookie}")?;
    writeln!(out, "Set-Cookie: {companion}")?;
    Ok(())
}

/// Check `signature` for `name=value`.
///
/// # Errors
///
/// Returns an error if the key cannot be loaded or the signature is wrong.
pub fn verify(name: &str, value: &str, signature: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !signer()?.verify(name, value, signature) {
        return Err(SignatureMismatch(name.to_string()).into());
    }
    writeln!(std::io::stdout().lock(), "valid")?;
    Ok(())
}

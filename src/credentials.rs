//! Secure credential storage using the OS credential store.
//!
//! On Windows this uses DPAPI (via the `keyring` crate), on macOS Keychain,
//! and on Linux the kernel keyring. Holds the hosted backend's URL and anon
//! key (when not provided through the environment) and the refresh token that
//! lets a signed-in session survive a restart.

use keyring::Entry;
use tracing::warn;

use crate::error::{PosError, PosResult};

const SERVICE_NAME: &str = "shop-pos";

// Credential keys
pub const KEY_BACKEND_URL: &str = "supabase_url";
pub const KEY_ANON_KEY: &str = "supabase_anon_key";
pub const KEY_REFRESH_TOKEN: &str = "auth_refresh_token";

/// Retrieve a single credential from the OS keyring. Returns `None` when the
/// entry does not exist (or the platform returns a "not found" error).
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) if !pw.trim().is_empty() => Some(pw),
        Ok(_) => None,
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

/// Store a credential in the OS keyring.
pub fn set_credential(key: &str, value: &str) -> PosResult<()> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| PosError::Storage(e.to_string()))?;
    entry
        .set_password(value)
        .map_err(|e| PosError::Storage(e.to_string()))?;
    Ok(())
}

/// Delete a credential from the OS keyring. Silently succeeds if the entry
/// does not exist.
pub fn delete_credential(key: &str) -> PosResult<()> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| PosError::Storage(e.to_string()))?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(PosError::Storage(e.to_string())),
    }
}

/// Mask a secret for logs, keeping only the last four characters.
pub fn mask_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "unknown".to_string();
    }
    let suffix: String = trimmed
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<char>>()
        .into_iter()
        .rev()
        .collect();
    format!("***{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_secret_keeps_suffix_only() {
        assert_eq!(mask_secret("eyJhbGciOiJIUzI1NiJ9.abcd"), "***abcd");
        assert_eq!(mask_secret("ab"), "***ab");
        assert_eq!(mask_secret("   "), "unknown");
    }
}

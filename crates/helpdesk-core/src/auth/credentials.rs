//! Remembered passwords in the OS keychain, one entry per account.

use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "helpdesk";

/// Keychain entries are keyed by the normalized account email, so
/// `Jane@Example.com ` and `jane@example.com` share one entry.
fn account_key(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct Keychain;

impl Keychain {
    fn entry(email: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &account_key(email)).context("Failed to open keychain entry")
    }

    /// The remembered password for `email`, or `None` if there is none.
    pub fn remembered(email: &str) -> Result<Option<String>> {
        match Self::entry(email)?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read password from keychain"),
        }
    }

    pub fn remember(email: &str, password: &str) -> Result<()> {
        Self::entry(email)?
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    /// Drop the remembered password. Returns false when there was none.
    pub fn forget(email: &str) -> Result<bool> {
        match Self::entry(email)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(e).context("Failed to delete password from keychain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_key_normalizes_email() {
        assert_eq!(account_key(" Jane@Example.com "), "jane@example.com");
        assert_eq!(account_key("jane@example.com"), "jane@example.com");
    }
}

//! Secure terminal config storage using the OS credential store.
//!
//! Holds the hosted backing-store credentials (REST URL + anon key) and the
//! terminal's display label. On Windows this uses DPAPI (via the `keyring`
//! crate), on macOS Keychain, and on Linux the Secret Service API.

use keyring::Entry;
use serde_json::Value;
use tracing::{info, warn};

const SERVICE_NAME: &str = "tableside-pos";

// Credential keys
const KEY_BACKEND_URL: &str = "backend_url";
const KEY_BACKEND_ANON_KEY: &str = "backend_anon_key";
const KEY_TERMINAL_LABEL: &str = "terminal_label";

/// All credential keys managed by this module.
const ALL_KEYS: &[&str] = &[KEY_BACKEND_URL, KEY_BACKEND_ANON_KEY, KEY_TERMINAL_LABEL];

// ---------------------------------------------------------------------------
// Low-level helpers
// ---------------------------------------------------------------------------

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
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

/// Store a credential in the OS keyring.
pub fn set_credential(key: &str, value: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    entry.set_password(value).map_err(|e| e.to_string())?;
    Ok(())
}

/// Delete a credential from the OS keyring. Silently succeeds if the entry
/// does not exist.
pub fn delete_credential(key: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

fn has_credential(key: &str) -> bool {
    get_credential(key).is_some()
}

// ---------------------------------------------------------------------------
// High-level API
// ---------------------------------------------------------------------------

/// The terminal is considered configured when both backing-store credentials
/// are present.
pub fn is_configured() -> bool {
    has_credential(KEY_BACKEND_URL) && has_credential(KEY_BACKEND_ANON_KEY)
}

/// The backing-store REST base URL, trailing slash trimmed.
pub fn backend_url() -> Option<String> {
    get_credential(KEY_BACKEND_URL).map(|url| url.trim().trim_end_matches('/').to_string())
}

/// The backing-store anon API key.
pub fn backend_anon_key() -> Option<String> {
    get_credential(KEY_BACKEND_ANON_KEY)
}

/// Human-readable label for this terminal, shown in diagnostics.
pub fn terminal_label() -> String {
    get_credential(KEY_TERMINAL_LABEL).unwrap_or_else(|| "terminal".to_string())
}

/// Store backing-store credentials received during onboarding.
///
/// Expected JSON shape (camelCase, matching the frontend payload):
/// ```json
/// { "backendUrl": "...", "anonKey": "...", "terminalLabel": "..." }
/// ```
pub fn update_backend_credentials(payload: &Value) -> Result<Value, String> {
    let url = payload
        .get("backendUrl")
        .or_else(|| payload.get("backend_url"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or("Missing required field: backendUrl")?;
    let anon_key = payload
        .get("anonKey")
        .or_else(|| payload.get("anon_key"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or("Missing required field: anonKey")?;

    set_credential(KEY_BACKEND_URL, url.trim_end_matches('/'))?;
    set_credential(KEY_BACKEND_ANON_KEY, anon_key)?;

    if let Some(label) = payload
        .get("terminalLabel")
        .or_else(|| payload.get("terminal_label"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        set_credential(KEY_TERMINAL_LABEL, label)?;
    }

    info!("backend credentials updated");
    Ok(serde_json::json!({ "success": true }))
}

/// Delete every stored credential (disconnect the terminal).
pub fn clear_credentials() -> Result<Value, String> {
    info!("clearing all stored backend credentials");
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    Ok(serde_json::json!({ "success": true }))
}

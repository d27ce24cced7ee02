//! Settings commands: terminal onboarding (backing-store credentials),
//! device-local key/value settings, and the restaurant settings singleton.

use std::sync::Arc;

use serde_json::Value;

use crate::backend::Backend;
use crate::db::{self, DbState};
use crate::models::RestaurantSettings;
use crate::settings::{self, SettingsState};
use crate::storage;

#[tauri::command]
pub async fn settings_is_configured() -> Result<bool, String> {
    Ok(storage::is_configured())
}

#[tauri::command]
pub async fn settings_update_backend_credentials(payload: Value) -> Result<Value, String> {
    storage::update_backend_credentials(&payload)
}

/// Disconnect the terminal: drop the stored credentials along with the
/// cached settings snapshot and feed cursor, so a re-onboarded terminal
/// starts from a clean window.
#[tauri::command]
pub async fn settings_clear_credentials(
    db: tauri::State<'_, DbState>,
) -> Result<Value, String> {
    let result = storage::clear_credentials()?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::delete_all_settings(&conn, "cache")?;
    db::delete_all_settings(&conn, "feed")?;
    Ok(result)
}

#[tauri::command]
pub async fn settings_terminal_label() -> Result<String, String> {
    Ok(storage::terminal_label())
}

// -- Device-local settings ---------------------------------------------------

#[tauri::command]
pub async fn settings_get_local(
    category: String,
    key: String,
    db: tauri::State<'_, DbState>,
) -> Result<Option<String>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(db::get_setting(&conn, &category, &key))
}

#[tauri::command]
pub async fn settings_set_local(
    category: String,
    key: String,
    value: String,
    db: tauri::State<'_, DbState>,
) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::set_setting(&conn, &category, &key, &value)
}

// -- Restaurant settings singleton -------------------------------------------

#[tauri::command]
pub async fn restaurant_get_settings(
    db: tauri::State<'_, DbState>,
    backend: tauri::State<'_, Backend>,
    state: tauri::State<'_, Arc<SettingsState>>,
) -> Result<RestaurantSettings, String> {
    if let Some(snapshot) = state.snapshot() {
        return Ok(snapshot);
    }
    settings::load(&backend, &db, &state).await
}

#[tauri::command]
pub async fn restaurant_reload_settings(
    db: tauri::State<'_, DbState>,
    backend: tauri::State<'_, Backend>,
    state: tauri::State<'_, Arc<SettingsState>>,
) -> Result<RestaurantSettings, String> {
    settings::load(&backend, &db, &state).await
}

#[tauri::command]
pub async fn restaurant_update_settings(
    patch: Value,
    db: tauri::State<'_, DbState>,
    backend: tauri::State<'_, Backend>,
    state: tauri::State<'_, Arc<SettingsState>>,
) -> Result<RestaurantSettings, String> {
    settings::update(&backend, &db, &state, &patch).await
}

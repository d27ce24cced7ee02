//! Restaurant settings for Tableside POS.
//!
//! `restaurant_settings` is a singleton record in the backing store, read by
//! nearly every component and mutated only through the explicit update
//! operation. The loaded snapshot is shared via managed state and mirrored
//! into the local database so the terminal can start offline.

use serde_json::Value;
use std::sync::RwLock;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::db::{self, DbState};
use crate::models::RestaurantSettings;

const CACHE_CATEGORY: &str = "cache";
const CACHE_KEY: &str = "restaurant_settings";

/// Tauri managed state holding the current settings snapshot.
#[derive(Default)]
pub struct SettingsState {
    current: RwLock<Option<RestaurantSettings>>,
}

impl SettingsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot, if any load has succeeded yet.
    pub fn snapshot(&self) -> Option<RestaurantSettings> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }

    pub fn store(&self, settings: RestaurantSettings) {
        if let Ok(mut guard) = self.current.write() {
            *guard = Some(settings);
        }
    }
}

/// Split a tax-inclusive total into subtotal and tax at the given
/// percentage rate: `subtotal = total / (1 + rate)`, `tax = total − subtotal`.
pub fn split_tax_inclusive(total: f64, rate_percent: f64) -> (f64, f64) {
    let rate = rate_percent.max(0.0) / 100.0;
    let subtotal = if rate > 0.0 { total / (1.0 + rate) } else { total };
    (subtotal, total - subtotal)
}

fn read_cached(db: &DbState) -> Option<RestaurantSettings> {
    let conn = db.conn.lock().ok()?;
    let raw = db::get_setting(&conn, CACHE_CATEGORY, CACHE_KEY)?;
    serde_json::from_str(&raw).ok()
}

fn write_cache(db: &DbState, settings: &RestaurantSettings) {
    let serialized = match serde_json::to_string(settings) {
        Ok(s) => s,
        Err(e) => {
            warn!("settings cache serialize failed: {e}");
            return;
        }
    };
    if let Ok(conn) = db.conn.lock() {
        if let Err(e) = db::set_setting(&conn, CACHE_CATEGORY, CACHE_KEY, &serialized) {
            warn!("settings cache write failed: {e}");
        }
    }
}

/// Load settings from the backing store into shared state, caching the
/// snapshot locally. Falls back to the cached copy when the store is
/// unreachable so pages keep working offline.
pub async fn load(
    backend: &Backend,
    db: &DbState,
    state: &SettingsState,
) -> Result<RestaurantSettings, String> {
    match backend.fetch_settings().await {
        Ok(Some(settings)) => {
            write_cache(db, &settings);
            state.store(settings.clone());
            info!(restaurant = %settings.name, "Restaurant settings loaded");
            Ok(settings)
        }
        Ok(None) => Err("No restaurant settings record exists yet".to_string()),
        Err(e) => match read_cached(db) {
            Some(cached) => {
                warn!("Settings fetch failed ({e}); using cached snapshot");
                state.store(cached.clone());
                Ok(cached)
            }
            None => Err(e),
        },
    }
}

/// Apply a settings patch through the backing store, then reload the shared
/// snapshot.
pub async fn update(
    backend: &Backend,
    db: &DbState,
    state: &SettingsState,
    patch: &Value,
) -> Result<RestaurantSettings, String> {
    let current = state
        .snapshot()
        .ok_or("Settings not loaded yet; cannot update")?;
    backend.update_settings(&current.id, patch).await?;
    load(backend, db, state).await
}

// ===========================================================================
// Tests
// ===========================================================================

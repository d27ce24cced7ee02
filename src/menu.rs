//! Menu administration for Tableside POS.
//!
//! Menu items and categories live in the backing store and have a lifecycle
//! independent from orders: order rows keep name/price snapshots, so edits
//! and deletions here never rewrite history.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::backend::Backend;
use crate::models::{MenuCategory, MenuItem};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMenuItem {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub available: Option<bool>,
}

pub async fn list_items(backend: &Backend) -> Result<Vec<MenuItem>, String> {
    backend.fetch_menu_items().await
}

pub async fn create_item(backend: &Backend, input: NewMenuItem) -> Result<MenuItem, String> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err("Missing menu item name".into());
    }
    if input.price < 0.0 {
        return Err("Menu item price cannot be negative".into());
    }

    let now = Utc::now().to_rfc3339();
    let item = MenuItem {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        price: input.price,
        category_id: input.category_id,
        description: input.description,
        available: input.available.unwrap_or(true),
        created_at: now.clone(),
        updated_at: now,
    };
    let stored = backend.insert_menu_item(&item).await?;
    info!(item_id = %stored.id, name = %stored.name, "Menu item created");
    Ok(stored)
}

pub async fn update_item(backend: &Backend, id: &str, patch: &Value) -> Result<(), String> {
    let mut patch = patch
        .as_object()
        .cloned()
        .ok_or("Menu item patch must be an object")?;
    patch.insert(
        "updated_at".into(),
        Value::String(Utc::now().to_rfc3339()),
    );
    backend.update_menu_item(id, &Value::Object(patch)).await
}

pub async fn set_item_availability(
    backend: &Backend,
    id: &str,
    available: bool,
) -> Result<(), String> {
    update_item(backend, id, &serde_json::json!({ "available": available })).await
}

pub async fn delete_item(backend: &Backend, id: &str) -> Result<(), String> {
    backend.delete_menu_item(id).await?;
    info!(item_id = %id, "Menu item deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

pub async fn list_categories(backend: &Backend) -> Result<Vec<MenuCategory>, String> {
    backend.fetch_menu_categories().await
}

pub async fn create_category(
    backend: &Backend,
    name: &str,
    sort_order: i64,
) -> Result<MenuCategory, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Missing category name".into());
    }
    let category = MenuCategory {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        sort_order,
    };
    let stored = backend.insert_menu_category(&category).await?;
    info!(category_id = %stored.id, name = %stored.name, "Menu category created");
    Ok(stored)
}

pub async fn update_category(backend: &Backend, id: &str, patch: &Value) -> Result<(), String> {
    backend.update_menu_category(id, patch).await
}

pub async fn delete_category(backend: &Backend, id: &str) -> Result<(), String> {
    backend.delete_menu_category(id).await?;
    info!(category_id = %id, "Menu category deleted");
    Ok(())
}

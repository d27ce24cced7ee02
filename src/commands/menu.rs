//! Menu and order-source administration commands.

use serde_json::Value;

use crate::backend::Backend;
use crate::menu::{self, NewMenuItem};
use crate::models::{MenuCategory, MenuItem, OrderSource};
use crate::sources::{self, NewOrderSource};

// -- Menu items --------------------------------------------------------------

#[tauri::command]
pub async fn menu_list_items(
    backend: tauri::State<'_, Backend>,
) -> Result<Vec<MenuItem>, String> {
    menu::list_items(&backend).await
}

#[tauri::command]
pub async fn menu_create_item(
    payload: NewMenuItem,
    backend: tauri::State<'_, Backend>,
) -> Result<MenuItem, String> {
    menu::create_item(&backend, payload).await
}

#[tauri::command]
pub async fn menu_update_item(
    item_id: String,
    patch: Value,
    backend: tauri::State<'_, Backend>,
) -> Result<(), String> {
    menu::update_item(&backend, &item_id, &patch).await
}

#[tauri::command]
pub async fn menu_set_availability(
    item_id: String,
    available: bool,
    backend: tauri::State<'_, Backend>,
) -> Result<(), String> {
    menu::set_item_availability(&backend, &item_id, available).await
}

#[tauri::command]
pub async fn menu_delete_item(
    item_id: String,
    backend: tauri::State<'_, Backend>,
) -> Result<(), String> {
    menu::delete_item(&backend, &item_id).await
}

// -- Categories --------------------------------------------------------------

#[tauri::command]
pub async fn menu_list_categories(
    backend: tauri::State<'_, Backend>,
) -> Result<Vec<MenuCategory>, String> {
    menu::list_categories(&backend).await
}

#[tauri::command]
pub async fn menu_create_category(
    name: String,
    sort_order: Option<i64>,
    backend: tauri::State<'_, Backend>,
) -> Result<MenuCategory, String> {
    menu::create_category(&backend, &name, sort_order.unwrap_or(0)).await
}

#[tauri::command]
pub async fn menu_update_category(
    category_id: String,
    patch: Value,
    backend: tauri::State<'_, Backend>,
) -> Result<(), String> {
    menu::update_category(&backend, &category_id, &patch).await
}

#[tauri::command]
pub async fn menu_delete_category(
    category_id: String,
    backend: tauri::State<'_, Backend>,
) -> Result<(), String> {
    menu::delete_category(&backend, &category_id).await
}

// -- Order sources -----------------------------------------------------------

#[tauri::command]
pub async fn source_list(
    backend: tauri::State<'_, Backend>,
) -> Result<Vec<OrderSource>, String> {
    sources::list(&backend).await
}

#[tauri::command]
pub async fn source_create(
    payload: NewOrderSource,
    backend: tauri::State<'_, Backend>,
) -> Result<OrderSource, String> {
    sources::create(&backend, payload).await
}

#[tauri::command]
pub async fn source_update(
    source_id: String,
    patch: Value,
    backend: tauri::State<'_, Backend>,
) -> Result<(), String> {
    sources::update(&backend, &source_id, &patch).await
}

#[tauri::command]
pub async fn source_delete(
    source_id: String,
    backend: tauri::State<'_, Backend>,
) -> Result<(), String> {
    sources::remove(&backend, &source_id).await
}

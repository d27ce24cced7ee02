//! Order commands: the read model queries behind the Orders, Kitchen,
//! Billing, Dashboard, and History pages, plus the explicit mutations.

use std::sync::Arc;

use serde::Serialize;

use crate::models::{Order, OrderItem, OrderStatus, TableStatus};
use crate::orders::{NewOrder, NewOrderItem, OrderStore};
use crate::settings::SettingsState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOverview {
    pub table: i64,
    pub status: TableStatus,
    pub active_order_id: Option<String>,
}

#[tauri::command]
pub async fn order_list(store: tauri::State<'_, Arc<OrderStore>>) -> Result<Vec<Order>, String> {
    Ok(store.snapshot())
}

#[tauri::command]
pub async fn order_get(
    order_id: String,
    store: tauri::State<'_, Arc<OrderStore>>,
) -> Result<OrderWithItems, String> {
    let order = store
        .get(&order_id)
        .ok_or_else(|| format!("Order {order_id} not found"))?;
    let items = store.items_for(&order_id);
    Ok(OrderWithItems { order, items })
}

#[tauri::command]
pub async fn order_create(
    payload: NewOrder,
    store: tauri::State<'_, Arc<OrderStore>>,
) -> Result<Order, String> {
    store.create_order(payload).await
}

#[tauri::command]
pub async fn order_add_items(
    order_id: String,
    items: Vec<NewOrderItem>,
    store: tauri::State<'_, Arc<OrderStore>>,
) -> Result<Order, String> {
    store.add_items(&order_id, items).await
}

#[tauri::command]
pub async fn order_update_status(
    order_id: String,
    status: String,
    store: tauri::State<'_, Arc<OrderStore>>,
) -> Result<(), String> {
    let status = OrderStatus::parse(&status)?;
    store.update_status(&order_id, status).await
}

#[tauri::command]
pub async fn order_record_payment(
    order_id: String,
    method: String,
    store: tauri::State<'_, Arc<OrderStore>>,
) -> Result<(), String> {
    store.record_payment(&order_id, &method).await
}

#[tauri::command]
pub async fn order_refresh(store: tauri::State<'_, Arc<OrderStore>>) -> Result<usize, String> {
    store.refresh().await
}

/// One row per table for the floor view: derived status plus the active
/// order occupying it, if any.
#[tauri::command]
pub async fn table_overview(
    store: tauri::State<'_, Arc<OrderStore>>,
    settings: tauri::State<'_, Arc<SettingsState>>,
) -> Result<Vec<TableOverview>, String> {
    let table_count = settings
        .snapshot()
        .map(|s| s.table_count)
        .unwrap_or_default();
    let rows = (1..=table_count)
        .map(|table| TableOverview {
            table,
            status: store.table_status(table),
            active_order_id: store.active_order_for_table(table).map(|o| o.id),
        })
        .collect();
    Ok(rows)
}

#[tauri::command]
pub async fn table_active_order(
    table: i64,
    store: tauri::State<'_, Arc<OrderStore>>,
) -> Result<Option<OrderWithItems>, String> {
    Ok(store.active_order_for_table(table).map(|order| {
        let items = store.items_for(&order.id);
        OrderWithItems { order, items }
    }))
}

#[tauri::command]
pub async fn source_active_orders(
    source_id: String,
    store: tauri::State<'_, Arc<OrderStore>>,
) -> Result<Vec<Order>, String> {
    Ok(store.active_orders_for_source(&source_id))
}

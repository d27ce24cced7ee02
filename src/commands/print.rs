//! Printing commands: printer endpoint registry, connection lifecycle,
//! on-demand receipt printing from billing, the printer test path, and the
//! notification panel feed.

use std::sync::Arc;

use crate::backend::Backend;
use crate::db::DbState;
use crate::notify::{Alert, NotificationLog};
use crate::settings::SettingsState;
use crate::spooler::{self, ConnectionState, PrintOutcome, PrintService, PrinterEndpoint};

// -- Printer endpoint registry -----------------------------------------------

#[tauri::command]
pub async fn printer_list(
    db: tauri::State<'_, DbState>,
) -> Result<Vec<PrinterEndpoint>, String> {
    spooler::list_endpoints(&db)
}

#[tauri::command]
pub async fn printer_register(
    name: String,
    host: String,
    port: Option<u16>,
    db: tauri::State<'_, DbState>,
) -> Result<PrinterEndpoint, String> {
    spooler::upsert_endpoint(&db, &name, &host, port.unwrap_or(9100))
}

#[tauri::command]
pub async fn printer_remove(name: String, db: tauri::State<'_, DbState>) -> Result<(), String> {
    spooler::remove_endpoint(&db, &name)
}

// -- Connection lifecycle ----------------------------------------------------

#[tauri::command]
pub async fn printer_connect(
    service: tauri::State<'_, Arc<PrintService>>,
) -> Result<ConnectionState, String> {
    service.ensure_connected().await?;
    Ok(service.state())
}

#[tauri::command]
pub async fn printer_reconnect(
    service: tauri::State<'_, Arc<PrintService>>,
) -> Result<ConnectionState, String> {
    service.reconnect().await?;
    Ok(service.state())
}

#[tauri::command]
pub async fn printer_connection_state(
    service: tauri::State<'_, Arc<PrintService>>,
) -> Result<ConnectionState, String> {
    Ok(service.state())
}

#[tauri::command]
pub async fn printer_names(
    service: tauri::State<'_, Arc<PrintService>>,
) -> Result<Vec<String>, String> {
    Ok(service.list_printers().await)
}

// -- On-demand printing ------------------------------------------------------

async fn dispatch_for_order(
    order_id: &str,
    print_kitchen: bool,
    skip_cash: bool,
    backend: &Backend,
    service: &PrintService,
    settings: &SettingsState,
) -> Result<PrintOutcome, String> {
    let settings = settings
        .snapshot()
        .ok_or("Settings not loaded yet; cannot print")?;
    let order = backend
        .fetch_order(order_id)
        .await?
        .ok_or_else(|| format!("Order {order_id} not found"))?;
    let items = backend.fetch_order_items(order_id).await?;
    if items.is_empty() {
        return Err(format!("Order {order_id} has no items to print"));
    }
    let source_name = match order.order_source_id.as_deref() {
        Some(source_id) => backend
            .fetch_order_source(source_id)
            .await?
            .map(|source| source.name),
        None => None,
    };

    service.ensure_connected().await?;
    Ok(service
        .print_order(
            &order,
            &items,
            &settings,
            source_name.as_deref(),
            print_kitchen,
            skip_cash,
        )
        .await)
}

/// Billing's "print receipt" button: the cash document only, regardless of
/// the order's auto-print routing. Used after payment for dine-in orders,
/// whose cash receipt is deferred at order time.
#[tauri::command]
pub async fn print_cash_receipt(
    order_id: String,
    backend: tauri::State<'_, Backend>,
    service: tauri::State<'_, Arc<PrintService>>,
    settings: tauri::State<'_, Arc<SettingsState>>,
) -> Result<PrintOutcome, String> {
    dispatch_for_order(&order_id, false, false, &backend, &service, &settings).await
}

/// Reprint the kitchen ticket for an order (kitchen display fallback).
#[tauri::command]
pub async fn print_kitchen_ticket(
    order_id: String,
    backend: tauri::State<'_, Backend>,
    service: tauri::State<'_, Arc<PrintService>>,
    settings: tauri::State<'_, Arc<SettingsState>>,
) -> Result<PrintOutcome, String> {
    dispatch_for_order(&order_id, true, true, &backend, &service, &settings).await
}

/// End-to-end printer validation with a fixed synthetic order.
#[tauri::command]
pub async fn printer_test(
    name: String,
    service: tauri::State<'_, Arc<PrintService>>,
    settings: tauri::State<'_, Arc<SettingsState>>,
) -> Result<(), String> {
    let settings = settings
        .snapshot()
        .ok_or("Settings not loaded yet; cannot test print")?;
    service.print_test(&name, &settings).await
}

// -- Notification panel ------------------------------------------------------

#[tauri::command]
pub async fn notifications_recent(
    log: tauri::State<'_, Arc<NotificationLog>>,
) -> Result<Vec<Alert>, String> {
    Ok(log.recent())
}

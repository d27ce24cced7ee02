//! Order read model and mutations for Tableside POS.
//!
//! The store keeps a client-side working set of recent orders and their
//! line-item snapshots, fully refetched from the backing store on every
//! relevant change-feed event — a simplicity-over-efficiency tradeoff that
//! is comfortable at restaurant-scale volumes. Every page-level view
//! (orders, kitchen, billing, dashboard, history) reads from here.
//!
//! Mutations funnel through explicit operations that write to the backing
//! store first and then trigger a full refetch; nothing is patched
//! optimistically in memory.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tauri::Emitter;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::feed::ChangeFeed;
use crate::models::{Order, OrderItem, OrderStatus, TableStatus};
use crate::settings::{split_tax_inclusive, SettingsState};

/// The working set covers orders from the last 30 days.
const RECENT_WINDOW_DAYS: i64 = 30;

// ---------------------------------------------------------------------------
// Derived views (pure over a snapshot)
// ---------------------------------------------------------------------------

/// Table status by priority: a `ready` order wins over `preparing`, which
/// wins over `ordered` (pending). No active order means the table is free.
pub fn derive_table_status(orders: &[Order], table: i64) -> TableStatus {
    let mut status = TableStatus::Free;
    for order in orders {
        if order.table_number != Some(table) || !order.is_active() {
            continue;
        }
        let candidate = match order.status {
            OrderStatus::Ready => TableStatus::Ready,
            OrderStatus::Preparing => TableStatus::Preparing,
            _ => TableStatus::Ordered,
        };
        status = match (status, candidate) {
            (_, TableStatus::Ready) | (TableStatus::Ready, _) => TableStatus::Ready,
            (_, TableStatus::Preparing) | (TableStatus::Preparing, _) => TableStatus::Preparing,
            _ => TableStatus::Ordered,
        };
    }
    status
}

/// Recompute tax-inclusive totals after items worth `added_total` join an
/// order, carrying over the order's existing subtotal/total ratio. Falls
/// back to the configured rate when the order total is zero.
pub fn recompute_totals_with_ratio(
    order: &Order,
    added_total: f64,
    tax_rate: f64,
) -> (f64, f64, f64) {
    let combined_total = order.total + added_total;
    if order.total > 0.0 {
        let ratio = order.subtotal / order.total;
        let subtotal = combined_total * ratio;
        (subtotal, combined_total - subtotal, combined_total)
    } else {
        let (subtotal, tax) = split_tax_inclusive(combined_total, tax_rate);
        (subtotal, tax, combined_total)
    }
}

// ---------------------------------------------------------------------------
// Mutation payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
    #[serde(default)]
    pub menu_item_id: Option<String>,
    pub name: String,
    pub price: f64,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    #[serde(default)]
    pub table_number: Option<i64>,
    #[serde(default)]
    pub order_source_id: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub items: Vec<NewOrderItem>,
}

fn items_total(items: &[NewOrderItem]) -> f64 {
    items
        .iter()
        .map(|item| item.price * item.quantity as f64)
        .sum()
}

fn snapshot_items(order_id: &str, items: &[NewOrderItem], now: &str) -> Vec<OrderItem> {
    items
        .iter()
        .map(|item| OrderItem {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            menu_item_id: item.menu_item_id.clone(),
            name: item.name.clone(),
            price: item.price,
            quantity: item.quantity.max(1),
            notes: item.notes.clone(),
            created_at: now.to_string(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct OrderStore {
    backend: Backend,
    settings: Arc<SettingsState>,
    orders: RwLock<Vec<Order>>,
    items: RwLock<HashMap<String, Vec<OrderItem>>>,
}

impl OrderStore {
    pub fn new(backend: Backend, settings: Arc<SettingsState>) -> Self {
        Self {
            backend,
            settings,
            orders: RwLock::new(Vec::new()),
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Full refetch of the recent window and its items. Returns the number
    /// of orders loaded.
    pub async fn refresh(&self) -> Result<usize, String> {
        let since = (Utc::now() - ChronoDuration::days(RECENT_WINDOW_DAYS)).to_rfc3339();
        let orders = self.backend.fetch_recent_orders(&since).await?;
        let ids: Vec<String> = orders.iter().map(|o| o.id.clone()).collect();
        let all_items = self.backend.fetch_items_for_orders(&ids).await?;

        let mut grouped: HashMap<String, Vec<OrderItem>> = HashMap::new();
        for item in all_items {
            grouped.entry(item.order_id.clone()).or_default().push(item);
        }

        let count = orders.len();
        if let Ok(mut guard) = self.orders.write() {
            *guard = orders;
        }
        if let Ok(mut guard) = self.items.write() {
            *guard = grouped;
        }
        Ok(count)
    }

    // -- Reads ------------------------------------------------------------

    pub fn snapshot(&self) -> Vec<Order> {
        self.orders
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, order_id: &str) -> Option<Order> {
        self.orders
            .read()
            .ok()?
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
    }

    pub fn items_for(&self, order_id: &str) -> Vec<OrderItem> {
        self.items
            .read()
            .ok()
            .and_then(|guard| guard.get(order_id).cloned())
            .unwrap_or_default()
    }

    pub fn table_status(&self, table: i64) -> TableStatus {
        self.orders
            .read()
            .map(|guard| derive_table_status(&guard, table))
            .unwrap_or(TableStatus::Free)
    }

    /// First active order occupying the table, if any.
    pub fn active_order_for_table(&self, table: i64) -> Option<Order> {
        self.orders
            .read()
            .ok()?
            .iter()
            .find(|o| o.table_number == Some(table) && o.is_active())
            .cloned()
    }

    pub fn active_orders_for_source(&self, source_id: &str) -> Vec<Order> {
        self.orders
            .read()
            .map(|guard| {
                guard
                    .iter()
                    .filter(|o| o.order_source_id.as_deref() == Some(source_id) && o.is_active())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // -- Mutations (write-through, then refetch) --------------------------

    /// Place a new order with its initial item snapshots. Totals are
    /// derived from the tax-inclusive item prices at the configured rate.
    pub async fn create_order(&self, input: NewOrder) -> Result<Order, String> {
        if input.items.is_empty() {
            return Err("An order needs at least one item".into());
        }
        let settings = self
            .settings
            .snapshot()
            .ok_or("Settings not loaded yet; cannot create orders")?;

        let now = Utc::now().to_rfc3339();
        let total = items_total(&input.items);
        let (subtotal, tax) = split_tax_inclusive(total, settings.tax_rate);

        let order = Order {
            id: Uuid::new_v4().to_string(),
            table_number: input.table_number,
            order_source_id: input.order_source_id.clone(),
            customer_name: input.customer_name.clone(),
            subtotal,
            tax,
            total,
            status: OrderStatus::Pending,
            paid: false,
            payment_method: None,
            printed_at: None,
            created_at: now.clone(),
            updated_at: now.clone(),
        };

        let stored = self.backend.insert_order(&order).await?;
        let items = snapshot_items(&stored.id, &input.items, &now);
        self.backend.insert_order_items(&items).await?;

        info!(order_id = %stored.id, total = total, "Order created");
        self.refresh().await?;
        Ok(stored)
    }

    /// Add items to an existing order: totals are recomputed from the
    /// order's existing tax ratio and the status resets to pending so the
    /// kitchen is re-notified.
    pub async fn add_items(&self, order_id: &str, items: Vec<NewOrderItem>) -> Result<Order, String> {
        if items.is_empty() {
            return Err("No items to add".into());
        }
        let settings = self
            .settings
            .snapshot()
            .ok_or("Settings not loaded yet; cannot update orders")?;
        let order = self
            .backend
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| format!("Order {order_id} not found"))?;

        let now = Utc::now().to_rfc3339();
        let added_total = items_total(&items);
        let (subtotal, tax, total) =
            recompute_totals_with_ratio(&order, added_total, settings.tax_rate);

        self.backend
            .insert_order_items(&snapshot_items(order_id, &items, &now))
            .await?;
        self.backend
            .update_order(
                order_id,
                &serde_json::json!({
                    "subtotal": subtotal,
                    "tax": tax,
                    "total": total,
                    "status": OrderStatus::Pending.as_str(),
                    "updated_at": now,
                }),
            )
            .await?;

        info!(order_id, added = added_total, "Items added, order reset to pending");
        self.refresh().await?;
        self.backend
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| format!("Order {order_id} vanished after update"))
    }

    pub async fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<(), String> {
        self.backend
            .update_order(
                order_id,
                &serde_json::json!({
                    "status": status.as_str(),
                    "updated_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        info!(order_id, status = status.as_str(), "Order status updated");
        self.refresh().await?;
        Ok(())
    }

    pub async fn record_payment(&self, order_id: &str, method: &str) -> Result<(), String> {
        let method = method.trim();
        if method.is_empty() {
            return Err("Missing payment method".into());
        }
        self.backend
            .update_order(
                order_id,
                &serde_json::json!({
                    "paid": true,
                    "payment_method": method,
                    "updated_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        info!(order_id, method, "Payment recorded");
        self.refresh().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Projector task
// ---------------------------------------------------------------------------

/// Keep the read model current: initial load, then a full refetch on every
/// change-feed event, notifying the webview afterwards.
pub fn start_order_projector(
    store: Arc<OrderStore>,
    app: tauri::AppHandle,
    feed: Arc<ChangeFeed>,
) {
    let mut events = feed.subscribe();
    tauri::async_runtime::spawn(async move {
        match store.refresh().await {
            Ok(count) => info!(orders = count, "Order store initial load complete"),
            Err(e) => warn!("Order store initial load failed: {e}"),
        }
        let _ = app.emit("orders_changed", serde_json::json!({ "reason": "init" }));

        loop {
            match events.recv().await {
                Ok(_event) => {
                    if let Err(e) = store.refresh().await {
                        warn!("Order store refresh failed: {e}");
                        continue;
                    }
                    let _ = app.emit("orders_changed", serde_json::json!({ "reason": "feed" }));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Order projector lagged; forcing refresh");
                    if let Err(e) = store.refresh().await {
                        warn!("Order store refresh failed: {e}");
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    info!("Order projector feed closed");
                    break;
                }
            }
        }
    });
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, table: Option<i64>, status: OrderStatus) -> Order {
        Order {
            id: id.into(),
            table_number: table,
            order_source_id: None,
            customer_name: None,
            subtotal: 9.09,
            tax: 0.91,
            total: 10.0,
            status,
            paid: false,
            payment_method: None,
            printed_at: None,
            created_at: "2026-02-21T10:00:00Z".into(),
            updated_at: "2026-02-21T10:00:00Z".into(),
        }
    }

    #[test]
    fn test_table_status_free_without_active_orders() {
        let mut paid = order("o-1", Some(3), OrderStatus::Ready);
        paid.paid = true;
        let rows = vec![
            paid,
            order("o-2", Some(3), OrderStatus::Served),
            order("o-3", Some(3), OrderStatus::Cancelled),
            order("o-4", Some(9), OrderStatus::Pending),
        ];
        assert_eq!(derive_table_status(&rows, 3), TableStatus::Free);
        assert_eq!(derive_table_status(&rows, 5), TableStatus::Free);
    }

    #[test]
    fn test_table_status_priority_ready_wins() {
        let rows = vec![
            order("o-1", Some(4), OrderStatus::Pending),
            order("o-2", Some(4), OrderStatus::Ready),
            order("o-3", Some(4), OrderStatus::Preparing),
        ];
        assert_eq!(derive_table_status(&rows, 4), TableStatus::Ready);
    }

    #[test]
    fn test_table_status_preparing_over_ordered() {
        let rows = vec![
            order("o-1", Some(4), OrderStatus::Pending),
            order("o-2", Some(4), OrderStatus::Preparing),
        ];
        assert_eq!(derive_table_status(&rows, 4), TableStatus::Preparing);
        assert_eq!(
            derive_table_status(&[order("o-1", Some(4), OrderStatus::Pending)], 4),
            TableStatus::Ordered
        );
    }

    #[test]
    fn test_recompute_totals_carries_existing_ratio() {
        let mut o = order("o-1", Some(5), OrderStatus::Ready);
        o.subtotal = 227.27;
        o.tax = 22.73;
        o.total = 250.0;

        let (subtotal, tax, total) = recompute_totals_with_ratio(&o, 50.0, 10.0);
        assert_eq!(total, 300.0);
        // ratio = 227.27 / 250 = 0.90908; applied to the combined total.
        assert!((subtotal - 272.724).abs() < 0.01);
        assert!((tax - 27.276).abs() < 0.01);
        assert!((subtotal + tax - total).abs() < 1e-9);
    }

    #[test]
    fn test_recompute_totals_zero_total_falls_back_to_rate() {
        let mut o = order("o-1", Some(5), OrderStatus::Pending);
        o.subtotal = 0.0;
        o.tax = 0.0;
        o.total = 0.0;

        let (subtotal, tax, total) = recompute_totals_with_ratio(&o, 110.0, 10.0);
        assert_eq!(total, 110.0);
        assert!((subtotal - 100.0).abs() < 1e-9);
        assert!((tax - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_items_total_and_snapshot() {
        let items = vec![
            NewOrderItem {
                menu_item_id: Some("mi-1".into()),
                name: "Halloumi".into(),
                price: 100.0,
                quantity: 2,
                notes: None,
            },
            NewOrderItem {
                menu_item_id: None,
                name: "Lemonade".into(),
                price: 50.0,
                quantity: 1,
                notes: Some("less ice".into()),
            },
        ];
        assert_eq!(items_total(&items), 250.0);

        let snapshots = snapshot_items("o-1", &items, "2026-02-21T10:00:00Z");
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|item| item.order_id == "o-1"));
        assert_eq!(snapshots[0].name, "Halloumi");
        assert_eq!(snapshots[1].notes.as_deref(), Some("less ice"));
        // ids are generated per snapshot row.
        assert_ne!(snapshots[0].id, snapshots[1].id);
    }
}

//! Domain models shared between the backing-store client, the order read
//! model, the printing pipeline, and the IPC command layer.
//!
//! Field names follow the backing-store column names (snake_case) so rows
//! deserialize straight out of the REST layer without remapping.

use serde::{Deserialize, Serialize};

/// Order lifecycle status. Transitions run forward
/// (pending → preparing → ready → served) except that adding items to an
/// existing order resets it to pending; cancellation is a status, not a
/// deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Served,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Served => "served",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "served" => Ok(OrderStatus::Served),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("Unknown order status: {other}")),
        }
    }
}

/// Derived dine-in table state, by priority: ready > preparing > ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    Free,
    Ordered,
    Preparing,
    Ready,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Dine-in table. `None` means a non-table order (see `order_source_id`).
    #[serde(default)]
    pub table_number: Option<i64>,
    /// Delivery/takeaway channel. Mutually exclusive with `table_number` by
    /// convention, not enforced by the store.
    #[serde(default)]
    pub order_source_id: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub status: OrderStatus,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Set once a receipt was dispatched for this order; the auto-print
    /// gate's authoritative de-dup marker.
    #[serde(default)]
    pub printed_at: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Order {
    /// First 8 characters of the id, uppercased — the human-facing order
    /// reference on tickets and receipts.
    pub fn short_id(&self) -> String {
        self.id.chars().take(8).collect::<String>().to_uppercase()
    }

    /// Dine-in means a table is set and no source channel is attached.
    pub fn is_dine_in(&self) -> bool {
        self.table_number.is_some() && self.order_source_id.is_none()
    }

    /// An order still occupying its table / source queue: unpaid and not
    /// served or cancelled.
    pub fn is_active(&self) -> bool {
        !self.paid && !matches!(self.status, OrderStatus::Served | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    /// The menu item may be deleted later; history keeps the snapshot below.
    #[serde(default)]
    pub menu_item_id: Option<String>,
    /// Name captured at order time, immutable afterwards.
    pub name: String,
    /// Unit price captured at order time, immutable afterwards.
    pub price: f64,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

impl OrderItem {
    pub fn line_amount(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sort_order: i64,
}

/// A non-table order channel (delivery platform, takeaway counter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub sort_order: i64,
}

/// Singleton per-restaurant configuration read by nearly every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestaurantSettings {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Tax percentage, e.g. 10.0 for 10%. Pricing is tax-inclusive:
    /// subtotal = total / (1 + rate), tax = total − subtotal.
    #[serde(default)]
    pub tax_rate: f64,
    #[serde(default)]
    pub business_hours: Option<String>,
    #[serde(default)]
    pub table_count: i64,
    #[serde(default = "default_true")]
    pub kitchen_printing_enabled: bool,
    #[serde(default)]
    pub kitchen_printer: Option<String>,
    #[serde(default)]
    pub cash_printer: Option<String>,
    #[serde(default)]
    pub updated_at: String,
}

fn default_true() -> bool {
    true
}

fn default_currency() -> String {
    "$".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(table: Option<i64>, source: Option<&str>) -> Order {
        Order {
            id: "a1b2c3d4-0000-0000-0000-000000000000".into(),
            table_number: table,
            order_source_id: source.map(str::to_string),
            customer_name: None,
            subtotal: 0.0,
            tax: 0.0,
            total: 0.0,
            status: OrderStatus::Pending,
            paid: false,
            payment_method: None,
            printed_at: None,
            created_at: "2026-02-21T10:00:00Z".into(),
            updated_at: "2026-02-21T10:00:00Z".into(),
        }
    }

    #[test]
    fn test_short_id_uppercases_first_eight() {
        let o = order(Some(5), None);
        assert_eq!(o.short_id(), "A1B2C3D4");
    }

    #[test]
    fn test_dine_in_requires_table_without_source() {
        assert!(order(Some(3), None).is_dine_in());
        assert!(!order(None, Some("src-1")).is_dine_in());
        // Both set: source wins, by convention not dine-in.
        assert!(!order(Some(3), Some("src-1")).is_dine_in());
        assert!(!order(None, None).is_dine_in());
    }

    #[test]
    fn test_active_excludes_paid_served_cancelled() {
        let mut o = order(Some(1), None);
        assert!(o.is_active());
        o.status = OrderStatus::Served;
        assert!(!o.is_active());
        o.status = OrderStatus::Ready;
        o.paid = true;
        assert!(!o.is_active());
        o.paid = false;
        o.status = OrderStatus::Cancelled;
        assert!(!o.is_active());
    }

    #[test]
    fn test_status_round_trips_through_serde() {
        let s: OrderStatus = serde_json::from_str("\"preparing\"").unwrap();
        assert_eq!(s, OrderStatus::Preparing);
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"preparing\"");
        assert_eq!(OrderStatus::parse("Canceled").unwrap(), OrderStatus::Cancelled);
        assert!(OrderStatus::parse("bogus").is_err());
    }
}

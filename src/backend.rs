//! Hosted backing-store client for Tableside POS.
//!
//! Thin REST layer over the managed Postgres (PostgREST conventions):
//! `apikey` + bearer headers, filter query params, `Prefer:
//! return=representation` on writes. Collections: `orders`, `order_items`,
//! `menu_items`, `menu_categories`, `order_sources`, `restaurant_settings`.
//!
//! Every failure surfaces as a human-readable `Err(String)`; callers decide
//! whether to retry. Nothing here retries automatically.

use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

use crate::models::{MenuCategory, MenuItem, Order, OrderItem, OrderSource, RestaurantSettings};
use crate::storage;

const REQUEST_TIMEOUT_SECS: u64 = 20;

pub struct Backend {
    client: reqwest::Client,
}

impl Backend {
    pub fn new() -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| format!("HTTP client error: {e}"))?;
        Ok(Self { client })
    }

    fn credentials(&self) -> Result<(String, String), String> {
        let url = storage::backend_url().ok_or("Backend not configured: missing URL")?;
        let key = storage::backend_anon_key().ok_or("Backend not configured: missing anon key")?;
        Ok((url, key))
    }

    fn rest_url(&self, base: &str, table: &str, params: &[(&str, String)]) -> Result<Url, String> {
        let mut url = Url::parse(&format!("{base}/rest/v1/{table}"))
            .map_err(|e| format!("Invalid backend URL: {e}"))?;
        {
            let mut qp = url.query_pairs_mut();
            for (k, v) in params {
                qp.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn decode(resp: reqwest::Response, context: &str) -> Result<Value, String> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("{context} failed ({status}): {body}"));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| format!("{context} JSON parse error: {e}"))
    }

    /// GET rows from a collection with PostgREST filter params.
    pub async fn select(&self, table: &str, params: &[(&str, String)]) -> Result<Value, String> {
        let (base, key) = self.credentials()?;
        let url = self.rest_url(&base, table, params)?;
        let resp = self
            .client
            .get(url)
            .header("apikey", &key)
            .header("Authorization", format!("Bearer {key}"))
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| format!("select {table} request failed: {e}"))?;
        Self::decode(resp, &format!("select {table}")).await
    }

    /// POST one or more rows; returns the stored representation.
    pub async fn insert(&self, table: &str, body: &Value) -> Result<Value, String> {
        let (base, key) = self.credentials()?;
        let url = self.rest_url(&base, table, &[])?;
        let resp = self
            .client
            .post(url)
            .header("apikey", &key)
            .header("Authorization", format!("Bearer {key}"))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await
            .map_err(|e| format!("insert {table} request failed: {e}"))?;
        Self::decode(resp, &format!("insert {table}")).await
    }

    /// PATCH rows matched by the filter params.
    pub async fn update(
        &self,
        table: &str,
        params: &[(&str, String)],
        body: &Value,
    ) -> Result<Value, String> {
        let (base, key) = self.credentials()?;
        let url = self.rest_url(&base, table, params)?;
        let resp = self
            .client
            .patch(url)
            .header("apikey", &key)
            .header("Authorization", format!("Bearer {key}"))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await
            .map_err(|e| format!("update {table} request failed: {e}"))?;
        Self::decode(resp, &format!("update {table}")).await
    }

    /// DELETE rows matched by the filter params.
    pub async fn delete(&self, table: &str, params: &[(&str, String)]) -> Result<(), String> {
        let (base, key) = self.credentials()?;
        let url = self.rest_url(&base, table, params)?;
        let resp = self
            .client
            .delete(url)
            .header("apikey", &key)
            .header("Authorization", format!("Bearer {key}"))
            .send()
            .await
            .map_err(|e| format!("delete {table} request failed: {e}"))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("delete {table} failed ({status}): {body}"));
        }
        Ok(())
    }
}

fn rows_to<T: serde::de::DeserializeOwned>(value: Value, context: &str) -> Result<Vec<T>, String> {
    serde_json::from_value(value).map_err(|e| format!("{context} decode error: {e}"))
}

fn first_row<T: serde::de::DeserializeOwned>(
    value: Value,
    context: &str,
) -> Result<Option<T>, String> {
    Ok(rows_to::<T>(value, context)?.into_iter().next())
}

// ---------------------------------------------------------------------------
// Typed collection wrappers
// ---------------------------------------------------------------------------

impl Backend {
    pub async fn fetch_settings(&self) -> Result<Option<RestaurantSettings>, String> {
        let rows = self
            .select(
                "restaurant_settings",
                &[("select", "*".into()), ("limit", "1".into())],
            )
            .await?;
        first_row(rows, "restaurant_settings")
    }

    pub async fn update_settings(&self, id: &str, patch: &Value) -> Result<(), String> {
        self.update("restaurant_settings", &[("id", format!("eq.{id}"))], patch)
            .await?;
        Ok(())
    }

    /// Orders created on or after `since` (RFC 3339), newest first.
    pub async fn fetch_recent_orders(&self, since: &str) -> Result<Vec<Order>, String> {
        let rows = self
            .select(
                "orders",
                &[
                    ("select", "*".into()),
                    ("created_at", format!("gte.{since}")),
                    ("order", "created_at.desc".into()),
                ],
            )
            .await?;
        rows_to(rows, "orders")
    }

    /// All orders lacking a printed marker, oldest first — the startup
    /// sweep's work list.
    pub async fn fetch_unprinted_orders(&self) -> Result<Vec<Order>, String> {
        let rows = self
            .select(
                "orders",
                &[
                    ("select", "*".into()),
                    ("printed_at", "is.null".into()),
                    ("order", "created_at.asc".into()),
                ],
            )
            .await?;
        rows_to(rows, "orders")
    }

    /// Orders whose `updated_at` moved past the feed cursor, oldest first.
    pub async fn fetch_orders_changed_since(&self, cursor: &str) -> Result<Vec<Order>, String> {
        let rows = self
            .select(
                "orders",
                &[
                    ("select", "*".into()),
                    ("updated_at", format!("gt.{cursor}")),
                    ("order", "updated_at.asc".into()),
                ],
            )
            .await?;
        rows_to(rows, "orders")
    }

    pub async fn fetch_order(&self, id: &str) -> Result<Option<Order>, String> {
        let rows = self
            .select(
                "orders",
                &[
                    ("select", "*".into()),
                    ("id", format!("eq.{id}")),
                    ("limit", "1".into()),
                ],
            )
            .await?;
        first_row(rows, "orders")
    }

    pub async fn insert_order(&self, order: &Order) -> Result<Order, String> {
        let body = serde_json::to_value(order).map_err(|e| format!("serialize order: {e}"))?;
        let rows = self.insert("orders", &body).await?;
        first_row(rows, "orders")?.ok_or("insert orders returned no row".to_string())
    }

    pub async fn update_order(&self, id: &str, patch: &Value) -> Result<(), String> {
        self.update("orders", &[("id", format!("eq.{id}"))], patch)
            .await?;
        Ok(())
    }

    /// Persist the printed marker — the authoritative auto-print de-dup
    /// signal shared by every terminal.
    pub async fn mark_order_printed(&self, id: &str, printed_at: &str) -> Result<(), String> {
        self.update_order(id, &serde_json::json!({ "printed_at": printed_at }))
            .await
    }

    pub async fn fetch_order_items(&self, order_id: &str) -> Result<Vec<OrderItem>, String> {
        let rows = self
            .select(
                "order_items",
                &[
                    ("select", "*".into()),
                    ("order_id", format!("eq.{order_id}")),
                    ("order", "created_at.asc".into()),
                ],
            )
            .await?;
        rows_to(rows, "order_items")
    }

    /// Items for a batch of orders in one round trip (`in.(...)` filter).
    pub async fn fetch_items_for_orders(
        &self,
        order_ids: &[String],
    ) -> Result<Vec<OrderItem>, String> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .select(
                "order_items",
                &[
                    ("select", "*".into()),
                    ("order_id", format!("in.({})", order_ids.join(","))),
                ],
            )
            .await?;
        rows_to(rows, "order_items")
    }

    pub async fn insert_order_items(&self, items: &[OrderItem]) -> Result<(), String> {
        if items.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_value(items).map_err(|e| format!("serialize items: {e}"))?;
        self.insert("order_items", &body).await?;
        Ok(())
    }

    // -- Menu -------------------------------------------------------------

    pub async fn fetch_menu_items(&self) -> Result<Vec<MenuItem>, String> {
        let rows = self
            .select(
                "menu_items",
                &[("select", "*".into()), ("order", "name.asc".into())],
            )
            .await?;
        rows_to(rows, "menu_items")
    }

    pub async fn insert_menu_item(&self, item: &MenuItem) -> Result<MenuItem, String> {
        let body = serde_json::to_value(item).map_err(|e| format!("serialize menu item: {e}"))?;
        let rows = self.insert("menu_items", &body).await?;
        first_row(rows, "menu_items")?.ok_or("insert menu_items returned no row".to_string())
    }

    pub async fn update_menu_item(&self, id: &str, patch: &Value) -> Result<(), String> {
        self.update("menu_items", &[("id", format!("eq.{id}"))], patch)
            .await?;
        Ok(())
    }

    pub async fn delete_menu_item(&self, id: &str) -> Result<(), String> {
        self.delete("menu_items", &[("id", format!("eq.{id}"))])
            .await
    }

    pub async fn fetch_menu_categories(&self) -> Result<Vec<MenuCategory>, String> {
        let rows = self
            .select(
                "menu_categories",
                &[("select", "*".into()), ("order", "sort_order.asc".into())],
            )
            .await?;
        rows_to(rows, "menu_categories")
    }

    pub async fn insert_menu_category(&self, category: &MenuCategory) -> Result<MenuCategory, String> {
        let body =
            serde_json::to_value(category).map_err(|e| format!("serialize category: {e}"))?;
        let rows = self.insert("menu_categories", &body).await?;
        first_row(rows, "menu_categories")?
            .ok_or("insert menu_categories returned no row".to_string())
    }

    pub async fn update_menu_category(&self, id: &str, patch: &Value) -> Result<(), String> {
        self.update("menu_categories", &[("id", format!("eq.{id}"))], patch)
            .await?;
        Ok(())
    }

    pub async fn delete_menu_category(&self, id: &str) -> Result<(), String> {
        self.delete("menu_categories", &[("id", format!("eq.{id}"))])
            .await
    }

    // -- Order sources ----------------------------------------------------

    pub async fn fetch_order_sources(&self) -> Result<Vec<OrderSource>, String> {
        let rows = self
            .select(
                "order_sources",
                &[("select", "*".into()), ("order", "sort_order.asc".into())],
            )
            .await?;
        rows_to(rows, "order_sources")
    }

    pub async fn fetch_order_source(&self, id: &str) -> Result<Option<OrderSource>, String> {
        let rows = self
            .select(
                "order_sources",
                &[
                    ("select", "*".into()),
                    ("id", format!("eq.{id}")),
                    ("limit", "1".into()),
                ],
            )
            .await?;
        first_row(rows, "order_sources")
    }

    pub async fn insert_order_source(&self, source: &OrderSource) -> Result<OrderSource, String> {
        let body = serde_json::to_value(source).map_err(|e| format!("serialize source: {e}"))?;
        let rows = self.insert("order_sources", &body).await?;
        first_row(rows, "order_sources")?.ok_or("insert order_sources returned no row".to_string())
    }

    pub async fn update_order_source(&self, id: &str, patch: &Value) -> Result<(), String> {
        self.update("order_sources", &[("id", format!("eq.{id}"))], patch)
            .await?;
        Ok(())
    }

    pub async fn delete_order_source(&self, id: &str) -> Result<(), String> {
        self.delete("order_sources", &[("id", format!("eq.{id}"))])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;

    #[test]
    fn test_rows_decode_into_orders() {
        let payload = serde_json::json!([{
            "id": "o-1",
            "table_number": 4,
            "subtotal": 9.09,
            "tax": 0.91,
            "total": 10.0,
            "status": "pending",
            "created_at": "2026-02-21T10:00:00Z"
        }]);
        let orders: Vec<Order> = rows_to(payload, "orders").expect("decode");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Pending);
        assert_eq!(orders[0].table_number, Some(4));
        assert!(orders[0].order_source_id.is_none());
        assert!(!orders[0].paid);
    }

    #[test]
    fn test_first_row_on_empty_result() {
        let none: Option<Order> = first_row(serde_json::json!([]), "orders").expect("decode");
        assert!(none.is_none());
    }
}

//! Order-source channel administration for Tableside POS.
//!
//! An order source is a non-table channel — a delivery platform or the
//! takeaway counter. Orders reference a source instead of a table, which is
//! what routes them into the dual kitchen + cash auto-print path.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::backend::Backend;
use crate::models::OrderSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderSource {
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i64>,
}

pub async fn list(backend: &Backend) -> Result<Vec<OrderSource>, String> {
    backend.fetch_order_sources().await
}

pub async fn create(backend: &Backend, input: NewOrderSource) -> Result<OrderSource, String> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err("Missing order source name".into());
    }
    let source = OrderSource {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        icon: input.icon.unwrap_or_default(),
        active: true,
        sort_order: input.sort_order.unwrap_or(0),
    };
    let stored = backend.insert_order_source(&source).await?;
    info!(source_id = %stored.id, name = %stored.name, "Order source created");
    Ok(stored)
}

pub async fn update(backend: &Backend, id: &str, patch: &Value) -> Result<(), String> {
    backend.update_order_source(id, patch).await
}

pub async fn remove(backend: &Backend, id: &str) -> Result<(), String> {
    backend.delete_order_source(id).await?;
    info!(source_id = %id, "Order source deleted");
    Ok(())
}

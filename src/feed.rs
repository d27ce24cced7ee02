//! Backing-store change feed for Tableside POS.
//!
//! The hosted store is the source of truth; this module turns its row
//! changes into an ordered stream of [`ChangeEvent`]s fanned out on a
//! broadcast channel. Consumers (the order-store projector, the auto-print
//! gate, the notification relay) each hold their own receiver and stay
//! decoupled from how the events are produced.
//!
//! The production producer is a polling task over an `updated_at` cursor
//! persisted in `local_settings`, so a restart does not replay history.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::db::{self, DbState};
use crate::storage;

const FEED_CHANNEL_CAPACITY: usize = 256;
const CURSOR_CATEGORY: &str = "feed";
const ORDERS_CURSOR_KEY: &str = "orders_cursor";
const ITEMS_CURSOR_KEY: &str = "order_items_cursor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Orders,
    OrderItems,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
}

/// One row change in the backing store.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub id: String,
    pub at: String,
}

/// Fan-out handle shared by the producer and all consumers.
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. A send with no live receivers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }
}

/// A row whose `created_at` is past the cursor was inserted within this
/// polling window; anything else is an update to a previously seen row.
/// RFC 3339 timestamps in UTC compare correctly as strings.
fn classify(created_at: &str, cursor: &str) -> ChangeKind {
    if created_at > cursor {
        ChangeKind::Inserted
    } else {
        ChangeKind::Updated
    }
}

fn read_cursor(db: &DbState, key: &str) -> Option<String> {
    let conn = db.conn.lock().ok()?;
    db::get_setting(&conn, CURSOR_CATEGORY, key)
}

fn write_cursor(db: &DbState, key: &str, value: &str) {
    if let Ok(conn) = db.conn.lock() {
        if let Err(e) = db::set_setting(&conn, CURSOR_CATEGORY, key, value) {
            warn!("feed cursor write failed: {e}");
        }
    }
}

/// One polling pass: publish events for rows changed since the cursors and
/// advance them. Returns the number of events published.
async fn poll_once(backend: &Backend, db: &DbState, feed: &ChangeFeed) -> Result<usize, String> {
    let now = chrono::Utc::now().to_rfc3339();

    // First run: start the window at "now" instead of replaying history.
    let orders_cursor = match read_cursor(db, ORDERS_CURSOR_KEY) {
        Some(cursor) => cursor,
        None => {
            write_cursor(db, ORDERS_CURSOR_KEY, &now);
            write_cursor(db, ITEMS_CURSOR_KEY, &now);
            info!("Change feed initialized, cursor set to {now}");
            return Ok(0);
        }
    };
    let items_cursor = read_cursor(db, ITEMS_CURSOR_KEY).unwrap_or_else(|| orders_cursor.clone());

    let mut published = 0;

    let changed = backend.fetch_orders_changed_since(&orders_cursor).await?;
    let mut max_orders_cursor = orders_cursor.clone();
    for order in &changed {
        feed.publish(ChangeEvent {
            collection: Collection::Orders,
            kind: classify(&order.created_at, &orders_cursor),
            id: order.id.clone(),
            at: order.updated_at.clone(),
        });
        if order.updated_at > max_orders_cursor {
            max_orders_cursor = order.updated_at.clone();
        }
        published += 1;
    }

    // Item rows are insert-only snapshots; their creation accompanies an
    // order insert or an add-items mutation.
    let rows = backend
        .select(
            "order_items",
            &[
                ("select", "*".into()),
                ("created_at", format!("gt.{items_cursor}")),
                ("order", "created_at.asc".into()),
            ],
        )
        .await?;
    let items: Vec<crate::models::OrderItem> =
        serde_json::from_value(rows).map_err(|e| format!("order_items decode error: {e}"))?;
    let mut max_items_cursor = items_cursor.clone();
    for item in &items {
        feed.publish(ChangeEvent {
            collection: Collection::OrderItems,
            kind: ChangeKind::Inserted,
            id: item.id.clone(),
            at: item.created_at.clone(),
        });
        if item.created_at > max_items_cursor {
            max_items_cursor = item.created_at.clone();
        }
        published += 1;
    }

    if max_orders_cursor != orders_cursor {
        write_cursor(db, ORDERS_CURSOR_KEY, &max_orders_cursor);
    }
    if max_items_cursor != items_cursor {
        write_cursor(db, ITEMS_CURSOR_KEY, &max_items_cursor);
    }

    Ok(published)
}

/// Start the change-feed polling loop. Runs every `interval_secs` seconds
/// until the token is cancelled.
pub fn start_change_feed(
    db: Arc<DbState>,
    feed: Arc<ChangeFeed>,
    interval_secs: u64,
    shutdown: CancellationToken,
) {
    tauri::async_runtime::spawn(async move {
        info!("Change feed poller started (interval: {interval_secs}s)");
        let backend = match Backend::new() {
            Ok(b) => b,
            Err(e) => {
                warn!("Change feed poller could not build HTTP client: {e}");
                return;
            }
        };
        let mut previous_online: Option<bool> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Change feed poller stopped");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {}
            }

            if !storage::is_configured() {
                continue;
            }

            match poll_once(&backend, &db, &feed).await {
                Ok(published) => {
                    if previous_online == Some(false) {
                        info!("Backing store reachable again; feed resumed");
                    }
                    previous_online = Some(true);
                    if published > 0 {
                        info!(events = published, "Change feed published events");
                    }
                }
                Err(e) => {
                    if previous_online != Some(false) {
                        warn!("Change feed poll failed: {e}");
                    }
                    previous_online = Some(false);
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

    #[test]
    fn test_classify_insert_vs_update() {
        let cursor = "2026-02-21T10:00:00+00:00";
        assert_eq!(
            classify("2026-02-21T10:00:01+00:00", cursor),
            ChangeKind::Inserted
        );
        assert_eq!(
            classify("2026-02-21T09:59:59+00:00", cursor),
            ChangeKind::Updated
        );
        // Created exactly at the cursor means it was seen before.
        assert_eq!(classify(cursor, cursor), ChangeKind::Updated);
    }

    #[tokio::test]
    async fn test_feed_fan_out_to_multiple_subscribers() {
        let feed = ChangeFeed::new();
        let mut rx1 = feed.subscribe();
        let mut rx2 = feed.subscribe();

        feed.publish(ChangeEvent {
            collection: Collection::Orders,
            kind: ChangeKind::Inserted,
            id: "o-1".into(),
            at: "2026-02-21T10:00:00Z".into(),
        });

        let e1 = rx1.recv().await.expect("rx1 event");
        let e2 = rx2.recv().await.expect("rx2 event");
        assert_eq!(e1.id, "o-1");
        assert_eq!(e2.id, "o-1");
        assert_eq!(e1.kind, ChangeKind::Inserted);
        assert_eq!(e1.collection, Collection::Orders);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let feed = ChangeFeed::new();
        feed.publish(ChangeEvent {
            collection: Collection::OrderItems,
            kind: ChangeKind::Inserted,
            id: "it-1".into(),
            at: String::new(),
        });
    }
}

//! In-app order notifications for Tableside POS.
//!
//! The relay observes the same change feed as the order store, entirely
//! decoupled from printing. Inserts raise a toast with a two-tone chime;
//! updates raise one only when the status transitions into `pending`
//! (items added to an existing order re-notify the kitchen). Everything is
//! suppressed during a warm-up window after start so the initial bulk load
//! of pre-existing orders stays silent.
//!
//! A second, independent surface keeps a bounded, auto-expiring list of
//! recent status changes for the notification panel — no audio attached.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tauri::Emitter;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::feed::{ChangeFeed, ChangeKind, Collection};
use crate::models::{Order, OrderStatus};

/// No alerts for this long after mount — covers the initial bulk load.
const WARMUP_MS: u64 = 10_000;

/// Panel log bounds.
const LOG_CAPACITY: usize = 50;
const LOG_TTL_MS: i64 = 30_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub order_id: String,
    pub kind: String,
    pub message: String,
    /// Two-tone chime for audible alerts; `None` keeps the toast silent.
    pub chime: Option<[u32; 2]>,
    pub timestamp: String,
}

/// Audible two-tone chime frequencies (Hz), low note then high.
const CHIME_TONES: [u32; 2] = [880, 1320];

// ---------------------------------------------------------------------------
// Relay core (decision logic, clock injected for tests)
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RelayCore {
    last_status: HashMap<String, OrderStatus>,
}

pub struct Observation {
    pub alert: Option<Alert>,
    pub panel: Option<Alert>,
}

impl RelayCore {
    pub fn new() -> Self {
        Self::default()
    }

    fn describe(order: &Order) -> String {
        match order.table_number {
            Some(table) => format!("table {table}"),
            None => "takeaway/delivery".to_string(),
        }
    }

    /// Decide what one feed event produces. `elapsed` is time since relay
    /// start; inside the warm-up window the status map still updates so
    /// later transitions compare against correct baselines.
    pub fn observe(&mut self, kind: ChangeKind, order: &Order, elapsed: Duration) -> Observation {
        let previous = self.last_status.insert(order.id.clone(), order.status);

        if elapsed < Duration::from_millis(WARMUP_MS) {
            return Observation {
                alert: None,
                panel: None,
            };
        }

        let timestamp = Utc::now().to_rfc3339();
        match kind {
            ChangeKind::Inserted => {
                let alert = Alert {
                    order_id: order.id.clone(),
                    kind: "new_order".into(),
                    message: format!("New order #{} ({})", order.short_id(), Self::describe(order)),
                    chime: Some(CHIME_TONES),
                    timestamp: timestamp.clone(),
                };
                Observation {
                    panel: Some(Alert {
                        chime: None,
                        ..alert.clone()
                    }),
                    alert: Some(alert),
                }
            }
            ChangeKind::Updated => {
                let status_changed = previous != Some(order.status);
                // Chime only when the status lands back on `pending` —
                // items were added to an existing order. An unknown
                // previous status counts as a transition so a missed
                // insert still alerts.
                let into_pending = order.status == OrderStatus::Pending && status_changed;
                let alert = into_pending.then(|| Alert {
                    order_id: order.id.clone(),
                    kind: "items_added".into(),
                    message: format!(
                        "Order #{} updated ({})",
                        order.short_id(),
                        Self::describe(order)
                    ),
                    chime: Some(CHIME_TONES),
                    timestamp: timestamp.clone(),
                });
                let panel = status_changed.then(|| Alert {
                    order_id: order.id.clone(),
                    kind: "status_change".into(),
                    message: format!(
                        "Order #{} is now {}",
                        order.short_id(),
                        order.status.as_str()
                    ),
                    chime: None,
                    timestamp,
                });
                Observation { alert, panel }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Bounded, auto-expiring panel log
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LogEntry {
    alert: Alert,
    recorded_at_ms: i64,
}

/// Managed state: the notification panel's backing list. At most
/// [`LOG_CAPACITY`] entries, each expiring [`LOG_TTL_MS`] after insertion;
/// pruning happens on both push and read.
#[derive(Default)]
pub struct NotificationLog {
    entries: Mutex<VecDeque<LogEntry>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(entries: &mut VecDeque<LogEntry>, now_ms: i64) {
        entries.retain(|entry| now_ms - entry.recorded_at_ms < LOG_TTL_MS);
        while entries.len() > LOG_CAPACITY {
            entries.pop_front();
        }
    }

    fn push_at(&self, alert: Alert, now_ms: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push_back(LogEntry {
                alert,
                recorded_at_ms: now_ms,
            });
            Self::prune(&mut entries, now_ms);
        }
    }

    fn recent_at(&self, now_ms: i64) -> Vec<Alert> {
        match self.entries.lock() {
            Ok(mut entries) => {
                Self::prune(&mut entries, now_ms);
                entries.iter().rev().map(|e| e.alert.clone()).collect()
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn push(&self, alert: Alert) {
        self.push_at(alert, Utc::now().timestamp_millis());
    }

    /// Unexpired entries, newest first.
    pub fn recent(&self) -> Vec<Alert> {
        self.recent_at(Utc::now().timestamp_millis())
    }
}

// ---------------------------------------------------------------------------
// Relay task
// ---------------------------------------------------------------------------

/// Start the notification relay: follow the feed, emit `order_alert` events
/// to the webview, and record panel entries.
pub fn start_notification_relay(
    app: tauri::AppHandle,
    feed: Arc<ChangeFeed>,
    log: Arc<NotificationLog>,
) {
    let mut events = feed.subscribe();
    tauri::async_runtime::spawn(async move {
        let backend = match Backend::new() {
            Ok(b) => b,
            Err(e) => {
                warn!("Notification relay could not build HTTP client: {e}");
                return;
            }
        };
        let started = Instant::now();
        let mut core = RelayCore::new();

        loop {
            match events.recv().await {
                Ok(event) => {
                    if event.collection != Collection::Orders {
                        continue;
                    }
                    let order = match backend.fetch_order(&event.id).await {
                        Ok(Some(order)) => order,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(order_id = %event.id, "Relay order fetch failed: {e}");
                            continue;
                        }
                    };

                    let observation = core.observe(event.kind, &order, started.elapsed());
                    if let Some(panel) = observation.panel {
                        log.push(panel);
                    }
                    if let Some(alert) = observation.alert {
                        let _ = app.emit("order_alert", &alert);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification relay lagged behind the feed");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    info!("Notification relay feed closed");
                    break;
                }
            }
        }
    });

    info!(warmup_ms = WARMUP_MS, "Notification relay started");
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, status: OrderStatus) -> Order {
        Order {
            id: id.into(),
            table_number: Some(5),
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

    fn after_warmup() -> Duration {
        Duration::from_millis(WARMUP_MS + 1)
    }

    fn alert(order_id: &str, kind: &str) -> Alert {
        Alert {
            order_id: order_id.into(),
            kind: kind.into(),
            message: "test".into(),
            chime: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_insert_alert_has_chime() {
        let mut core = RelayCore::new();
        let obs = core.observe(
            ChangeKind::Inserted,
            &order("o-1", OrderStatus::Pending),
            after_warmup(),
        );
        let alert = obs.alert.expect("insert alert");
        assert_eq!(alert.kind, "new_order");
        assert_eq!(alert.chime, Some(CHIME_TONES));
        assert!(alert.message.contains("table 5"));
        // Panel entry exists but carries no chime.
        assert!(obs.panel.expect("panel entry").chime.is_none());
    }

    #[test]
    fn test_warmup_suppresses_everything_but_tracks_status() {
        let mut core = RelayCore::new();
        let obs = core.observe(
            ChangeKind::Inserted,
            &order("o-1", OrderStatus::Ready),
            Duration::from_millis(10),
        );
        assert!(obs.alert.is_none());
        assert!(obs.panel.is_none());

        // After warm-up, a move back to pending is a tracked transition.
        let obs = core.observe(
            ChangeKind::Updated,
            &order("o-1", OrderStatus::Pending),
            after_warmup(),
        );
        assert_eq!(obs.alert.expect("items-added alert").kind, "items_added");
    }

    #[test]
    fn test_update_alerts_only_on_transition_into_pending() {
        let mut core = RelayCore::new();
        core.observe(
            ChangeKind::Inserted,
            &order("o-1", OrderStatus::Pending),
            after_warmup(),
        );

        // pending → preparing: panel entry, no chime alert.
        let obs = core.observe(
            ChangeKind::Updated,
            &order("o-1", OrderStatus::Preparing),
            after_warmup(),
        );
        assert!(obs.alert.is_none());
        assert_eq!(obs.panel.expect("panel").kind, "status_change");

        // preparing → pending (items added): chime alert.
        let obs = core.observe(
            ChangeKind::Updated,
            &order("o-1", OrderStatus::Pending),
            after_warmup(),
        );
        assert_eq!(obs.alert.expect("alert").kind, "items_added");

        // pending → pending (no transition): silence.
        let obs = core.observe(
            ChangeKind::Updated,
            &order("o-1", OrderStatus::Pending),
            after_warmup(),
        );
        assert!(obs.alert.is_none());
        assert!(obs.panel.is_none());
    }

    #[test]
    fn test_log_expires_entries_after_ttl() {
        let log = NotificationLog::new();
        log.push_at(alert("o-1", "status_change"), 1_000);
        log.push_at(alert("o-2", "status_change"), 20_000);

        // At t=32s the first entry (age 31s) is gone, the second remains.
        let recent = log.recent_at(32_000);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].order_id, "o-2");

        // At t=51s everything has expired.
        assert!(log.recent_at(51_000).is_empty());
    }

    #[test]
    fn test_log_caps_at_capacity_dropping_oldest() {
        let log = NotificationLog::new();
        for i in 0..60 {
            log.push_at(alert(&format!("o-{i}"), "status_change"), 10_000);
        }
        let recent = log.recent_at(10_001);
        assert_eq!(recent.len(), LOG_CAPACITY);
        // Newest first; the oldest ten were dropped.
        assert_eq!(recent[0].order_id, "o-59");
        assert_eq!(recent.last().unwrap().order_id, "o-10");
    }
}

//! Printer dispatch for Tableside POS.
//!
//! Owns the single print-service connection for the whole process: a state
//! machine (`idle → connecting → connected`, `connecting → error`) guarded
//! so concurrent connect attempts collapse into one in-flight dial. The
//! transport behind it is a capability trait, so tests substitute a
//! recording transport while production resolves printer names to network
//! endpoints (raw ESC/POS over TCP, port 9100 convention) registered in the
//! local database.
//!
//! Dispatch never raises past its boundary: `print_order` returns a
//! [`PrintOutcome`] with independent per-document success flags and an
//! aggregated list of human-readable error strings.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tauri::Emitter;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{self, DbState};
use crate::escpos::PaperWidth;
use crate::models::{Order, OrderItem, OrderStatus, RestaurantSettings};
use crate::receipt;

const PRINT_TIMEOUT_SECS: u64 = 5;
const PROBE_TIMEOUT_MS: u64 = 500;
const LOGO_FETCH_TIMEOUT_SECS: u64 = 8;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PrintError {
    #[error("No printer endpoints are registered on this terminal")]
    Unconfigured,

    #[error("Print service connection is not active")]
    NotConnected,

    #[error("No printer registered under the name \"{0}\"")]
    UnknownPrinter(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Printer endpoint registry (local SQLite)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterEndpoint {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl PrinterEndpoint {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn list_endpoints(db: &DbState) -> Result<Vec<PrinterEndpoint>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare("SELECT id, name, host, port FROM printer_endpoints ORDER BY name ASC")
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PrinterEndpoint {
                id: row.get(0)?,
                name: row.get(1)?,
                host: row.get(2)?,
                port: row.get::<_, i64>(3)? as u16,
            })
        })
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

pub fn get_endpoint(db: &DbState, name: &str) -> Result<Option<PrinterEndpoint>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let endpoint = conn
        .query_row(
            "SELECT id, name, host, port FROM printer_endpoints WHERE name = ?1",
            params![name],
            |row| {
                Ok(PrinterEndpoint {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    host: row.get(2)?,
                    port: row.get::<_, i64>(3)? as u16,
                })
            },
        )
        .ok();
    Ok(endpoint)
}

/// Register or update a printer endpoint by name.
pub fn upsert_endpoint(
    db: &DbState,
    name: &str,
    host: &str,
    port: u16,
) -> Result<PrinterEndpoint, String> {
    let name = name.trim();
    let host = host.trim();
    if name.is_empty() {
        return Err("Missing printer name".into());
    }
    if host.is_empty() {
        return Err("Missing printer host".into());
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let now = Utc::now().to_rfc3339();
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO printer_endpoints (id, name, host, port, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(name) DO UPDATE SET
            host = excluded.host,
            port = excluded.port,
            updated_at = excluded.updated_at",
        params![id, name, host, port as i64, now],
    )
    .map_err(|e| format!("upsert printer endpoint: {e}"))?;

    let stored = conn
        .query_row(
            "SELECT id, name, host, port FROM printer_endpoints WHERE name = ?1",
            params![name],
            |row| {
                Ok(PrinterEndpoint {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    host: row.get(2)?,
                    port: row.get::<_, i64>(3)? as u16,
                })
            },
        )
        .map_err(|e| format!("read back printer endpoint: {e}"))?;

    info!(printer = %stored.name, addr = %stored.addr(), "Printer endpoint registered");
    Ok(stored)
}

pub fn remove_endpoint(db: &DbState, name: &str) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let affected = conn
        .execute(
            "DELETE FROM printer_endpoints WHERE name = ?1",
            params![name],
        )
        .map_err(|e| format!("remove printer endpoint: {e}"))?;
    if affected == 0 {
        return Err(format!("No printer registered under the name \"{name}\""));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Transport capability
// ---------------------------------------------------------------------------

/// The narrow interface the dispatcher needs from whatever actually moves
/// bytes to paper. Production uses [`TcpTransport`]; tests substitute a
/// recording implementation.
#[async_trait]
pub trait PrintTransport: Send + Sync {
    /// Establish (or verify) the link to the printing environment.
    async fn connect(&self) -> Result<(), PrintError>;

    /// Names this transport can currently resolve.
    async fn list_printers(&self) -> Vec<String>;

    /// Deliver a raw ESC/POS payload to the named printer.
    async fn print(&self, printer: &str, payload: &[u8]) -> Result<(), PrintError>;

    /// Cheap reachability probe for one printer.
    async fn probe(&self, printer: &str) -> bool;
}

/// Raw TCP transport: each registered printer is an ESC/POS device listening
/// on `host:port` (9100 by default).
pub struct TcpTransport {
    db: Arc<DbState>,
}

impl TcpTransport {
    pub fn new(db: Arc<DbState>) -> Self {
        Self { db }
    }

    fn resolve(&self, printer: &str) -> Result<PrinterEndpoint, PrintError> {
        get_endpoint(&self.db, printer)
            .map_err(PrintError::Connection)?
            .ok_or_else(|| PrintError::UnknownPrinter(printer.to_string()))
    }

    async fn probe_addr(addr: &str) -> bool {
        matches!(
            tokio::time::timeout(
                Duration::from_millis(PROBE_TIMEOUT_MS),
                TcpStream::connect(addr),
            )
            .await,
            Ok(Ok(_))
        )
    }
}

#[async_trait]
impl PrintTransport for TcpTransport {
    async fn connect(&self) -> Result<(), PrintError> {
        let endpoints = list_endpoints(&self.db).map_err(PrintError::Connection)?;
        if endpoints.is_empty() {
            return Err(PrintError::Unconfigured);
        }
        for endpoint in &endpoints {
            if Self::probe_addr(&endpoint.addr()).await {
                info!(printer = %endpoint.name, addr = %endpoint.addr(), "Printer reachable");
            } else {
                warn!(printer = %endpoint.name, addr = %endpoint.addr(), "Printer not reachable");
            }
        }
        Ok(())
    }

    async fn list_printers(&self) -> Vec<String> {
        list_endpoints(&self.db)
            .map(|endpoints| endpoints.into_iter().map(|e| e.name).collect())
            .unwrap_or_default()
    }

    async fn print(&self, printer: &str, payload: &[u8]) -> Result<(), PrintError> {
        let endpoint = self.resolve(printer)?;
        let addr = endpoint.addr();

        let stream = tokio::time::timeout(
            Duration::from_secs(PRINT_TIMEOUT_SECS),
            TcpStream::connect(&addr),
        )
        .await
        .map_err(|_| PrintError::Timeout(format!("connection timeout: {addr}")))?
        .map_err(|e| PrintError::Connection(format!("{addr}: {e}")))?;

        let mut stream = stream;
        stream.write_all(payload).await?;
        stream.flush().await?;

        info!(printer = %printer, bytes = payload.len(), "Sent raw payload to printer");
        Ok(())
    }

    async fn probe(&self, printer: &str) -> bool {
        match self.resolve(printer) {
            Ok(endpoint) => Self::probe_addr(&endpoint.addr()).await,
            Err(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Connection state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Error { message: String },
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error { .. } => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Print outcome
// ---------------------------------------------------------------------------

/// Result of one dispatch pass. `None` means the document was not requested;
/// an empty error list means full success.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintOutcome {
    pub kitchen: Option<bool>,
    pub cash: Option<bool>,
    pub errors: Vec<String>,
}

impl PrintOutcome {
    fn skipped() -> Self {
        Self {
            kitchen: None,
            cash: None,
            errors: Vec::new(),
        }
    }

    /// True when at least one document was requested and every requested
    /// document printed.
    pub fn requested_succeeded(&self) -> bool {
        let any_requested = self.kitchen.is_some() || self.cash.is_some();
        any_requested && self.kitchen != Some(false) && self.cash != Some(false)
    }
}

// ---------------------------------------------------------------------------
// Print service
// ---------------------------------------------------------------------------

/// The process-wide print-service handle: one per application lifetime,
/// shared by every page and background worker.
pub struct PrintService {
    transport: Arc<dyn PrintTransport>,
    state: RwLock<ConnectionState>,
    /// Serializes dials so concurrent connect attempts collapse into one.
    dial_lock: tokio::sync::Mutex<()>,
}

impl PrintService {
    pub fn new(transport: Arc<dyn PrintTransport>) -> Self {
        Self {
            transport,
            state: RwLock::new(ConnectionState::Idle),
            dial_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|guard| guard.clone())
            .unwrap_or(ConnectionState::Idle)
    }

    fn set_state(&self, next: ConnectionState) {
        if let Ok(mut guard) = self.state.write() {
            *guard = next;
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state(), ConnectionState::Connected)
    }

    /// Idempotent connect: an already-active connection is left alone, and a
    /// caller arriving while another dial is in flight waits for it instead
    /// of dialing again.
    pub async fn ensure_connected(&self) -> Result<(), String> {
        let _guard = self.dial_lock.lock().await;
        if self.is_active() {
            return Ok(());
        }
        self.dial(false).await
    }

    /// Force a fresh dial, refreshing an existing connection. Still
    /// serialized behind the dial lock.
    pub async fn reconnect(&self) -> Result<(), String> {
        let _guard = self.dial_lock.lock().await;
        self.dial(true).await
    }

    async fn dial(&self, refresh: bool) -> Result<(), String> {
        self.set_state(ConnectionState::Connecting);
        match self.transport.connect().await {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                info!(refresh, "Print service connected");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.set_state(ConnectionState::Error {
                    message: message.clone(),
                });
                warn!("Print service connect failed: {message}");
                Err(message)
            }
        }
    }

    pub async fn list_printers(&self) -> Vec<String> {
        self.transport.list_printers().await
    }

    /// Dispatch the documents for one order. The kitchen document prints
    /// when `print_kitchen` is set; the cash document prints unless
    /// `skip_cash` is set. Each attempt is independent — a kitchen failure
    /// never prevents the cash attempt.
    pub async fn print_order(
        &self,
        order: &Order,
        items: &[OrderItem],
        settings: &RestaurantSettings,
        source_name: Option<&str>,
        print_kitchen: bool,
        skip_cash: bool,
    ) -> PrintOutcome {
        let mut outcome = PrintOutcome::skipped();

        if !print_kitchen && skip_cash {
            return outcome;
        }

        if !self.is_active() {
            let message = PrintError::NotConnected.to_string();
            if print_kitchen {
                outcome.kitchen = Some(false);
                outcome.errors.push(format!("kitchen: {message}"));
            }
            if !skip_cash {
                outcome.cash = Some(false);
                outcome.errors.push(format!("cash: {message}"));
            }
            return outcome;
        }

        if print_kitchen {
            let rendered = receipt::render_kitchen_ticket(order, items, settings, source_name);
            outcome.kitchen = Some(
                self.dispatch_document(
                    "kitchen",
                    settings.kitchen_printer.as_deref(),
                    &rendered.bytes,
                    &mut outcome.errors,
                )
                .await,
            );
        }

        if !skip_cash {
            let logo_raster = load_logo_raster(settings).await;
            let rendered = receipt::render_cash_receipt(
                order,
                items,
                settings,
                source_name,
                logo_raster.as_deref(),
            );
            for warning in &rendered.warnings {
                warn!(code = %warning.code, order_id = %order.id, "{}", warning.message);
            }
            outcome.cash = Some(
                self.dispatch_document(
                    "cash",
                    settings.cash_printer.as_deref(),
                    &rendered.bytes,
                    &mut outcome.errors,
                )
                .await,
            );
        }

        outcome
    }

    async fn dispatch_document(
        &self,
        document: &str,
        printer: Option<&str>,
        payload: &[u8],
        errors: &mut Vec<String>,
    ) -> bool {
        let Some(printer) = printer.map(str::trim).filter(|name| !name.is_empty()) else {
            errors.push(format!("{document}: no printer configured in settings"));
            return false;
        };
        match self.transport.print(printer, payload).await {
            Ok(()) => true,
            Err(e) => {
                errors.push(format!("{document}: {e}"));
                false
            }
        }
    }

    /// Validate a printer end-to-end with a fixed synthetic order pushed
    /// through the production formatting + dispatch path.
    pub async fn print_test(
        &self,
        printer: &str,
        settings: &RestaurantSettings,
    ) -> Result<(), String> {
        self.ensure_connected().await?;

        let (order, items) = test_order();
        let mut probe_settings = settings.clone();
        probe_settings.logo_url = None;

        let rendered = receipt::render_cash_receipt(&order, &items, &probe_settings, None, None);
        self.transport
            .print(printer, &rendered.bytes)
            .await
            .map_err(|e| e.to_string())
    }
}

/// The synthetic order used by the printer test path. Fixed values so the
/// printed sheet is recognizable as a diagnostic.
fn test_order() -> (Order, Vec<OrderItem>) {
    let order = Order {
        id: "testprnt-0000-0000-0000-000000000000".into(),
        table_number: None,
        order_source_id: None,
        customer_name: Some("Printer Test".into()),
        subtotal: 9.09,
        tax: 0.91,
        total: 10.0,
        status: OrderStatus::Pending,
        paid: false,
        payment_method: None,
        printed_at: None,
        created_at: "2026-01-01T12:00:00+00:00".into(),
        updated_at: "2026-01-01T12:00:00+00:00".into(),
    };
    let items = vec![OrderItem {
        id: "testitem-0000-0000-0000-000000000000".into(),
        order_id: order.id.clone(),
        menu_item_id: None,
        name: "Test Item".into(),
        price: 5.0,
        quantity: 2,
        notes: None,
        created_at: String::new(),
    }];
    (order, items)
}

// ---------------------------------------------------------------------------
// Logo loading
// ---------------------------------------------------------------------------

fn parse_data_url_image(source: &str) -> Option<Vec<u8>> {
    let trimmed = source.trim();
    if !trimmed.starts_with("data:image/") {
        return None;
    }
    let (_, payload) = trimmed.split_once(',')?;
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .ok()
}

/// Fetch and rasterize the configured logo, if any. All failures degrade to
/// `None` — the receipt renders without the logo and carries a warning.
async fn load_logo_raster(settings: &RestaurantSettings) -> Option<Vec<u8>> {
    let source = settings
        .logo_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())?;

    let bytes = if let Some(decoded) = parse_data_url_image(source) {
        decoded
    } else if source.starts_with("http://") || source.starts_with("https://") {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LOGO_FETCH_TIMEOUT_SECS))
            .build()
            .ok()?;
        let response = client.get(source).send().await.ok()?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "Logo fetch failed");
            return None;
        }
        response.bytes().await.ok()?.to_vec()
    } else {
        warn!("Unsupported logo source; expected data: or http(s) URL");
        return None;
    };

    match receipt::build_logo_raster(&bytes, PaperWidth::Mm80) {
        Ok(raster) => Some(raster),
        Err(e) => {
            warn!("Logo rasterization failed: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Background printer status monitor
// ---------------------------------------------------------------------------

async fn collect_status_map(
    db: &DbState,
    service: &PrintService,
) -> Result<serde_json::Map<String, serde_json::Value>, String> {
    let endpoints = list_endpoints(db)?;
    let mut status_map = serde_json::Map::new();
    for endpoint in endpoints {
        let online = service.transport.probe(&endpoint.name).await;
        status_map.insert(
            endpoint.name.clone(),
            serde_json::json!({
                "printer": endpoint.name,
                "addr": endpoint.addr(),
                "state": if online { "online" } else { "offline" },
            }),
        );
    }
    Ok(status_map)
}

fn hash_status_map(status_map: &serde_json::Map<String, serde_json::Value>) -> u64 {
    let mut hasher = DefaultHasher::new();
    let serialized = serde_json::to_string(status_map).unwrap_or_default();
    serialized.hash(&mut hasher);
    hasher.finish()
}

/// Probe registered printers every `interval_secs` seconds and emit a
/// `printer_status_changed` event whenever the snapshot differs from the
/// previous one.
pub fn start_printer_status_monitor(
    app: tauri::AppHandle,
    db: Arc<DbState>,
    service: Arc<PrintService>,
    interval_secs: u64,
) {
    let cadence = Duration::from_secs(interval_secs.max(5));
    tauri::async_runtime::spawn(async move {
        let mut last_hash: Option<u64> = None;
        loop {
            match collect_status_map(&db, &service).await {
                Ok(statuses) => {
                    let current_hash = hash_status_map(&statuses);
                    if last_hash != Some(current_hash) {
                        last_hash = Some(current_hash);
                        let _ = app.emit(
                            "printer_status_changed",
                            serde_json::json!({
                                "connection": service.state().label(),
                                "printers": statuses,
                                "updatedAt": Utc::now().to_rfc3339(),
                            }),
                        );
                    }
                }
                Err(error) => {
                    warn!(error = %error, "Printer status monitor iteration failed");
                }
            }

            tokio::time::sleep(cadence).await;
        }
    });

    info!(
        interval_secs = interval_secs.max(5),
        "Printer status monitor started"
    );
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Recording transport: configurable failures, counts dials, captures
    /// every payload.
    pub struct MockTransport {
        pub connect_calls: AtomicUsize,
        pub fail_connect: bool,
        pub failing_printers: Vec<String>,
        pub printed: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                connect_calls: AtomicUsize::new(0),
                fail_connect: false,
                failing_printers: Vec::new(),
                printed: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(printers: &[&str]) -> Self {
            Self {
                failing_printers: printers.iter().map(|p| p.to_string()).collect(),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl PrintTransport for MockTransport {
        async fn connect(&self) -> Result<(), PrintError> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_connect {
                Err(PrintError::Unconfigured)
            } else {
                Ok(())
            }
        }

        async fn list_printers(&self) -> Vec<String> {
            vec!["kitchen".into(), "cash".into()]
        }

        async fn print(&self, printer: &str, payload: &[u8]) -> Result<(), PrintError> {
            if self.failing_printers.iter().any(|p| p == printer) {
                return Err(PrintError::Connection(format!("{printer}: refused")));
            }
            self.printed
                .lock()
                .unwrap()
                .push((printer.to_string(), payload.to_vec()));
            Ok(())
        }

        async fn probe(&self, printer: &str) -> bool {
            !self.failing_printers.iter().any(|p| p == printer)
        }
    }

    fn settings() -> RestaurantSettings {
        RestaurantSettings {
            id: "rs-1".into(),
            name: "Casa Pepe".into(),
            address: String::new(),
            logo_url: None,
            currency: "$".into(),
            tax_rate: 10.0,
            business_hours: None,
            table_count: 8,
            kitchen_printing_enabled: true,
            kitchen_printer: Some("kitchen".into()),
            cash_printer: Some("cash".into()),
            updated_at: String::new(),
        }
    }

    fn order() -> (Order, Vec<OrderItem>) {
        test_order()
    }

    #[tokio::test]
    async fn test_connect_transitions_to_connected() {
        let service = PrintService::new(Arc::new(MockTransport::new()));
        assert_eq!(service.state(), ConnectionState::Idle);
        service.ensure_connected().await.expect("connect");
        assert!(service.is_active());
        assert_eq!(service.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_failure_transitions_to_error() {
        let transport = Arc::new(MockTransport {
            fail_connect: true,
            ..MockTransport::new()
        });
        let service = PrintService::new(transport);
        let err = service.ensure_connected().await.expect_err("should fail");
        assert!(err.contains("No printer endpoints"));
        assert!(matches!(service.state(), ConnectionState::Error { .. }));
        assert!(!service.is_active());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_once_active() {
        let transport = Arc::new(MockTransport::new());
        let service = PrintService::new(transport.clone());
        service.ensure_connected().await.expect("first connect");
        service.ensure_connected().await.expect("second connect");
        assert_eq!(transport.connect_calls.load(Ordering::SeqCst), 1);
        // An explicit reconnect does re-dial.
        service.reconnect().await.expect("reconnect");
        assert_eq!(transport.connect_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_connects_collapse_into_one_dial() {
        let transport = Arc::new(MockTransport::new());
        let service = Arc::new(PrintService::new(transport.clone()));

        let a = {
            let service = service.clone();
            tokio::spawn(async move { service.ensure_connected().await })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move { service.ensure_connected().await })
        };
        a.await.unwrap().expect("task a");
        b.await.unwrap().expect("task b");
        assert_eq!(transport.connect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dine_in_prints_kitchen_only() {
        let transport = Arc::new(MockTransport::new());
        let service = PrintService::new(transport.clone());
        service.ensure_connected().await.unwrap();

        let (o, items) = order();
        let outcome = service
            .print_order(&o, &items, &settings(), None, true, true)
            .await;
        assert_eq!(outcome.kitchen, Some(true));
        assert_eq!(outcome.cash, None);
        assert!(outcome.errors.is_empty());
        assert!(outcome.requested_succeeded());

        let printed = transport.printed.lock().unwrap();
        assert_eq!(printed.len(), 1);
        assert_eq!(printed[0].0, "kitchen");
    }

    #[tokio::test]
    async fn test_kitchen_failure_does_not_block_cash() {
        let transport = Arc::new(MockTransport::failing(&["kitchen"]));
        let service = PrintService::new(transport.clone());
        service.ensure_connected().await.unwrap();

        let (o, items) = order();
        let outcome = service
            .print_order(&o, &items, &settings(), Some("Wolt"), true, false)
            .await;
        assert_eq!(outcome.kitchen, Some(false));
        assert_eq!(outcome.cash, Some(true));
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("kitchen:"));
        assert!(!outcome.requested_succeeded());

        let printed = transport.printed.lock().unwrap();
        assert_eq!(printed.len(), 1);
        assert_eq!(printed[0].0, "cash");
    }

    #[tokio::test]
    async fn test_not_connected_reports_per_document_errors() {
        let service = PrintService::new(Arc::new(MockTransport::new()));
        let (o, items) = order();
        let outcome = service
            .print_order(&o, &items, &settings(), None, true, false)
            .await;
        assert_eq!(outcome.kitchen, Some(false));
        assert_eq!(outcome.cash, Some(false));
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors.iter().all(|e| e.contains("not active")));
    }

    #[tokio::test]
    async fn test_missing_printer_name_is_an_error_string() {
        let service = PrintService::new(Arc::new(MockTransport::new()));
        service.ensure_connected().await.unwrap();

        let mut cfg = settings();
        cfg.kitchen_printer = None;
        let (o, items) = order();
        let outcome = service.print_order(&o, &items, &cfg, None, true, true).await;
        assert_eq!(outcome.kitchen, Some(false));
        assert!(outcome.errors[0].contains("no printer configured"));
    }

    #[tokio::test]
    async fn test_nothing_requested_is_a_silent_noop() {
        let transport = Arc::new(MockTransport::new());
        let service = PrintService::new(transport.clone());
        service.ensure_connected().await.unwrap();

        let (o, items) = order();
        let outcome = service
            .print_order(&o, &items, &settings(), None, false, true)
            .await;
        assert_eq!(outcome.kitchen, None);
        assert_eq!(outcome.cash, None);
        assert!(outcome.errors.is_empty());
        assert!(!outcome.requested_succeeded());
        assert!(transport.printed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_endpoint_registry_round_trip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        db::run_migrations_for_test(&conn);
        let state = DbState {
            conn: Mutex::new(conn),
            db_path: std::path::PathBuf::from(":memory:"),
        };

        upsert_endpoint(&state, "kitchen", "10.0.0.5", 9100).expect("insert");
        upsert_endpoint(&state, "kitchen", "10.0.0.9", 9100).expect("update same name");
        upsert_endpoint(&state, "cash", "10.0.0.6", 9101).expect("second printer");

        let endpoints = list_endpoints(&state).expect("list");
        assert_eq!(endpoints.len(), 2);
        let kitchen = get_endpoint(&state, "kitchen").unwrap().unwrap();
        assert_eq!(kitchen.host, "10.0.0.9");

        remove_endpoint(&state, "cash").expect("remove");
        assert!(get_endpoint(&state, "cash").unwrap().is_none());
        assert!(remove_endpoint(&state, "cash").is_err());
    }
}

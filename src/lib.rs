//! Tableside POS - Tauri v2 Backend
//!
//! Registers the IPC command handlers the webview calls via
//! `@tauri-apps/api/core::invoke()` and wires the background workers:
//! change-feed poller, order-store projector, auto-print gate, notification
//! relay, and printer status monitor. Orders and menu data live in the
//! hosted backing store; the local SQLite database only holds device-local
//! state (settings, printer endpoints, feed cursor).

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod backend;
mod commands;
mod db;
mod escpos;
mod feed;
mod gate;
mod menu;
mod models;
mod notify;
mod orders;
mod receipt;
mod settings;
mod sources;
mod spooler;
mod storage;

use backend::Backend;
use gate::AutoPrintGate;
use notify::NotificationLog;
use orders::OrderStore;
use settings::SettingsState;
use spooler::{PrintService, TcpTransport};

/// Change-feed polling cadence.
const FEED_POLL_SECS: u64 = 3;
/// Printer reachability probe cadence.
const PRINTER_STATUS_SECS: u64 = 15;

fn log_dir() -> PathBuf {
    std::env::var_os("TABLESIDE_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("logs"))
}

// ============================================================================
// App entry point
// ============================================================================

pub fn run() {
    // Initialize structured logging (console + rolling file)
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tableside_pos_lib=debug"));

    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, "pos");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Keep the guard alive for the lifetime of the app — dropping it flushes
    // logs. We leak it intentionally since the app runs until process exit.
    std::mem::forget(_guard);

    info!("Starting Tableside POS v{}", env!("CARGO_PKG_VERSION"));

    let feed_shutdown = CancellationToken::new();
    let feed_shutdown_for_exit = feed_shutdown.clone();

    let app = tauri::Builder::default()
        .setup(move |app| {
            use tauri::Manager;

            let app_data_dir = app
                .path()
                .app_data_dir()
                .expect("Failed to get app data dir");

            // Main DB connection for Tauri commands
            let db_state = db::init(&app_data_dir).expect("Failed to initialize database");
            app.manage(db_state);

            // Shared HTTP client for command handlers
            app.manage(Backend::new().expect("Failed to build backend client"));

            // Restaurant settings snapshot, shared with background workers
            let settings_state = Arc::new(SettingsState::new());
            app.manage(settings_state.clone());

            // Order read model (own backend client; refreshed by the projector)
            let store = Arc::new(OrderStore::new(
                Backend::new().expect("Failed to build store client"),
                settings_state.clone(),
            ));
            app.manage(store.clone());

            // Second DB connection for the print transport + status monitor
            let db_for_print =
                Arc::new(db::init(&app_data_dir).expect("Failed to init print database"));
            let service = Arc::new(PrintService::new(Arc::new(TcpTransport::new(
                db_for_print.clone(),
            ))));
            app.manage(service.clone());

            // Notification panel log
            let log = Arc::new(NotificationLog::new());
            app.manage(log.clone());

            // Change feed: third DB connection for the poller's cursor
            let feed = Arc::new(feed::ChangeFeed::new());
            let db_for_feed =
                Arc::new(db::init(&app_data_dir).expect("Failed to init feed database"));
            feed::start_change_feed(
                db_for_feed.clone(),
                feed.clone(),
                FEED_POLL_SECS,
                feed_shutdown.clone(),
            );

            // Read-model projector (full refetch per feed event)
            orders::start_order_projector(store.clone(), app.handle().clone(), feed.clone());

            // Auto-print gate: startup sweep + live events
            let gate = Arc::new(AutoPrintGate::new(
                Backend::new().expect("Failed to build gate client"),
                service.clone(),
                settings_state.clone(),
            ));
            gate::start_auto_print(gate, app.handle().clone(), feed.clone());

            // Notification relay (toasts + panel log)
            notify::start_notification_relay(app.handle().clone(), feed.clone(), log.clone());

            // Printer reachability monitor
            spooler::start_printer_status_monitor(
                app.handle().clone(),
                db_for_print,
                service.clone(),
                PRINTER_STATUS_SECS,
            );

            // Bootstrap: load settings and bring the print service up once
            // the terminal is configured. Failures are non-fatal — commands
            // and workers retry on their own cadence.
            if storage::is_configured() {
                let boot_backend = Backend::new().expect("Failed to build bootstrap client");
                let boot_settings = settings_state.clone();
                let boot_service = service.clone();
                let boot_db = db_for_feed;
                tauri::async_runtime::spawn(async move {
                    match settings::load(&boot_backend, &boot_db, &boot_settings).await {
                        Ok(_) => info!("Startup settings load complete"),
                        Err(e) => tracing::warn!("Startup settings load failed: {e}"),
                    }
                    if let Err(e) = boot_service.ensure_connected().await {
                        tracing::warn!("Startup printer connect failed: {e}");
                    }
                });
            } else {
                info!("Terminal not configured yet; waiting for onboarding");
            }

            info!("Database, store, feed, gate, relay, and printer monitor registered");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Settings / onboarding
            commands::settings::settings_is_configured,
            commands::settings::settings_update_backend_credentials,
            commands::settings::settings_clear_credentials,
            commands::settings::settings_terminal_label,
            commands::settings::settings_get_local,
            commands::settings::settings_set_local,
            commands::settings::restaurant_get_settings,
            commands::settings::restaurant_reload_settings,
            commands::settings::restaurant_update_settings,
            // Orders
            commands::orders::order_list,
            commands::orders::order_get,
            commands::orders::order_create,
            commands::orders::order_add_items,
            commands::orders::order_update_status,
            commands::orders::order_record_payment,
            commands::orders::order_refresh,
            commands::orders::table_overview,
            commands::orders::table_active_order,
            commands::orders::source_active_orders,
            // Menu
            commands::menu::menu_list_items,
            commands::menu::menu_create_item,
            commands::menu::menu_update_item,
            commands::menu::menu_set_availability,
            commands::menu::menu_delete_item,
            commands::menu::menu_list_categories,
            commands::menu::menu_create_category,
            commands::menu::menu_update_category,
            commands::menu::menu_delete_category,
            commands::menu::source_list,
            commands::menu::source_create,
            commands::menu::source_update,
            commands::menu::source_delete,
            // Printing
            commands::print::printer_list,
            commands::print::printer_register,
            commands::print::printer_remove,
            commands::print::printer_connect,
            commands::print::printer_reconnect,
            commands::print::printer_connection_state,
            commands::print::printer_names,
            commands::print::print_cash_receipt,
            commands::print::print_kitchen_ticket,
            commands::print::printer_test,
            commands::print::notifications_recent,
        ])
        .build(tauri::generate_context!())
        .expect("error while building Tableside POS");

    app.run(move |_app_handle, event| {
        if let tauri::RunEvent::Exit = event {
            feed_shutdown_for_exit.cancel();
            info!("Tableside POS shutting down");
        }
    });
}

//! IPC command handlers, grouped by page surface.

pub mod menu;
pub mod orders;
pub mod print;
pub mod settings;

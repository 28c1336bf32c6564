//! NetWarden daemon library - exposes modules for testing.

pub mod alerts;
pub mod config;
pub mod hardware;
pub mod network;
pub mod orchestrator;
pub mod plugins;
pub mod state_machine;
pub mod triggers;

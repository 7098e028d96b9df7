//! Library crate for popcorn-engine, exposing modules for the binary and integration tests.

/// Engine configuration and its loader.
pub mod config;
/// Statistics persistence.
pub mod dao;
/// Announcement and status payloads.
pub mod dto;
/// Rejections and engine errors.
pub mod error;
/// Engines, timers, messaging and command routing.
pub mod services;
/// Game state and the registry of running games.
pub mod state;

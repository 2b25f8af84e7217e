//! # Respawn Bot
//!
//! Tracks boss respawn timers for a Revolt server. A user starts a
//! countdown with a chat command; the bot warns the channel ahead of the
//! spawn, announces the spawn with a reaction to click once the boss is
//! killed, and restarts the countdown from that click with the cooldown it
//! remembers for that boss. Timers survive restarts.
//!
//! The [`engine::TimerEngine`] owns scheduling; everything chat-specific
//! sits behind [`dispatch::AlertDispatcher`] and [`facade::Facade`].

pub mod clock;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod durations;
pub mod engine;
pub mod error;
pub mod facade;
pub mod handler;
pub mod logging;
pub mod persist;
pub mod preferences;
pub mod render;
pub mod status;
pub mod store;

#[cfg(test)]
mod testing;

pub use engine::{EngineSettings, RestoreReport, StalePolicy, TimerEngine, TimerEntry};
pub use error::{ConfigError, DispatchError, PersistenceError, TimerError};

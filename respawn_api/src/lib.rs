//! # Respawn API
//!
//! Asynchronous client for the parts of the Revolt chat API a timer bot
//! needs: posting messages (with reaction interactions) over REST and
//! receiving messages and reactions over the WebSocket gateway. Built on
//! `tokio`, `reqwest` and `tokio-tungstenite`.

pub mod api;
pub mod client;
pub mod error;
pub mod types;
pub mod websocket;

pub use client::*;
pub use error::RevoltError;
pub use types::*;
pub use websocket::*;

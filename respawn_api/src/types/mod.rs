pub mod error_types;
pub mod message;
pub mod user;
pub mod websocket;

// Re-export the main types commonly used
pub use error_types::Error as ApiError;
pub use message::{DataMessageSend, Message};
pub use user::User;
pub use websocket::*;

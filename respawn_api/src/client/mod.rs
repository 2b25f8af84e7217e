mod client;

pub use client::parse_json_if_ok;
pub use client::{AuthToken, RevoltClient, DEFAULT_API_URL, DEFAULT_WS_URL};

pub use crate::{
    api::messages::MessagesApi,
    error::{handle_api_error, RevoltError},
};

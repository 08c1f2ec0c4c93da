//! Request handlers.

mod pull;
mod push;

pub use pull::{handle_check, handle_pull};
pub use push::{handle_push, PushResponse};

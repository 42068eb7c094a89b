pub mod handlers;
pub mod routes;
pub mod user_extractor;
pub mod ws;

pub use handlers::*;
pub use routes::*;
pub use ws::{request_command, REQUEST_COMMAND_PATTERN};

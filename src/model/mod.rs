pub mod common;
pub mod filter;
pub mod instance;
pub mod request;
pub mod response;
pub mod schema;
pub mod user_context;

pub use common::*;
pub use filter::*;
pub use instance::*;
pub use request::*;
pub use response::*;
pub use schema::*;
pub use user_context::*;

pub mod data;
pub mod host;

pub use data::*;
pub use host::*;

pub mod classify;
pub mod commands;
pub mod crud;
pub mod function;
pub mod gateway;
pub mod instance_filter;
pub mod permission;
pub mod registry;
pub mod search;
pub mod validate;

pub use classify::{classify, RawRequest, Verb};
pub use commands::{
    CommandDispatch, CommandHandler, CommandInvocation, CommandRouter, CommandRouterBuilder,
};
pub use gateway::Gateway;
pub use instance_filter::*;
pub use permission::{represent, require_access};
pub use registry::{normalize_path, SchemaRegistry};
pub use validate::*;

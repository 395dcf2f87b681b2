//! Application services for the world generation context.

pub mod command_handlers;
pub mod context;
pub mod publication;
pub mod query_handlers;
pub mod scheduler;

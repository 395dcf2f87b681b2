//! Domain model for the world generation context.

pub mod commands;
pub mod content_hash;
pub mod generation;
pub mod job;
pub mod module;
pub mod registry;
pub mod repository;
pub mod world;

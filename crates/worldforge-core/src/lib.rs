//! Worldforge Core: shared domain abstractions.
//!
//! This crate defines the time source, command contract and error taxonomy
//! that the world generation context and its adapters depend on. It contains
//! no infrastructure code.

pub mod clock;
pub mod command;
pub mod error;

//! Worldforge: world generation bounded context.
//!
//! Responsible for the module catalog, content fingerprints and module
//! status rules, publication reconciliation, and the generation job queue
//! that turns authored fields into narrative text.

pub mod application;
pub mod domain;

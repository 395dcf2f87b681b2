//! Shared test doubles and utilities for Worldforge.

mod clock;
mod generation;
mod store;

pub use clock::{FixedClock, ManualClock, fixed_now};
pub use generation::{ScriptedTextGenerator, StaticCredentials, StubPromptRenderer};
pub use store::{FailingWorldStore, InMemoryWorldStore};

//! Dollhouse Engine library.
//!
//! Turn pipelines over the `dollhouse-domain` world-state core.
//!
//! ## Structure
//!
//! - `use_cases/` - Day and night pipelines, gating components, the turn service
//! - `infrastructure/` - Ports and their adapters (storage, generators, clock, settings)
//! - `app` - Application composition

pub mod app;
pub mod infrastructure;
pub mod use_cases;

/// Test fixtures shared by the engine's unit tests.
#[cfg(test)]
pub mod test_fixtures;

pub use app::App;

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Apply CLI overrides
//!
//! Background (janitor.rs):
//!     Every sweep interval → drop idle limiter windows → purge expired cache
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → Broadcast → Stop accepting → Drain → Exit
//! ```

pub mod janitor;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;

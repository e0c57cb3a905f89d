//! Window and event-loop shell for Lucent applications.
//!
//! Implement [`LucentApp`] and hand it to [`run_app`]; the shell owns the
//! window, the backend bring-up, the per-frame protocol, and the ledger
//! that unwinds every acquired resource on shutdown.

pub mod app;
pub mod context;
pub mod runner;

pub use app::LucentApp;
pub use context::AppContext;
pub use runner::{run_app, AppConfig};

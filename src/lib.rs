//! Headless client for the ops dashboard backend: multi-step wizards for
//! probes, SLOs and tasks, and synchronized list views with row actions.

pub mod backend;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod notify;
pub mod server;
pub mod state;
pub mod sync;
pub mod wizard;

pub use error::{Error, Result};

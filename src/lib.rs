//! Kiln - BOSH release resolution and fetching
//!
//! Resolves the releases pinned in Kilnfile.lock against a local releases
//! directory and a prioritized list of remote release sources.

pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod lock;
pub mod release;
pub mod source;
pub mod ui;
pub mod update;

pub use error::{KilnError, KilnResult};

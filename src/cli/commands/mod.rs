//! CLI command implementations

pub mod fetch;
pub mod update_release;

pub use fetch::execute as fetch;
pub use update_release::execute as update_release;

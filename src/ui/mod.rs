//! Terminal output for kiln commands
//!
//! A `UiContext` is created once in the command layer and handed to every
//! component that reports progress to the user. Interactive terminals get
//! `cliclack` styling and `indicatif` bars; CI and pipes get plain lines.

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{intro, outro_success, remark, section, step_error, step_info, step_ok, step_warn};
pub use progress::DownloadProgress;
pub use prompts::confirm;

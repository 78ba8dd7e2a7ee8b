//! Terminal output for the inspection CLI
//!
//! Interactive terminals get `cliclack` styling and prompts; pipes and CI
//! fall back to plain, greppable lines.

mod context;
mod output;
mod prompts;

pub use context::UiContext;
pub use output::{remark, step_ok, step_ok_detail, step_warn_hint};
pub use prompts::confirm;

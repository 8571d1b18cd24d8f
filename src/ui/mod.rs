//! Terminal output for the CLI
//!
//! Uses `cliclack` framing, `indicatif` spinners and `console` styling
//! in interactive terminals, with plain line output in CI and pipes.
//!
//! # Example
//!
//! ```rust,ignore
//! use orca::ui::{self, CopyProgress, UiContext};
//!
//! let ctx = UiContext::detect();
//! let progress = CopyProgress::new(&ctx, "Copying");
//! opts.observer = Some(progress.clone());
//! let report = copy_graph(&src, &dst, &root, &opts).await?;
//! progress.finish();
//!
//! ui::key_value(&ctx, "Copied", &report.copied.to_string());
//! ui::outro_success(&ctx, "Copy complete");
//! ```

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{
    key_value, outro_success, outro_warn, section, step_ok, step_warn, step_warn_hint,
};
pub use progress::{CopyProgress, TaskSpinner};
pub use prompts::confirm;

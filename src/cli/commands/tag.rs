//! Tag command - add tags to an artifact in a layout

use super::required_reference;
use crate::cli::args::TagArgs;
use crate::config::Config;
use crate::error::OrcaResult;
use crate::ops;
use crate::target::OciLayout;
use crate::ui::{self, UiContext};

/// Execute the tag command
pub async fn execute(args: TagArgs, config: &Config) -> OrcaResult<()> {
    let ctx = UiContext::detect();
    let reference = required_reference(&args.target)?;
    let layout = OciLayout::open_existing(&args.target.path).await?;
    let concurrency = args.concurrency.unwrap_or(config.copy.concurrency);

    let (desc, committed) = ops::tag(&layout, &reference, &args.tags, concurrency).await?;
    for tag in &committed {
        ui::step_ok(&ctx, &format!("{} -> {}", tag, desc.digest));
    }
    Ok(())
}

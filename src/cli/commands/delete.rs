//! Delete command - remove an artifact from a layout

use super::{print_warnings, required_reference};
use crate::cli::args::DeleteArgs;
use crate::config::Config;
use crate::error::OrcaResult;
use crate::ops::{self, DeleteOptions};
use crate::target::OciLayout;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the delete command
pub async fn execute(args: DeleteArgs, config: &Config) -> OrcaResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    let reference = required_reference(&args.target)?;
    let layout = OciLayout::open_existing(&args.target.path).await?;

    let prompt = format!("Delete {}?", args.target);
    if !ui::confirm(&ctx, &prompt, false).await? {
        ui::outro_warn(&ctx, "Aborted (pass --yes to delete without asking)");
        return Ok(());
    }

    let opts = DeleteOptions {
        referrers: args.referrers.unwrap_or(config.copy.referrers),
        skip_gc: args.skip_gc || config.copy.skip_gc,
    };
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Deleting {}", reference));
    let outcome = match ops::delete(&layout, &reference, &opts).await {
        Ok(outcome) => outcome,
        Err(e) => {
            spinner.stop_error(&format!("Could not delete {}", reference));
            return Err(e);
        }
    };
    spinner.stop(&format!("Deleted {}", outcome.deleted.digest));

    print_warnings(&ctx, &outcome.warnings);
    Ok(())
}

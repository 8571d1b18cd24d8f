//! Progress indicators with CI fallback

use super::context::UiContext;
use crate::content::Descriptor;
use crate::copy::CopyObserver;
use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    /// Create a new spinner (shows immediately in interactive mode)
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.interactive {
            println!("{} {}", style("✓").green(), message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if self.interactive {
            println!("{} {}", style("✗").red(), message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Per-node progress for a copy.
///
/// Prints one line per finished node. In interactive mode the lines
/// scroll above a spinner counting finished nodes.
pub struct CopyProgress {
    bar: Option<ProgressBar>,
    done: AtomicUsize,
}

impl CopyProgress {
    pub fn new(ctx: &UiContext, label: &str) -> Arc<Self> {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new_spinner();
            if let Ok(template) =
                ProgressStyle::default_spinner().template("  {spinner:.cyan} {prefix} {msg:.dim}  {elapsed:.dim}")
            {
                bar.set_style(template.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };
        Arc::new(Self {
            bar,
            done: AtomicUsize::new(0),
        })
    }

    fn line(&self, status: StyledObject<&str>, desc: &Descriptor) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let line = format_line(&status.to_string(), desc);
        match &self.bar {
            Some(bar) => {
                bar.println(line);
                bar.set_message(format!("{} nodes", done));
            }
            None => println!("{}", line),
        }
    }

    /// Finish and clear the spinner
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

impl CopyObserver for CopyProgress {
    fn on_copied(&self, desc: &Descriptor) {
        self.line(style("Copied").green(), desc);
    }

    fn on_mounted(&self, desc: &Descriptor, _from_repository: &str) {
        self.line(style("Mounted").cyan(), desc);
    }

    fn on_skipped(&self, desc: &Descriptor) {
        self.line(style("Exists").dim(), desc);
    }

    fn on_would_copy(&self, desc: &Descriptor) {
        self.line(style("Would copy").yellow(), desc);
    }
}

/// `<status> <short digest> <title or media type>`
fn format_line(status: &str, desc: &Descriptor) -> String {
    let encoded = desc.digest.encoded();
    let short = &encoded[..encoded.len().min(12)];
    let what = desc.title().unwrap_or(&desc.media_type);
    format!("  {:<10} {} {}", status, short, what)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::annotations;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Resolving...");
        spinner.stop("Done");
        // Should not panic
    }

    #[test]
    fn line_prefers_title() {
        let desc = Descriptor::from_bytes("text/plain", b"hello")
            .with_annotation(annotations::TITLE, "hello.txt");
        let line = format_line("Copied", &desc);
        assert!(line.contains("Copied"));
        assert!(line.contains(&desc.digest.encoded()[..12]));
        assert!(line.ends_with("hello.txt"));

        let untitled = Descriptor::from_bytes("text/plain", b"hello");
        assert!(format_line("Exists", &untitled).ends_with("text/plain"));
    }

    #[test]
    fn copy_progress_counts_nodes() {
        let ctx = UiContext::non_interactive();
        let progress = CopyProgress::new(&ctx, "copy");
        let desc = Descriptor::from_bytes("text/plain", b"x");
        progress.on_copied(&desc);
        progress.on_skipped(&desc);
        progress.on_would_copy(&desc);
        progress.finish();
        assert_eq!(progress.done.load(Ordering::SeqCst), 3);
    }
}

//! Batch progress UI.
//!
//! Renders executor events for humans. Output modes:
//! - `full`: progress bar plus one styled line per transition
//! - `minimal`: plain lines only, used when stdout is not a terminal

use crate::orchestrator::{BatchEvent, BatchResult, BatchState, OutcomeStatus};
use crate::ui::icons::{BLOCKED, CHECK, CLOCK, CROSS, RUNNING, SKIP, SPARKLE, STOP};
use console::{Term, style};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::Write;
use std::time::Duration;

/// Output mode for the batch UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    /// Progress bar with colors
    #[default]
    Full,
    /// Plain status lines
    Minimal,
}

impl UiMode {
    /// `Full` on an interactive terminal, `Minimal` otherwise.
    pub fn detect() -> Self {
        if Term::stdout().is_term() {
            UiMode::Full
        } else {
            UiMode::Minimal
        }
    }
}

/// Terminal UI for one batch.
pub struct BatchUI {
    mode: UiMode,
    bar: ProgressBar,
    term: Term,
    verbose: bool,
}

impl BatchUI {
    pub fn new(mode: UiMode, verbose: bool) -> Self {
        let bar = match mode {
            UiMode::Full => {
                let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
                if let Ok(bar_style) = ProgressStyle::default_bar()
                    .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                {
                    bar.set_style(bar_style.progress_chars("█▓▒░"));
                }
                bar.set_prefix("Phases");
                bar
            }
            UiMode::Minimal => ProgressBar::hidden(),
        };

        Self {
            mode,
            bar,
            term: Term::stdout(),
            verbose,
        }
    }

    /// Print a line above the progress bar, falling back to stdout.
    fn print_line(&self, msg: impl AsRef<str>) {
        match self.mode {
            UiMode::Full if !self.bar.is_hidden() => self.bar.println(msg.as_ref()),
            _ => {
                let _ = writeln!(&self.term, "{}", msg.as_ref());
            }
        }
    }

    /// Update the UI for one executor event.
    pub fn handle_event(&self, event: &BatchEvent) {
        match event {
            BatchEvent::Planned { run, skip, dry_run } => {
                self.bar.set_length((run.len() + skip.len()) as u64);
                let prefix = if *dry_run {
                    format!("{} ", style("[dry run]").magenta().bold())
                } else {
                    String::new()
                };
                self.print_line(format!(
                    "{}Plan: {} to run, {} already succeeded",
                    prefix,
                    style(run.len()).cyan().bold(),
                    style(skip.len()).dim()
                ));
                if self.verbose && !run.is_empty() {
                    self.print_line(format!("  {}", style(run.join(" -> ")).dim()));
                }
            }
            BatchEvent::Skip { phase } => {
                self.bar.inc(1);
                self.print_line(format!(
                    "{}{} {}",
                    SKIP,
                    style(phase).dim(),
                    style("(already succeeded)").dim()
                ));
            }
            BatchEvent::Start {
                phase,
                position,
                total,
            } => {
                self.bar.set_message(style(phase).yellow().to_string());
                self.print_line(format!(
                    "{}{} {}",
                    RUNNING,
                    style(phase).yellow().bold(),
                    style(format!("[{}/{}]", position, total)).dim()
                ));
            }
            BatchEvent::Success {
                phase,
                detail,
                duration_ms,
            } => {
                self.bar.inc(1);
                self.print_line(format!(
                    "{}{} {} {}",
                    CHECK,
                    style(phase).green().bold(),
                    style(detail).dim(),
                    style(format_duration(Duration::from_millis(*duration_ms))).dim()
                ));
            }
            BatchEvent::Failure {
                phase,
                detail,
                duration_ms,
            } => {
                self.bar.inc(1);
                self.print_line(format!(
                    "{}{} {} {}",
                    CROSS,
                    style(phase).red().bold(),
                    style(detail).red(),
                    style(format_duration(Duration::from_millis(*duration_ms))).dim()
                ));
            }
            BatchEvent::Timeout { phase, secs, .. } => {
                self.bar.inc(1);
                self.print_line(format!(
                    "{}{} {}",
                    CLOCK,
                    style(phase).red().bold(),
                    style(format!("timeout after {}s", secs)).red()
                ));
            }
            BatchEvent::NotAttempted { phase, reason } => {
                self.bar.inc(1);
                self.print_line(format!(
                    "{}{} {}",
                    BLOCKED,
                    style(phase).dim(),
                    style(format!("not attempted: {}", reason)).dim()
                ));
            }
            BatchEvent::BatchCompleted { .. } => {
                self.bar.set_message(style("done").green().to_string());
            }
            BatchEvent::BatchAborted { failed_phase, .. } => {
                self.bar
                    .set_message(style(format!("aborted at {}", failed_phase)).red().to_string());
            }
            BatchEvent::BatchInterrupted { phase } => {
                let at = phase
                    .as_deref()
                    .map(|p| format!(" during {}", p))
                    .unwrap_or_default();
                self.print_line(format!("{}{}", STOP, style(format!("Interrupted{}", at)).red()));
            }
            BatchEvent::BatchRefused { stage, .. } => {
                self.print_line(format!(
                    "{}{}",
                    CROSS,
                    style(format!("Batch refused during {}, no phase was run", stage))
                        .red()
                        .bold()
                ));
                self.bar.finish_and_clear();
            }
        }
    }

    /// Clear the progress bar and print the final summary.
    pub fn print_summary(&self, result: &BatchResult) {
        self.bar.finish_and_clear();

        let headline = match (result.state, result.first_failure()) {
            (BatchState::Interrupted, _) => style("Batch interrupted".to_string()).red().bold(),
            (BatchState::Aborted, Some(failure)) => style(format!(
                "Phase '{}' failed: {}",
                failure.phase, failure.detail
            ))
            .red()
            .bold(),
            (_, Some(_)) => style("Batch completed with failures".to_string()).yellow().bold(),
            _ if result.dry_run => style("Dry run complete, nothing was executed".to_string())
                .magenta()
                .bold(),
            _ => style("All phases succeeded".to_string()).green().bold(),
        };
        let icon = if result.is_success() { SPARKLE } else { CROSS };
        let _ = writeln!(&self.term);
        let _ = writeln!(&self.term, "{}{}", icon, headline);

        let _ = writeln!(
            &self.term,
            "  {} succeeded, {} skipped, {} failed, {} not attempted {}",
            style(result.succeeded().len()).green(),
            style(result.skipped().len()).dim(),
            style(result.failed().len()).red(),
            style(result.not_attempted().len()).yellow(),
            style(format!("in {}", format_duration(result.elapsed))).dim()
        );

        for outcome in &result.outcomes {
            if outcome.status == OutcomeStatus::Failed {
                let _ = writeln!(
                    &self.term,
                    "  {} {}: {}",
                    style("failed").red(),
                    outcome.phase,
                    outcome.detail
                );
            }
        }

        let never = result.not_attempted();
        if !never.is_empty() {
            let _ = writeln!(
                &self.term,
                "  {} {}",
                style("never attempted:").yellow(),
                never.join(", ")
            );
        }
    }
}

/// `Xms`, `Xs` or `Xm Ys`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs >= 1 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}

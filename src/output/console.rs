//! Terminal sink with a progress bar

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::bench::{CancelReason, StatsSink};
use crate::models::{IntervalStats, RunSummary};
use crate::Result;

/// Shows elapsed time against the run duration and prints each interval
/// line above the bar. When the bar is hidden (not a terminal) the lines
/// go straight to stdout.
pub struct ConsoleSink {
    bar: ProgressBar,
}

impl ConsoleSink {
    /// Bar sized to `duration`, drawn on stderr
    pub fn new(duration: Duration) -> Self {
        let bar = ProgressBar::new(duration.as_secs().max(1));
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {wide_bar} {pos}/{len}s {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(200));
        Self { bar }
    }

    /// No bar; plain lines on stdout
    pub fn plain() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    fn print(&self, line: String) {
        if self.bar.is_hidden() {
            println!("{}", line);
        } else {
            self.bar.println(line);
        }
    }
}

impl StatsSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn record(&mut self, stats: &IntervalStats) -> Result<()> {
        self.bar.set_position(stats.elapsed.as_secs());
        self.bar.set_message(format!(
            "{} ok / {} fail",
            stats.totals.successes, stats.totals.failures
        ));
        self.print(stats.display_line());
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<()> {
        self.bar.finish_and_clear();
        let reason = match summary.stop_reason {
            Some(CancelReason::Deadline) => "deadline reached",
            Some(CancelReason::Interrupt) => "interrupted",
            None => "stopped",
        };
        self.print(format!("Run {} after {} interval(s)", reason, summary.intervals));
        Ok(())
    }
}

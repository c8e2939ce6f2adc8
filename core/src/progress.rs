use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Visual progress for a collection run: one overall bar, one spinner
/// per in-flight source or country. Disabled entirely in quiet/test
/// runs so log output stays parseable.
pub struct ProgressMonitor {
    multi: MultiProgress,
    overall: ProgressBar,
    bars: HashMap<String, ProgressBar>,
    enabled: bool,
}

impl ProgressMonitor {
    pub fn new(total: usize, enabled: bool) -> Self {
        if !enabled {
            return Self {
                multi: MultiProgress::new(),
                overall: ProgressBar::hidden(),
                bars: HashMap::new(),
                enabled: false,
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total as u64));
        overall.set_style(
            ProgressStyle::default_bar()
                .template(
                    "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}",
                )
                .unwrap()
                .progress_chars("█▓▒░  "),
        );
        overall.set_message("Starting...");

        Self {
            multi,
            overall,
            bars: HashMap::new(),
            enabled: true,
        }
    }

    pub fn add_item(&mut self, label: &str) {
        if !self.enabled {
            return;
        }
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.green} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bars.insert(label.to_string(), bar);
    }

    pub fn complete_item(&mut self, label: &str, success: bool) {
        if !self.enabled {
            return;
        }
        if let Some(bar) = self.bars.remove(label) {
            let icon = if success { "✅" } else { "❌" };
            bar.finish_with_message(format!("{icon} {label}"));
        }
        self.overall.inc(1);
    }

    pub fn set_message(&self, msg: &str) {
        if self.enabled {
            self.overall.set_message(msg.to_string());
        }
    }

    pub fn finish(&self, msg: &str) {
        if self.enabled {
            self.overall.finish_with_message(msg.to_string());
        }
    }
}

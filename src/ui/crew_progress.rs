//! Crew execution progress UI.
//!
//! Renders the [`UpdateEvent`] stream of a run. It supports three output modes:
//! - `full`: one spinner per running task plus an overall bar
//! - `minimal`: one line per finished task
//! - `json`: one JSON event per line for machine consumption

use crate::crew::{ExecutionResult, RunState, TaskOutcome};
use crate::stream::UpdateEvent;
use crate::ui::icons::{AGENT, CHECK, CLOCK, CROSS, RETRY, RUNNING, SKIP, SPARKLE, STOP};
use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

/// Output mode for the run UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    /// Progress bars and colors
    #[default]
    Full,
    /// Single-line status updates
    Minimal,
    /// JSON-formatted events
    Json,
}

impl std::str::FromStr for UiMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "minimal" => Self::Minimal,
            _ => Self::Full,
        })
    }
}

impl UiMode {
    /// Parse a UI mode, falling back to `Full`.
    pub fn parse(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

/// What a progress message says about its task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskProgress {
    Started { agent: String },
    Retrying,
    Completed,
    Failed { error: String },
    Skipped { reason: String },
    Cancelled,
    Other,
}

impl TaskProgress {
    /// Classify an executor progress message for `task_id`.
    pub fn classify(task_id: &str, message: &str) -> Self {
        if let Some(rest) = message.strip_prefix(&format!("Starting task {} with agent ", task_id))
        {
            return Self::Started {
                agent: rest.to_string(),
            };
        }
        if message == format!("Completed task {}", task_id) {
            return Self::Completed;
        }
        if let Some(error) = message.strip_prefix(&format!("Task {} failed: ", task_id)) {
            return Self::Failed {
                error: error.to_string(),
            };
        }
        if let Some(reason) = message.strip_prefix(&format!("Skipped task {}: ", task_id)) {
            return Self::Skipped {
                reason: reason.to_string(),
            };
        }
        if message == format!("Cancelled task {}", task_id) {
            return Self::Cancelled;
        }
        if message.starts_with(&format!("Retrying task {} ", task_id)) {
            return Self::Retrying;
        }
        Self::Other
    }
}

/// Crew run progress UI.
///
/// Takes `&mut self` so a streaming callback can own it without locking.
pub struct CrewUI {
    mode: UiMode,
    multi: MultiProgress,
    header_bar: ProgressBar,
    task_bars: HashMap<String, ProgressBar>,
    verbose: bool,
    term: Term,
}

impl CrewUI {
    pub fn new(graph_name: &str, total_tasks: usize, mode: UiMode, verbose: bool) -> Self {
        let multi = MultiProgress::new();
        let header_bar = multi.add(ProgressBar::new(total_tasks as u64));

        if let Ok(header_style) = ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            header_bar.set_style(header_style.progress_chars("█▓▒░"));
        }
        header_bar.set_prefix(graph_name.to_string());
        header_bar.set_message("Starting...");
        if mode != UiMode::Full {
            header_bar.finish_and_clear();
        }

        Self {
            mode,
            multi,
            header_bar,
            task_bars: HashMap::new(),
            verbose,
            term: Term::stdout(),
        }
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    /// Handle an update event.
    pub fn handle_event(&mut self, event: &UpdateEvent) {
        match self.mode {
            UiMode::Json => self.handle_json(event),
            UiMode::Minimal => self.handle_minimal(event),
            UiMode::Full => self.handle_full(event),
        }
    }

    fn handle_json(&self, event: &UpdateEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(&self.term, "{}", json);
        }
    }

    fn handle_minimal(&self, event: &UpdateEvent) {
        match event {
            UpdateEvent::Progress { task_id, message } => {
                match TaskProgress::classify(task_id, message) {
                    TaskProgress::Completed => {
                        let _ = writeln!(&self.term, "✓ {}", task_id);
                    }
                    TaskProgress::Failed { error } => {
                        let _ = writeln!(&self.term, "✗ {} ({})", task_id, error);
                    }
                    TaskProgress::Skipped { .. } => {
                        let _ = writeln!(&self.term, "- {} (skipped)", task_id);
                    }
                    TaskProgress::Cancelled => {
                        let _ = writeln!(&self.term, "- {} (cancelled)", task_id);
                    }
                    _ if self.verbose => {
                        let _ = writeln!(&self.term, "  {}", message);
                    }
                    _ => {}
                }
            }
            UpdateEvent::Error {
                task_id: Some(task_id),
                error,
            } => {
                let _ = writeln!(&self.term, "! {}: {}", task_id, error);
            }
            _ => {}
        }
    }

    fn handle_full(&mut self, event: &UpdateEvent) {
        match event {
            UpdateEvent::Progress { task_id, message } => {
                match TaskProgress::classify(task_id, message) {
                    TaskProgress::Started { agent } => self.on_task_started(task_id, &agent),
                    TaskProgress::Retrying => self.on_task_retrying(task_id, message),
                    TaskProgress::Completed => self.on_task_completed(task_id),
                    TaskProgress::Failed { error } => self.on_task_failed(task_id, &error),
                    TaskProgress::Skipped { reason } => self.on_task_skipped(task_id, &reason),
                    TaskProgress::Cancelled => self.on_task_cancelled(task_id),
                    TaskProgress::Other => {
                        if self.verbose {
                            self.multi.println(format!("    {}", style(message).dim())).ok();
                        }
                    }
                }
            }
            UpdateEvent::Content {
                task_id,
                accumulated_content,
                ..
            } => self.on_content(task_id, accumulated_content),
            UpdateEvent::Error { task_id, error } => {
                let label = task_id.as_deref().unwrap_or("run");
                self.multi
                    .println(format!(
                        "  {} {}: {}",
                        CROSS,
                        style(label).red().bold(),
                        style(error).red()
                    ))
                    .ok();
            }
            UpdateEvent::Complete { .. } => {
                self.header_bar.finish_and_clear();
            }
        }
    }

    fn on_task_started(&mut self, task_id: &str, agent: &str) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        if let Ok(bar_style) = ProgressStyle::default_spinner().template("  {prefix:.bold} {spinner} {msg}") {
            bar.set_style(bar_style);
        }
        bar.set_prefix(format!("[{}]", task_id));
        bar.set_message(format!("{} {}{}", RUNNING, AGENT, agent));
        bar.enable_steady_tick(Duration::from_millis(100));
        self.task_bars.insert(task_id.to_string(), bar);
        self.header_bar.set_message(format!("running {}", task_id));

        if self.verbose {
            self.multi
                .println(format!(
                    "  {} Task {} starting with agent {}",
                    style("▶").cyan(),
                    style(task_id).yellow(),
                    agent
                ))
                .ok();
        }
    }

    fn on_task_retrying(&self, task_id: &str, message: &str) {
        if let Some(bar) = self.task_bars.get(task_id) {
            bar.set_message(format!("{} {}", RETRY, style(message).yellow()));
        }
        self.multi
            .println(format!("  {} {}", RETRY, style(message).yellow()))
            .ok();
    }

    fn on_content(&self, task_id: &str, accumulated: &str) {
        if let Some(bar) = self.task_bars.get(task_id) {
            bar.set_message(format!(
                "{} {}",
                style(format!("{} chars", accumulated.chars().count())).dim(),
                preview(accumulated, 60)
            ));
        }
    }

    fn on_task_completed(&mut self, task_id: &str) {
        if let Some(bar) = self.task_bars.remove(task_id) {
            bar.finish_with_message(format!("{} Complete", CHECK));
        }
        self.header_bar.inc(1);
    }

    fn on_task_failed(&mut self, task_id: &str, error: &str) {
        if let Some(bar) = self.task_bars.remove(task_id) {
            bar.finish_with_message(format!("{} Failed: {}", CROSS, error));
        }
        self.header_bar.inc(1);
        self.multi
            .println(format!(
                "  {} Task {} {}: {}",
                CROSS,
                style(task_id).red().bold(),
                style("failed").red(),
                error
            ))
            .ok();
    }

    fn on_task_skipped(&mut self, task_id: &str, reason: &str) {
        self.header_bar.inc(1);
        self.multi
            .println(format!(
                "  {} Task {} skipped: {}",
                SKIP,
                style(task_id).yellow(),
                style(reason).dim()
            ))
            .ok();
    }

    fn on_task_cancelled(&mut self, task_id: &str) {
        if let Some(bar) = self.task_bars.remove(task_id) {
            bar.abandon_with_message(format!("{} Cancelled", STOP));
        }
        self.header_bar.inc(1);
    }

    /// Print the closing summary for a finished run.
    pub fn finish(&mut self, result: &ExecutionResult) {
        for (_, bar) in self.task_bars.drain() {
            bar.finish_and_clear();
        }
        self.header_bar.finish_and_clear();

        match self.mode {
            UiMode::Json => {}
            UiMode::Minimal => {
                let _ = writeln!(
                    &self.term,
                    "Done: {}/{} {}",
                    result.count(TaskOutcome::Succeeded),
                    result.task_results.len(),
                    if result.success { "✓" } else { "✗" }
                );
            }
            UiMode::Full => self.print_summary(result),
        }
    }

    fn print_summary(&self, result: &ExecutionResult) {
        self.multi.println("").ok();
        self.multi
            .println(format!("{}", style("═".repeat(60)).cyan()))
            .ok();
        let banner = match result.state {
            RunState::Completed => format!(
                "{} Crew {} {}",
                SPARKLE,
                style("COMPLETE").green().bold(),
                SPARKLE
            ),
            RunState::Failed => format!("{} Crew {}", CROSS, style("FAILED").red().bold()),
            RunState::Cancelled => {
                format!("{} Crew {}", STOP, style("CANCELLED").yellow().bold())
            }
        };
        self.multi.println(banner).ok();
        self.multi
            .println(format!("{}", style("═".repeat(60)).cyan()))
            .ok();

        self.multi
            .println(format!(
                "{}  Tasks: {}/{} succeeded in {}",
                CLOCK,
                style(result.count(TaskOutcome::Succeeded)).green().bold(),
                result.task_results.len(),
                format_duration(result.duration)
            ))
            .ok();

        let failed = result.count(TaskOutcome::Failed);
        let skipped = result.count(TaskOutcome::Skipped);
        let cancelled = result.count(TaskOutcome::Cancelled);
        if failed + skipped + cancelled > 0 {
            self.multi
                .println(format!(
                    "   {} failed, {} skipped, {} cancelled",
                    style(failed).red(),
                    style(skipped).yellow(),
                    style(cancelled).dim()
                ))
                .ok();
        }

        if self.verbose {
            for task in &result.task_results {
                self.multi
                    .println(format!(
                        "   {} {} ({} attempt(s), {})",
                        style(format!("{:?}", task.status).to_lowercase()).dim(),
                        task.task_id,
                        task.attempts,
                        format_duration(task.duration)
                    ))
                    .ok();
            }
        }
        self.multi.println("").ok();
    }
}

/// Last `max` characters of `text` on one line.
fn preview(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    let count = flat.chars().count();
    if count <= max {
        return flat;
    }
    let tail: String = flat.chars().skip(count - max).collect();
    format!("…{}", tail)
}

/// Format a duration as `Xms`, `Xs` or `Xm Ys`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs == 0 {
        format!("{}ms", d.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

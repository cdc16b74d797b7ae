use riskscope_session::{ActionRow, SessionObserver, SessionView};
use std::sync::Mutex;

const GOAL_WIDTH: usize = 32;
const ELEMENT_WIDTH: usize = 28;

#[derive(Default)]
struct Seen {
    state: String,
    progress: usize,
    errors: usize,
    log_text: String,
}

/// Prints session changes to the terminal as they happen.
#[derive(Default)]
pub struct ConsoleObserver {
    seen: Mutex<Seen>,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionObserver for ConsoleObserver {
    fn on_update(&self, view: &SessionView) {
        let Ok(mut seen) = self.seen.lock() else {
            return;
        };

        if seen.state != view.state {
            println!("● {} [{}] {}", view.mode, view.session_id, view.state);
            seen.state = view.state.clone();
        }

        for line in view.progress.iter().skip(seen.progress) {
            println!("  {}", line);
        }
        seen.progress = view.progress.len();

        for error in view.errors.iter().skip(seen.errors) {
            println!("  ⚠ {}", error);
        }
        seen.errors = view.errors.len();

        // Log text arrives as full snapshots; show only what is new.
        if view.mode == riskscope_core::Mode::Exploration && view.log_text != seen.log_text {
            let fresh = view
                .log_text
                .strip_prefix(seen.log_text.as_str())
                .unwrap_or(&view.log_text);
            for line in fresh.lines().filter(|l| !l.trim().is_empty()) {
                println!("  │ {}", line);
            }
            seen.log_text = view.log_text.clone();
        }
    }
}

/// Print the annotated actions table and summary of a finished session.
pub fn print_result(view: &SessionView) {
    println!();
    println!("Session {} ({}, started {})", view.session_id, view.state, view.started_at);
    if let Some(path) = &view.service_log_path {
        println!("  service log:      {}", path);
    }
    if let Some(path) = &view.service_combined_path {
        println!("  service combined: {}", path);
    }
    if view.rows.is_empty() {
        if view.export_available {
            println!("No actions were annotated.");
        } else {
            println!("No result: the session ended before the service finished.");
        }
        return;
    }

    println!(
        "{:>3}  {:<9}  {:<w$}  {:<16}  {:<e$}  {:<9}  {:<11}  {}",
        "#",
        "kind",
        "goal",
        "action",
        "element",
        "sensitive",
        "appropriate",
        "risk",
        w = GOAL_WIDTH,
        e = ELEMENT_WIDTH,
    );
    for row in &view.rows {
        print_row(row);
    }

    if let Some(summary) = &view.summary {
        println!();
        println!(
            "{} actions ({} executed, {} candidate): {} touch sensitive data, {} out of context, {} with an identified risk",
            summary.total,
            summary.executed,
            summary.candidate,
            summary.sensitive,
            summary.inappropriate,
            summary.risky(),
        );
        for (risk, count) in &summary.risk_types {
            println!("  {:<28} {}", risk, count);
        }
    }
}

fn print_row(row: &ActionRow) {
    println!(
        "{:>3}  {:<9}  {:<w$}  {:<16}  {:<e$}  {:<9}  {:<11}  {}",
        row.index,
        row.kind,
        clip(&row.goal, GOAL_WIDTH),
        clip(&row.action_name, 16),
        clip(&row.element, ELEMENT_WIDTH),
        row.sensitive,
        row.appropriate,
        row.risk_type,
        w = GOAL_WIDTH,
        e = ELEMENT_WIDTH,
    );
    println!(
        "     ↳ {} · {} · {}",
        row.reversibility, row.rollback_effect, row.impact_scope
    );
}

fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(width.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("a longer goal text", 8), "a longe…");
        assert_eq!(clip("ÄÖÜäöü", 4).chars().count(), 4);
    }
}

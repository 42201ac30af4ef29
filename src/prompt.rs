//! Operator confirmation for destructive or repairing actions

use std::io::{BufRead, Write};

/// Capability to ask the operator a yes/no question
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Interactive prompt on stdin; only `y`/`yes` counts as agreement
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let mut stdout = std::io::stdout();
        // A failed flush only affects prompt display
        let _ = write!(stdout, "{} (y/N): ", prompt);
        let _ = stdout.flush();

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read confirmation, treating as no");
                false
            }
        }
    }
}

/// Fixed answer, for `--yes` and tests
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&self, prompt: &str) -> bool {
        tracing::debug!(prompt = %prompt, answer = self.0, "Confirmation answered without prompting");
        self.0
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

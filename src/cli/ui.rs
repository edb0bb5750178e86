// Terminal output and prompts
//
// Commands go to stdout so `eval "$(tern ask ...)"` works; everything meant
// for the human goes to stderr.

use crossterm::style::{StyledContent, Stylize};
use std::io::{self, BufRead, Write};

use crate::planning::{Gate, PlanStep};
use crate::safety::{RiskAssessment, RiskTier};

pub fn tier_label(tier: RiskTier) -> StyledContent<String> {
    let label = format!("{} risk", tier.as_str().to_uppercase());
    match tier {
        RiskTier::Safe => label.green(),
        RiskTier::Caution => label.yellow(),
        RiskTier::Dangerous => label.red(),
        RiskTier::Critical => label.red().bold(),
    }
}

/// Risk block for a non-safe assessment.
pub fn print_assessment(assessment: &RiskAssessment) {
    if assessment.is_safe() {
        return;
    }
    eprintln!();
    eprintln!("{}", tier_label(assessment.tier));
    for reason in &assessment.reasons {
        eprintln!("  {}", reason);
    }
    if let Some(suggestion) = &assessment.suggestion {
        eprintln!("{}", suggestion.as_str().cyan());
    }
}

pub fn print_blocked() {
    eprintln!("{}", "This command is blocked. Override with --no-safety.".red().bold());
}

pub fn print_step(step: &PlanStep) {
    eprintln!();
    let header = format!("Step {}", step.ordinal);
    match step.retry_of {
        Some(original) => eprintln!("{} {}", header.cyan().bold(), format!("(retry of {})", original).dim()),
        None => eprintln!("{}", header.cyan().bold()),
    }
    if !step.description.is_empty() {
        eprintln!("  {}", step.description.as_str().dim());
    }
    eprintln!("  {}", step.command.as_str().bold());
    if !step.assessment.is_safe() {
        eprintln!("  {}: {}", tier_label(step.assessment.tier), step.assessment.rationale);
    }
    if step.gate == Gate::Blocked {
        eprintln!("  {}", "blocked by safety policy, skipping".red());
    }
}

/// Read one trimmed, lowercased line. `None` on EOF or a read error.
pub fn read_answer(prompt: &str) -> Option<String> {
    eprint!("{} ", prompt.yellow());
    io::stderr().flush().ok()?;

    let mut input = String::new();
    match io::stdin().lock().read_line(&mut input) {
        Ok(0) | Err(_) => {
            eprintln!();
            None
        }
        Ok(_) => Some(input.trim().to_lowercase()),
    }
}

/// Yes/no question. Empty input takes `default`; EOF answers no.
pub fn confirm(prompt: &str, default: bool) -> bool {
    let suffix = if default { "[Y/n]" } else { "[y/N]" };
    match read_answer(&format!("{} {}", prompt, suffix)) {
        None => false,
        Some(answer) if answer.is_empty() => default,
        Some(answer) => matches!(answer.as_str(), "y" | "yes"),
    }
}

/// What to do at the confirmation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAnswer {
    Confirm,
    Skip,
    Quit,
}

pub fn ask_gate(ordinal: usize) -> GateAnswer {
    match read_answer(&format!("Run step {}? [y]es/[N]o/[q]uit", ordinal)).as_deref() {
        Some("y") | Some("yes") => GateAnswer::Confirm,
        Some("q") | Some("quit") | None => GateAnswer::Quit,
        _ => GateAnswer::Skip,
    }
}

/// How a failed step is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAnswer {
    Retry,
    Continue,
    Abort,
}

pub fn ask_failure(ordinal: usize) -> FailureAnswer {
    match read_answer(&format!("Step {} failed. [r]etry/[c]ontinue/[A]bort", ordinal)).as_deref() {
        Some("r") | Some("retry") => FailureAnswer::Retry,
        Some("c") | Some("continue") => FailureAnswer::Continue,
        _ => FailureAnswer::Abort,
    }
}

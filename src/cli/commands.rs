// Subcommand handlers

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::ui::{self, FailureAnswer, GateAnswer};
use super::{joined, Cli, Command};
use crate::assistant::{Assistant, ChatSession};
use crate::config::constants::DEFAULT_CONTEXT_ENTRIES;
use crate::config::{load_config, write_default_config, Config};
use crate::context;
use crate::planning::{
    Decision, Gate, GatePolicy, OnFailure, PlanEngine, PlanProgress, PlanState, StepOutcome,
};
use crate::providers::{Orchestrator, RouteError};
use crate::safety::RiskClassifier;

/// Exit code for a command refused by the safety policy
const EXIT_BLOCKED: u8 = 2;
/// Exit code after Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

pub async fn run(cli: Cli) -> Result<ExitCode> {
    if let Command::InitConfig = cli.command {
        let path = write_default_config(cli.config.as_deref())?;
        eprintln!("{} {}", "Wrote".green(), path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(cli.config.as_deref())?;
    let policy = if cli.no_safety {
        GatePolicy::permissive()
    } else {
        config.gate_policy()
    };

    match cli.command {
        Command::Ask { query, context } => ask(&config, &policy, &joined(&query), context).await,
        Command::Explain { command } => explain(&config, &joined(&command)).await,
        Command::Chat { message } => chat(&config, &joined(&message)).await,
        Command::Plan {
            goal,
            dry_run,
            yes,
            json,
        } => plan(&config, policy, &joined(&goal), dry_run, yes, json).await,
        Command::Classify { command } => Ok(classify(&policy, &joined(&command))),
        Command::Backends => backends(&config).await,
        Command::InitConfig => Ok(ExitCode::SUCCESS),
    }
}

async fn ask(config: &Config, policy: &GatePolicy, query: &str, with_context: bool) -> Result<ExitCode> {
    let assistant = Assistant::from_config(config)?;
    let context = if with_context {
        Some(context::gather(DEFAULT_CONTEXT_ENTRIES).await.render())
    } else {
        None
    };

    let suggestion = assistant.suggest(query, context.as_deref()).await?;
    if suggestion.is_degraded() {
        eprintln!("{}", format!("Using {}", suggestion.source).yellow());
    }
    ui::print_assessment(&suggestion.assessment);

    if policy.gate_for(&suggestion.assessment) == Gate::Blocked {
        eprintln!("  {}", suggestion.command);
        ui::print_blocked();
        return Ok(ExitCode::from(EXIT_BLOCKED));
    }

    println!("{}", suggestion.command);
    Ok(ExitCode::SUCCESS)
}

async fn explain(config: &Config, command: &str) -> Result<ExitCode> {
    let assistant = Assistant::from_config(config)?;
    let routed = assistant
        .explain(command)
        .await
        .context("Could not get an explanation")?;
    tracing::info!("Explanation from {}", routed.backend);

    println!("{}", routed.value);
    ui::print_assessment(&assistant.classifier().classify(command));
    Ok(ExitCode::SUCCESS)
}

async fn chat(config: &Config, message: &str) -> Result<ExitCode> {
    let assistant = Assistant::from_config(config)?;
    let mut session = assistant.chat_session();

    if !message.is_empty() {
        return Ok(match chat_turn(&mut session, message).await? {
            true => ExitCode::SUCCESS,
            false => ExitCode::from(EXIT_INTERRUPTED),
        });
    }

    eprintln!("{}", "Chat with tern. Empty line or Ctrl-D to leave.".dim());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("{} ", ">".cyan().bold());
        std::io::stderr().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line.filter(|l| !l.trim().is_empty()) else {
            eprintln!();
            break;
        };
        chat_turn(&mut session, &line).await?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Stream one reply to stdout. Returns false if the user interrupted it.
async fn chat_turn(session: &mut ChatSession, message: &str) -> Result<bool> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut stdout = std::io::stdout();
    let result = session
        .send_streaming(message, &cancel, |fragment| {
            let _ = write!(stdout, "{}", fragment);
            let _ = stdout.flush();
        })
        .await;
    watcher.abort();
    println!();

    match result {
        Ok(routed) => {
            tracing::debug!("Reply from {} ({} chars)", routed.backend, routed.value.len());
            Ok(true)
        }
        Err(RouteError::Cancelled) => {
            eprintln!("{}", "(interrupted)".dim());
            Ok(false)
        }
        Err(e) => Err(e).context("Chat failed"),
    }
}

async fn plan(
    config: &Config,
    policy: GatePolicy,
    goal: &str,
    dry_run: bool,
    yes: bool,
    json: bool,
) -> Result<ExitCode> {
    let orchestrator = Arc::new(Orchestrator::from_config(config)?);
    let engine = PlanEngine::new(orchestrator, RiskClassifier::default(), policy)
        .with_settings(config.generation_settings());

    let mut plan = engine.decompose(goal).await.context("Planning failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!("{} {}", "Plan:".cyan().bold(), plan.goal());
    if let Some(notes) = plan.notes() {
        eprintln!("{} {}", "Notes:".dim(), notes);
    }

    if dry_run {
        for step in plan.steps() {
            ui::print_step(step);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut handed_off: Vec<String> = Vec::new();
    loop {
        let step = match engine.advance(&mut plan)? {
            PlanProgress::Step(step) => step,
            PlanProgress::Finished(summary) => {
                eprintln!();
                eprintln!("{}", summary.to_string().dim());
                break;
            }
        };
        ui::print_step(&step);

        let decision = match step.gate {
            Gate::Blocked => Decision::Skip,
            Gate::AutoConfirm => Decision::Confirm,
            Gate::Confirm if yes => Decision::Confirm,
            Gate::Confirm => match ui::ask_gate(step.ordinal) {
                GateAnswer::Confirm => Decision::Confirm,
                GateAnswer::Skip => Decision::Skip,
                GateAnswer::Quit => {
                    engine.abort(&mut plan)?;
                    continue;
                }
            },
        };
        engine.mark(&mut plan, step.ordinal, decision)?;
        if decision == Decision::Skip {
            continue;
        }

        if yes {
            // The calling shell runs the chain; `&&` stops it at the first failure
            handed_off.push(step.command.clone());
            engine.record_outcome(&mut plan, step.ordinal, StepOutcome::Executed, OnFailure::Abort)?;
            continue;
        }

        println!("{}", step.command);
        if ui::confirm(&format!("Did step {} succeed?", step.ordinal), true) {
            engine.record_outcome(&mut plan, step.ordinal, StepOutcome::Executed, OnFailure::Abort)?;
            continue;
        }

        match ui::ask_failure(step.ordinal) {
            FailureAnswer::Retry => {
                engine.record_outcome(&mut plan, step.ordinal, StepOutcome::Failed, OnFailure::Continue)?;
                engine.append_retry(&mut plan, step.ordinal)?;
            }
            FailureAnswer::Continue => {
                engine.record_outcome(&mut plan, step.ordinal, StepOutcome::Failed, OnFailure::Continue)?;
            }
            FailureAnswer::Abort => {
                engine.record_outcome(&mut plan, step.ordinal, StepOutcome::Failed, OnFailure::Abort)?;
            }
        }
    }

    if !handed_off.is_empty() {
        println!("{}", handed_off.join(" && "));
    }

    Ok(match plan.state() {
        PlanState::Aborted => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

fn classify(policy: &GatePolicy, command: &str) -> ExitCode {
    let assessment = RiskClassifier::default().classify(command);

    println!("{} ({})", ui::tier_label(assessment.tier), assessment.matched_rule);
    println!("  {}", assessment.rationale);
    for reason in assessment.reasons.iter().skip(1) {
        println!("  {}", reason);
    }
    if let Some(suggestion) = &assessment.suggestion {
        println!("{}", suggestion.as_str().cyan());
    }

    match policy.gate_for(&assessment) {
        Gate::Blocked => ExitCode::from(EXIT_BLOCKED),
        _ => ExitCode::SUCCESS,
    }
}

async fn backends(config: &Config) -> Result<ExitCode> {
    let orchestrator = Orchestrator::from_config(config)?;
    let reports = orchestrator.probe_all().await;

    for (i, report) in reports.iter().enumerate() {
        let status = if report.available {
            "up".green()
        } else {
            "down".red()
        };
        println!("{}. {:<8} {} {}", i + 1, report.kind.as_str(), status, report.name);
    }

    if reports.iter().any(|r| r.available) {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{}", "No backend reachable; ask will use heuristics.".yellow());
        Ok(ExitCode::FAILURE)
    }
}

// src/cli/chat.rs — Interactive REPL and one-shot ask

use std::io::Write;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;

use super::session::{self, StorePaths};
use crate::core::orchestrator::{PromptSource, SessionOrchestrator};
use crate::core::types::{CostInfo, StopReason, TurnOutcome, TurnReply};
use crate::infra::config::Config;

/// Prompts read line by line from stdin.
pub struct StdinPrompts {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinPrompts {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinPrompts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PromptSource for StdinPrompts {
    async fn next_prompt(&mut self) -> Option<String> {
        print!("> ");
        std::io::stdout().flush().ok();
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to read stdin: {}", e);
                None
            }
        }
    }
}

/// One-line spend summary for a turn.
pub fn cost_line(model: &str, cost: Option<&CostInfo>) -> String {
    match cost {
        None => format!("[{model}] offline, no cost"),
        Some(c) => format!(
            "[{model}] ${:.6} this turn, ${:.2} / ${:.2} ({:.1}%)",
            c.turn_cost,
            c.cumulative_cost,
            c.cap,
            c.percent_of_cap()
        ),
    }
}

pub fn format_reply(reply: &TurnReply, quiet: bool) -> String {
    let mut out = format!("\nAssistant ({}):\n{}\n", reply.model, reply.display);
    if !quiet {
        out.push('\n');
        out.push_str(&cost_line(&reply.model, reply.cost.as_ref()));
        out.push('\n');
    }
    out
}

pub fn stop_message(reason: StopReason, cap: f64) -> String {
    match reason {
        StopReason::EmptyInput => "Cancelled by user.".into(),
        StopReason::BudgetExceeded => format!("Budget cap of ${cap:.2} reached."),
        StopReason::Shutdown => "Shutting down.".into(),
        StopReason::SourceExhausted => "End of input.".into(),
    }
}

fn report(outcome: &TurnOutcome, quiet: bool) {
    match outcome {
        TurnOutcome::Reply(reply) => {
            for d in &reply.diagnostics {
                eprintln!("warning: {d}");
            }
            println!("{}", format_reply(reply, quiet));
        }
        TurnOutcome::Failed(e) => eprintln!("error: {e}"),
        TurnOutcome::Stopped { error: Some(e), .. } => eprintln!("{e}"),
        TurnOutcome::Stopped { error: None, .. } => {}
    }
}

fn open_session(
    model_flag: Option<&str>,
    config: &Config,
    interactive: bool,
    shutdown: CancellationToken,
) -> anyhow::Result<Option<SessionOrchestrator>> {
    let kind = match model_flag {
        Some(_) => session::model_from_flags(model_flag, config)?,
        None if interactive => match session::pick_model(config)? {
            Some(k) => k,
            None => {
                eprintln!("Model selection cancelled.");
                return Ok(None);
            }
        },
        None => session::model_from_flags(None, config)?,
    };
    let dispatcher = session::build_dispatcher(kind, config)?;
    Ok(Some(session::build_session(
        dispatcher,
        config,
        &StorePaths::default_locations(),
        shutdown,
    )))
}

/// Run the interactive session until the user stops or a signal arrives.
pub async fn run_chat(
    model_flag: Option<&str>,
    config: &Config,
    quiet: bool,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let Some(mut orch) = open_session(model_flag, config, true, shutdown)? else {
        return Ok(());
    };

    let model = orch.state().selected_model.name.clone();
    eprintln!(
        "parley v{} | {} | Enter an empty line to quit\n",
        env!("CARGO_PKG_VERSION"),
        model
    );
    if orch.budget_exhausted() {
        eprintln!("{}", stop_message(StopReason::BudgetExceeded, orch.settings().budget_cap));
        return Ok(());
    }

    let mut source = StdinPrompts::new();
    let reason = orch.run(&mut source, |o| report(o, quiet)).await;
    eprintln!("{}", stop_message(reason, orch.settings().budget_cap));

    orch.finish().await;
    Ok(())
}

/// Send one prompt through a session on `models.default` (or `--model`).
pub async fn run_ask(
    prompt: &str,
    model_flag: Option<&str>,
    config: &Config,
    quiet: bool,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let Some(mut orch) = open_session(model_flag, config, false, shutdown)? else {
        return Ok(());
    };

    if !quiet {
        println!("You:\n{}", orch.prompt_echo(prompt));
    }
    let outcome = orch.turn(prompt).await;
    report(&outcome, quiet);
    orch.finish().await;

    match outcome {
        TurnOutcome::Reply(_) => Ok(()),
        TurnOutcome::Failed(e) => Err(e.into()),
        TurnOutcome::Stopped { reason, error } => match error {
            Some(e) => Err(e.into()),
            None => anyhow::bail!("{}", stop_message(reason, orch.settings().budget_cap)),
        },
    }
}

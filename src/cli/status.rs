// src/cli/status.rs — Status display

use std::path::Path;

use crate::core::context::build_context;
use crate::core::ledger::{UsageLedger, UsageRecord};
use crate::core::transcript::ChatLog;
use crate::infra::config::Config;
use crate::infra::paths;

use super::session::StorePaths;

/// Display model, credential, spend and transcript status.
pub fn show_status(config: &Config, config_path: Option<&Path>) -> anyhow::Result<()> {
    let stores = StorePaths::default_locations();
    let default_config = paths::config_file_path();
    let config_path = config_path.unwrap_or(&default_config);

    println!("parley v{}", env!("CARGO_PKG_VERSION"));
    println!();
    for line in status_lines(config, config_path, &stores) {
        println!("{line}");
    }
    Ok(())
}

pub fn status_lines(config: &Config, config_path: &Path, stores: &StorePaths) -> Vec<String> {
    let mut lines = Vec::new();

    if config_path.exists() {
        lines.push(format!("  Config:     {} (loaded)", config_path.display()));
    } else {
        lines.push("  Config:     (using defaults)".into());
    }
    lines.push(format!("  Default:    {}", config.models.default));
    lines.push(format!(
        "  API key:    {}",
        if config.api_key().is_ok() {
            "found"
        } else {
            "missing (offline model only)"
        }
    ));

    let ledger = UsageLedger::new(&stores.usage, config.pricing_table());
    let usage = ledger.load();
    lines.push(String::new());
    lines.push("  Spend:".into());
    lines.extend(spend_lines(&usage, config.budget.max_yearly_cost));

    let log = ChatLog::new(&stores.transcript);
    lines.push(String::new());
    match log.tail(config.context.max_chars) {
        Ok(tail) if !tail.is_empty() => {
            let window = build_context(&tail, config.context.max_exchanges);
            lines.push(format!(
                "  Transcript: {} ({} recent exchanges in context)",
                log.path().display(),
                window.len()
            ));
        }
        Ok(_) => lines.push(format!("  Transcript: {} (empty)", log.path().display())),
        Err(e) => lines.push(format!("  Transcript: {e}")),
    }
    lines
}

fn spend_lines(usage: &UsageRecord, cap: f64) -> Vec<String> {
    let percent = if cap > 0.0 {
        usage.total_cost / cap * 100.0
    } else {
        100.0
    };
    let mut lines = vec![
        format!(
            "    Tokens:   {} in / {} out",
            usage.input_tokens, usage.output_tokens
        ),
        format!(
            "    Cost:     ${:.4} of ${:.2} ({:.1}%)",
            usage.total_cost, cap, percent
        ),
    ];
    if usage.over_budget(cap) {
        lines.push("    Budget cap reached; online models are refused.".into());
    }
    lines
}

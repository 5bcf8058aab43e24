// src/core/ledger.rs — Persistent token/cost counters
//
// The usage file is the only source of truth for budget enforcement. Reads
// fail soft to a zero record; writes are atomic (temp file + rename) and
// report failures without rolling back the in-memory record.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::cost::{round6, PricingTable};
use crate::infra::errors::ParleyError;

/// Cumulative spend. Field names match the on-disk JSON keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(rename = "input")]
    pub input_tokens: u64,
    #[serde(rename = "output")]
    pub output_tokens: u64,
    #[serde(rename = "total")]
    pub total_cost: f64,
}

impl UsageRecord {
    fn is_valid(&self) -> bool {
        self.total_cost.is_finite() && self.total_cost >= 0.0
    }

    pub fn over_budget(&self, cap: f64) -> bool {
        self.total_cost >= cap
    }
}

/// Outcome of recording one remote turn.
#[derive(Debug)]
pub struct RecordedUsage {
    pub record: UsageRecord,
    pub cost: f64,
    /// Set when the updated record could not be persisted.
    pub save_error: Option<ParleyError>,
}

pub struct UsageLedger {
    path: PathBuf,
    pricing: PricingTable,
}

impl UsageLedger {
    pub fn new(path: impl Into<PathBuf>, pricing: PricingTable) -> Self {
        Self {
            path: path.into(),
            pricing,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Create the store with a zero record if it does not exist yet.
    pub fn ensure(&self) -> Result<(), ParleyError> {
        if self.path.exists() {
            return Ok(());
        }
        self.save(&UsageRecord::default())
    }

    /// Read the record. Any read, parse or schema problem yields zeros.
    pub fn load(&self) -> UsageRecord {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Could not read {}: {}", self.path.display(), e);
                }
                return UsageRecord::default();
            }
        };
        match serde_json::from_str::<UsageRecord>(&content) {
            Ok(r) if r.is_valid() => r,
            Ok(r) => {
                tracing::warn!("Ignoring usage record with invalid total {}", r.total_cost);
                UsageRecord::default()
            }
            Err(e) => {
                tracing::warn!("Malformed usage file {}: {}", self.path.display(), e);
                UsageRecord::default()
            }
        }
    }

    /// Rewrite the store wholesale.
    pub fn save(&self, record: &UsageRecord) -> Result<(), ParleyError> {
        self.write_atomic(record)
            .map_err(|e| ParleyError::storage(&self.path, e))
    }

    fn write_atomic(&self, record: &UsageRecord) -> anyhow::Result<()> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(record)?;
        let tmp = dir.join(".usage.json.tmp");
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(json.as_bytes())?;
        f.flush()?;
        f.sync_all()?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.pricing.estimate_cost(model, input_tokens, output_tokens)
    }

    /// Add one turn's tokens and cost to `record` and persist it.
    pub fn record_usage(
        &self,
        mut record: UsageRecord,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> RecordedUsage {
        let cost = self.estimate_cost(model, input_tokens, output_tokens);
        record.input_tokens = record.input_tokens.saturating_add(input_tokens);
        record.output_tokens = record.output_tokens.saturating_add(output_tokens);
        record.total_cost = round6(record.total_cost + cost);

        tracing::info!(
            model,
            input_tokens,
            output_tokens,
            cost,
            total = record.total_cost,
            "usage recorded"
        );

        let save_error = self.save(&record).err();
        if let Some(ref e) = save_error {
            tracing::warn!("{}", e);
        }
        RecordedUsage {
            record,
            cost,
            save_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger(dir: &TempDir) -> UsageLedger {
        UsageLedger::new(dir.path().join("usage.json"), PricingTable::builtin())
    }

    #[test]
    fn test_load_missing_is_zero() {
        let dir = TempDir::new().unwrap();
        assert_eq!(ledger(&dir).load(), UsageRecord::default());
    }

    #[test]
    fn test_ensure_creates_zero_record() {
        let dir = TempDir::new().unwrap();
        let l = UsageLedger::new(dir.path().join("logs/usage.json"), PricingTable::builtin());
        l.ensure().unwrap();
        let raw = std::fs::read_to_string(l.path()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["input"], 0);
        assert_eq!(v["output"], 0);
        assert_eq!(v["total"], 0.0);
    }

    #[test]
    fn test_ensure_keeps_existing() {
        let dir = TempDir::new().unwrap();
        let l = ledger(&dir);
        std::fs::write(l.path(), r#"{"input": 7, "output": 3, "total": 1.5}"#).unwrap();
        l.ensure().unwrap();
        assert_eq!(l.load().input_tokens, 7);
    }

    #[test]
    fn test_load_reads_plain_format() {
        let dir = TempDir::new().unwrap();
        let l = ledger(&dir);
        std::fs::write(
            l.path(),
            r#"{"input": 1200, "output": 800, "total": 0.0018}"#,
        )
        .unwrap();
        let r = l.load();
        assert_eq!(r.input_tokens, 1200);
        assert_eq!(r.output_tokens, 800);
        assert!((r.total_cost - 0.0018).abs() < 1e-12);
    }

    #[test]
    fn test_load_malformed_is_zero() {
        let dir = TempDir::new().unwrap();
        let l = ledger(&dir);
        std::fs::write(l.path(), "{not json").unwrap();
        assert_eq!(l.load(), UsageRecord::default());
    }

    #[test]
    fn test_load_missing_key_is_zero() {
        let dir = TempDir::new().unwrap();
        let l = ledger(&dir);
        std::fs::write(l.path(), r#"{"input": 5, "output": 5}"#).unwrap();
        assert_eq!(l.load(), UsageRecord::default());
    }

    #[test]
    fn test_load_negative_total_is_zero() {
        let dir = TempDir::new().unwrap();
        let l = ledger(&dir);
        std::fs::write(l.path(), r#"{"input": 5, "output": 5, "total": -2.0}"#).unwrap();
        assert_eq!(l.load(), UsageRecord::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let l = ledger(&dir);
        let r = UsageRecord {
            input_tokens: 10,
            output_tokens: 20,
            total_cost: 0.25,
        };
        l.save(&r).unwrap();
        assert_eq!(l.load(), r);
        assert!(!dir.path().join(".usage.json.tmp").exists());
    }

    #[test]
    fn test_save_failure_is_storage_error() {
        let dir = TempDir::new().unwrap();
        // Parent "directory" is a regular file
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let l = UsageLedger::new(blocker.join("usage.json"), PricingTable::builtin());
        let err = l.save(&UsageRecord::default()).unwrap_err();
        assert!(matches!(err, ParleyError::Storage { .. }));
    }

    #[test]
    fn test_record_usage_accumulates_and_persists() {
        let dir = TempDir::new().unwrap();
        let l = ledger(&dir);
        let turns = [(1000u64, 500u64), (2500, 1200), (40, 9000)];

        let mut record = l.load();
        let mut expected = 0.0;
        for (i, o) in turns {
            expected += l.estimate_cost("gpt-4o", i, o);
            let out = l.record_usage(record, "gpt-4o", i, o);
            assert!(out.save_error.is_none());
            record = out.record;
        }

        assert_eq!(record.input_tokens, 3540);
        assert_eq!(record.output_tokens, 10_700);
        assert!((record.total_cost - expected).abs() < 1e-6);
        let stored = l.load();
        assert_eq!(stored.input_tokens, record.input_tokens);
        assert!((stored.total_cost - record.total_cost).abs() < 1e-12);
    }

    #[test]
    fn test_record_usage_saturates_huge_counters() {
        let dir = TempDir::new().unwrap();
        let l = ledger(&dir);
        std::fs::write(
            l.path(),
            format!(r#"{{"input": {}, "output": 7, "total": 1.0}}"#, u64::MAX),
        )
        .unwrap();

        let out = l.record_usage(l.load(), "gpt-4o", 10, 3);
        assert_eq!(out.record.input_tokens, u64::MAX);
        assert_eq!(out.record.output_tokens, 10);
        assert!(out.save_error.is_none());
    }

    #[test]
    fn test_record_usage_keeps_memory_state_when_save_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let l = UsageLedger::new(blocker.join("usage.json"), PricingTable::builtin());

        let out = l.record_usage(UsageRecord::default(), "gpt-3.5-turbo", 1_000_000, 0);
        assert!(out.save_error.is_some());
        assert_eq!(out.record.input_tokens, 1_000_000);
        assert!((out.record.total_cost - 0.5).abs() < 1e-9);
        assert!((out.cost - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_total_cost_never_decreases() {
        let dir = TempDir::new().unwrap();
        let l = ledger(&dir);
        let mut record = UsageRecord::default();
        for n in [0u64, 1, 17, 0, 250_000] {
            let before = record.total_cost;
            record = l.record_usage(record, "gpt-3.5-turbo", n, n).record;
            assert!(record.total_cost >= before);
        }
    }

    #[test]
    fn test_over_budget_at_cap() {
        let r = UsageRecord {
            input_tokens: 0,
            output_tokens: 0,
            total_cost: 5.0,
        };
        assert!(r.over_budget(5.0));
        assert!(!r.over_budget(5.01));
    }
}

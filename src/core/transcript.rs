// src/core/transcript.rs — Append-only chat transcript
//
// Each exchange is one block:
//
//   --- 2026-02-21 10:30:00 ---
//   You: <prompt>
//   Assistant: <reply>
//   <blank line>
//
// The raw model reply is stored; display normalization never touches disk.

use chrono::{Local, NaiveDateTime};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::context::tail_chars;
use crate::infra::errors::ParleyError;

pub const PROMPT_PREFIX: &str = "You:";
pub const REPLY_PREFIX: &str = "Assistant:";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct ChatLog {
    path: PathBuf,
}

impl ChatLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the transcript (and its directory) if absent.
    pub fn ensure(&self) -> Result<(), ParleyError> {
        self.open_append()
            .map(|_| ())
            .map_err(|e| ParleyError::storage(&self.path, e))
    }

    fn open_append(&self) -> std::io::Result<std::fs::File> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
    }

    /// Append one exchange stamped with the current local time.
    pub fn append(&self, prompt: &str, reply: &str) -> Result<(), ParleyError> {
        self.append_at(Local::now().naive_local(), prompt, reply)
    }

    pub fn append_at(
        &self,
        timestamp: NaiveDateTime,
        prompt: &str,
        reply: &str,
    ) -> Result<(), ParleyError> {
        let block = format!(
            "--- {} ---\n{PROMPT_PREFIX} {prompt}\n{REPLY_PREFIX} {reply}\n\n",
            timestamp.format(TIMESTAMP_FORMAT)
        );
        let mut f = self
            .open_append()
            .map_err(|e| ParleyError::storage(&self.path, e))?;
        f.write_all(block.as_bytes())
            .map_err(|e| ParleyError::storage(&self.path, e))?;
        tracing::debug!("Appended exchange to {}", self.path.display());
        Ok(())
    }

    /// Last `max_chars` characters of the transcript; empty when it does not exist.
    pub fn tail(&self, max_chars: usize) -> Result<String, ParleyError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(tail_chars(&content, max_chars).to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(ParleyError::storage(&self.path, e)),
        }
    }
}

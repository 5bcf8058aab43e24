// src/core/context.rs — Sliding-window context from the transcript tail

use chrono::NaiveDateTime;

use super::transcript::{PROMPT_PREFIX, REPLY_PREFIX, TIMESTAMP_FORMAT};

/// One logged prompt/reply pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatExchange {
    /// Absent when the block header fell outside the scanned tail.
    pub timestamp: Option<NaiveDateTime>,
    pub prompt: String,
    pub reply: String,
}

/// Recent exchanges, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextWindow {
    pub exchanges: Vec<ChatExchange>,
}

impl ContextWindow {
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// The window as a transcript-style prefix, exchanges separated by a blank line.
    pub fn render(&self) -> String {
        self.exchanges
            .iter()
            .map(|e| format!("{PROMPT_PREFIX} {}\n{REPLY_PREFIX} {}", e.prompt, e.reply))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// The text actually sent to the model: the window followed by the new prompt,
    /// or the prompt unmodified when the window is empty.
    pub fn prompt_with_context(&self, prompt: &str) -> String {
        if self.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n{PROMPT_PREFIX} {prompt}", self.render())
        }
    }
}

/// Last `max_chars` characters of `s`, cut on a char boundary.
pub fn tail_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((idx, _)) if max_chars > 0 => &s[idx..],
        _ if max_chars == 0 => "",
        _ => s,
    }
}

fn parse_header(line: &str) -> Option<Option<NaiveDateTime>> {
    let inner = line.strip_prefix("--- ")?.strip_suffix(" ---")?;
    Some(NaiveDateTime::parse_from_str(inner.trim(), TIMESTAMP_FORMAT).ok())
}

/// Rebuild up to `max_exchanges` of the most recent exchanges from a transcript.
///
/// Lines are scanned from the end. A reply completes a pair when the prompt
/// line above it is reached; replies without a prompt and prompts without a
/// reply are dropped. Unprefixed lines are continuations of the entry above.
pub fn build_context(transcript_tail: &str, max_exchanges: usize) -> ContextWindow {
    let mut collected: Vec<ChatExchange> = Vec::new();
    let mut pending_reply: Option<String> = None;
    // Continuation lines, in reverse order
    let mut continuation: Vec<&str> = Vec::new();
    // The newest pair still waiting for its header line
    let mut awaiting_header = false;

    for line in transcript_tail.lines().rev() {
        if let Some(ts) = parse_header(line) {
            if awaiting_header {
                if let Some(last) = collected.last_mut() {
                    last.timestamp = ts;
                }
            }
            awaiting_header = false;
            pending_reply = None;
            continuation.clear();
            if collected.len() >= max_exchanges {
                break;
            }
            continue;
        }

        if collected.len() >= max_exchanges {
            // Only the header of the last pair is still of interest
            if line.trim().is_empty() {
                continue;
            }
            break;
        }

        if let Some(rest) = line.strip_prefix(REPLY_PREFIX) {
            pending_reply = Some(join_entry(rest, &mut continuation));
            awaiting_header = false;
        } else if let Some(rest) = line.strip_prefix(PROMPT_PREFIX) {
            let prompt = join_entry(rest, &mut continuation);
            if let Some(reply) = pending_reply.take() {
                collected.push(ChatExchange {
                    timestamp: None,
                    prompt,
                    reply,
                });
                awaiting_header = true;
            }
        } else {
            continuation.push(line);
        }
    }

    collected.reverse();
    ContextWindow {
        exchanges: collected,
    }
}

fn join_entry(first: &str, continuation: &mut Vec<&str>) -> String {
    let mut text = first.trim_start().to_string();
    for line in continuation.drain(..).rev() {
        text.push('\n');
        text.push_str(line);
    }
    text.trim_end().to_string()
}

/// Build the window from at most the last `max_chars` of `transcript`.
pub fn build_context_bounded(
    transcript: &str,
    max_exchanges: usize,
    max_chars: usize,
) -> ContextWindow {
    build_context(tail_chars(transcript, max_chars), max_exchanges)
}

// src/provider/local.rs — Offline keyword responder
//
// Categories are checked in order and the first one with a keyword matching
// one of the prompt's words wins. Keywords match inflected forms ("thinking",
// "coding", "systems"); very short ones must match the whole word. Prompts
// matching nothing fall back by length.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::infra::errors::ParleyError;

pub const GENERAL: &str = "general";
pub const HELPFUL: &str = "helpful";
pub const THINKING: &str = "thinking";

const SHORT_PROMPT_CHARS: usize = 20;
const MEDIUM_PROMPT_CHARS: usize = 50;

const BUILTIN_CATEGORIES: &[(&str, &[&str])] = &[
    ("greeting", &["hello", "hi", "hey", "greetings"]),
    ("helpful", &["help", "assist", "support"]),
    ("thinking", &["think", "thought", "consider", "reflect"]),
    ("creative", &["creative", "imagine", "design", "art", "story"]),
    (
        "technical",
        &["technical", "code", "programming", "algorithm", "system"],
    ),
];

const BUILTIN_RESPONSES: &[(&str, &[&str])] = &[
    (
        "greeting",
        &[
            "Hello! I'm your offline AI assistant. How can I help you today?",
            "Hi there! I'm here to assist you with your questions and tasks.",
            "Greetings! I'm your local AI assistant, ready to help.",
        ],
    ),
    (
        "general",
        &[
            "That's an interesting question. Let me think about that for you.",
            "I understand what you're asking. Here's what I can tell you about that.",
            "That's a good point. Let me provide some insights on this topic.",
            "I see what you mean. Here's my perspective on that matter.",
            "That's a thoughtful question. Let me share some information about that.",
        ],
    ),
    (
        "technical",
        &[
            "From a technical perspective, this involves several key considerations.",
            "Technically speaking, there are a few important aspects to consider here.",
            "In technical terms, this relates to several fundamental concepts.",
            "From a technical standpoint, this touches on several important principles.",
        ],
    ),
    (
        "creative",
        &[
            "That's a creative idea! Let me explore some possibilities with you.",
            "I love the creativity in your question. Here are some interesting angles to consider.",
            "That's an imaginative approach. Let me suggest some creative solutions.",
            "Your creative thinking is inspiring. Here are some innovative perspectives.",
        ],
    ),
    (
        "helpful",
        &[
            "I'd be happy to help you with that. Here's what I can suggest.",
            "Let me assist you with that. Here are some helpful approaches.",
            "I'm here to help! Here's what I can offer for your situation.",
            "I'd love to help you with this. Here are some useful suggestions.",
        ],
    ),
    (
        "thinking",
        &[
            "Let me think about that for a moment...",
            "That's an interesting challenge. Let me consider the options...",
            "Hmm, that's a good question. Let me reflect on this...",
            "That's worth thinking about. Let me explore this further...",
        ],
    ),
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Category {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Keyword table plus response pools, as loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseTables {
    pub categories: Vec<Category>,
    pub responses: BTreeMap<String, Vec<String>>,
}

impl ResponseTables {
    pub fn builtin() -> Self {
        Self {
            categories: BUILTIN_CATEGORIES
                .iter()
                .map(|(name, kws)| Category {
                    name: (*name).into(),
                    keywords: kws.iter().map(|k| (*k).into()).collect(),
                })
                .collect(),
            responses: BUILTIN_RESPONSES
                .iter()
                .map(|(name, pool)| ((*name).into(), pool.iter().map(|r| (*r).into()).collect()))
                .collect(),
        }
    }

    /// Every category and every fallback bucket needs a non-empty pool.
    fn validate(&self) -> Result<(), String> {
        let required = self
            .categories
            .iter()
            .map(|c| c.name.as_str())
            .chain([GENERAL, HELPFUL, THINKING]);
        for name in required {
            match self.responses.get(name) {
                Some(pool) if !pool.is_empty() => {}
                _ => return Err(format!("no responses for category '{name}'")),
            }
        }
        Ok(())
    }
}

/// Which pool(s) a prompt draws from.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Category(String),
    /// No keyword matched; one response from each listed pool, space-joined.
    Fallback(Vec<&'static str>),
}

pub struct LocalResponder {
    tables: ResponseTables,
}

impl Default for LocalResponder {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LocalResponder {
    pub fn builtin() -> Self {
        Self {
            tables: ResponseTables::builtin(),
        }
    }

    pub fn from_tables(tables: ResponseTables) -> Result<Self, ParleyError> {
        tables.validate().map_err(ParleyError::Config)?;
        Ok(Self { tables })
    }

    pub fn from_file(path: &Path) -> Result<Self, ParleyError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ParleyError::storage(path, e))?;
        let mut tables: ResponseTables = toml::from_str(&content)
            .map_err(|e| ParleyError::Config(format!("{}: {}", path.display(), e)))?;
        for c in &mut tables.categories {
            for k in &mut c.keywords {
                *k = k.to_lowercase();
            }
        }
        Self::from_tables(tables)
    }

    /// Use the tables at `path` when given and valid, else the built-in ones.
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::from_file(p).unwrap_or_else(|e| {
                tracing::warn!("Using built-in local responses: {}", e);
                Self::builtin()
            }),
            None => Self::builtin(),
        }
    }

    pub fn pool(&self, category: &str) -> &[String] {
        self.tables
            .responses
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn classify(&self, prompt: &str) -> Classification {
        let lower = prompt.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let hit = self
            .tables
            .categories
            .iter()
            .find(|c| {
                c.keywords
                    .iter()
                    .any(|k| words.iter().any(|w| keyword_matches(w, k)))
            });
        if let Some(c) = hit {
            return Classification::Category(c.name.clone());
        }

        let len = prompt.chars().count();
        if len < SHORT_PROMPT_CHARS {
            Classification::Fallback(vec![GENERAL])
        } else if len < MEDIUM_PROMPT_CHARS {
            Classification::Fallback(vec![HELPFUL])
        } else {
            Classification::Fallback(vec![GENERAL, THINKING])
        }
    }

    pub fn respond(&self, prompt: &str) -> String {
        self.respond_with(prompt, &mut rand::thread_rng())
    }

    pub fn respond_with<R: Rng + ?Sized>(&self, prompt: &str, rng: &mut R) -> String {
        let pools: Vec<&str> = match self.classify(prompt) {
            Classification::Category(name) => {
                return self.pick(&name, rng);
            }
            Classification::Fallback(pools) => pools,
        };
        pools
            .into_iter()
            .map(|p| self.pick(p, rng))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn pick<R: Rng + ?Sized>(&self, category: &str, rng: &mut R) -> String {
        self.pool(category)
            .choose(rng)
            .cloned()
            .unwrap_or_default()
    }
}

/// `word` is `keyword` or an inflection of it: "think" matches "thinking",
/// "code" matches "coding". Keywords under three letters need an exact match.
fn keyword_matches(word: &str, keyword: &str) -> bool {
    if keyword.chars().count() < 3 {
        return word == keyword;
    }
    let stem = keyword.strip_suffix('e').unwrap_or(keyword);
    word.starts_with(stem) && word.len() >= keyword.len()
}

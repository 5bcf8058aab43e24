// src/core/normalize.rs — Reply text normalization
//
// Stage 1 turns LaTeX-style markup into plain text. Stage 2 wraps the result
// into indented paragraphs for the terminal. Both stages are pure.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use unicode_width::UnicodeWidthStr;

/// Literal substitutions, applied in order after the structural rewrites.
///
/// Order matters: a pattern that is a prefix of another must come after it
/// (`\infty` before `\in`). Patterns must be unique; see `substitutions()`.
pub const SUBSTITUTIONS: &[(&str, &str)] = &[
    (r"\sum_{", "Σ_"),
    (r"\prod_{", "Π_"),
    (r"\int_{", "∫_"),
    (r"\lim_{", "lim_"),
    (r"\max_{", "max_"),
    (r"\min_{", "min_"),
    (r"\sup_{", "sup_"),
    (r"\inf_{", "inf_"),
    (r"\log_{", "log_"),
    (r"\bmod{", "mod("),
    (r"\pmod{", "mod("),
    (r"\bmod", "mod"),
    (r"\pmod", "mod"),
    (r"\approx", "≈"),
    (r"\leq", "≤"),
    (r"\geq", "≥"),
    (r"\neq", "≠"),
    (r"\pm", "±"),
    (r"\times", "×"),
    (r"\div", "÷"),
    (r"\sqrt", "√"),
    (r"\sum", "Σ"),
    (r"\prod", "Π"),
    (r"\int", "∫"),
    (r"\infty", "∞"),
    (r"\alpha", "α"),
    (r"\beta", "β"),
    (r"\gamma", "γ"),
    (r"\delta", "δ"),
    (r"\theta", "θ"),
    (r"\lambda", "λ"),
    (r"\mu", "μ"),
    (r"\pi", "π"),
    (r"\sigma", "σ"),
    (r"\phi", "φ"),
    (r"\omega", "ω"),
    (r"\rightarrow", "→"),
    (r"\leftarrow", "←"),
    (r"\Rightarrow", "⇒"),
    (r"\Leftarrow", "⇐"),
    (r"\leftrightarrow", "↔"),
    (r"\Leftrightarrow", "⇔"),
    (r"\subseteq", "⊆"),
    (r"\subset", "⊂"),
    (r"\supseteq", "⊇"),
    (r"\supset", "⊃"),
    (r"\in", "∈"),
    (r"\notin", "∉"),
    (r"\cup", "∪"),
    (r"\cap", "∩"),
    (r"\emptyset", "∅"),
    (r"\forall", "∀"),
    (r"\exists", "∃"),
    (r"\nexists", "∄"),
    (r"\partial", "∂"),
    (r"\nabla", "∇"),
    (r"\cdot", "·"),
    (r"\circ", "∘"),
    (r"\bullet", "•"),
    (r"\diamond", "◇"),
    (r"\triangle", "△"),
    (r"\square", "□"),
    (r"\angle", "∠"),
    (r"\perp", "⊥"),
    (r"\parallel", "∥"),
    (r"\cong", "≅"),
    (r"\sim", "∼"),
    (r"\equiv", "≡"),
    (r"\propto", "∝"),
    (r"\oplus", "⊕"),
    (r"\otimes", "⊗"),
    (r"\ominus", "⊖"),
    (r"\oslash", "⊘"),
    (r"\bigoplus", "⨁"),
    (r"\bigotimes", "⨂"),
    (r"\bigcup", "⋃"),
    (r"\bigcap", "⋂"),
    (r"\ln", "ln"),
    (r"\exp", "exp"),
    (r"\sinh", "sinh"),
    (r"\sin", "sin"),
    (r"\cosh", "cosh"),
    (r"\cos", "cos"),
    (r"\tanh", "tanh"),
    (r"\tan", "tan"),
    (r"\csc", "csc"),
    (r"\sec", "sec"),
    (r"\cot", "cot"),
    (r"\arcsin", "arcsin"),
    (r"\arccos", "arccos"),
    (r"\arctan", "arctan"),
    (r"\det", "det"),
    (r"\dim", "dim"),
    (r"\ker", "ker"),
    (r"\im", "im"),
    (r"\Re", "Re"),
    (r"\Im", "Im"),
    (r"\arg", "arg"),
    (r"\deg", "deg"),
    (r"\binom{", "C("),
    (r"\choose", "C"),
    (r"\dbinom{", "C("),
    (r"\tbinom{", "C("),
    (r"\overline{", "¯"),
    (r"\underline{", "_"),
    (r"\widehat{", "^"),
    (r"\widetilde{", "~"),
    (r"\vec{", "→"),
    (r"\hat{", "^"),
    (r"\tilde", "~"),
    (r"\bar{", "¯"),
    (r"\dot{", "·"),
    (r"\ddot{", "··"),
    (r"\dddot{", "···"),
    (r"\ddddot{", "····"),
    (r"\prime", "'"),
    (r"\backslash", "\\"),
    (r"\$", "$"),
    (r"\#", "#"),
    (r"\&", "&"),
    (r"\%", "%"),
    (r"\~", "~"),
    (r"\^", "^"),
    (r"\\", "\\"),
    (r"\_", "_"),
    (r"\text{", ""),
    (r"\mathrm{", ""),
    (r"\mathbf{", ""),
    (r"\mathit{", ""),
    (r"\mathcal{", ""),
    (r"\mathbb{", ""),
    (r"\mathfrak{", ""),
    (r"\mathscr{", ""),
    (r"\mathsf{", ""),
    (r"\mathtt{", ""),
    (r"\textnormal{", ""),
    (r"\textrm{", ""),
    (r"\textsf{", ""),
    (r"\texttt{", ""),
    (r"\textup{", ""),
    (r"\textit{", ""),
    (r"\textsl{", ""),
    (r"\textsc{", ""),
    (r"\textmd{", ""),
    (r"\textlf{", ""),
    (r"\textbf{", ""),
];

struct Patterns {
    fraction: Regex,
    text_block: Regex,
    display_math: Regex,
    inline_math: Regex,
    command: Regex,
    whitespace: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        fraction: Regex::new(r"\\frac\{([^}]+)\}\{([^}]+)\}").unwrap(),
        text_block: Regex::new(r"\\text\{([^}]+)\}").unwrap(),
        display_math: Regex::new(r"(?s)\\\[(.*?)\\\]").unwrap(),
        inline_math: Regex::new(r"(?s)\\\((.*?)\\\)").unwrap(),
        command: Regex::new(r"\\[a-zA-Z]+").unwrap(),
        whitespace: Regex::new(r"\s+").unwrap(),
    })
}

/// `SUBSTITUTIONS` with later repeats of a pattern dropped (first occurrence wins).
pub fn substitutions() -> &'static [(&'static str, &'static str)] {
    static TABLE: OnceLock<Vec<(&'static str, &'static str)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut seen = HashSet::new();
        SUBSTITUTIONS
            .iter()
            .copied()
            .filter(|(pattern, _)| seen.insert(*pattern))
            .collect()
    })
}

/// Patterns that appear more than once in `SUBSTITUTIONS`.
pub fn duplicate_patterns() -> Vec<&'static str> {
    let mut seen = HashSet::new();
    SUBSTITUTIONS
        .iter()
        .filter(|(pattern, _)| !seen.insert(*pattern))
        .map(|(pattern, _)| *pattern)
        .collect()
}

// Escaped braces survive brace stripping as these private-use stand-ins.
const ESCAPED_OPEN: char = '\u{E000}';
const ESCAPED_CLOSE: char = '\u{E001}';

/// Stage 1: markup to plain text, whitespace collapsed and trimmed.
///
/// `\{` and `\}` come out as literal braces; all other braces are grouping
/// and are removed.
pub fn markup_to_plain(raw: &str) -> String {
    let p = patterns();

    let escaped = raw
        .replace(r"\{", &ESCAPED_OPEN.to_string())
        .replace(r"\}", &ESCAPED_CLOSE.to_string());
    let mut text = p.fraction.replace_all(&escaped, "$1 / $2").into_owned();
    text = p.text_block.replace_all(&text, "$1").into_owned();
    text = p.display_math.replace_all(&text, "$1").into_owned();
    text = p.inline_math.replace_all(&text, "$1").into_owned();

    for (pattern, replacement) in substitutions() {
        if text.contains(pattern) {
            text = text.replace(pattern, replacement);
        }
    }

    // Group braces carry no meaning once commands are gone. Entries like
    // `\sum_{` consume the opening brace, so closers can be unpaired here.
    text = text
        .chars()
        .filter(|c| *c != '{' && *c != '}')
        .map(|c| match c {
            ESCAPED_OPEN => '{',
            ESCAPED_CLOSE => '}',
            other => other,
        })
        .collect();

    text = p.command.replace_all(&text, "").into_owned();
    p.whitespace.replace_all(&text, " ").trim().to_string()
}

/// Stage 2: greedy word wrap per blank-line-separated paragraph.
///
/// `width` counts terminal columns including the indent. Words are never
/// split; a word wider than the line is emitted on a line of its own.
pub fn wrap(text: &str, width: usize, indent: &str) -> String {
    text.split("\n\n")
        .map(|paragraph| wrap_paragraph(paragraph, width, indent))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn wrap_paragraph(paragraph: &str, width: usize, indent: &str) -> String {
    let indent_width = indent.width();
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut line_width = 0;

    for word in paragraph.split_whitespace() {
        let word_width = word.width();
        if line.is_empty() {
            line.push_str(indent);
            line.push_str(word);
            line_width = indent_width + word_width;
        } else if line_width + 1 + word_width <= width {
            line.push(' ');
            line.push_str(word);
            line_width += 1 + word_width;
        } else {
            lines.push(std::mem::take(&mut line));
            line.push_str(indent);
            line.push_str(word);
            line_width = indent_width + word_width;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines.join("\n")
}

/// Display formatting for replies.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    pub width: usize,
    pub indent: String,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self {
            width: 80,
            indent: "  ".into(),
        }
    }
}

impl TextNormalizer {
    pub fn new(width: usize, indent: impl Into<String>) -> Self {
        Self {
            width,
            indent: indent.into(),
        }
    }

    /// Markup conversion followed by wrapping.
    pub fn normalize(&self, raw: &str) -> String {
        self.wrap(&markup_to_plain(raw))
    }

    pub fn wrap(&self, text: &str) -> String {
        wrap(text, self.width, &self.indent)
    }
}

// File: src/learning.rs
use crate::core::types::UNKNOWN_WORD;
use crate::lm::Learnable;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// Strips one trailing apostrophe from every token; a token that becomes
/// empty turns into `<unk>`.
pub fn strip_trailing_apostrophes(tokens: &mut [String]) {
    for token in tokens.iter_mut() {
        if let Some(stripped) = token.strip_suffix('\'') {
            *token = if stripped.is_empty() {
                UNKNOWN_WORD.to_string()
            } else {
                stripped.to_string()
            };
        }
    }
}

/// Drops the tokens at `indices` and returns the non-empty runs between
/// them.
pub fn split_tokens_at(tokens: &[String], indices: &[usize]) -> Vec<Vec<String>> {
    let mut sections = Vec::new();
    let mut current = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if indices.contains(&i) {
            if !current.is_empty() {
                sections.push(std::mem::take(&mut current));
            }
        } else {
            current.push(token.clone());
        }
    }
    if !current.is_empty() {
        sections.push(current);
    }
    sections
}

/// Positions whose token no model knows as an exact word. `codes[i][m]`
/// is the match code of token `i` in model `m` (1 means exact match).
/// With no models every position qualifies.
pub fn new_word_positions(codes: &[Vec<i32>]) -> Vec<usize> {
    codes
        .iter()
        .enumerate()
        .filter(|(_, per_model)| per_model.iter().all(|&code| code != 1))
        .map(|(i, _)| i)
        .collect()
}

/// Feeds token sections into learnable models and optionally keeps a
/// plain-text record of everything learned.
pub struct LearningEngine {
    log_path: Option<PathBuf>,
}

impl LearningEngine {
    pub fn new(log_path: Option<PathBuf>) -> Self {
        Self { log_path }
    }

    pub fn log_path(&self) -> Option<&PathBuf> {
        self.log_path.as_ref()
    }

    /// Learns each section on its own so that n-grams never span the
    /// dropped gaps between them.
    pub fn learn(&self, model: &mut dyn Learnable, sections: &[Vec<String>], allow_new_words: bool) {
        for section in sections {
            model.learn_tokens(section, allow_new_words);
        }
    }

    /// Appends one line per section followed by a blank line.
    pub fn log_sections(&self, sections: &[Vec<String>]) {
        let mut text = String::new();
        for section in sections {
            text.push_str(&section.join(" "));
            text.push('\n');
        }
        text.push('\n');
        self.append(&text);
    }

    pub fn log_event(&self, line: &str) {
        self.append(&format!("{line}\n"));
    }

    fn append(&self, text: &str) {
        let Some(path) = &self.log_path else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, "cannot create learning log directory");
                return;
            }
        }
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(text.as_bytes()));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "cannot write learning log");
        }
    }
}

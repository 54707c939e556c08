// File: src/core/tokenize.rs
//! Splits raw text into sentences and word tokens with character spans.

use crate::core::types::{Span, NUMBER_WORD, SENTENCE_BEGIN, UNKNOWN_WORD};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::error;

static TEXT_TOKEN: Lazy<Option<Regex>> = Lazy::new(|| token_pattern("'´΄"));
static CONTEXT_TOKEN: Lazy<Option<Regex>> = Lazy::new(|| token_pattern("\\-'´΄"));

/// Word, number and `<unk>` alternatives; `trailing` lists the characters
/// a word may end in. `None` (logged) if the pattern does not compile.
fn token_pattern(trailing: &str) -> Option<Regex> {
    let pattern = format!(
        r"(?P<unk>:[^\s:@]+?@)|(?P<num>[-+]?\d+(?:[.,]\d+)*|[.,]\d+)|(?P<word>-{{0,2}}[^\W\d]\w*(?:[-'´΄]\w+)*[{trailing}]?|<unk>|<s>|</s>|<num>|<bot:[a-z]*>)"
    );
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            error!(error = %e, "invalid token pattern");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    Context,
}

/// Splits `text` into stripped, non-empty sentences with their spans.
/// A sentence ends after `[.;:!?]` followed by whitespace (or a closing
/// quote, which stays with the sentence), at a blank line, or at `<s>`.
pub fn split_sentences(text: &str) -> Vec<(String, Span)> {
    let chars: Vec<char> = text.chars().map(|c| if c == '\r' { ' ' } else { c }).collect();
    let n = chars.len();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < n {
        let c = chars[i];
        let mut cut = None;
        if matches!(c, '.' | ';' | ':' | '!' | '?') {
            match chars.get(i + 1) {
                Some('"') => cut = Some((i + 2, i + 2)),
                Some(w) if w.is_whitespace() => cut = Some((i + 1, i + 1)),
                _ => {}
            }
        } else if c == '\n' {
            let mut j = i + 1;
            while j < n && chars[j] != '\n' && chars[j].is_whitespace() {
                j += 1;
            }
            if j < n && chars[j] == '\n' {
                cut = Some((i, j));
            }
        } else if chars[i..].starts_with(&['<', 's', '>']) {
            cut = Some((i, i + 3));
        }

        match cut {
            Some((end, next)) => {
                push_sentence(&chars, start, end, &mut sentences);
                start = next;
                i = next;
            }
            None => i += 1,
        }
    }
    push_sentence(&chars, start, n, &mut sentences);
    sentences
}

fn push_sentence(chars: &[char], begin: usize, end: usize, out: &mut Vec<(String, Span)>) {
    let slice = &chars[begin..end];
    let lead = slice.iter().take_while(|c| c.is_whitespace()).count();
    let trail = slice[lead..].iter().rev().take_while(|c| c.is_whitespace()).count();
    let length = slice.len() - lead - trail;
    if length == 0 {
        return;
    }
    let sentence: String = slice[lead..lead + length].iter().collect();
    out.push((sentence, Span::new(begin + lead, length)));
}

/// Tokenizes a single sentence without looking for sentence boundaries.
pub fn tokenize_sentence(sentence: &str) -> (Vec<String>, Vec<Span>) {
    tokenize_chunks(sentence, Mode::Text)
}

/// Tokenizes running text. Sentence boundaries show up as `<s>` tokens
/// with empty spans.
pub fn tokenize_text(text: &str) -> (Vec<String>, Vec<Span>) {
    tokenize_sentences(text, Mode::Text)
}

/// Tokenizes the text before the cursor. The last token is the prefix of
/// the word being typed; an empty token is appended when the text ends
/// between words.
pub fn tokenize_context(text: &str) -> (Vec<String>, Vec<Span>) {
    let (mut tokens, mut spans) = tokenize_sentences(text, Mode::Context);
    if !ends_in_word(text) {
        tokens.push(String::new());
        spans.push(Span::new(text.chars().count(), 0));
    }
    (tokens, spans)
}

fn tokenize_sentences(text: &str, mode: Mode) -> (Vec<String>, Vec<Span>) {
    let mut tokens = Vec::new();
    let mut spans = Vec::new();
    for (i, (sentence, sspan)) in split_sentences(text).into_iter().enumerate() {
        if i > 0 {
            tokens.push(SENTENCE_BEGIN.to_string());
            spans.push(Span::new(sspan.begin, 0));
        }
        let (ts, ss) = tokenize_chunks(&sentence, mode);
        tokens.extend(ts);
        spans.extend(ss.into_iter().map(|s| Span::new(s.begin + sspan.begin, s.length)));
    }
    (tokens, spans)
}

fn tokenize_chunks(text: &str, mode: Mode) -> (Vec<String>, Vec<Span>) {
    let mut tokens = Vec::new();
    let mut spans = Vec::new();
    for (chunk, begin) in whitespace_chunks(text) {
        let len = chunk.chars().count();
        if has_repeated_char(chunk) || chunk == "---" {
            tokens.push(UNKNOWN_WORD.to_string());
            spans.push(Span::new(begin, len));
            continue;
        }
        if chunk == "|" || (mode == Mode::Context && (chunk == "-" || chunk == "--")) {
            tokens.push(chunk.to_string());
            spans.push(Span::new(begin, len));
            continue;
        }

        let compiled = match mode {
            Mode::Text => TEXT_TOKEN.as_ref(),
            Mode::Context => CONTEXT_TOKEN.as_ref(),
        };
        let Some(pattern) = compiled else {
            continue;
        };
        for caps in pattern.captures_iter(chunk) {
            let (token, m) = if let Some(m) = caps.name("word") {
                (m.as_str().to_string(), m)
            } else if let Some(m) = caps.name("num") {
                (NUMBER_WORD.to_string(), m)
            } else if let Some(m) = caps.name("unk") {
                (UNKNOWN_WORD.to_string(), m)
            } else {
                continue;
            };
            let offset = chunk[..m.start()].chars().count();
            tokens.push(token);
            spans.push(Span::new(begin + offset, m.as_str().chars().count()));
        }
    }
    (tokens, spans)
}

/// Yields whitespace separated chunks with their character offsets.
fn whitespace_chunks(text: &str) -> Vec<(&str, usize)> {
    let mut chunks = Vec::new();
    let mut start: Option<(usize, usize)> = None;
    let mut char_pos = 0;
    for (byte_pos, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some((b, cpos)) = start.take() {
                chunks.push((&text[b..byte_pos], cpos));
            }
        } else if start.is_none() {
            start = Some((byte_pos, char_pos));
        }
        char_pos += 1;
    }
    if let Some((b, cpos)) = start {
        chunks.push((&text[b..], cpos));
    }
    chunks
}

/// True when some character occurs more than three times in a row.
fn has_repeated_char(chunk: &str) -> bool {
    let mut prev = None;
    let mut run = 0;
    for c in chunk.chars() {
        if Some(c) == prev {
            run += 1;
            if run >= 4 {
                return true;
            }
        } else {
            prev = Some(c);
            run = 1;
        }
    }
    false
}

/// Whether the context text ends inside a token that is still being typed.
fn ends_in_word(text: &str) -> bool {
    let Some(last) = text.chars().last() else {
        return true;
    };
    if last.is_alphanumeric() || last == '_' || matches!(last, '-' | '\'' | '´' | '΄') {
        return true;
    }
    let tail = text.trim_end_matches('=');
    let stripped = text.len() - tail.len();
    if stripped <= 1 && tail.ends_with('|') {
        let before = &tail[..tail.len() - 1];
        if before.is_empty() || before.ends_with(char::is_whitespace) {
            return true;
        }
    }
    let last_chunk = text.rsplit(char::is_whitespace).next().unwrap_or("");
    let run = last_chunk.chars().rev().take_while(|&c| c == last).count();
    !last.is_whitespace() && run >= 4
}

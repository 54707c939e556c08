// File: src/core/dictionary.rs
use crate::core::types::{PredictOptions, WordId, CONTROL_WORDS, NUM_CONTROL_WORDS};
use std::collections::{BTreeMap, HashMap};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Result of looking a word up in a dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordMatch {
    None,
    Exact,
    /// The word is a proper prefix of this many dictionary entries.
    Partial(usize),
}

impl WordMatch {
    /// Numeric match code: 1 exact, 0 none, -n partial.
    pub fn code(self) -> i32 {
        match self {
            WordMatch::None => 0,
            WordMatch::Exact => 1,
            WordMatch::Partial(n) => -(n as i32),
        }
    }
}

/// Word <-> id mapping shared by all model variants.
/// Ids are dense and never reused; the control words always come first.
#[derive(Debug, Clone)]
pub struct Dictionary {
    words: Vec<String>,
    ids: HashMap<String, WordId>,
    sorted: BTreeMap<String, WordId>,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Dictionary {
    pub fn new() -> Self {
        let mut dict = Self { words: Vec::new(), ids: HashMap::new(), sorted: BTreeMap::new() };
        for word in CONTROL_WORDS {
            dict.add_word(word);
        }
        dict
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.len() <= NUM_CONTROL_WORDS as usize
    }

    pub fn word_id(&self, word: &str) -> Option<WordId> {
        self.ids.get(word).copied()
    }

    pub fn word(&self, id: WordId) -> Option<&str> {
        self.words.get(id as usize).map(String::as_str)
    }

    /// Gets or creates the id of a word.
    pub fn add_word(&mut self, word: &str) -> WordId {
        if let Some(id) = self.word_id(word) {
            return id;
        }
        let id = self.words.len() as WordId;
        self.words.push(word.to_string());
        self.ids.insert(word.to_string(), id);
        self.sorted.insert(word.to_string(), id);
        id
    }

    pub fn match_word(&self, word: &str) -> WordMatch {
        if self.ids.contains_key(word) {
            return WordMatch::Exact;
        }
        let partial = self
            .sorted
            .range(word.to_string()..)
            .take_while(|(w, _)| w.starts_with(word))
            .count();
        if partial == 0 {
            WordMatch::None
        } else {
            WordMatch::Partial(partial)
        }
    }

    /// Ids of all words starting with `prefix` under the matching rules in
    /// `options`. When `candidates` is given only those ids are examined.
    /// Complexity: O(V * |prefix|) for a full scan.
    pub fn prefix_search(
        &self,
        prefix: &str,
        candidates: Option<&[WordId]>,
        options: PredictOptions,
    ) -> Vec<WordId> {
        let min_id = if options.contains(PredictOptions::INCLUDE_CONTROL_WORDS) {
            0
        } else {
            NUM_CONTROL_WORDS
        };
        let matcher = PrefixMatcher::new(prefix, options);

        match candidates {
            Some(ids) => ids
                .iter()
                .copied()
                .filter(|&id| id >= min_id)
                .filter(|&id| self.word(id).map_or(false, |w| matcher.matches(w)))
                .collect(),
            None => (min_id..self.words.len() as WordId)
                .filter(|&id| matcher.matches(&self.words[id as usize]))
                .collect(),
        }
    }
}

struct PrefixMatcher {
    prefix: Vec<char>,
    options: PredictOptions,
}

impl PrefixMatcher {
    fn new(prefix: &str, options: PredictOptions) -> Self {
        let prefix = prefix
            .chars()
            .map(|c| {
                let mut c = c;
                if !options.contains(PredictOptions::CASE_INSENSITIVE_SMART)
                    && options.contains(PredictOptions::CASE_INSENSITIVE)
                {
                    c = to_lower(c);
                }
                if !options.contains(PredictOptions::ACCENT_INSENSITIVE_SMART)
                    && options.contains(PredictOptions::ACCENT_INSENSITIVE)
                {
                    c = remove_accent(c);
                }
                c
            })
            .collect();
        Self { prefix, options }
    }

    fn matches(&self, word: &str) -> bool {
        let opts = self.options;
        if let Some(first) = word.chars().next() {
            if opts.contains(PredictOptions::IGNORE_CAPITALIZED) && first.is_uppercase() {
                return false;
            }
            if opts.contains(PredictOptions::IGNORE_NON_CAPITALIZED) && !first.is_uppercase() {
                return false;
            }
        }

        let mut chars = word.chars();
        for &p in &self.prefix {
            let Some(mut c) = chars.next() else {
                return false;
            };
            if opts.contains(PredictOptions::CASE_INSENSITIVE_SMART) {
                if !p.is_uppercase() {
                    c = to_lower(c);
                }
            } else if opts.contains(PredictOptions::CASE_INSENSITIVE) {
                c = to_lower(c);
            }
            if opts.contains(PredictOptions::ACCENT_INSENSITIVE_SMART) {
                if !has_accent(p) {
                    c = remove_accent(c);
                }
            } else if opts.contains(PredictOptions::ACCENT_INSENSITIVE) {
                c = remove_accent(c);
            }
            if c != p {
                return false;
            }
        }
        true
    }
}

fn to_lower(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn remove_accent(c: char) -> char {
    std::iter::once(c).nfd().find(|d| !is_combining_mark(*d)).unwrap_or(c)
}

fn has_accent(c: char) -> bool {
    std::iter::once(c).nfd().any(is_combining_mark)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(words: &[&str]) -> Dictionary {
        let mut d = Dictionary::new();
        for w in words {
            d.add_word(w);
        }
        d
    }

    fn found(d: &Dictionary, prefix: &str, options: PredictOptions) -> Vec<String> {
        d.prefix_search(prefix, None, options)
            .into_iter()
            .filter_map(|id| d.word(id).map(str::to_string))
            .collect()
    }

    #[test]
    fn control_words_come_first() {
        let d = dict(&["hello"]);
        assert_eq!(d.word_id("<unk>"), Some(0));
        assert_eq!(d.word_id("<num>"), Some(3));
        assert_eq!(d.word_id("hello"), Some(4));
        assert!(!d.is_empty());
        assert!(Dictionary::new().is_empty());
    }

    #[test]
    fn match_codes() {
        let d = dict(&["cat", "cats", "catalog", "dog"]);
        assert_eq!(d.match_word("cat"), WordMatch::Exact);
        assert_eq!(d.match_word("ca"), WordMatch::Partial(3));
        assert_eq!(d.match_word("bird"), WordMatch::None);
        assert_eq!(d.match_word("ca").code(), -3);
        assert_eq!(d.match_word("dog").code(), 1);
    }

    #[test]
    fn prefix_search_respects_case_flags() {
        let d = dict(&["Paris", "park", "PARTY"]);
        assert_eq!(found(&d, "par", PredictOptions::NONE), vec!["park"]);
        assert_eq!(found(&d, "par", PredictOptions::CASE_INSENSITIVE).len(), 3);
        // smart: an uppercase prefix char must match exactly
        assert_eq!(found(&d, "Par", PredictOptions::CASE_INSENSITIVE_SMART), vec!["Paris"]);
        assert_eq!(found(&d, "par", PredictOptions::CASE_INSENSITIVE_SMART).len(), 3);
        assert_eq!(
            found(&d, "", PredictOptions::IGNORE_CAPITALIZED),
            vec!["park"]
        );
        assert_eq!(found(&d, "", PredictOptions::IGNORE_NON_CAPITALIZED).len(), 2);
    }

    #[test]
    fn prefix_search_accents() {
        let d = dict(&["café", "cafe", "über"]);
        assert_eq!(found(&d, "cafe", PredictOptions::ACCENT_INSENSITIVE).len(), 2);
        assert_eq!(found(&d, "ub", PredictOptions::ACCENT_INSENSITIVE), vec!["über"]);
        assert_eq!(found(&d, "café", PredictOptions::ACCENT_INSENSITIVE_SMART), vec!["café"]);
        assert_eq!(found(&d, "cafe", PredictOptions::ACCENT_INSENSITIVE_SMART).len(), 2);
    }

    #[test]
    fn control_words_hidden_by_default() {
        let d = dict(&["<s>x"]);
        assert!(found(&d, "<", PredictOptions::NONE).iter().all(|w| w == "<s>x"));
        assert_eq!(found(&d, "<", PredictOptions::INCLUDE_CONTROL_WORDS).len(), 5);
    }
}

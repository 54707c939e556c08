// File: src/lm/dynamic.rs
use super::smoothing::{interpolated_probs, Weighting};
use super::{for_each_ngram_in, predict_with, LanguageModel, Learnable, ModelData, NgramEntry, NgramScorer};
use crate::core::dictionary::{Dictionary, WordMatch};
use crate::core::trie::NgramTrie;
use crate::core::types::{PredictOptions, PredictResult, Smoothing, WordId, UNKNOWN_WORD_ID};
use crate::error::{Result, WpError};
use std::collections::BTreeMap;

/// An n-gram model of arbitrary order that grows with learned text.
#[derive(Debug, Clone)]
pub struct DynamicModel {
    pub(crate) dictionary: Dictionary,
    pub(crate) trie: NgramTrie,
    /// Advances by one for every learned token.
    pub(crate) clock: u32,
    smoothing: Smoothing,
    lambdas: Vec<f64>,
    modified: bool,
    load_error: Option<String>,
}

impl DynamicModel {
    pub fn new(order: usize) -> Self {
        Self {
            dictionary: Dictionary::new(),
            trie: NgramTrie::new(order),
            clock: 0,
            smoothing: Smoothing::default(),
            lambdas: Vec::new(),
            modified: false,
            load_error: None,
        }
    }

    /// Rebuilds a model from its stored n-grams. Removed n-grams (count 0)
    /// are skipped; an n-gram longer than the order is a format error.
    pub fn from_data(data: ModelData) -> Result<Self> {
        let mut model = Self::new(data.order);
        for entry in data.entries {
            if entry.words.is_empty() || entry.words.len() > model.trie.order() {
                return Err(WpError::Format(format!(
                    "{}-gram in a model of order {}",
                    entry.words.len(),
                    model.trie.order()
                )));
            }
            if entry.count == 0 {
                continue;
            }
            let ids: Vec<WordId> = entry.words.iter().map(|w| model.dictionary.add_word(w)).collect();
            model.trie.count_ngram(&ids, entry.count as i64, entry.time);
        }
        model.clock = data.clock;
        Ok(model)
    }

    pub fn smoothing(&self) -> Smoothing {
        self.smoothing
    }

    /// Per-level weights for Jelinek-Mercer smoothing.
    pub fn set_lambdas(&mut self, lambdas: Vec<f64>) {
        self.lambdas = lambdas;
    }

    pub fn clock(&self) -> u32 {
        self.clock
    }

    pub fn num_word_types(&self) -> usize {
        self.dictionary.len()
    }

    pub fn ngram_count<S: AsRef<str>>(&self, words: &[S]) -> u32 {
        let ids: Option<Vec<WordId>> = words.iter().map(|w| self.dictionary.word_id(w.as_ref())).collect();
        ids.map_or(0, |ids| self.trie.ngram_count(&ids))
    }

    /// Adds `increment` to one n-gram, registering unknown words.
    pub fn count_ngram<S: AsRef<str>>(&mut self, words: &[S], increment: i64) -> u32 {
        let ids: Vec<WordId> = words.iter().map(|w| self.dictionary.add_word(w.as_ref())).collect();
        self.modified = true;
        self.trie.count_ngram(&ids, increment, self.clock)
    }

    /// N-grams that removing `context` would touch, with their negated counts.
    pub fn remove_context_changes(&self, context: &[String]) -> BTreeMap<Vec<String>, i64> {
        let mut changes = BTreeMap::new();
        let ids: Option<Vec<WordId>> = context.iter().map(|w| self.dictionary.word_id(w)).collect();
        let Some(ids) = ids.filter(|ids| !ids.is_empty()) else {
            return changes;
        };

        self.trie.for_each_ngram(|ngram, node| {
            if node.count() == 0 || ngram.len() < ids.len() {
                return;
            }
            if ngram.windows(ids.len()).any(|w| w == ids.as_slice()) {
                let words = ngram
                    .iter()
                    .filter_map(|&id| self.dictionary.word(id).map(str::to_string))
                    .collect();
                changes.insert(words, -(node.count() as i64));
            }
        });
        changes
    }
}

impl NgramScorer for DynamicModel {
    fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    fn model_order(&self) -> usize {
        self.trie.order()
    }

    fn unigram_count(&self, wid: WordId) -> u32 {
        self.trie.ngram_count(&[wid])
    }

    fn successors(&self, history: &[WordId]) -> Vec<WordId> {
        self.trie.successors(history)
    }

    fn probabilities(&self, history: &[WordId], candidates: &[WordId]) -> Vec<f64> {
        interpolated_probs(
            &self.trie,
            history,
            candidates,
            self.dictionary.len(),
            self.smoothing,
            &self.lambdas,
            Weighting::Counts,
        )
    }
}

impl LanguageModel for DynamicModel {
    fn predict(&self, context: &[String], limit: Option<usize>, options: PredictOptions) -> Vec<PredictResult> {
        predict_with(self, context, limit, options)
    }

    fn lookup_word(&self, word: &str) -> u32 {
        self.dictionary.word_id(word).map_or(0, |id| self.trie.ngram_count(&[id]))
    }

    fn match_word(&self, word: &str) -> WordMatch {
        self.dictionary.match_word(word)
    }

    fn order(&self) -> usize {
        self.trie.order()
    }

    fn is_modified(&self) -> bool {
        self.modified
    }

    fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    fn set_load_error(&mut self, message: String) {
        self.load_error = Some(message);
    }

    fn clear(&mut self) {
        self.dictionary = Dictionary::new();
        self.trie.clear();
        self.clock = 0;
        self.modified = true;
    }

    fn to_data(&self) -> Option<ModelData> {
        let mut entries = Vec::new();
        self.trie.for_each_ngram(|ngram, node| {
            if node.count() == 0 {
                return;
            }
            let words = ngram
                .iter()
                .filter_map(|&id| self.dictionary.word(id).map(str::to_string))
                .collect();
            entries.push(NgramEntry { words, count: node.count(), time: node.time() });
        });
        Some(ModelData { order: self.trie.order(), clock: self.clock, entries })
    }

    fn as_learnable_mut(&mut self) -> Option<&mut dyn Learnable> {
        Some(self)
    }
}

impl Learnable for DynamicModel {
    fn learn_tokens(&mut self, tokens: &[String], allow_new_words: bool) {
        if tokens.is_empty() {
            return;
        }
        let clock = self.clock;
        let order = self.trie.order();
        let dictionary = &mut self.dictionary;
        let trie = &mut self.trie;
        for_each_ngram_in(tokens, order, |ngram, position| {
            let ids: Vec<WordId> = ngram
                .iter()
                .map(|w| {
                    if allow_new_words {
                        dictionary.add_word(w)
                    } else {
                        dictionary.word_id(w).unwrap_or(UNKNOWN_WORD_ID)
                    }
                })
                .collect();
            trie.count_ngram(&ids, 1, clock + position as u32);
        });
        self.clock = clock + tokens.len() as u32;
        self.modified = true;
    }

    fn remove_context(&mut self, context: &[String]) -> BTreeMap<Vec<String>, i64> {
        let changes = self.remove_context_changes(context);
        if !changes.is_empty() {
            for (ngram, delta) in &changes {
                self.count_ngram(ngram, *delta);
            }
            self.modified = true;
        }
        changes
    }

    fn set_smoothing(&mut self, smoothing: Smoothing) {
        self.smoothing = smoothing;
    }
}

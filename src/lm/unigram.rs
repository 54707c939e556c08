// File: src/lm/unigram.rs
use super::{predict_with, LanguageModel, ModelData, NgramEntry, NgramScorer};
use crate::core::dictionary::{Dictionary, WordMatch};
use crate::core::types::{PredictOptions, PredictResult, WordId};
use crate::error::{Result, WpError};

/// Word counts without context. Used for read-only single-token word lists.
#[derive(Debug, Clone, Default)]
pub struct UnigramModel {
    dictionary: Dictionary,
    counts: Vec<u32>,
    total: u64,
    load_error: Option<String>,
}

impl UnigramModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        let mut model = Self::new();
        for (word, count) in counts {
            model.add_count(word.as_ref(), count);
        }
        model
    }

    /// Builds the model from stored data; only 1-grams are accepted.
    pub fn from_data(data: ModelData) -> Result<Self> {
        let mut model = Self::new();
        for entry in data.entries {
            if entry.words.len() != 1 {
                return Err(WpError::Format(format!(
                    "{}-gram in a unigram model",
                    entry.words.len()
                )));
            }
            model.add_count(&entry.words[0], entry.count);
        }
        Ok(model)
    }

    fn add_count(&mut self, word: &str, count: u32) {
        let id = self.dictionary.add_word(word) as usize;
        if self.counts.len() <= id {
            self.counts.resize(id + 1, 0);
        }
        self.counts[id] = self.counts[id].saturating_add(count);
        self.total += count as u64;
    }
}

impl NgramScorer for UnigramModel {
    fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    fn model_order(&self) -> usize {
        1
    }

    fn unigram_count(&self, wid: WordId) -> u32 {
        self.counts.get(wid as usize).copied().unwrap_or(0)
    }

    fn successors(&self, _history: &[WordId]) -> Vec<WordId> {
        Vec::new()
    }

    /// Add-one estimate: (c + 1) / (total + V).
    fn probabilities(&self, _history: &[WordId], candidates: &[WordId]) -> Vec<f64> {
        let denom = self.total as f64 + self.dictionary.len() as f64;
        candidates
            .iter()
            .map(|&wid| (self.unigram_count(wid) as f64 + 1.0) / denom)
            .collect()
    }
}

impl LanguageModel for UnigramModel {
    fn predict(&self, context: &[String], limit: Option<usize>, options: PredictOptions) -> Vec<PredictResult> {
        predict_with(self, context, limit, options)
    }

    fn lookup_word(&self, word: &str) -> u32 {
        self.dictionary.word_id(word).map_or(0, |id| self.unigram_count(id))
    }

    fn match_word(&self, word: &str) -> WordMatch {
        self.dictionary.match_word(word)
    }

    fn order(&self) -> usize {
        1
    }

    fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    fn set_load_error(&mut self, message: String) {
        self.load_error = Some(message);
    }

    fn clear(&mut self) {
        let load_error = self.load_error.take();
        *self = Self { load_error, ..Self::default() };
    }

    fn to_data(&self) -> Option<ModelData> {
        let entries = self
            .counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .filter_map(|(id, &count)| {
                self.dictionary.word(id as WordId).map(|w| NgramEntry {
                    words: vec![w.to_string()],
                    count,
                    time: 0,
                })
            })
            .collect();
        Some(ModelData { order: 1, clock: 0, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_by_frequency() {
        let model = UnigramModel::from_counts([("apple", 5), ("apricot", 2), ("banana", 9)]);
        let results = model.predict(&["ap".to_string()], None, PredictOptions::NONE);
        let words: Vec<&str> = results.iter().map(|r| r.word.as_str()).collect();
        assert_eq!(words, vec!["apple", "apricot"]);
        assert_eq!(model.lookup_word("banana"), 9);
        assert_eq!(model.order(), 1);
    }

    #[test]
    fn no_predictions_without_prefix_after_history() {
        let model = UnigramModel::from_counts([("apple", 5)]);
        let ctx = vec!["eat".to_string(), String::new()];
        assert!(model.predict(&ctx, None, PredictOptions::NONE).is_empty());
    }

    #[test]
    fn rejects_bigrams() {
        let data = ModelData {
            order: 1,
            clock: 0,
            entries: vec![NgramEntry { words: vec!["a".into(), "b".into()], count: 1, time: 0 }],
        };
        assert!(UnigramModel::from_data(data).is_err());
    }

    #[test]
    fn is_not_learnable() {
        let mut model = UnigramModel::new();
        assert!(model.as_learnable_mut().is_none());
    }
}

// File: src/lm/cached.rs
use super::smoothing::{interpolated_probs, Weighting};
use super::{predict_with, DynamicModel, LanguageModel, Learnable, ModelData, NgramScorer};
use crate::core::dictionary::{Dictionary, WordMatch};
use crate::core::types::{PredictOptions, PredictResult, Smoothing, WordId};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Settings of the recency layer. Supplied by the engine before every
/// call, never stored with the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecencyParams {
    /// Share of the recency layer in the final probability, 0..=1.
    pub ratio: f64,
    /// Age in learned tokens after which a weight has halved.
    pub halflife: u32,
    pub smoothing: Smoothing,
    pub lambdas: Vec<f64>,
}

impl Default for RecencyParams {
    fn default() -> Self {
        Self {
            ratio: 0.811,
            halflife: 96,
            smoothing: Smoothing::JelinekMercerI,
            lambdas: vec![0.404, 0.831, 0.444],
        }
    }
}

/// A dynamic model that also boosts recently learned words.
///
/// Each n-gram remembers the model clock of its last learning event; its
/// recency weight decays by half every `halflife` tokens. The recency
/// distribution is blended with the frequency distribution by `ratio`.
#[derive(Debug, Clone)]
pub struct CachedDynamicModel {
    inner: DynamicModel,
    recency: RecencyParams,
}

impl CachedDynamicModel {
    pub fn new(order: usize) -> Self {
        Self { inner: DynamicModel::new(order), recency: RecencyParams::default() }
    }

    pub fn from_data(data: ModelData) -> Result<Self> {
        Ok(Self { inner: DynamicModel::from_data(data)?, recency: RecencyParams::default() })
    }

    pub fn recency(&self) -> &RecencyParams {
        &self.recency
    }

    pub fn dynamic(&self) -> &DynamicModel {
        &self.inner
    }

    pub fn ngram_count<S: AsRef<str>>(&self, words: &[S]) -> u32 {
        self.inner.ngram_count(words)
    }

    fn recency_probs(&self, history: &[WordId], candidates: &[WordId]) -> Vec<f64> {
        interpolated_probs(
            &self.inner.trie,
            history,
            candidates,
            self.inner.dictionary.len(),
            self.recency.smoothing,
            &self.recency.lambdas,
            Weighting::Recency { now: self.inner.clock, halflife: self.recency.halflife as f64 },
        )
    }
}

impl NgramScorer for CachedDynamicModel {
    fn dictionary(&self) -> &Dictionary {
        &self.inner.dictionary
    }

    fn model_order(&self) -> usize {
        self.inner.order()
    }

    fn unigram_count(&self, wid: WordId) -> u32 {
        self.inner.unigram_count(wid)
    }

    fn successors(&self, history: &[WordId]) -> Vec<WordId> {
        self.inner.successors(history)
    }

    fn probabilities(&self, history: &[WordId], candidates: &[WordId]) -> Vec<f64> {
        let frequency = self.inner.probabilities(history, candidates);
        let ratio = self.recency.ratio.clamp(0.0, 1.0);
        if ratio == 0.0 {
            return frequency;
        }
        let recency = self.recency_probs(history, candidates);
        frequency
            .iter()
            .zip(&recency)
            .map(|(pf, pr)| (1.0 - ratio) * pf + ratio * pr)
            .collect()
    }
}

impl LanguageModel for CachedDynamicModel {
    fn predict(&self, context: &[String], limit: Option<usize>, options: PredictOptions) -> Vec<PredictResult> {
        predict_with(self, context, limit, options)
    }

    fn lookup_word(&self, word: &str) -> u32 {
        self.inner.lookup_word(word)
    }

    fn match_word(&self, word: &str) -> WordMatch {
        self.inner.match_word(word)
    }

    fn order(&self) -> usize {
        self.inner.order()
    }

    fn is_modified(&self) -> bool {
        self.inner.is_modified()
    }

    fn set_modified(&mut self, modified: bool) {
        self.inner.set_modified(modified);
    }

    fn load_error(&self) -> Option<&str> {
        self.inner.load_error()
    }

    fn set_load_error(&mut self, message: String) {
        self.inner.set_load_error(message);
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn to_data(&self) -> Option<ModelData> {
        self.inner.to_data()
    }

    fn as_learnable_mut(&mut self) -> Option<&mut dyn Learnable> {
        Some(self)
    }
}

impl Learnable for CachedDynamicModel {
    fn learn_tokens(&mut self, tokens: &[String], allow_new_words: bool) {
        self.inner.learn_tokens(tokens, allow_new_words);
    }

    fn remove_context(&mut self, context: &[String]) -> BTreeMap<Vec<String>, i64> {
        self.inner.remove_context(context)
    }

    fn set_smoothing(&mut self, smoothing: Smoothing) {
        self.inner.set_smoothing(smoothing);
    }

    fn set_recency(&mut self, params: &RecencyParams) {
        self.recency = params.clone();
    }
}

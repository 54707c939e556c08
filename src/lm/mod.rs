// File: src/lm/mod.rs
//! Language model variants and the capability traits the engine uses to
//! drive them.

pub mod cached;
pub mod dynamic;
pub mod overlay;
pub mod smoothing;
pub mod unigram;

pub use cached::{CachedDynamicModel, RecencyParams};
pub use dynamic::DynamicModel;
pub use overlay::{LogLinearModel, OverlayModel};
pub use unigram::UnigramModel;

use crate::core::dictionary::{Dictionary, WordMatch};
use crate::core::types::{PredictOptions, PredictResult, Smoothing, WordId, UNKNOWN_WORD_ID};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A statistical model that ranks candidate words for a context.
pub trait LanguageModel: Send + Sync {
    /// Ranks completions of the last context token given the tokens before
    /// it. An empty context yields no results.
    fn predict(
        &self,
        context: &[String],
        limit: Option<usize>,
        options: PredictOptions,
    ) -> Vec<PredictResult>;

    /// Unigram count of `word`, 0 when unknown.
    fn lookup_word(&self, word: &str) -> u32;

    fn match_word(&self, word: &str) -> WordMatch;

    fn order(&self) -> usize;

    fn is_modified(&self) -> bool {
        false
    }

    fn set_modified(&mut self, _modified: bool) {}

    fn load_error(&self) -> Option<&str> {
        None
    }

    fn set_load_error(&mut self, _message: String) {}

    fn clear(&mut self) {}

    /// Serializable contents, for models that can be written to disk.
    fn to_data(&self) -> Option<ModelData> {
        None
    }

    /// Learning capability; `None` for read-only models.
    fn as_learnable_mut(&mut self) -> Option<&mut dyn Learnable> {
        None
    }
}

/// Models whose statistics change with observed text.
pub trait Learnable {
    /// Counts every n-gram of the token stream. Unknown words become
    /// `<unk>` unless `allow_new_words` is set.
    fn learn_tokens(&mut self, tokens: &[String], allow_new_words: bool);

    /// Removes every n-gram containing `context` as a contiguous run and
    /// returns the applied count changes.
    fn remove_context(&mut self, context: &[String]) -> BTreeMap<Vec<String>, i64>;

    fn set_smoothing(&mut self, smoothing: Smoothing);

    fn set_recency(&mut self, _params: &RecencyParams) {}
}

/// One stored n-gram as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NgramEntry {
    pub words: Vec<String>,
    pub count: u32,
    pub time: u32,
}

/// Everything needed to rebuild a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelData {
    pub order: usize,
    pub clock: u32,
    pub entries: Vec<NgramEntry>,
}

/// Internal view shared by the count-based models so they can reuse one
/// candidate selection and ranking routine.
pub(crate) trait NgramScorer {
    fn dictionary(&self) -> &Dictionary;
    fn model_order(&self) -> usize;
    fn unigram_count(&self, wid: WordId) -> u32;
    /// Words seen after `history` with a positive count.
    fn successors(&self, history: &[WordId]) -> Vec<WordId>;
    fn probabilities(&self, history: &[WordId], candidates: &[WordId]) -> Vec<f64>;
}

/// Splits a context into word id history and completion prefix.
pub(crate) fn split_context<'a>(
    dict: &Dictionary,
    context: &'a [String],
    order: usize,
) -> (Vec<WordId>, &'a str) {
    let (prefix, history) = match context.split_last() {
        Some((last, rest)) => (last.as_str(), rest),
        None => ("", context),
    };
    let keep = order.saturating_sub(1);
    let start = history.len().saturating_sub(keep);
    let ids = history[start..]
        .iter()
        .map(|w| dict.word_id(w).unwrap_or(UNKNOWN_WORD_ID))
        .collect();
    (ids, prefix)
}

pub(crate) fn candidates<S: NgramScorer + ?Sized>(
    model: &S,
    history: &[WordId],
    prefix: &str,
    options: PredictOptions,
) -> Vec<WordId> {
    let dict = model.dictionary();
    let only_successors = prefix.is_empty()
        && !history.is_empty()
        && !options.contains(PredictOptions::INCLUDE_CONTROL_WORDS);

    let mut wids = if only_successors {
        let last = &history[history.len() - 1..];
        let following = model.successors(last);
        dict.prefix_search("", Some(&following), options)
    } else {
        dict.prefix_search(prefix, None, options)
            .into_iter()
            .filter(|&wid| model.unigram_count(wid) > 0)
            .collect()
    };
    wids.sort_unstable();
    wids
}

pub(crate) fn predict_with<S: NgramScorer + ?Sized>(
    model: &S,
    context: &[String],
    limit: Option<usize>,
    options: PredictOptions,
) -> Vec<PredictResult> {
    if context.is_empty() {
        return Vec::new();
    }
    let dict = model.dictionary();
    let (history, prefix) = split_context(dict, context, model.model_order());
    let wids = candidates(model, &history, prefix, options);
    let probs = model.probabilities(&history, &wids);

    let mut order: Vec<usize> = (0..wids.len()).collect();
    if !options.contains(PredictOptions::NO_SORT) {
        // stable: equal probabilities keep dictionary order
        order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));
    }
    let psum: f64 = probs.iter().sum();
    let scale = if options.contains(PredictOptions::NORMALIZE) && psum > 0.0 {
        1.0 / psum
    } else {
        1.0
    };

    order
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .filter_map(|i| {
            dict.word(wids[i]).map(|w| PredictResult { word: w.to_string(), p: probs[i] * scale })
        })
        .collect()
}

/// Calls `f` with every n-gram of length 1..=order starting at each
/// position of each learnable section of `tokens`. Sections end at
/// `<unk>`, which is dropped, and at `<s>`, which opens the next section.
pub(crate) fn for_each_ngram_in<F>(tokens: &[String], order: usize, mut f: F)
where
    F: FnMut(&[String], usize),
{
    let mut position = 0;
    for section in tokens.split(|t| t == crate::core::types::UNKNOWN_WORD) {
        let mut start = 0;
        for i in 1..=section.len() {
            let at_end = i == section.len();
            if at_end || section[i] == crate::core::types::SENTENCE_BEGIN {
                let part = &section[start..i];
                for j in 0..part.len() {
                    let max = order.min(part.len() - j);
                    for n in 1..=max {
                        f(&part[j..j + n], position + j);
                    }
                }
                position += part.len();
                start = i;
            }
        }
        position += 1;
    }
}

// File: src/lm/overlay.rs
use super::LanguageModel;
use crate::core::dictionary::WordMatch;
use crate::core::types::{PredictOptions, PredictResult};
use std::collections::HashMap;

/// Accumulates per-word probabilities in order of first appearance.
struct Merged {
    words: Vec<String>,
    probs: Vec<f64>,
    index: HashMap<String, usize>,
}

impl Merged {
    fn new() -> Self {
        Self { words: Vec::new(), probs: Vec::new(), index: HashMap::new() }
    }

    fn slot(&mut self, word: &str, initial: f64) -> &mut f64 {
        let idx = match self.index.get(word) {
            Some(&idx) => idx,
            None => {
                let idx = self.words.len();
                self.words.push(word.to_string());
                self.probs.push(initial);
                self.index.insert(word.to_string(), idx);
                idx
            }
        };
        &mut self.probs[idx]
    }

    /// Sorted by descending probability; ties keep first appearance.
    fn into_results(self, limit: Option<usize>, options: PredictOptions) -> Vec<PredictResult> {
        let Merged { words, mut probs, .. } = self;
        if options.contains(PredictOptions::NORMALIZE) {
            let sum: f64 = probs.iter().sum();
            if sum > 0.0 {
                probs.iter_mut().for_each(|p| *p /= sum);
            }
        }
        let mut results: Vec<PredictResult> =
            words.into_iter().zip(probs).map(|(word, p)| PredictResult { word, p }).collect();
        if !options.contains(PredictOptions::NO_SORT) {
            results.sort_by(|a, b| b.p.total_cmp(&a.p));
        }
        results.truncate(limit.unwrap_or(usize::MAX));
        results
    }
}

fn component_options(options: PredictOptions) -> PredictOptions {
    options | PredictOptions::NORMALIZE | PredictOptions::NO_SORT
}

fn padded_weights(weights: &[f64], n: usize) -> Vec<f64> {
    (0..n).map(|i| weights.get(i).copied().unwrap_or(1.0)).collect()
}

/// Read-only view combining several models by weighted linear
/// interpolation: p(w) = sum_i (w_i / sum w) * p_i(w).
///
/// Holds borrowed models only; it is rebuilt for every prediction.
pub struct OverlayModel<'a> {
    models: Vec<&'a dyn LanguageModel>,
    weights: Vec<f64>,
}

impl<'a> OverlayModel<'a> {
    pub fn new(models: Vec<&'a dyn LanguageModel>) -> Self {
        let weights = vec![1.0; models.len()];
        Self { models, weights }
    }

    pub fn with_weights(models: Vec<&'a dyn LanguageModel>, weights: &[f64]) -> Self {
        let weights = padded_weights(weights, models.len());
        Self { models, weights }
    }

    pub fn set_models(&mut self, models: Vec<&'a dyn LanguageModel>) {
        self.weights = padded_weights(&self.weights, models.len());
        self.models = models;
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl LanguageModel for OverlayModel<'_> {
    fn predict(&self, context: &[String], limit: Option<usize>, options: PredictOptions) -> Vec<PredictResult> {
        let weight_sum: f64 = self.weights.iter().sum();
        if context.is_empty() || weight_sum <= 0.0 {
            return Vec::new();
        }
        let mut merged = Merged::new();
        for (model, weight) in self.models.iter().zip(&self.weights) {
            let share = weight / weight_sum;
            for result in model.predict(context, None, component_options(options)) {
                *merged.slot(&result.word, 0.0) += share * result.p;
            }
        }
        merged.into_results(limit, options)
    }

    fn lookup_word(&self, word: &str) -> u32 {
        self.models.iter().map(|m| m.lookup_word(word)).max().unwrap_or(0)
    }

    fn match_word(&self, word: &str) -> WordMatch {
        best_match(self.models.iter().map(|m| m.match_word(word)))
    }

    fn order(&self) -> usize {
        self.models.iter().map(|m| m.order()).max().unwrap_or(0)
    }
}

/// Log-linear interpolation: p(w) proportional to prod_i p_i(w)^w_i over
/// the words any component predicts.
pub struct LogLinearModel<'a> {
    models: Vec<&'a dyn LanguageModel>,
    weights: Vec<f64>,
}

impl<'a> LogLinearModel<'a> {
    pub fn with_weights(models: Vec<&'a dyn LanguageModel>, weights: &[f64]) -> Self {
        let weights = padded_weights(weights, models.len());
        Self { models, weights }
    }
}

impl LanguageModel for LogLinearModel<'_> {
    fn predict(&self, context: &[String], limit: Option<usize>, options: PredictOptions) -> Vec<PredictResult> {
        if context.is_empty() {
            return Vec::new();
        }
        let components: Vec<(Vec<PredictResult>, f64, f64)> = self
            .models
            .iter()
            .zip(&self.weights)
            .filter_map(|(model, &weight)| {
                let results = model.predict(context, None, component_options(options));
                let least = results.iter().map(|r| r.p).fold(f64::INFINITY, f64::min);
                // a component without candidates scales every word alike
                least.is_finite().then(|| (results, least / 2.0, weight))
            })
            .collect();
        let lookup: Vec<HashMap<&str, f64>> = components
            .iter()
            .map(|(results, _, _)| results.iter().map(|r| (r.word.as_str(), r.p)).collect())
            .collect();

        let mut merged = Merged::new();
        for (results, _, _) in &components {
            for result in results {
                if merged.index.contains_key(&result.word) {
                    continue;
                }
                // a word a component did not predict counts as half of
                // that component's least likely prediction
                let p: f64 = components
                    .iter()
                    .zip(&lookup)
                    .map(|((_, floor, weight), probs)| {
                        probs.get(result.word.as_str()).copied().unwrap_or(*floor).powf(*weight)
                    })
                    .product();
                *merged.slot(&result.word, 0.0) = p;
            }
        }
        merged.into_results(limit, options | PredictOptions::NORMALIZE)
    }

    fn lookup_word(&self, word: &str) -> u32 {
        self.models.iter().map(|m| m.lookup_word(word)).max().unwrap_or(0)
    }

    fn match_word(&self, word: &str) -> WordMatch {
        best_match(self.models.iter().map(|m| m.match_word(word)))
    }

    fn order(&self) -> usize {
        self.models.iter().map(|m| m.order()).max().unwrap_or(0)
    }
}

fn best_match(matches: impl Iterator<Item = WordMatch>) -> WordMatch {
    matches.fold(WordMatch::None, |best, m| match (best, m) {
        (WordMatch::Exact, _) | (_, WordMatch::Exact) => WordMatch::Exact,
        (WordMatch::Partial(a), WordMatch::Partial(b)) => WordMatch::Partial(a.max(b)),
        (WordMatch::None, other) | (other, WordMatch::None) => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::{DynamicModel, Learnable, UnigramModel};

    fn model(text: &str) -> DynamicModel {
        let mut m = DynamicModel::new(2);
        let tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        m.learn_tokens(&tokens, true);
        m
    }

    fn words(results: &[PredictResult]) -> Vec<&str> {
        results.iter().map(|r| r.word.as_str()).collect()
    }

    #[test]
    fn merges_and_normalizes() {
        let a = model("cat cat cow");
        let b = model("cow cow cat cub");
        let models: Vec<&dyn LanguageModel> = vec![&a, &b];
        let overlay = OverlayModel::new(models);
        let results = overlay.predict(&["c".to_string()], None, PredictOptions::NORMALIZE);
        assert_eq!(results.len(), 3);
        let sum: f64 = results.iter().map(|r| r.p).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(results.last().map(|r| r.word.as_str()), Some("cub"));
    }

    #[test]
    fn weights_shift_ranking() {
        let a = model("cat cat cat cow");
        let b = model("cow cow cow cat");
        let ctx = vec!["c".to_string()];
        let models: Vec<&dyn LanguageModel> = vec![&a, &b];
        let favor_a = OverlayModel::with_weights(models.clone(), &[3.0, 1.0]);
        let favor_b = OverlayModel::with_weights(models, &[1.0, 3.0]);
        assert_eq!(favor_a.predict(&ctx, Some(1), PredictOptions::NONE)[0].word, "cat");
        assert_eq!(favor_b.predict(&ctx, Some(1), PredictOptions::NONE)[0].word, "cow");
    }

    #[test]
    fn ties_follow_declaration_order() {
        let a = model("dog");
        let b = model("dot");
        let ctx = vec!["do".to_string()];
        let ab: Vec<&dyn LanguageModel> = vec![&a, &b];
        let ba: Vec<&dyn LanguageModel> = vec![&b, &a];
        let (ab, ba) = (OverlayModel::new(ab), OverlayModel::new(ba));
        assert_eq!(words(&ab.predict(&ctx, None, PredictOptions::NONE)), vec!["dog", "dot"]);
        assert_eq!(words(&ba.predict(&ctx, None, PredictOptions::NONE)), vec!["dot", "dog"]);
    }

    #[test]
    fn lookup_takes_maximum() {
        let a = model("hi hi");
        let b = UnigramModel::from_counts([("hi", 7), ("ho", 1)]);
        let models: Vec<&dyn LanguageModel> = vec![&a, &b];
        let overlay = OverlayModel::new(models);
        assert_eq!(overlay.lookup_word("hi"), 7);
        assert_eq!(overlay.match_word("ho"), WordMatch::Exact);
        assert_eq!(overlay.match_word("h"), WordMatch::Partial(2));
        assert_eq!(overlay.order(), 2);
    }

    #[test]
    fn empty_overlay_predicts_nothing() {
        let a = model("apple");
        let mut overlay = OverlayModel::new(Vec::new());
        assert!(overlay.predict(&["a".to_string()], None, PredictOptions::NONE).is_empty());
        let models: Vec<&dyn LanguageModel> = vec![&a];
        overlay.set_models(models);
        assert_eq!(overlay.len(), 1);
        assert_eq!(overlay.predict(&["a".to_string()], None, PredictOptions::NONE).len(), 1);
    }

    #[test]
    fn log_linear_prefers_agreement() {
        let a = model("cat cow");
        let b = model("cow cub");
        let models: Vec<&dyn LanguageModel> = vec![&a, &b];
        let loglin = LogLinearModel::with_weights(models, &[1.0, 1.0]);
        let results = loglin.predict(&["c".to_string()], None, PredictOptions::NONE);
        let sum: f64 = results.iter().map(|r| r.p).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(words(&results), vec!["cow", "cat", "cub"]);
        assert!(results[0].p > results[1].p);
        assert!((results[1].p - results[2].p).abs() < 1e-12);
    }

    #[test]
    fn log_linear_ignores_silent_components() {
        let a = model("cat cow cow");
        let b = model("dog");
        let models: Vec<&dyn LanguageModel> = vec![&a, &b];
        let loglin = LogLinearModel::with_weights(models, &[1.0, 1.0]);
        let results = loglin.predict(&["c".to_string()], None, PredictOptions::NONE);
        assert_eq!(words(&results), vec!["cow", "cat"]);
    }
}

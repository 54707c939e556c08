// File: src/lm/smoothing.rs
//! Interpolated smoothing over the levels of an n-gram trie.
//!
//! Every level blends the distribution of the next shorter history with the
//! observed statistics of the current one. The base of the recursion is the
//! uniform distribution over the vocabulary.

use crate::core::trie::{NgramNode, NgramTrie};
use crate::core::types::{Smoothing, WordId};

/// What a node contributes as its "count" at a level.
#[derive(Debug, Clone, Copy)]
pub enum Weighting {
    /// Raw counts (continuation counts on the lower levels of Kneser-Ney).
    Counts,
    /// Exponentially decaying weight by age since the node was last learned.
    Recency { now: u32, halflife: f64 },
}

/// Default interpolation weight for levels without a configured lambda.
pub const DEFAULT_LAMBDA: f64 = 0.5;

/// Absolute discount for n-grams of length `len`: n1 / (n1 + 2 n2).
pub fn discount(trie: &NgramTrie, len: usize) -> f64 {
    let (n1, n2) = trie.count_of_counts(len);
    let denom = n1 as f64 + 2.0 * n2 as f64;
    if denom > 0.0 {
        n1 as f64 / denom
    } else {
        0.5
    }
}

pub fn recency_weight(now: u32, time: u32, halflife: f64) -> f64 {
    let age = now.saturating_sub(time) as f64;
    (-age / halflife.max(f64::MIN_POSITIVE)).exp2()
}

/// Probabilities of `candidates` following `history`.
/// O(levels * (candidates + children)).
pub fn interpolated_probs(
    trie: &NgramTrie,
    history: &[WordId],
    candidates: &[WordId],
    vocab_size: usize,
    smoothing: Smoothing,
    lambdas: &[f64],
    weighting: Weighting,
) -> Vec<f64> {
    let uniform = 1.0 / vocab_size.max(1) as f64;
    let mut probs = vec![uniform; candidates.len()];
    let n = history.len();

    for j in 0..=n {
        let h = &history[n - j..];
        let Some(children) = trie.lookup_children(h, candidates) else {
            continue;
        };
        let continuation = smoothing == Smoothing::KneserNeyI && j < n;
        let value = |node: &NgramNode| -> f64 {
            match weighting {
                Weighting::Counts if continuation => node.n1_pre as f64,
                Weighting::Counts => node.count as f64,
                Weighting::Recency { now, halflife } => {
                    if node.count > 0 {
                        recency_weight(now, node.time, halflife)
                    } else {
                        0.0
                    }
                }
            }
        };

        let all = trie.children(h);
        let cs: f64 = all.iter().map(|node| value(node)).sum();
        if cs <= 0.0 {
            continue;
        }
        let n1prx = all.iter().filter(|node| value(node) > 0.0).count() as f64;
        let d = match smoothing {
            Smoothing::AbsDiscI | Smoothing::KneserNeyI => discount(trie, j + 1),
            _ => 0.0,
        };
        let lambda = lambdas.get(j).copied().unwrap_or(DEFAULT_LAMBDA);

        for (p, child) in probs.iter_mut().zip(&children) {
            let c = child.map_or(0.0, |node| value(node));
            *p = match smoothing {
                Smoothing::None => c / cs,
                Smoothing::JelinekMercerI => lambda * c / cs + (1.0 - lambda) * *p,
                Smoothing::WittenBellI => (c + n1prx * *p) / (cs + n1prx),
                Smoothing::AbsDiscI | Smoothing::KneserNeyI => {
                    (c - d).max(0.0) / cs + d * n1prx / cs * *p
                }
            };
        }
    }
    probs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NgramTrie {
        // a b a c a b
        let mut trie = NgramTrie::new(2);
        let counts: [(&[WordId], i64); 7] = [
            (&[4], 3),
            (&[5], 2),
            (&[6], 1),
            (&[4, 5], 2),
            (&[5, 4], 1),
            (&[4, 6], 1),
            (&[6, 4], 1),
        ];
        for (ids, c) in counts {
            trie.count_ngram(ids, c, 0);
        }
        trie
    }

    fn full(trie: &NgramTrie, history: &[WordId], smoothing: Smoothing) -> f64 {
        let all: Vec<WordId> = (0..7).collect();
        interpolated_probs(trie, history, &all, 7, smoothing, &[0.3, 0.6], Weighting::Counts)
            .iter()
            .sum()
    }

    #[test]
    fn distributions_sum_to_one() {
        let trie = sample();
        for smoothing in [
            Smoothing::JelinekMercerI,
            Smoothing::WittenBellI,
            Smoothing::AbsDiscI,
            Smoothing::KneserNeyI,
        ] {
            let histories: [&[WordId]; 4] = [&[], &[4], &[6], &[9]];
            for history in histories {
                let sum = full(&trie, history, smoothing);
                assert!((sum - 1.0).abs() < 1e-9, "{smoothing:?} {history:?} sums to {sum}");
            }
        }
    }

    #[test]
    fn context_raises_seen_successor() {
        let trie = sample();
        let p = interpolated_probs(&trie, &[4], &[5, 6], 7, Smoothing::AbsDiscI, &[], Weighting::Counts);
        assert!(p[0] > p[1]);
    }

    #[test]
    fn discount_from_count_of_counts() {
        let trie = sample();
        // unigrams: one with count 1, one with count 2
        assert!((discount(&trie, 1) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(discount(&NgramTrie::new(2), 1), 0.5);
    }

    #[test]
    fn recency_halves_per_halflife() {
        assert!((recency_weight(10, 10, 4.0) - 1.0).abs() < 1e-12);
        assert!((recency_weight(14, 10, 4.0) - 0.5).abs() < 1e-12);
        assert!((recency_weight(18, 10, 4.0) - 0.25).abs() < 1e-12);
    }
}

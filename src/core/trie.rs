// --- File: src/core/trie.rs
use crate::core::types::{WordId, NUM_CONTROL_WORDS};
use std::collections::BTreeMap;

/// One n-gram in the trie. The path of word ids from the root spells the
/// n-gram; a count of zero marks an n-gram that was removed but whose node
/// is kept so its id path stays valid.
#[derive(Debug, Clone)]
pub struct NgramNode {
    pub(crate) word_id: WordId,
    pub(crate) count: u32,
    /// Model clock at the last time this n-gram was learned.
    pub(crate) time: u32,
    /// Number of children with a positive count, N1+(h•).
    pub(crate) n1_prx: u32,
    /// Number of distinct left extensions with a positive count, N1+(•w).
    pub(crate) n1_pre: u32,
    children: BTreeMap<WordId, usize>,
}

impl NgramNode {
    fn new(word_id: WordId) -> Self {
        Self { word_id, count: 0, time: 0, n1_prx: 0, n1_pre: 0, children: BTreeMap::new() }
    }

    pub fn word_id(&self) -> WordId {
        self.word_id
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn time(&self) -> u32 {
        self.time
    }
}

/// A mutable arena trie holding n-gram counts of every length up to `order`.
/// Node 0 is the root; its count is the total number of unigram tokens.
#[derive(Debug, Clone)]
pub struct NgramTrie {
    nodes: Vec<NgramNode>,
    order: usize,
    /// Per n-gram length (index = length - 1): n-grams with count 1 and 2.
    n1: Vec<u32>,
    n2: Vec<u32>,
    /// Per n-gram length: n-grams with a positive count.
    num_ngrams: Vec<u32>,
}

const ROOT: usize = 0;

impl NgramTrie {
    pub fn new(order: usize) -> Self {
        let order = order.max(1);
        Self {
            nodes: vec![NgramNode::new(0)],
            order,
            n1: vec![0; order],
            n2: vec![0; order],
            num_ngrams: vec![0; order],
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.order);
    }

    /// Total number of unigram tokens.
    pub fn total(&self) -> u32 {
        self.nodes[ROOT].count
    }

    pub fn num_ngrams(&self, len: usize) -> u32 {
        len.checked_sub(1).and_then(|l| self.num_ngrams.get(l)).copied().unwrap_or(0)
    }

    /// Counts of n-grams of length `len` seen exactly once and twice.
    pub fn count_of_counts(&self, len: usize) -> (u32, u32) {
        match len.checked_sub(1) {
            Some(l) if l < self.order => (self.n1[l], self.n2[l]),
            _ => (0, 0),
        }
    }

    fn node_index(&self, ids: &[WordId]) -> Option<usize> {
        let mut idx = ROOT;
        for id in ids {
            idx = *self.nodes[idx].children.get(id)?;
        }
        Some(idx)
    }

    /// Looks up the node of an n-gram; the empty slice yields the root.
    pub fn get_node(&self, ids: &[WordId]) -> Option<&NgramNode> {
        self.node_index(ids).map(|idx| &self.nodes[idx])
    }

    pub fn ngram_count(&self, ids: &[WordId]) -> u32 {
        if ids.is_empty() {
            return 0;
        }
        self.get_node(ids).map_or(0, |n| n.count)
    }

    /// Children of the node spelled by `ids`, in word id order.
    pub fn children(&self, ids: &[WordId]) -> Vec<&NgramNode> {
        match self.node_index(ids) {
            Some(idx) => self.nodes[idx].children.values().map(|&c| &self.nodes[c]).collect(),
            None => Vec::new(),
        }
    }

    /// Child of `ids` for word `wid`, if any.
    pub fn child(&self, ids: &[WordId], wid: WordId) -> Option<&NgramNode> {
        let idx = self.node_index(ids)?;
        self.nodes[idx].children.get(&wid).map(|&c| &self.nodes[c])
    }

    /// Children of `ids` for each of `wids`; `None` if `ids` is not stored.
    pub fn lookup_children(&self, ids: &[WordId], wids: &[WordId]) -> Option<Vec<Option<&NgramNode>>> {
        let idx = self.node_index(ids)?;
        let children = &self.nodes[idx].children;
        Some(wids.iter().map(|w| children.get(w).map(|&c| &self.nodes[c])).collect())
    }

    /// Word ids following `ids` with a positive count.
    pub fn successors(&self, ids: &[WordId]) -> Vec<WordId> {
        self.children(ids).into_iter().filter(|n| n.count > 0).map(|n| n.word_id).collect()
    }

    fn get_or_add_node(&mut self, ids: &[WordId]) -> usize {
        let mut idx = ROOT;
        for &id in ids {
            let next_idx = if let Some(&child) = self.nodes[idx].children.get(&id) {
                child
            } else {
                let new_idx = self.nodes.len();
                self.nodes.push(NgramNode::new(id));
                self.nodes[idx].children.insert(id, new_idx);
                new_idx
            };
            idx = next_idx;
        }
        idx
    }

    /// Adds `increment` to the count of an n-gram, creating missing nodes.
    /// Counts clamp at zero, control word unigrams at one. Bookkeeping for
    /// discounting and continuation counts follows every 0 <-> positive
    /// transition. Returns the new count.
    /// O(n) in the n-gram length.
    pub fn count_ngram(&mut self, ids: &[WordId], increment: i64, time: u32) -> u32 {
        if ids.is_empty() || ids.len() > self.order {
            return 0;
        }
        let idx = self.get_or_add_node(ids);
        let parent = self.get_or_add_node(&ids[..ids.len() - 1]);

        let old = self.nodes[idx].count;
        let mut new = (old as i64 + increment).clamp(0, u32::MAX as i64) as u32;
        if ids.len() == 1 && ids[0] < NUM_CONTROL_WORDS && old > 0 {
            new = new.max(1);
        }
        self.nodes[idx].count = new;
        if increment > 0 {
            self.nodes[idx].time = time;
        }
        if ids.len() == 1 {
            let total = self.nodes[ROOT].count as i64 + new as i64 - old as i64;
            self.nodes[ROOT].count = total.max(0) as u32;
        }

        let level = ids.len() - 1;
        match old {
            1 => self.n1[level] -= 1,
            2 => self.n2[level] -= 1,
            _ => {}
        }
        match new {
            1 => self.n1[level] += 1,
            2 => self.n2[level] += 1,
            _ => {}
        }

        if old == 0 && new > 0 {
            self.nodes[parent].n1_prx += 1;
            self.num_ngrams[level] += 1;
            if ids.len() > 1 {
                let suffix = self.get_or_add_node(&ids[1..]);
                self.nodes[suffix].n1_pre += 1;
            }
        } else if old > 0 && new == 0 {
            self.nodes[parent].n1_prx -= 1;
            self.num_ngrams[level] -= 1;
            if ids.len() > 1 {
                let suffix = self.get_or_add_node(&ids[1..]);
                self.nodes[suffix].n1_pre = self.nodes[suffix].n1_pre.saturating_sub(1);
            }
        }
        new
    }

    /// Visits every stored n-gram, depth first in word id order, including
    /// removed ones with a count of zero.
    pub fn for_each_ngram<F>(&self, mut f: F)
    where
        F: FnMut(&[WordId], &NgramNode),
    {
        let mut path = Vec::with_capacity(self.order);
        self.visit(ROOT, &mut path, &mut f);
    }

    fn visit<F>(&self, idx: usize, path: &mut Vec<WordId>, f: &mut F)
    where
        F: FnMut(&[WordId], &NgramNode),
    {
        for (&wid, &child) in &self.nodes[idx].children {
            path.push(wid);
            f(path, &self.nodes[child]);
            self.visit(child, path, f);
            path.pop();
        }
    }

    /// Restores the time stamp of a loaded n-gram.
    pub fn set_time(&mut self, ids: &[WordId], time: u32) {
        if let Some(idx) = self.node_index(ids) {
            self.nodes[idx].time = time;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_totals() {
        let mut trie = NgramTrie::new(3);
        trie.count_ngram(&[5], 1, 1);
        trie.count_ngram(&[5], 1, 2);
        trie.count_ngram(&[6], 1, 3);
        trie.count_ngram(&[5, 6], 1, 3);
        assert_eq!(trie.ngram_count(&[5]), 2);
        assert_eq!(trie.total(), 3);
        assert_eq!(trie.get_node(&[]).map(|n| n.n1_prx), Some(2));
        assert_eq!(trie.count_of_counts(1), (1, 1));
        assert_eq!(trie.count_of_counts(2), (1, 0));
        assert_eq!(trie.get_node(&[6]).map(|n| n.n1_pre), Some(1));
        assert_eq!(trie.get_node(&[5]).map(|n| n.time), Some(2));
    }

    #[test]
    fn removal_keeps_node_and_updates_stats() {
        let mut trie = NgramTrie::new(2);
        trie.count_ngram(&[7], 2, 1);
        trie.count_ngram(&[8], 1, 1);
        trie.count_ngram(&[7, 8], 1, 1);
        trie.count_ngram(&[7, 8], -5, 2);
        assert_eq!(trie.ngram_count(&[7, 8]), 0);
        assert!(trie.get_node(&[7, 8]).is_some());
        assert_eq!(trie.get_node(&[7]).map(|n| n.n1_prx), Some(0));
        assert_eq!(trie.get_node(&[8]).map(|n| n.n1_pre), Some(0));
        assert_eq!(trie.num_ngrams(2), 0);
        assert!(trie.successors(&[7]).is_empty());
    }

    #[test]
    fn control_word_unigrams_stay_positive() {
        let mut trie = NgramTrie::new(2);
        trie.count_ngram(&[1], 3, 1);
        trie.count_ngram(&[1], -10, 2);
        assert_eq!(trie.ngram_count(&[1]), 1);
        trie.count_ngram(&[9], 3, 1);
        trie.count_ngram(&[9], -10, 2);
        assert_eq!(trie.ngram_count(&[9]), 0);
    }

    #[test]
    fn rejects_overlong_ngrams() {
        let mut trie = NgramTrie::new(2);
        assert_eq!(trie.count_ngram(&[4, 5, 6], 1, 0), 0);
        assert!(trie.get_node(&[4]).is_none());
    }

    #[test]
    fn visits_every_ngram_in_order() {
        let mut trie = NgramTrie::new(2);
        trie.count_ngram(&[5], 1, 0);
        trie.count_ngram(&[4], 1, 0);
        trie.count_ngram(&[4, 5], 1, 0);
        let mut seen = Vec::new();
        trie.for_each_ngram(|ids, node| seen.push((ids.to_vec(), node.count())));
        assert_eq!(seen, vec![(vec![4], 1), (vec![4, 5], 1), (vec![5], 1)]);
    }
}

// src/core/types.rs
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Index of a word in a model's dictionary.
pub type WordId = u32;

pub const UNKNOWN_WORD: &str = "<unk>";
pub const SENTENCE_BEGIN: &str = "<s>";
pub const SENTENCE_END: &str = "</s>";
pub const NUMBER_WORD: &str = "<num>";

/// Control words occupy the first dictionary slots of every model,
/// in this order.
pub const CONTROL_WORDS: [&str; 4] = [UNKNOWN_WORD, SENTENCE_BEGIN, SENTENCE_END, NUMBER_WORD];
pub const NUM_CONTROL_WORDS: WordId = CONTROL_WORDS.len() as WordId;
pub const UNKNOWN_WORD_ID: WordId = 0;

pub fn is_control_word(word: &str) -> bool {
    CONTROL_WORDS.contains(&word)
}

/// Half-open character range `[begin, begin + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub begin: usize,
    pub length: usize,
}

impl Span {
    pub fn new(begin: usize, length: usize) -> Self {
        Self { begin, length }
    }

    pub fn end(&self) -> usize {
        self.begin + self.length
    }
}

/// A token together with the span of text it was cut from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSpan {
    pub span: Span,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictResult {
    pub word: String,
    pub p: f64,
}

/// Bit set of prediction flags. The empty set is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct PredictOptions(u32);

impl PredictOptions {
    pub const NONE: Self = Self(0);
    pub const CASE_INSENSITIVE: Self = Self(1 << 0);
    pub const CASE_INSENSITIVE_SMART: Self = Self(1 << 1);
    pub const ACCENT_INSENSITIVE: Self = Self(1 << 2);
    pub const ACCENT_INSENSITIVE_SMART: Self = Self(1 << 3);
    pub const IGNORE_CAPITALIZED: Self = Self(1 << 4);
    pub const IGNORE_NON_CAPITALIZED: Self = Self(1 << 5);
    pub const INCLUDE_CONTROL_WORDS: Self = Self(1 << 6);
    pub const NO_SORT: Self = Self(1 << 7);
    pub const NORMALIZE: Self = Self(1 << 8);

    /// Flags that change which words are candidates at all.
    pub const FILTER_OPTIONS: Self = Self(0b11_1111);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for PredictOptions {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PredictOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Smoothing method used to spread probability mass onto unseen n-grams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Smoothing {
    None,
    JelinekMercerI,
    WittenBellI,
    AbsDiscI,
    #[default]
    KneserNeyI,
}

/// How the engine combines the predictions of several models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Combination {
    #[default]
    Linear,
    LogLinear,
}

// File: src/core/mod.rs
pub mod dictionary;
pub mod engine;
pub mod tokenize;
pub mod trie;
pub mod types;

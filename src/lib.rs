// src/lib.rs

pub mod autosave;
pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod learning;
pub mod lm;
pub mod lmid;
pub mod persistence;
pub mod recovery;

pub use crate::config::EngineConfig;
pub use crate::core::engine::WPEngine;
pub use crate::core::types::{PredictOptions, PredictResult};
pub use crate::error::{Result, WpError};

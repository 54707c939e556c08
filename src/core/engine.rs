// File: src/core/engine.rs
use crate::autosave::{spawn_ticker, AutoSaveTimer, Clock, SystemClock};
use crate::cache::ModelCache;
use crate::config::EngineConfig;
use crate::core::tokenize;
use crate::core::types::{Combination, PredictOptions, PredictResult, TokenSpan};
use crate::learning::{new_word_positions, split_tokens_at, strip_trailing_apostrophes, LearningEngine};
use crate::lm::{LanguageModel, LogLinearModel, OverlayModel};
use crate::lmid::{canonicalize, ModelClass};
use crate::recovery::{self, RecoveryAction};
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Longest stretch of text before the cursor looked at for context.
const MAX_CONTEXT_CHARS: usize = 1024;

/// N-gram count changes keyed by the affected n-gram.
pub type NgramChanges = BTreeMap<Vec<String>, i64>;

/// Everything guarded by the engine lock.
struct EngineState {
    cache: ModelCache,
    persistent: Vec<String>,
    auto_learn: Vec<String>,
    scratch: Vec<String>,
}

impl EngineState {
    /// Models consulted for predictions: persistent and scratch models plus
    /// learning targets not already among them, each once.
    fn prediction_ids(&mut self) -> Vec<String> {
        let requested: Vec<&String> = self
            .persistent
            .iter()
            .chain(&self.scratch)
            .chain(&self.auto_learn)
            .collect();
        let mut keys: Vec<String> = Vec::with_capacity(requested.len());
        for key in self.cache.get_model_ids(&requested) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Exact-match codes of every token in every model of `lmids`.
    fn lookup_tokens(&mut self, tokens: &[String], lmids: &[String]) -> Vec<Vec<i32>> {
        let keys = self.cache.get_model_ids(lmids);
        let models = self.cache.loaded_models(&keys);
        tokens
            .iter()
            .map(|token| models.iter().map(|m| m.match_word(token).code()).collect())
            .collect()
    }

    /// Splits the tokens at words no persistent model knows, dropping them.
    fn drop_new_words(&mut self, tokens: &[String]) -> Vec<Vec<String>> {
        let persistent = self.persistent.clone();
        let codes = self.lookup_tokens(tokens, &persistent);
        split_tokens_at(tokens, &new_word_positions(&codes))
    }

    fn learn_sections(&mut self, lmids: &[String], sections: &[Vec<String>], learning: &LearningEngine) {
        for key in self.cache.get_model_ids(lmids) {
            match self.cache.get_model(&key).and_then(|m| m.as_learnable_mut()) {
                Some(model) => learning.learn(model, sections, true),
                None => debug!(lmid = %key, "model is not learnable"),
            }
        }
    }
}

/// State shared with the save thread and the autosave timer.
struct Shared {
    state: ReentrantMutex<RefCell<EngineState>>,
    /// The single in-flight background save, if any.
    save_thread: Mutex<Option<JoinHandle<()>>>,
    learning: LearningEngine,
    config: EngineConfig,
}

impl Shared {
    fn save_models(self: &Arc<Self>, reason: &str, concurrent: bool) {
        info!(reason, concurrent, "saving models");
        if self.config.log_learning {
            let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            self.learning.log_event(&format!("{stamp} saving models: {reason}"));
        }

        let mut slot = self.save_thread.lock();
        if let Some(handle) = slot.take() {
            if handle.join().is_err() {
                error!("previous save thread panicked");
            }
        }
        if concurrent {
            let shared = Arc::clone(self);
            *slot = Some(thread::spawn(move || shared.do_save_models()));
        } else {
            self.do_save_models();
        }
    }

    fn do_save_models(&self) {
        let guard = self.state.lock();
        let saved = guard.borrow_mut().cache.save_models();
        debug!(saved, "save finished");
    }

    fn join_save_thread(&self) {
        if let Some(handle) = self.save_thread.lock().take() {
            if handle.join().is_err() {
                error!("save thread panicked");
            }
        }
    }
}

/// Word prediction and learning over a set of cached language models.
///
/// Models are referenced by LMID in three groups: `persistent` models are
/// consulted for predictions and decide which words count as known,
/// `auto_learn` models receive learned text and `scratch` models hold
/// throwaway context. All calls serialize on one reentrant lock; saving
/// can run on a background thread, at most one at a time.
///
/// Dropping the engine stops autosaving and saves synchronously.
pub struct WPEngine {
    shared: Arc<Shared>,
    autosave: Arc<Mutex<AutoSaveTimer>>,
    ticker: Option<(Arc<AtomicBool>, JoinHandle<()>)>,
}

impl WPEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Engine whose autosave timer reads time from `clock`.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let log_path = config
            .log_learning
            .then(|| config.user_model_dir.join("learned_text.txt"));
        let state = EngineState {
            cache: ModelCache::new(&config),
            persistent: Vec::new(),
            auto_learn: Vec::new(),
            scratch: Vec::new(),
        };
        let shared = Arc::new(Shared {
            state: ReentrantMutex::new(RefCell::new(state)),
            save_thread: Mutex::new(None),
            learning: LearningEngine::new(log_path),
            config,
        });

        let timer_shared = Arc::clone(&shared);
        let timer = AutoSaveTimer::new(
            &shared.config.autosave,
            clock,
            Box::new(move || timer_shared.save_models("AutoSaveTimer", true)),
        );
        Self { shared, autosave: Arc::new(Mutex::new(timer)), ticker: None }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let guard = self.shared.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut *state)
    }

    /// Replaces the three model groups. Models load lazily on first use.
    pub fn set_model_ids<S: AsRef<str>>(&self, persistent: &[S], auto_learn: &[S], scratch: &[S]) {
        let owned = |ids: &[S]| ids.iter().map(|s| s.as_ref().to_string()).collect::<Vec<_>>();
        self.with_state(|state| {
            state.persistent = owned(persistent);
            state.auto_learn = owned(auto_learn);
            state.scratch = owned(scratch);
        });
    }

    /// The persistent, auto-learn and scratch groups as last set.
    pub fn model_ids(&self) -> (Vec<String>, Vec<String>, Vec<String>) {
        self.with_state(|state| {
            (state.persistent.clone(), state.auto_learn.clone(), state.scratch.clone())
        })
    }

    /// Loads every model predictions consult ahead of the first
    /// prediction.
    pub fn load_models(&self) {
        self.with_state(|state| {
            let loaded = state.prediction_ids();
            info!(models = loaded.len(), "models loaded");
        });
    }

    /// Ranked completions for the text before the cursor.
    pub fn predict(&self, context_line: &str, limit: Option<usize>, options: PredictOptions) -> Vec<String> {
        self.predict_scored(context_line, limit, options)
            .into_iter()
            .map(|r| r.word)
            .collect()
    }

    /// Like [`predict`](Self::predict) but keeps the probabilities.
    pub fn predict_scored(
        &self,
        context_line: &str,
        limit: Option<usize>,
        options: PredictOptions,
    ) -> Vec<PredictResult> {
        let (context, _) = tokenize::tokenize_context(context_line);
        let config = &self.shared.config;
        self.with_state(|state| {
            let keys = state.prediction_ids();
            for key in &keys {
                if let Some(model) = state.cache.get_model(key).and_then(|m| m.as_learnable_mut()) {
                    model.set_smoothing(config.dynamic_smoothing);
                    model.set_recency(&config.recency);
                }
            }
            let models = state.cache.loaded_models(&keys);
            let weights = vec![1.0; models.len()];
            let results = match config.combination {
                Combination::Linear => OverlayModel::new(models).predict(&context, limit, options),
                Combination::LogLinear => {
                    LogLinearModel::with_weights(models, &weights).predict(&context, limit, options)
                }
            };
            debug!(
                context = ?context,
                top = ?results.iter().take(3).map(|r| r.word.as_str()).collect::<Vec<_>>(),
                "predicted"
            );
            results
        })
    }

    /// Learns `text` into every auto-learn model. Unless `allow_new_words`
    /// is set, words unknown to all persistent models are left out and
    /// n-grams do not span them.
    pub fn learn_text(&self, text: &str, allow_new_words: bool) {
        let learned = self.with_state(|state| {
            if state.auto_learn.is_empty() {
                return false;
            }
            let (mut tokens, _) = tokenize::tokenize_text(text);
            strip_trailing_apostrophes(&mut tokens);
            let sections = if allow_new_words {
                split_tokens_at(&tokens, &[])
            } else {
                state.drop_new_words(&tokens)
            };
            if sections.is_empty() {
                return false;
            }
            let targets = state.auto_learn.clone();
            state.learn_sections(&targets, &sections, &self.shared.learning);
            info!(?sections, models = targets.len(), "learned text");
            if self.shared.config.log_learning {
                self.shared.learning.log_sections(&sections);
            }
            true
        });
        if learned {
            self.postpone_autosave();
        }
    }

    /// Learns `text` into the scratch models, new words included.
    pub fn learn_scratch_text(&self, text: &str) {
        self.with_state(|state| {
            let (tokens, _) = tokenize::tokenize_text(text);
            let targets = state.scratch.clone();
            state.learn_sections(&targets, &[tokens], &self.shared.learning);
        });
    }

    pub fn clear_scratch_models(&self) {
        self.with_state(|state| {
            let targets = state.scratch.clone();
            for key in state.cache.get_model_ids(&targets) {
                if let Some(model) = state.cache.get_model(&key) {
                    model.clear();
                }
            }
        });
    }

    /// Forgets every n-gram containing `context` in the auto-learn models.
    /// Returns the applied changes per model.
    pub fn remove_context<S: AsRef<str>>(&self, context: &[S]) -> BTreeMap<String, NgramChanges> {
        let context: Vec<String> = context.iter().map(|s| s.as_ref().to_string()).collect();
        let removed = self.with_state(|state| {
            let mut removed = BTreeMap::new();
            let targets = state.auto_learn.clone();
            for key in state.cache.get_model_ids(&targets) {
                let Some(model) = state.cache.get_model(&key).and_then(|m| m.as_learnable_mut()) else {
                    continue;
                };
                let changes = model.remove_context(&context);
                for (ngram, delta) in &changes {
                    info!(lmid = %key, ngram = ?ngram, delta, "removed n-gram");
                }
                removed.insert(key, changes);
            }
            removed
        });
        self.postpone_autosave();
        removed
    }

    /// True when a persistent model has seen `word`.
    pub fn word_exists(&self, word: &str) -> bool {
        self.with_state(|state| {
            let ids = state.persistent.clone();
            let keys = state.cache.get_model_ids(&ids);
            state.cache.loaded_models(&keys).iter().any(|m| m.lookup_word(word) > 0)
        })
    }

    /// Tokens of `text` and their match codes in each of `lmids`.
    pub fn lookup_text<S: AsRef<str>>(&self, text: &str, lmids: &[S]) -> (Vec<TokenSpan>, Vec<Vec<i32>>) {
        let tokens = self.tokenize_text(text);
        let words: Vec<String> = tokens.iter().map(|t| t.text.clone()).collect();
        let codes = self.lookup_tokens(&words, lmids);
        (tokens, codes)
    }

    /// Match codes of each token in each of `lmids`: 1 for a known word,
    /// -n when the token is a prefix of n known words, 0 otherwise.
    pub fn lookup_tokens<S: AsRef<str>>(&self, tokens: &[String], lmids: &[S]) -> Vec<Vec<i32>> {
        let lmids: Vec<String> = lmids.iter().map(|s| s.as_ref().to_string()).collect();
        self.with_state(|state| state.lookup_tokens(tokens, &lmids))
    }

    pub fn tokenize_text(&self, text: &str) -> Vec<TokenSpan> {
        zip_spans(tokenize::tokenize_text(text))
    }

    pub fn tokenize_context(&self, text: &str) -> Vec<TokenSpan> {
        zip_spans(tokenize::tokenize_context(text))
    }

    /// Names of the model files present for `class`.
    pub fn get_model_names(&self, class: ModelClass) -> Vec<String> {
        self.with_state(|state| state.cache.find_available_model_names(class))
    }

    /// The end of `text` starting at the last context token, e.g. the
    /// partial word being typed.
    pub fn get_last_context_fragment(&self, text: &str) -> String {
        let start = text
            .char_indices()
            .rev()
            .nth(MAX_CONTEXT_CHARS - 1)
            .map_or(0, |(i, _)| i);
        let tail = &text[start..];
        let (_, spans) = tokenize::tokenize_context(tail);
        match spans.last() {
            Some(span) => tail.chars().skip(span.begin).collect(),
            None => String::new(),
        }
    }

    /// Writes all modified user models. With `concurrent` the write runs on
    /// a background thread; a save still in flight is waited for first.
    pub fn save_models(&self, reason: &str, concurrent: bool) {
        self.shared.save_models(reason, concurrent);
    }

    /// Blocks until a background save, if any, has finished.
    pub fn wait_for_save(&self) {
        self.shared.join_save_thread();
    }

    pub fn postpone_autosave(&self) {
        self.autosave.lock().postpone();
    }

    pub fn pause_autosave(&self) {
        let duration = self.shared.config.autosave.pause();
        self.autosave.lock().pause(duration);
    }

    pub fn resume_autosave(&self) {
        self.autosave.lock().resume();
    }

    /// Runs one autosave timer period by hand. Returns true when a save
    /// was started.
    pub fn on_autosave_tick(&self) -> bool {
        self.autosave.lock().on_tick()
    }

    /// Starts ticking the autosave timer on a background thread.
    pub fn start_autosave(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = spawn_ticker(Arc::clone(&self.autosave), Arc::clone(&shutdown));
        self.ticker = Some((shutdown, handle));
    }

    pub fn stop_autosave(&mut self) {
        if let Some((shutdown, handle)) = self.ticker.take() {
            shutdown.store(true, Ordering::Release);
            if handle.join().is_err() {
                error!("autosave thread panicked");
            }
        }
    }

    /// Moves broken user model files aside, restoring backups where
    /// possible, so the models load again on next use.
    pub fn recover_broken_models(&self) -> Vec<RecoveryAction> {
        self.shared.join_save_thread();
        self.with_state(|state| recovery::recover_broken_models(&mut state.cache))
    }

    /// Load errors of the cached models, by canonical LMID.
    pub fn load_errors(&self) -> Vec<(String, String)> {
        self.with_state(|state| state.cache.load_errors())
    }

    /// Canonical form of an LMID as used for cache keys.
    pub fn canonical_lmid(lmid: &str) -> String {
        canonicalize(lmid)
    }
}

impl Drop for WPEngine {
    fn drop(&mut self) {
        self.stop_autosave();
        self.shared.save_models("shutdown", false);
    }
}

fn zip_spans((tokens, spans): (Vec<String>, Vec<crate::core::types::Span>)) -> Vec<TokenSpan> {
    tokens
        .into_iter()
        .zip(spans)
        .map(|(text, span)| TokenSpan { span, text })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autosave::ManualClock;
    use std::time::Duration;

    fn new_engine(root: &std::path::Path) -> WPEngine {
        let engine = WPEngine::new(EngineConfig::with_model_root(root));
        engine.set_model_ids(&["lm:system:en"], &["lm:user:en"], &["lm:mem:scratch"]);
        engine
    }

    #[test]
    fn learns_and_predicts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = new_engine(dir.path());
        engine.learn_text("the quick brown fox", true);
        engine.learn_text("the quiet night", true);
        let words = engine.predict("the qu", Some(5), PredictOptions::NONE);
        assert_eq!(words.len(), 2);
        assert!(words.contains(&"quick".to_string()));
        assert!(words.contains(&"quiet".to_string()));
        assert_eq!(engine.predict("the quick br", None, PredictOptions::NONE), vec!["brown"]);
    }

    #[test]
    fn load_models_includes_auto_learn_models() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = WPEngine::new(EngineConfig::with_model_root(dir.path()));
        engine.set_model_ids(&["lm:system:en"], &["lm:user:en"], &[]);
        assert!(!engine.with_state(|state| state.cache.contains("lm:user:en")));
        engine.load_models();
        assert!(engine.with_state(|state| state.cache.contains("lm:user:en")));
        assert!(engine.with_state(|state| state.cache.contains("lm:system:en")));
    }

    #[test]
    fn unknown_words_are_not_learned_without_permission() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = new_engine(dir.path());
        // system model is missing, so no word is known
        engine.learn_text("brand new words", false);
        assert!(engine.predict("bra", None, PredictOptions::NONE).is_empty());
        engine.learn_text("brand new words", true);
        assert_eq!(engine.predict("bra", None, PredictOptions::NONE), vec!["brand"]);
    }

    #[test]
    fn learning_without_targets_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = WPEngine::new(EngineConfig::with_model_root(dir.path()));
        engine.set_model_ids(&["lm:system:en"], &[], &[]);
        engine.learn_text("hello", true);
        assert!(engine.predict("hel", None, PredictOptions::NONE).is_empty());
    }

    #[test]
    fn scratch_text_is_predicted_and_cleared() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = new_engine(dir.path());
        engine.learn_scratch_text("example.org documentation");
        assert_eq!(engine.predict("docu", None, PredictOptions::NONE), vec!["documentation"]);
        engine.clear_scratch_models();
        assert!(engine.predict("docu", None, PredictOptions::NONE).is_empty());
    }

    #[test]
    fn scratch_text_is_not_saved() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let engine = new_engine(dir.path());
            engine.learn_scratch_text("ephemeral");
        }
        let engine = new_engine(dir.path());
        assert!(engine.predict("ephem", None, PredictOptions::NONE).is_empty());
    }

    #[test]
    fn word_exists_checks_persistent_models() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = WPEngine::new(EngineConfig::with_model_root(dir.path()));
        engine.set_model_ids(&["lm:user:en"], &["lm:user:en"], &[]);
        assert!(!engine.word_exists("kettle"));
        engine.learn_text("kettle", true);
        assert!(engine.word_exists("kettle"));
    }

    #[test]
    fn tokenizes_and_looks_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = new_engine(dir.path());
        engine.learn_text("hello world", true);
        let (tokens, codes) = engine.lookup_text("hello wor", &["lm:user:en"]);
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["hello", "wor"]);
        assert_eq!(codes, vec![vec![1], vec![-1]]);
        assert_eq!(tokens[1].span, crate::core::types::Span::new(6, 3));
    }

    #[test]
    fn last_context_fragment_is_the_partial_word() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = new_engine(dir.path());
        assert_eq!(engine.get_last_context_fragment("see you tomo"), "tomo");
        assert_eq!(engine.get_last_context_fragment("see you "), "");
        assert_eq!(engine.get_last_context_fragment(""), "");
        let long = format!("{} tail", "x".repeat(5000));
        assert_eq!(engine.get_last_context_fragment(&long), "tail");
    }

    #[test]
    fn save_and_reload_keeps_learned_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let engine = new_engine(dir.path());
            engine.learn_text("persistent memory", true);
            engine.save_models("test", true);
            engine.wait_for_save();
        }
        let engine = new_engine(dir.path());
        assert_eq!(engine.predict("pers", None, PredictOptions::NONE), vec!["persistent"]);
        assert_eq!(engine.get_model_names(ModelClass::User), vec!["en"]);
    }

    #[test]
    fn autosave_tick_saves_after_interval() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = ManualClock::new();
        let engine = WPEngine::with_clock(EngineConfig::with_model_root(dir.path()), Arc::new(clock.clone()));
        engine.set_model_ids(&["lm:system:en"], &["lm:user:en"], &[]);
        engine.learn_text("ticking", true);
        assert!(!engine.on_autosave_tick());
        clock.advance(Duration::from_secs(601));
        engine.pause_autosave();
        assert!(!engine.on_autosave_tick());
        engine.resume_autosave();
        assert!(engine.on_autosave_tick());
        engine.wait_for_save();
        assert!(dir.path().join("user").join("en.lm").exists());
    }

    #[test]
    fn learning_log_records_sections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = EngineConfig::with_model_root(dir.path());
        config.log_learning = true;
        let engine = WPEngine::new(config);
        engine.set_model_ids(&["lm:user:en"], &["lm:user:en"], &[]);
        engine.learn_text("first words. second", true);
        let log = std::fs::read_to_string(dir.path().join("user").join("learned_text.txt"))
            .expect("log");
        assert!(log.starts_with("first words <s> second\n\n"));
    }
}

// File: src/cache.rs
use crate::config::EngineConfig;
use crate::error::{Result, WpError};
use crate::lm::{CachedDynamicModel, DynamicModel, LanguageModel, UnigramModel};
use crate::lmid::{Lmid, ModelClass};
use crate::persistence::{load_model_data, read_order, stage_save};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Owner of all loaded language models, keyed by canonical LMID.
///
/// Models are created on first reference and stay cached until the cache
/// is cleared, so repeated lookups return the same instance.
pub struct ModelCache {
    system_dir: PathBuf,
    user_dir: PathBuf,
    default_order: usize,
    models: HashMap<String, Box<dyn LanguageModel>>,
}

impl ModelCache {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            system_dir: config.system_model_dir.clone(),
            user_dir: config.user_model_dir.clone(),
            default_order: config.default_order.max(1),
            models: HashMap::new(),
        }
    }

    fn class_dir(&self, class: ModelClass) -> Option<&Path> {
        match class {
            ModelClass::System => Some(self.system_dir.as_path()),
            ModelClass::User => Some(self.user_dir.as_path()),
            ModelClass::Mem => None,
        }
    }

    /// Path of the model file, `None` for in-memory models or bad ids.
    pub fn model_filename(&self, lmid: &str) -> Option<PathBuf> {
        let id = Lmid::parse(lmid).ok()?;
        self.class_dir(id.class).map(|dir| dir.join(id.file_name()))
    }

    pub fn contains(&self, lmid: &str) -> bool {
        Lmid::parse(lmid).map_or(false, |id| self.models.contains_key(&id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Resolves a model, loading it on first use. Invalid ids are logged and
    /// yield `None`.
    pub fn get_model(&mut self, lmid: &str) -> Option<&mut dyn LanguageModel> {
        let key = self.ensure_loaded(lmid)?;
        match self.models.get_mut(&key) {
            Some(model) => Some(model.as_mut()),
            None => None,
        }
    }

    fn ensure_loaded(&mut self, lmid: &str) -> Option<String> {
        let id = match Lmid::parse(lmid) {
            Ok(id) => id,
            Err(e) => {
                error!(lmid, error = %e, "ignoring model");
                return None;
            }
        };
        let key = id.to_string();
        if !self.models.contains_key(&key) {
            let model = self.load_model(&id);
            self.models.insert(key.clone(), model);
        }
        Some(key)
    }

    /// Canonical ids of all resolvable models in `lmids`, in input order.
    pub fn get_model_ids<S: AsRef<str>>(&mut self, lmids: &[S]) -> Vec<String> {
        lmids.iter().filter_map(|lmid| self.ensure_loaded(lmid.as_ref())).collect()
    }

    /// Resolves every id, skipping the ones that fail.
    pub fn get_models<S: AsRef<str>>(&mut self, lmids: &[S]) -> Vec<&dyn LanguageModel> {
        let keys = self.get_model_ids(lmids);
        self.loaded_models(&keys)
    }

    /// Already loaded models for canonical ids.
    pub fn loaded_models(&self, keys: &[String]) -> Vec<&dyn LanguageModel> {
        keys.iter().filter_map(|key| self.models.get(key)).map(|m| m.as_ref()).collect()
    }

    /// Builds the model for `id`. Never fails: missing files give empty
    /// models and unreadable ones give empty models carrying a load error.
    pub fn load_model(&self, id: &Lmid) -> Box<dyn LanguageModel> {
        let order = self.default_order;
        let empty = |class: ModelClass| -> Box<dyn LanguageModel> {
            match class {
                ModelClass::User => Box::new(CachedDynamicModel::new(order)),
                ModelClass::System | ModelClass::Mem => Box::new(DynamicModel::new(order)),
            }
        };

        let Some(dir) = self.class_dir(id.class) else {
            return empty(id.class);
        };
        let path = dir.join(id.file_name());
        if !path.exists() {
            match id.class {
                ModelClass::System => warn!(lmid = %id, path = %path.display(), "system model not found"),
                _ => info!(lmid = %id, "starting new model"),
            }
            return empty(id.class);
        }

        match Self::read_model(id.class, &path) {
            Ok(model) => {
                info!(lmid = %id, order = model.order(), "loaded model");
                model
            }
            Err(e) => {
                error!(lmid = %id, path = %path.display(), error = %e, "failed to load model");
                let mut model = empty(id.class);
                model.set_load_error(e.to_string());
                model
            }
        }
    }

    fn read_model(class: ModelClass, path: &Path) -> Result<Box<dyn LanguageModel>> {
        let model: Box<dyn LanguageModel> = match class {
            ModelClass::System if read_order(path)? == 1 => {
                Box::new(UnigramModel::from_data(load_model_data(path)?)?)
            }
            ModelClass::System | ModelClass::Mem => {
                Box::new(DynamicModel::from_data(load_model_data(path)?)?)
            }
            ModelClass::User => Box::new(CachedDynamicModel::from_data(load_model_data(path)?)?),
        };
        Ok(model)
    }

    /// Writes one user model to disk and marks it clean.
    pub fn save_model(&mut self, lmid: &str) -> Result<()> {
        let id = Lmid::parse(lmid)?;
        let key = id.to_string();
        if id.class != ModelClass::User {
            return Err(WpError::NotPersistent(key));
        }
        let path = self.user_dir.join(id.file_name());
        let model = self
            .models
            .get_mut(&key)
            .ok_or_else(|| WpError::NotPersistent(format!("{key} is not loaded")))?;
        if let Some(message) = model.load_error() {
            return Err(WpError::LoadError(format!("{key}: {message}")));
        }
        let data = model
            .to_data()
            .ok_or_else(|| WpError::NotPersistent(format!("{key} has no file format")))?;
        stage_save(&data, &path)?.commit()?;
        model.set_modified(false);
        info!(lmid = %key, path = %path.display(), entries = data.entries.len(), "saved model");
        Ok(())
    }

    /// Saves every modified user model. Failures are logged and leave the
    /// model dirty so a later save retries. Returns the number saved.
    pub fn save_models(&mut self) -> usize {
        let mut dirty: Vec<String> = self
            .models
            .iter()
            .filter(|(key, model)| {
                model.is_modified()
                    && Lmid::parse(key).map_or(false, |id| id.class == ModelClass::User)
            })
            .map(|(key, _)| key.clone())
            .collect();
        dirty.sort();

        let mut saved = 0;
        for key in dirty {
            match self.save_model(&key) {
                Ok(()) => saved += 1,
                Err(WpError::LoadError(message)) => {
                    warn!(lmid = %key, %message, "not saving model that failed to load");
                }
                Err(e) => error!(lmid = %key, error = %e, "failed to save model"),
            }
        }
        saved
    }

    /// Ids and messages of cached models that failed to load.
    pub fn load_errors(&self) -> Vec<(String, String)> {
        let mut errors: Vec<(String, String)> = self
            .models
            .iter()
            .filter_map(|(key, m)| m.load_error().map(|e| (key.clone(), e.to_string())))
            .collect();
        errors.sort();
        errors
    }

    /// Drops a model so that the next reference reloads it.
    pub fn evict(&mut self, lmid: &str) -> bool {
        Lmid::parse(lmid).map_or(false, |id| self.models.remove(&id.to_string()).is_some())
    }

    pub fn clear(&mut self) {
        self.models.clear();
    }

    /// Names of the model files available for `class`, sorted.
    pub fn find_available_model_names(&self, class: ModelClass) -> Vec<String> {
        let Some(dir) = self.class_dir(class) else {
            return Vec::new();
        };
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "lm"))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::save_model_data;

    fn cache(root: &Path) -> ModelCache {
        ModelCache::new(&EngineConfig::with_model_root(root))
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn learn(cache: &mut ModelCache, lmid: &str, text: &str) {
        let model = cache.get_model(lmid).expect("model");
        model.as_learnable_mut().expect("learnable").learn_tokens(&tokens(text), true);
    }

    #[test]
    fn same_instance_until_cleared() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = cache(dir.path());
        let first = cache.get_model("lm:user:en_US").map(|m| m as *const _ as *const u8);
        let second = cache.get_model("user:en_US").map(|m| m as *const _ as *const u8);
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(!cache.contains("lm:user:en_US"));
    }

    #[test]
    fn invalid_ids_resolve_to_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = cache(dir.path());
        assert!(cache.get_model("lm:bogus:en").is_none());
        let ids = cache.get_model_ids(&["lm:bogus:en", "mem:a", "user:b"]);
        assert_eq!(ids, vec!["lm:mem:a", "lm:user:b"]);
        assert_eq!(cache.get_models(&["mem:a", "nope:x:y"]).len(), 1);
    }

    #[test]
    fn class_decides_variant() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = cache(dir.path());
        assert!(cache.get_model("lm:mem:scratch").and_then(|m| m.as_learnable_mut()).is_some());
        assert!(cache.get_model("lm:system:en").map(|m| m.load_error().is_none()).unwrap_or(false));
        assert!(cache.model_filename("lm:mem:scratch").is_none());
        assert_eq!(
            cache.model_filename("user:de"),
            Some(dir.path().join("user").join("de.lm"))
        );
    }

    #[test]
    fn order_one_system_file_loads_as_unigram() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut words = DynamicModel::new(1);
        crate::lm::Learnable::learn_tokens(&mut words, &tokens("one two two"), true);
        let data = words.to_data().expect("data");
        save_model_data(&data, &dir.path().join("system").join("words.lm")).expect("save");

        let mut cache = cache(dir.path());
        let model = cache.get_model("system:words").expect("model");
        assert_eq!(model.order(), 1);
        assert_eq!(model.lookup_word("two"), 2);
        assert!(model.as_learnable_mut().is_none());
    }

    #[test]
    fn saves_only_dirty_user_models() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = cache(dir.path());
        learn(&mut cache, "user:en", "a a a b");
        learn(&mut cache, "mem:tmp", "x y");
        learn(&mut cache, "system:en", "x y");
        assert_eq!(cache.save_models(), 1);
        assert_eq!(cache.save_models(), 0);
        assert!(dir.path().join("user").join("en.lm").exists());
        assert!(!dir.path().join("system").join("en.lm").exists());

        let mut fresh = self::cache(dir.path());
        let model = fresh.get_model("user:en").expect("model");
        assert_eq!(model.lookup_word("a"), 3);
        assert_eq!(model.lookup_word("b"), 1);
    }

    #[test]
    fn corrupt_file_sets_sticky_error_and_is_never_saved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("user").join("en.lm");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, b"garbage that is not a model").expect("write");
        let before = fs::read(&path).expect("read");

        let mut cache = cache(dir.path());
        learn(&mut cache, "user:en", "still learns in memory");
        let model = cache.get_model("user:en").expect("model");
        assert!(model.load_error().is_some());
        assert_eq!(model.lookup_word("learns"), 1);

        assert_eq!(cache.save_models(), 0);
        assert!(matches!(cache.save_model("user:en"), Err(WpError::LoadError(_))));
        assert_eq!(fs::read(&path).expect("read"), before);
        assert_eq!(cache.load_errors().len(), 1);
    }

    #[test]
    fn failed_save_keeps_model_dirty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("user");
        // a plain file where the user directory should be
        fs::write(&blocker, b"x").expect("write");
        let mut cache = cache(dir.path());
        learn(&mut cache, "user:en", "hello");
        assert_eq!(cache.save_models(), 0);
        assert!(cache.get_model("user:en").map(|m| m.is_modified()).unwrap_or(false));
    }

    #[test]
    fn mem_models_are_not_persistent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = cache(dir.path());
        learn(&mut cache, "mem:x", "hello");
        assert!(matches!(cache.save_model("mem:x"), Err(WpError::NotPersistent(_))));
    }

    #[test]
    fn lists_model_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let user = dir.path().join("user");
        fs::create_dir_all(&user).expect("mkdir");
        for name in ["en.lm", "de.lm", "en.lm.bak", "notes.txt"] {
            fs::write(user.join(name), b"").expect("write");
        }
        let cache = cache(dir.path());
        assert_eq!(cache.find_available_model_names(ModelClass::User), vec!["de", "en"]);
        assert!(cache.find_available_model_names(ModelClass::System).is_empty());
        assert!(cache.find_available_model_names(ModelClass::Mem).is_empty());
    }
}

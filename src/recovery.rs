// File: src/recovery.rs
use crate::cache::ModelCache;
use crate::error::Result;
use crate::lmid::{Lmid, ModelClass};
use crate::persistence::{backup_path, broken_path};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// What was done about one model that failed to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// The broken file was moved aside and the backup copied into its place.
    RestoredBackup { lmid: String, broken: PathBuf },
    /// No backup existed; the broken file was moved aside and the model
    /// starts over empty.
    MovedAside { lmid: String, broken: PathBuf },
}

impl RecoveryAction {
    pub fn lmid(&self) -> &str {
        match self {
            Self::RestoredBackup { lmid, .. } | Self::MovedAside { lmid, .. } => lmid,
        }
    }
}

/// Moves the files of user models that failed to load out of the way,
/// restoring `<file>.bak` where one exists, and evicts those models so the
/// next reference loads them again.
pub fn recover_broken_models(cache: &mut ModelCache) -> Vec<RecoveryAction> {
    let mut actions = Vec::new();
    for (lmid, message) in cache.load_errors() {
        let is_user = Lmid::parse(&lmid).map_or(false, |id| id.class == ModelClass::User);
        let Some(path) = cache.model_filename(&lmid).filter(|_| is_user) else {
            continue;
        };
        warn!(%lmid, %message, "recovering broken model");
        match recover_file(&lmid, &path) {
            Ok(Some(action)) => {
                cache.evict(&lmid);
                actions.push(action);
            }
            Ok(None) => {
                cache.evict(&lmid);
            }
            Err(e) => error!(%lmid, error = %e, "model recovery failed"),
        }
    }
    actions
}

fn recover_file(lmid: &str, path: &Path) -> Result<Option<RecoveryAction>> {
    if !path.exists() {
        return Ok(None);
    }
    let broken = broken_path(path);
    fs::rename(path, &broken)?;
    let backup = backup_path(path);
    if backup.exists() {
        fs::copy(&backup, path)?;
        Ok(Some(RecoveryAction::RestoredBackup { lmid: lmid.to_string(), broken }))
    } else {
        Ok(Some(RecoveryAction::MovedAside { lmid: lmid.to_string(), broken }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::lm::{ModelData, NgramEntry};
    use crate::persistence::save_model_data;

    fn data(word: &str, count: u32) -> ModelData {
        ModelData {
            order: 2,
            clock: count,
            entries: vec![NgramEntry { words: vec![word.to_string()], count, time: 1 }],
        }
    }

    #[test]
    fn restores_backup_over_broken_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig::with_model_root(dir.path());
        let path = config.user_model_dir.join("en.lm");
        save_model_data(&data("good", 4), &path).expect("save");
        // second save turns the first file into the backup
        save_model_data(&data("newer", 1), &path).expect("save");
        fs::write(&path, b"garbage").expect("corrupt");

        let mut cache = ModelCache::new(&config);
        let model = cache.get_model("lm:user:en").expect("model");
        assert!(model.load_error().is_some());

        let actions = recover_broken_models(&mut cache);
        assert_eq!(actions.len(), 1);
        let RecoveryAction::RestoredBackup { broken, .. } = &actions[0] else {
            panic!("expected restore, got {actions:?}");
        };
        assert_eq!(fs::read(broken).expect("broken"), b"garbage");
        assert!(!cache.contains("lm:user:en"));

        let model = cache.get_model("lm:user:en").expect("model");
        assert!(model.load_error().is_none());
        assert_eq!(model.lookup_word("good"), 4);
    }

    #[test]
    fn moves_broken_file_aside_without_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig::with_model_root(dir.path());
        fs::create_dir_all(&config.user_model_dir).expect("dir");
        let path = config.user_model_dir.join("de.lm");
        fs::write(&path, b"not a model").expect("write");

        let mut cache = ModelCache::new(&config);
        cache.get_model("lm:user:de");
        let actions = recover_broken_models(&mut cache);
        assert!(matches!(&actions[..], [RecoveryAction::MovedAside { lmid, .. }] if lmid == "lm:user:de"));
        assert!(!path.exists());

        let model = cache.get_model("lm:user:de").expect("model");
        assert!(model.load_error().is_none());
        assert_eq!(model.lookup_word("anything"), 0);
    }

    #[test]
    fn healthy_models_are_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig::with_model_root(dir.path());
        let mut cache = ModelCache::new(&config);
        cache.get_model("lm:user:en");
        assert!(recover_broken_models(&mut cache).is_empty());
        assert!(cache.contains("lm:user:en"));
    }
}

use crate::{
    error::{IoResultExt, ModError, ModResult},
    game::{GameLayout, CONFIG_FILE_NAME},
};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub const SELECT_GAME_TITLE: &str = "Select the game folder";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RainbowConfig {
    pub game_path: PathBuf,
}

pub trait ConfigStore {
    fn load(&self) -> ModResult<Option<RainbowConfig>>;
    fn save(&self, config: &RainbowConfig) -> ModResult<()>;
    fn location(&self) -> String;
}

impl<S: ConfigStore + ?Sized> ConfigStore for Box<S> {
    fn load(&self) -> ModResult<Option<RainbowConfig>> {
        (**self).load()
    }

    fn save(&self, config: &RainbowConfig) -> ModResult<()> {
        (**self).save(config)
    }

    fn location(&self) -> String {
        (**self).location()
    }
}

/// Asks the user for a directory. `Ok(None)` means the selection was cancelled.
pub trait PathPrompt {
    fn select_directory(&mut self, title: &str) -> io::Result<Option<PathBuf>>;
}

#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for JsonConfigStore {
    fn default() -> Self {
        Self::new(CONFIG_FILE_NAME)
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(&self) -> ModResult<Option<RainbowConfig>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ModError::io(
                    format!("read config {}", self.path.display()),
                    err,
                ))
            }
        };
        let config = serde_json::from_str(&raw).map_err(|source| ModError::Config {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(config))
    }

    fn save(&self, config: &RainbowConfig) -> ModResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .io_context(|| format!("create config dir {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(config).map_err(|source| ModError::Config {
            path: self.path.clone(),
            source,
        })?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, raw).io_context(|| format!("write {}", temp.display()))?;
        fs::rename(&temp, &self.path)
            .io_context(|| format!("finalize config {}", self.path.display()))?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Resolves and persists the game installation root.
pub struct PathConfig<S> {
    store: S,
}

impl<S: ConfigStore> PathConfig<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn stored_game_path(&self) -> ModResult<Option<PathBuf>> {
        Ok(self.store.load()?.map(|config| config.game_path))
    }

    /// Returns the stored root, prompting on first run or when the stored
    /// folder has disappeared.
    pub fn get_game_path(&self, prompt: &mut dyn PathPrompt) -> ModResult<PathBuf> {
        if let Some(path) = self.stored_game_path()? {
            if path.is_dir() {
                return Ok(path);
            }
            log::warn!(
                "configured game folder {} no longer exists",
                path.display()
            );
        }
        self.set_game_path(prompt)?.ok_or(ModError::ConfigMissing)
    }

    /// Always prompts. A cancelled prompt keeps the previous value.
    pub fn set_game_path(&self, prompt: &mut dyn PathPrompt) -> ModResult<Option<PathBuf>> {
        let Some(path) = prompt_directory(prompt, SELECT_GAME_TITLE)? else {
            log::info!("game folder selection cancelled");
            return Ok(None);
        };
        let path = self.save_game_path(&path)?;
        Ok(Some(path))
    }

    pub fn save_game_path(&self, path: &Path) -> ModResult<PathBuf> {
        let layout = GameLayout::open(path)?;
        let game_path = fs::canonicalize(layout.root()).unwrap_or_else(|_| path.to_path_buf());
        if !layout.has_content() {
            log::warn!(
                "{} has no content folder yet; it will be created on first install",
                game_path.display()
            );
        }
        self.store.save(&RainbowConfig {
            game_path: game_path.clone(),
        })?;
        log::info!(
            "game folder set to {} ({})",
            game_path.display(),
            self.store.location()
        );
        Ok(game_path)
    }
}

/// Prompts until an existing directory is chosen or the prompt is cancelled.
pub fn prompt_directory(prompt: &mut dyn PathPrompt, title: &str) -> ModResult<Option<PathBuf>> {
    loop {
        let choice = prompt
            .select_directory(title)
            .io_context(|| "read folder selection")?;
        match choice {
            None => return Ok(None),
            Some(path) if path.is_dir() => return Ok(Some(path)),
            Some(path) => log::warn!("{} is not a folder", path.display()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::{cell::RefCell, collections::VecDeque};

    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub config: RefCell<Option<RainbowConfig>>,
        pub saves: RefCell<usize>,
    }

    impl ConfigStore for MemoryStore {
        fn load(&self) -> ModResult<Option<RainbowConfig>> {
            Ok(self.config.borrow().clone())
        }

        fn save(&self, config: &RainbowConfig) -> ModResult<()> {
            *self.config.borrow_mut() = Some(config.clone());
            *self.saves.borrow_mut() += 1;
            Ok(())
        }

        fn location(&self) -> String {
            "memory".to_string()
        }
    }

    /// Answers prompts from a fixed script; an exhausted script cancels.
    pub(crate) struct ScriptedPrompt {
        pub answers: VecDeque<Option<PathBuf>>,
        pub asked: usize,
    }

    impl ScriptedPrompt {
        pub(crate) fn new(answers: Vec<Option<PathBuf>>) -> Self {
            Self {
                answers: answers.into(),
                asked: 0,
            }
        }
    }

    impl PathPrompt for ScriptedPrompt {
        fn select_directory(&mut self, _title: &str) -> io::Result<Option<PathBuf>> {
            self.asked += 1;
            Ok(self.answers.pop_front().flatten())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{MemoryStore, ScriptedPrompt};
    use super::*;
    use tempfile::TempDir;

    fn canonical(path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap()
    }

    #[test]
    fn json_store_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonConfigStore::new(dir.path().join("missing.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn json_store_round_trips_and_uses_game_path_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let store = JsonConfigStore::new(&path);
        let config = RainbowConfig {
            game_path: PathBuf::from("/games/smatrs"),
        };

        store.save(&config).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["game_path"], "/games/smatrs");
        assert_eq!(store.load().unwrap(), Some(config));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn json_store_save_replaces_existing_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let store = JsonConfigStore::new(&path);
        store
            .save(&RainbowConfig {
                game_path: PathBuf::from("/games/old"),
            })
            .unwrap();
        let newer = RainbowConfig {
            game_path: PathBuf::from("/games/new"),
        };

        store.save(&newer).unwrap();

        assert_eq!(store.load().unwrap(), Some(newer));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn json_store_reports_corrupt_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();
        let err = JsonConfigStore::new(&path).load().unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn first_run_prompts_and_persists() {
        let game = TempDir::new().unwrap();
        let config = PathConfig::new(MemoryStore::default());
        let mut prompt = ScriptedPrompt::new(vec![Some(game.path().to_path_buf())]);

        let path = config.get_game_path(&mut prompt).unwrap();

        assert_eq!(path, canonical(game.path()));
        assert_eq!(config.stored_game_path().unwrap(), Some(path));
        assert_eq!(prompt.asked, 1);
    }

    #[test]
    fn stored_path_skips_prompt() {
        let game = TempDir::new().unwrap();
        let store = MemoryStore::default();
        *store.config.borrow_mut() = Some(RainbowConfig {
            game_path: game.path().to_path_buf(),
        });
        let config = PathConfig::new(store);
        let mut prompt = ScriptedPrompt::new(Vec::new());

        assert_eq!(config.get_game_path(&mut prompt).unwrap(), game.path());
        assert_eq!(prompt.asked, 0);
    }

    #[test]
    fn cancelled_first_run_is_config_missing() {
        let config = PathConfig::new(MemoryStore::default());
        let mut prompt = ScriptedPrompt::new(vec![None]);

        let err = config.get_game_path(&mut prompt).unwrap_err();

        assert!(matches!(err, ModError::ConfigMissing));
        assert_eq!(*config.store().saves.borrow(), 0);
    }

    #[test]
    fn stale_path_reprompts() {
        let game = TempDir::new().unwrap();
        let store = MemoryStore::default();
        *store.config.borrow_mut() = Some(RainbowConfig {
            game_path: game.path().join("gone"),
        });
        let config = PathConfig::new(store);
        let mut prompt = ScriptedPrompt::new(vec![Some(game.path().to_path_buf())]);

        let path = config.get_game_path(&mut prompt).unwrap();

        assert_eq!(path, canonical(game.path()));
        assert_eq!(prompt.asked, 1);
    }

    #[test]
    fn prompt_retries_until_directory() {
        let game = TempDir::new().unwrap();
        let file = game.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        let mut prompt = ScriptedPrompt::new(vec![
            Some(game.path().join("nope")),
            Some(file),
            Some(game.path().to_path_buf()),
        ]);

        let chosen = prompt_directory(&mut prompt, "pick").unwrap();

        assert_eq!(chosen, Some(game.path().to_path_buf()));
        assert_eq!(prompt.asked, 3);
    }

    #[test]
    fn set_game_path_always_prompts_and_cancel_keeps_old_value() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let config = PathConfig::new(MemoryStore::default());
        config.save_game_path(first.path()).unwrap();

        let mut prompt = ScriptedPrompt::new(vec![None]);
        assert_eq!(config.set_game_path(&mut prompt).unwrap(), None);
        assert_eq!(
            config.stored_game_path().unwrap(),
            Some(canonical(first.path()))
        );

        let mut prompt = ScriptedPrompt::new(vec![Some(second.path().to_path_buf())]);
        let changed = config.set_game_path(&mut prompt).unwrap();
        assert_eq!(changed, Some(canonical(second.path())));
        assert_eq!(config.stored_game_path().unwrap(), changed);
    }
}

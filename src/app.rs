use crate::{
    authoring, backup,
    config::{ConfigStore, PathConfig, PathPrompt},
    error::{IoResultExt, ModError, ModResult},
    game::{self, GameLayout},
    installer,
    progress::{OperationLock, ProgressSink},
};
use std::{
    io,
    path::{Path, PathBuf},
};

const LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupMode {
    Ui,
    Cli,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerbosity {
    Quiet,
    Normal,
    Verbose,
    Debug,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ApplyMod,
    ApplyModpack,
    RemoveMods,
    CreateMod,
    CreateModpack,
    ChangePath,
    Quit,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::ApplyMod,
        Action::ApplyModpack,
        Action::RemoveMods,
        Action::CreateMod,
        Action::CreateModpack,
        Action::ChangePath,
        Action::Quit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Action::ApplyMod => "Apply Mod",
            Action::ApplyModpack => "Apply Modpack",
            Action::RemoveMods => "Remove Mods",
            Action::CreateMod => "Create Mod",
            Action::CreateModpack => "Create Modpack",
            Action::ChangePath => "Change Path",
            Action::Quit => "Quit",
        }
    }

    pub fn hotkey(self) -> char {
        match self {
            Action::ApplyMod => 'm',
            Action::ApplyModpack => 'p',
            Action::RemoveMods => 'r',
            Action::CreateMod => 'c',
            Action::CreateModpack => 'k',
            Action::ChangePath => 'g',
            Action::Quit => 'q',
        }
    }

    pub fn from_hotkey(key: char) -> Option<Action> {
        let key = key.to_ascii_lowercase();
        Action::ALL.into_iter().find(|action| action.hotkey() == key)
    }
}

/// What a presentation layer supplies to the app while an action runs:
/// prompts, progress, and a way to repaint between steps.
pub trait Interaction: PathPrompt + ProgressSink {
    fn select_file(&mut self, title: &str) -> io::Result<Option<PathBuf>>;
    fn select_files(&mut self, title: &str) -> io::Result<Option<Vec<PathBuf>>>;
    fn refresh(&mut self, view: AppView);
}

/// Owned snapshot of everything the screen shows.
#[derive(Debug, Clone, Default)]
pub struct AppView {
    pub game_root: String,
    pub backup_present: bool,
    pub status: String,
    pub progress: f32,
    pub logs: Vec<LogEntry>,
    pub selected: usize,
    pub busy: bool,
    pub log_path: Option<String>,
}

pub struct App {
    pub paths: PathConfig<Box<dyn ConfigStore>>,
    pub game_root: PathBuf,
    pub status: String,
    pub progress: f32,
    pub logs: Vec<LogEntry>,
    pub selected: usize,
    pub should_quit: bool,
    pub log_path: Option<PathBuf>,
    lock: OperationLock,
}

impl App {
    /// Resolves the game folder, prompting on first run. A cancelled first-run
    /// prompt ends the session with `ConfigMissing`.
    pub fn initialize(
        paths: PathConfig<Box<dyn ConfigStore>>,
        prompt: &mut dyn PathPrompt,
        log_path: Option<PathBuf>,
    ) -> ModResult<Self> {
        let game_root = paths.get_game_path(prompt)?;
        let mut app = App {
            paths,
            game_root,
            status: "Ready".to_string(),
            progress: 0.0,
            logs: Vec::new(),
            selected: 0,
            should_quit: false,
            log_path,
            lock: OperationLock::new(),
        };
        app.log_info(format!("Game folder: {}", app.game_root.display()));
        if let Some(path) = &app.log_path {
            let message = format!("Log file: {}", path.display());
            app.log_info(message);
        }
        Ok(app)
    }

    pub fn view(&self) -> AppView {
        AppView {
            game_root: self.game_root.display().to_string(),
            backup_present: self.game_root.join(game::BACKUP_DIR).is_dir(),
            status: self.status.clone(),
            progress: self.progress,
            logs: self.logs.clone(),
            selected: self.selected,
            busy: self.lock.is_busy(),
            log_path: self.log_path.as_ref().map(|path| path.display().to_string()),
        }
    }

    pub fn selected_action(&self) -> Action {
        Action::ALL[self.selected.min(Action::ALL.len() - 1)]
    }

    pub fn move_selection(&mut self, delta: isize) {
        let len = Action::ALL.len();
        if delta.is_negative() {
            self.selected = self.selected.saturating_sub(delta.unsigned_abs());
        } else {
            self.selected = self.selected.saturating_add(delta as usize);
        }
        if self.selected >= len {
            self.selected = len - 1;
        }
    }

    pub fn select(&mut self, action: Action) {
        if let Some(index) = Action::ALL.iter().position(|item| *item == action) {
            self.selected = index;
        }
    }

    pub fn log_info(&mut self, message: String) {
        self.push_log(LogLevel::Info, message);
    }

    pub fn log_warn(&mut self, message: String) {
        self.push_log(LogLevel::Warn, message);
    }

    pub fn log_error(&mut self, message: String) {
        self.push_log(LogLevel::Error, message);
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        match level {
            LogLevel::Info => log::info!("{message}"),
            LogLevel::Warn => log::warn!("{message}"),
            LogLevel::Error => log::error!("{message}"),
        }
        self.logs.push(LogEntry { level, message });
        if self.logs.len() > LOG_CAPACITY {
            let overflow = self.logs.len() - LOG_CAPACITY;
            self.logs.drain(0..overflow);
        }
    }

    pub fn run_action<I: Interaction>(&mut self, action: Action, io: &mut I) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::ApplyMod => self.guarded(io, |app, io| app.apply_mod(io)),
            Action::ApplyModpack => self.guarded(io, |app, io| app.apply_modpack(io)),
            Action::RemoveMods => self.guarded(io, |app, io| app.remove_mods(io)),
            Action::CreateMod => self.guarded(io, |app, io| app.create_mod(io)),
            Action::CreateModpack => self.guarded(io, |app, io| app.create_modpack(io)),
            Action::ChangePath => self.guarded(io, |app, io| app.change_game_path(io)),
        }
    }

    /// Applies a mod or modpack chosen outside the menu (launch argument).
    pub fn apply_file<I: Interaction>(&mut self, path: PathBuf, io: &mut I) {
        self.guarded(io, move |app, io| app.install(&path, io).map(Some));
    }

    /// Runs one mutating operation under the busy guard. Every failure ends up
    /// as a status line and the guard is dropped on every path.
    fn guarded<I, F>(&mut self, io: &mut I, op: F)
    where
        I: Interaction,
        F: FnOnce(&mut Self, &mut I) -> ModResult<Option<String>>,
    {
        let lock = self.lock.clone();
        let _guard = match lock.try_acquire() {
            Ok(guard) => guard,
            Err(err) => {
                self.report_error(&err);
                return;
            }
        };
        self.progress = 0.0;
        match op(self, io) {
            Ok(Some(message)) => {
                self.status = message.clone();
                self.log_info(message);
            }
            Ok(None) => {
                self.status = "Cancelled.".to_string();
            }
            Err(err) => self.report_error(&err),
        }
        io.refresh(self.view());
    }

    fn report_error(&mut self, err: &ModError) {
        self.status = format!("Error: {err}");
        self.log_error(format!("{}: {err}", err.kind()));
    }

    fn begin<I: Interaction>(&mut self, status: &str, io: &mut I) {
        self.status = status.to_string();
        self.progress = 0.0;
        io.refresh(self.view());
    }

    fn layout(&self) -> ModResult<GameLayout> {
        GameLayout::open(&self.game_root)
    }

    fn apply_mod<I: Interaction>(&mut self, io: &mut I) -> ModResult<Option<String>> {
        let title = format!("Select a mod file (.{})", game::MOD_EXTENSION);
        let Some(path) = io.select_file(&title).io_context(|| "read mod selection")? else {
            return Ok(None);
        };
        if game::is_modpack_path(&path) {
            return Err(ModError::validation(format!(
                "{} is a modpack; use Apply Modpack instead.",
                path.display()
            )));
        }
        let layout = self.layout()?;
        self.begin(installer::INSTALL_LABEL, io);
        let report = installer::apply_mod(&layout, &path, &mut Tracked { app: self, io })?;
        Ok(Some(report.summary()))
    }

    fn apply_modpack<I: Interaction>(&mut self, io: &mut I) -> ModResult<Option<String>> {
        let title = format!("Select a modpack file (.{})", game::MODPACK_EXTENSION);
        let Some(path) = io
            .select_file(&title)
            .io_context(|| "read modpack selection")?
        else {
            return Ok(None);
        };
        let layout = self.layout()?;
        self.begin(installer::INSTALL_LABEL, io);
        let report = installer::apply_modpack(&layout, &path, &mut Tracked { app: self, io })?;
        Ok(Some(report.summary()))
    }

    fn install<I: Interaction>(&mut self, path: &Path, io: &mut I) -> ModResult<String> {
        let layout = self.layout()?;
        self.begin(installer::INSTALL_LABEL, io);
        let report = installer::apply_path(&layout, path, &mut Tracked { app: self, io })?;
        Ok(report.summary())
    }

    fn remove_mods<I: Interaction>(&mut self, io: &mut I) -> ModResult<Option<String>> {
        let layout = self.layout()?;
        self.begin(backup::RESTORE_LABEL, io);
        let outcome = backup::restore(&layout, &mut Tracked { app: self, io })?;
        Ok(Some(format!(
            "Mods removed. Original content restored ({} files).",
            outcome.files
        )))
    }

    fn create_mod<I: Interaction>(&mut self, io: &mut I) -> ModResult<Option<String>> {
        let title = format!("Select the '{}' folder to pack", game::CONTENT_FOLDER_NAME);
        let Some(source) = io
            .select_directory(&title)
            .io_context(|| "read folder selection")?
        else {
            return Ok(None);
        };
        let title = format!("Save mod as (.{})", game::MOD_EXTENSION);
        let Some(output) = io.select_file(&title).io_context(|| "read output path")? else {
            return Ok(None);
        };
        let output = with_default_extension(output, game::MOD_EXTENSION);
        self.begin(authoring::PACK_MOD_LABEL, io);
        let report = authoring::create_mod(&source, &output, &mut Tracked { app: self, io })?;
        Ok(Some(format!("Mod created: {}", report.output.display())))
    }

    fn create_modpack<I: Interaction>(&mut self, io: &mut I) -> ModResult<Option<String>> {
        let Some(mods) = io
            .select_files("Select the mods to bundle")
            .io_context(|| "read mod selection")?
        else {
            return Ok(None);
        };
        if mods.len() < 2 {
            return Err(ModError::validation(
                "Select at least two mods to build a modpack.",
            ));
        }
        let title = format!("Save modpack as (.{})", game::MODPACK_EXTENSION);
        let Some(output) = io.select_file(&title).io_context(|| "read output path")? else {
            return Ok(None);
        };
        let output = with_default_extension(output, game::MODPACK_EXTENSION);
        self.begin(authoring::PACK_MODPACK_LABEL, io);
        let report =
            authoring::create_modpack(&mods, &output, &mut Tracked { app: self, io })?;
        Ok(Some(format!(
            "Modpack created: {} ({} mods)",
            report.output.display(),
            report.entries
        )))
    }

    fn change_game_path<I: Interaction>(&mut self, io: &mut I) -> ModResult<Option<String>> {
        let Some(path) = self.paths.set_game_path(io)? else {
            return Ok(Some("Game path unchanged.".to_string()));
        };
        self.game_root = path;
        Ok(Some(format!("Game path set to {}", self.game_root.display())))
    }
}

/// Mirrors core progress into the app state before handing it to the
/// presentation layer.
struct Tracked<'a, I> {
    app: &'a mut App,
    io: &'a mut I,
}

impl<I: Interaction> ProgressSink for Tracked<'_, I> {
    fn report(&mut self, status: &str, percent: f32) {
        self.app.status = status.to_string();
        self.app.progress = percent;
        self.io.report(status, percent);
    }
}

fn with_default_extension(path: PathBuf, extension: &str) -> PathBuf {
    if path.extension().is_some() {
        path
    } else {
        path.with_extension(extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archive::fixtures::{write_zip, zip_bytes},
        config::{testing::MemoryStore, RainbowConfig},
    };
    use std::{collections::VecDeque, fs};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Script {
        dirs: VecDeque<Option<PathBuf>>,
        files: VecDeque<Option<PathBuf>>,
        lists: VecDeque<Option<Vec<PathBuf>>>,
        reports: Vec<(String, f32)>,
        refreshes: Vec<AppView>,
    }

    impl PathPrompt for Script {
        fn select_directory(&mut self, _title: &str) -> io::Result<Option<PathBuf>> {
            Ok(self.dirs.pop_front().flatten())
        }
    }

    impl ProgressSink for Script {
        fn report(&mut self, status: &str, percent: f32) {
            self.reports.push((status.to_string(), percent));
        }
    }

    impl Interaction for Script {
        fn select_file(&mut self, _title: &str) -> io::Result<Option<PathBuf>> {
            Ok(self.files.pop_front().flatten())
        }

        fn select_files(&mut self, _title: &str) -> io::Result<Option<Vec<PathBuf>>> {
            Ok(self.lists.pop_front().flatten())
        }

        fn refresh(&mut self, view: AppView) {
            self.refreshes.push(view);
        }
    }

    fn app_for(game: &Path) -> App {
        let store = MemoryStore::default();
        *store.config.borrow_mut() = Some(RainbowConfig {
            game_path: game.to_path_buf(),
        });
        let store: Box<dyn ConfigStore> = Box::new(store);
        App::initialize(PathConfig::new(store), &mut Script::default(), None).unwrap()
    }

    fn game_dir(dir: &TempDir) -> PathBuf {
        let root = dir.path().join("game");
        let content = root.join(game::CONTENT_DIR);
        fs::create_dir_all(&content).unwrap();
        fs::write(content.join("a.txt"), "1").unwrap();
        root
    }

    #[test]
    fn cancelled_first_run_fails_initialize() {
        let store: Box<dyn ConfigStore> = Box::new(MemoryStore::default());
        let err = App::initialize(PathConfig::new(store), &mut Script::default(), None)
            .err()
            .unwrap();
        assert!(matches!(err, ModError::ConfigMissing));
    }

    #[test]
    fn apply_mod_action_updates_status_and_releases_guard() {
        let dir = TempDir::new().unwrap();
        let root = game_dir(&dir);
        let mod_path = dir.path().join("x.rsm");
        write_zip(&mod_path, &[("data/worlds/SMATRS Demo 2/a.txt", b"2")]);
        let mut app = app_for(&root);
        let mut script = Script::default();
        script.files.push_back(Some(mod_path));

        app.run_action(Action::ApplyMod, &mut script);

        assert_eq!(app.status, "x.rsm applied successfully.");
        assert_eq!(app.progress, 100.0);
        assert!(!app.lock.is_busy());
        assert!(script.refreshes.iter().any(|view| view.busy));
        assert_eq!(
            fs::read_to_string(root.join(game::CONTENT_DIR).join("a.txt")).unwrap(),
            "2"
        );
        assert!(app.view().backup_present);
        assert!(script
            .reports
            .iter()
            .any(|(label, _)| label == installer::INSTALL_LABEL));
    }

    #[test]
    fn apply_mod_action_rejects_modpack_files() {
        let dir = TempDir::new().unwrap();
        let root = game_dir(&dir);
        let inner = zip_bytes(&[("data/worlds/SMATRS Demo 2/a.txt", b"packed")]);
        let pack = dir.path().join("p.rsmp");
        write_zip(&pack, &[("inner.rsm", &inner)]);
        let mut app = app_for(&root);
        let mut script = Script::default();
        script.files.push_back(Some(pack));

        app.run_action(Action::ApplyMod, &mut script);

        assert!(app.status.starts_with("Error: "));
        assert!(app.logs.last().unwrap().message.starts_with("ValidationError"));
        assert!(!root.join("inner.rsm").exists());
        assert!(!root.join(game::BACKUP_DIR).exists());
        assert_eq!(
            fs::read_to_string(root.join(game::CONTENT_DIR).join("a.txt")).unwrap(),
            "1"
        );
    }

    #[test]
    fn failures_become_error_status() {
        let dir = TempDir::new().unwrap();
        let root = game_dir(&dir);
        let mut app = app_for(&root);

        app.run_action(Action::RemoveMods, &mut Script::default());

        assert!(app.status.starts_with("Error: "));
        assert_eq!(app.logs.last().unwrap().level, LogLevel::Error);
        assert!(app.logs.last().unwrap().message.starts_with("NotFoundError"));
        assert!(!app.lock.is_busy());
    }

    #[test]
    fn cancelled_prompt_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let mut app = app_for(&game_dir(&dir));
        app.run_action(Action::ApplyMod, &mut Script::default());
        assert_eq!(app.status, "Cancelled.");
        assert!(!app.lock.is_busy());
    }

    #[test]
    fn busy_app_rejects_second_action() {
        let dir = TempDir::new().unwrap();
        let mut app = app_for(&game_dir(&dir));
        let lock = app.lock.clone();
        let _held = lock.try_acquire().unwrap();

        app.run_action(Action::RemoveMods, &mut Script::default());

        assert!(app.status.contains("already running"));
    }

    #[test]
    fn apply_then_remove_restores_original() {
        let dir = TempDir::new().unwrap();
        let root = game_dir(&dir);
        let inner = zip_bytes(&[("data/worlds/SMATRS Demo 2/a.txt", b"packed")]);
        let pack = dir.path().join("p.rsmp");
        write_zip(&pack, &[("inner.rsm", &inner)]);
        let mut app = app_for(&root);
        let mut script = Script::default();

        app.apply_file(pack, &mut script);
        assert_eq!(app.status, "p.rsmp applied successfully (1 mods).");
        app.run_action(Action::RemoveMods, &mut script);

        assert!(app.status.starts_with("Mods removed."));
        assert_eq!(
            fs::read_to_string(root.join(game::CONTENT_DIR).join("a.txt")).unwrap(),
            "1"
        );
    }

    #[test]
    fn create_actions_add_default_extensions() {
        let dir = TempDir::new().unwrap();
        let mut app = app_for(&game_dir(&dir));
        let data = dir.path().join("work").join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("x.txt"), "x").unwrap();
        let mut script = Script::default();
        script.dirs.push_back(Some(data));
        script.files.push_back(Some(dir.path().join("one")));

        app.run_action(Action::CreateMod, &mut script);

        let one = dir.path().join("one.rsm");
        assert!(one.is_file(), "{}", app.status);

        let two = dir.path().join("two.rsm");
        fs::copy(&one, &two).unwrap();
        script.lists.push_back(Some(vec![one, two]));
        script.files.push_back(Some(dir.path().join("bundle")));
        app.run_action(Action::CreateModpack, &mut script);

        assert!(dir.path().join("bundle.rsmp").is_file(), "{}", app.status);
        assert!(app.status.contains("2 mods"));
    }

    #[test]
    fn create_modpack_with_one_mod_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut app = app_for(&game_dir(&dir));
        let mut script = Script::default();
        script.lists.push_back(Some(vec![dir.path().join("only.rsm")]));

        app.run_action(Action::CreateModpack, &mut script);

        assert!(app.status.starts_with("Error: "));
        assert!(app.logs.last().unwrap().message.starts_with("ValidationError"));
    }

    #[test]
    fn change_path_switches_game_root() {
        let dir = TempDir::new().unwrap();
        let mut app = app_for(&game_dir(&dir));
        let other = dir.path().join("other");
        fs::create_dir_all(&other).unwrap();
        let mut script = Script::default();
        script.dirs.push_back(Some(other.clone()));

        app.run_action(Action::ChangePath, &mut script);

        assert_eq!(app.game_root, fs::canonicalize(&other).unwrap());
        assert!(app.status.starts_with("Game path set to"));
    }

    #[test]
    fn menu_navigation_clamps_and_hotkeys_resolve() {
        let dir = TempDir::new().unwrap();
        let mut app = app_for(&game_dir(&dir));
        app.move_selection(-3);
        assert_eq!(app.selected_action(), Action::ApplyMod);
        app.move_selection(42);
        assert_eq!(app.selected_action(), Action::Quit);
        assert_eq!(Action::from_hotkey('R'), Some(Action::RemoveMods));
        assert_eq!(Action::from_hotkey('z'), None);
    }

    #[test]
    fn log_is_bounded() {
        let dir = TempDir::new().unwrap();
        let mut app = app_for(&game_dir(&dir));
        for index in 0..(LOG_CAPACITY + 5) {
            app.log_info(format!("line {index}"));
        }
        assert_eq!(app.logs.len(), LOG_CAPACITY);
        assert_eq!(
            app.logs.last().unwrap().message,
            format!("line {}", LOG_CAPACITY + 4)
        );
    }
}

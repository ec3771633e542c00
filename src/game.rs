use crate::error::{ModError, ModResult};
use std::path::{Path, PathBuf};

pub const GAME_NAME: &str = "SMATRS Demo 2";
pub const CONTENT_DIR: &str = "data/worlds/SMATRS Demo 2";
pub const BACKUP_DIR: &str = "backup/SMATRS_Demo_2_Backup";
/// Top-level folder every mod archive is rooted at.
pub const CONTENT_FOLDER_NAME: &str = "data";
pub const MOD_EXTENSION: &str = "rsm";
pub const MODPACK_EXTENSION: &str = "rsmp";
pub const CONFIG_FILE_NAME: &str = "rainbow_modloader_config.json";

#[derive(Debug, Clone)]
pub struct GameLayout {
    root: PathBuf,
}

impl GameLayout {
    pub fn open(root: &Path) -> ModResult<Self> {
        if !root.is_dir() {
            return Err(ModError::GameRootMissing(root.to_path_buf()));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join(CONTENT_DIR)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    pub fn has_backup(&self) -> bool {
        self.backup_dir().is_dir()
    }

    pub fn has_content(&self) -> bool {
        self.content_dir().is_dir()
    }
}

pub fn is_mod_archive_name(name: &str) -> bool {
    has_extension(Path::new(name), MOD_EXTENSION)
}

pub fn is_mod_archive_path(path: &Path) -> bool {
    has_extension(path, MOD_EXTENSION)
}

pub fn is_modpack_path(path: &Path) -> bool {
    has_extension(path, MODPACK_EXTENSION)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = GameLayout::open(&missing).unwrap_err();
        assert!(matches!(err, ModError::GameRootMissing(path) if path == missing));
    }

    #[test]
    fn layout_paths_hang_off_root() {
        let dir = TempDir::new().unwrap();
        let layout = GameLayout::open(dir.path()).unwrap();
        assert_eq!(
            layout.content_dir(),
            dir.path().join("data").join("worlds").join("SMATRS Demo 2")
        );
        assert_eq!(
            layout.backup_dir(),
            dir.path().join("backup").join("SMATRS_Demo_2_Backup")
        );
        assert!(!layout.has_backup());
        assert!(!layout.has_content());
    }

    #[test]
    fn extension_checks_ignore_case() {
        assert!(is_mod_archive_name("Cool Mod.RSM"));
        assert!(is_mod_archive_name("nested/dir/a.rsm"));
        assert!(!is_mod_archive_name("readme.txt"));
        assert!(!is_mod_archive_name("pack.rsmp"));
        assert!(is_modpack_path(Path::new("/tmp/pack.rsmp")));
        assert!(!is_modpack_path(Path::new("/tmp/mod.rsm")));
    }
}

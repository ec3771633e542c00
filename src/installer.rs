use crate::{
    archive,
    backup::{self, BackupOutcome},
    error::ModResult,
    game::{self, GameLayout},
    progress::{percent_of, ProgressSink},
};
use std::path::{Path, PathBuf};

pub const INSTALL_LABEL: &str = "Installing Mod...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub source: PathBuf,
    pub backup: BackupOutcome,
    /// Mods applied, in the order they were extracted.
    pub mods: Vec<String>,
    pub files_written: usize,
}

impl InstallReport {
    pub fn summary(&self) -> String {
        let name = display_name(&self.source);
        match self.mods.len() {
            0 => format!("{name}: no mods found in modpack."),
            1 if self.mods[0] == name => format!("{name} applied successfully."),
            count => format!("{name} applied successfully ({count} mods)."),
        }
    }
}

/// Backs up the content folder if needed, then merges one mod archive into
/// the game root.
pub fn apply_mod(
    layout: &GameLayout,
    archive_path: &Path,
    progress: &mut dyn ProgressSink,
) -> ModResult<InstallReport> {
    let backup = backup::ensure_backup(layout, progress)?;

    log::info!("applying mod {}", archive_path.display());
    let mut archive = archive::open_archive(archive_path)?;
    let extracted = archive::extract_into(&mut archive, archive_path, layout.root())?;
    progress.report(INSTALL_LABEL, 100.0);

    Ok(InstallReport {
        source: archive_path.to_path_buf(),
        backup,
        mods: vec![display_name(archive_path)],
        files_written: extracted.files,
    })
}

/// Applies every nested mod of a modpack in container order. A failing
/// nested mod stops the sequence; mods before it stay applied.
pub fn apply_modpack(
    layout: &GameLayout,
    modpack_path: &Path,
    progress: &mut dyn ProgressSink,
) -> ModResult<InstallReport> {
    let backup = backup::ensure_backup(layout, progress)?;

    let mut pack = archive::open_archive(modpack_path)?;
    let names = archive::nested_mod_names(&mut pack, modpack_path)?;
    let total = names.len();
    log::info!(
        "applying modpack {} ({total} mods)",
        modpack_path.display()
    );
    if total == 0 {
        log::warn!("modpack {} contains no mods", modpack_path.display());
        progress.report(INSTALL_LABEL, 100.0);
    }

    let mut report = InstallReport {
        source: modpack_path.to_path_buf(),
        backup,
        mods: Vec::with_capacity(total),
        files_written: 0,
    };
    for (index, name) in names.iter().enumerate() {
        let label = modpack_path.join(name);
        progress.report(
            &format!("Installing mod {}/{total}: {name}", index + 1),
            percent_of(index, total),
        );
        let bytes = archive::read_entry(&mut pack, modpack_path, name)?;
        let mut nested = archive::open_nested(&label, bytes)?;
        let extracted = archive::extract_into(&mut nested, &label, layout.root())?;
        log::debug!(
            "{name}: {} files, {} dirs, {} skipped",
            extracted.files,
            extracted.dirs,
            extracted.skipped
        );

        report.files_written += extracted.files;
        report.mods.push(name.clone());
        progress.report(
            &format!("Installed mod {}/{total}: {name}", index + 1),
            percent_of(index + 1, total),
        );
    }
    Ok(report)
}

/// Picks `apply_mod` or `apply_modpack` from the file extension.
pub fn apply_path(
    layout: &GameLayout,
    path: &Path,
    progress: &mut dyn ProgressSink,
) -> ModResult<InstallReport> {
    if game::is_modpack_path(path) {
        apply_modpack(layout, path, progress)
    } else {
        apply_mod(layout, path, progress)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

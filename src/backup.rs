use crate::{
    error::{IoResultExt, ModError, ModResult},
    game::GameLayout,
    progress::{CopyProgress, ProgressSink},
};
use filetime::{set_file_mtime, FileTime};
use std::{fs, path::Path};
use walkdir::{DirEntry, WalkDir};

pub const BACKUP_LABEL: &str = "Creating Backup...";
pub const RESTORE_LABEL: &str = "Restoring Backup...";
pub const BACKUP_EXISTS_LABEL: &str = "Backup already exists. No new backup was created.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    Created { files: usize },
    AlreadyExists,
}

impl BackupOutcome {
    pub fn message(self) -> String {
        match self {
            BackupOutcome::Created { files } => {
                format!("Backup created successfully ({files} files).")
            }
            BackupOutcome::AlreadyExists => BACKUP_EXISTS_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub files: usize,
}

/// Snapshots the content directory the first time it is called. Once a
/// snapshot exists it is never refreshed.
pub fn ensure_backup(
    layout: &GameLayout,
    progress: &mut dyn ProgressSink,
) -> ModResult<BackupOutcome> {
    let backup_dir = layout.backup_dir();
    if backup_dir.exists() {
        log::info!("backup already present at {}", backup_dir.display());
        progress.report(BACKUP_EXISTS_LABEL, 100.0);
        return Ok(BackupOutcome::AlreadyExists);
    }

    let content_dir = layout.content_dir();
    if !content_dir.is_dir() {
        log::warn!(
            "content folder {} is missing; creating an empty backup",
            content_dir.display()
        );
    }

    fs::create_dir_all(&backup_dir)
        .io_context(|| format!("create backup dir {}", backup_dir.display()))?;
    let files = copy_tree(&content_dir, &backup_dir, BACKUP_LABEL, progress)?;
    log::info!("backup created with {files} files at {}", backup_dir.display());
    Ok(BackupOutcome::Created { files })
}

/// Replaces the content directory with the snapshot. The snapshot itself is
/// kept so the restore can be repeated.
pub fn restore(layout: &GameLayout, progress: &mut dyn ProgressSink) -> ModResult<RestoreOutcome> {
    let backup_dir = layout.backup_dir();
    if !backup_dir.is_dir() {
        return Err(ModError::BackupNotFound(backup_dir));
    }

    let content_dir = layout.content_dir();
    if content_dir.exists() {
        fs::remove_dir_all(&content_dir)
            .io_context(|| format!("remove {}", content_dir.display()))?;
    }
    fs::create_dir_all(&content_dir)
        .io_context(|| format!("create {}", content_dir.display()))?;

    let files = copy_tree(&backup_dir, &content_dir, RESTORE_LABEL, progress)?;
    log::info!("restored {files} files into {}", content_dir.display());
    Ok(RestoreOutcome { files })
}

pub fn count_files(root: &Path) -> usize {
    if !root.is_dir() {
        return 0;
    }
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(is_content_file)
        .count()
}

/// Regular files, plus symlinks that resolve to one. Linked files are copied
/// by content.
pub(crate) fn is_content_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
}

fn copy_tree(
    source: &Path,
    dest: &Path,
    label: &'static str,
    sink: &mut dyn ProgressSink,
) -> ModResult<usize> {
    let total = count_files(source);
    let mut progress = CopyProgress::new(sink, label, total);
    if source.is_dir() {
        copy_dir_with_progress(source, dest, &mut progress)?;
    }
    progress.finish();
    Ok(progress.copied())
}

fn copy_dir_with_progress(
    source: &Path,
    dest: &Path,
    progress: &mut CopyProgress<'_>,
) -> ModResult<()> {
    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|err| ModError::walk(format!("walk {}", source.display()), err))?;
        let Ok(rel) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .io_context(|| format!("create dir {}", target.display()))?;
        } else if is_content_file(&entry) {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .io_context(|| format!("create dir {}", parent.display()))?;
            }
            fs::copy(entry.path(), &target)
                .io_context(|| format!("copy {}", entry.path().display()))?;
            preserve_mtime(entry.path(), &target);
            progress.bump();
        } else {
            log::warn!("skipping {}: not a regular file", entry.path().display());
        }
    }
    Ok(())
}

fn preserve_mtime(source: &Path, dest: &Path) {
    let Ok(meta) = fs::metadata(source) else {
        return;
    };
    let mtime = FileTime::from_last_modification_time(&meta);
    let _ = set_file_mtime(dest, mtime);
}

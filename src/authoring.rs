use crate::{
    archive::{self, ArchiveBuilder},
    backup::{count_files, is_content_file},
    error::{IoResultExt, ModError, ModResult},
    game::{self, CONTENT_FOLDER_NAME},
    progress::{CopyProgress, ProgressSink},
};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

pub const PACK_MOD_LABEL: &str = "Packing Mod...";
pub const PACK_MODPACK_LABEL: &str = "Packing Modpack...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthoringReport {
    pub output: PathBuf,
    pub entries: usize,
}

/// Packs a `data` folder into a mod archive. Entry names keep the `data/`
/// prefix so the archive extracts straight onto the game root.
pub fn create_mod(
    content_dir: &Path,
    output: &Path,
    progress: &mut dyn ProgressSink,
) -> ModResult<AuthoringReport> {
    let folder_name = content_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if folder_name != CONTENT_FOLDER_NAME {
        return Err(ModError::validation(format!(
            "Selected folder must be named '{CONTENT_FOLDER_NAME}' (got '{folder_name}')."
        )));
    }
    if !content_dir.is_dir() {
        return Err(ModError::validation(format!(
            "{} is not a folder.",
            content_dir.display()
        )));
    }
    let source_root = fs::canonicalize(content_dir)
        .io_context(|| format!("resolve {}", content_dir.display()))?;
    if resolve_lenient(output).starts_with(&source_root) {
        return Err(ModError::validation(
            "The mod file cannot be saved inside the folder being packed.",
        ));
    }
    let Some(base) = content_dir.parent() else {
        return Err(ModError::validation("Selected folder has no parent."));
    };

    let total = count_files(content_dir);
    let mut builder = ArchiveBuilder::create(output)?;
    let mut tracker = CopyProgress::new(progress, PACK_MOD_LABEL, total);
    let mut entries = 0usize;
    for entry in WalkDir::new(content_dir)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry
            .map_err(|err| ModError::walk(format!("walk {}", content_dir.display()), err))?;
        let Some(name) = archive::entry_name(base, entry.path()) else {
            continue;
        };
        if entry.file_type().is_dir() {
            builder.add_dir(&format!("{name}/"))?;
        } else if is_content_file(&entry) {
            builder.add_file(&name, entry.path())?;
            tracker.bump();
        } else {
            log::debug!("skipping non-regular file {}", entry.path().display());
            continue;
        }
        entries += 1;
    }
    tracker.finish();
    let output = builder.finish()?;
    log::info!("created mod {} ({entries} entries)", output.display());
    Ok(AuthoringReport { output, entries })
}

/// Canonical form of a path that may not exist yet: the deepest existing
/// ancestor is resolved and the rest appended.
fn resolve_lenient(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        let existing = if ancestor.as_os_str().is_empty() {
            Path::new(".")
        } else {
            ancestor
        };
        if let Ok(resolved) = fs::canonicalize(existing) {
            let rest = path.strip_prefix(ancestor).unwrap_or(path);
            return resolved.join(rest);
        }
    }
    path.to_path_buf()
}

/// Bundles existing mod archives into a modpack, one verbatim entry per mod,
/// in the order given.
pub fn create_modpack(
    mod_paths: &[PathBuf],
    output: &Path,
    progress: &mut dyn ProgressSink,
) -> ModResult<AuthoringReport> {
    if mod_paths.len() < 2 {
        return Err(ModError::validation(
            "Select at least two mods to build a modpack.",
        ));
    }

    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(mod_paths.len());
    for path in mod_paths {
        if !path.is_file() {
            return Err(ModError::validation(format!(
                "Mod file not found: {}",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(ModError::validation(format!(
                "Two mods share the file name '{name}'."
            )));
        }
        if !game::is_mod_archive_name(&name) {
            log::warn!(
                "{name} has no .{} extension; installers will skip it",
                game::MOD_EXTENSION
            );
        }
        names.push(name);
    }

    let mut builder = ArchiveBuilder::create(output)?;
    let mut tracker = CopyProgress::new(progress, PACK_MODPACK_LABEL, mod_paths.len());
    for (path, name) in mod_paths.iter().zip(&names) {
        builder.add_stored(name, path)?;
        tracker.bump();
    }
    let output = builder.finish()?;
    log::info!("created modpack {} ({} mods)", output.display(), names.len());
    Ok(AuthoringReport {
        output,
        entries: names.len(),
    })
}

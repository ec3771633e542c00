use crate::error::{IoResultExt, ModError, ModResult};
use crate::game;
use filetime::{set_file_mtime, FileTime};
use std::{
    fs,
    io::{self, Cursor, Read, Seek, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time as TimeOfDay};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    pub files: usize,
    pub dirs: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub is_mod: bool,
}

pub fn open_archive(path: &Path) -> ModResult<ZipArchive<fs::File>> {
    let file = fs::File::open(path).io_context(|| format!("open archive {}", path.display()))?;
    ZipArchive::new(file).map_err(|err| ModError::archive(path, err))
}

/// Opens an in-memory archive, used for mods nested inside a modpack.
pub fn open_nested(label: &Path, bytes: Vec<u8>) -> ModResult<ZipArchive<Cursor<Vec<u8>>>> {
    ZipArchive::new(Cursor::new(bytes)).map_err(|err| ModError::archive(label, err))
}

/// Writes every entry of `archive` below `dest`, overwriting existing files.
/// Files already in `dest` that the archive does not mention are left alone.
pub fn extract_into<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    label: &Path,
    dest: &Path,
) -> ModResult<ExtractReport> {
    let mut report = ExtractReport::default();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| ModError::archive(label, err))?;
        let Some(rel) = entry.enclosed_name() else {
            log::warn!(
                "skipping unsafe entry {:?} in {}",
                entry.name(),
                label.display()
            );
            report.skipped += 1;
            continue;
        };

        let out_path = dest.join(rel);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .io_context(|| format!("create dir {}", out_path.display()))?;
            report.dirs += 1;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .io_context(|| format!("create dir {}", parent.display()))?;
        }

        let mut out_file = fs::File::create(&out_path)
            .io_context(|| format!("write {}", out_path.display()))?;
        io::copy(&mut entry, &mut out_file)
            .io_context(|| format!("extract {} from {}", entry.name(), label.display()))?;
        drop(out_file);
        if let Some(mtime) = entry.last_modified().and_then(zip_time_to_unix) {
            let _ = set_file_mtime(&out_path, FileTime::from_unix_time(mtime, 0));
        }
        report.files += 1;
    }
    Ok(report)
}

pub fn list_entries(path: &Path) -> ModResult<Vec<EntryInfo>> {
    let mut archive = open_archive(path)?;
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|err| ModError::archive(path, err))?;
        let name = entry.name().to_string();
        entries.push(EntryInfo {
            is_mod: !entry.is_dir() && game::is_mod_archive_name(&name),
            size: entry.size(),
            is_dir: entry.is_dir(),
            name,
        });
    }
    Ok(entries)
}

/// Names of the nested mods of a modpack in container order, skipping
/// anything that is not a mod archive.
pub fn nested_mod_names<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    label: &Path,
) -> ModResult<Vec<String>> {
    let mut names = Vec::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|err| ModError::archive(label, err))?;
        if !entry.is_dir() && game::is_mod_archive_name(entry.name()) {
            names.push(entry.name().to_string());
        }
    }
    Ok(names)
}

pub fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    label: &Path,
    name: &str,
) -> ModResult<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .map_err(|err| ModError::archive(label, err))?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut bytes)
        .io_context(|| format!("read {name} from {}", label.display()))?;
    Ok(bytes)
}

/// Zip writer that deletes its output unless `finish` succeeds.
pub struct ArchiveBuilder {
    path: PathBuf,
    writer: Option<ZipWriter<fs::File>>,
}

impl ArchiveBuilder {
    pub fn create(path: &Path) -> ModResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .io_context(|| format!("create dir {}", parent.display()))?;
            }
        }
        let file = fs::File::create(path).io_context(|| format!("create {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(ZipWriter::new(file)),
        })
    }

    pub fn add_dir(&mut self, name: &str) -> ModResult<()> {
        let path = self.path.clone();
        let writer = self.writer_mut()?;
        writer
            .add_directory(name, SimpleFileOptions::default())
            .map_err(|err| ModError::archive(path, err))
    }

    /// Copies a file from disk as a deflated entry, keeping its mtime.
    pub fn add_file(&mut self, name: &str, source: &Path) -> ModResult<()> {
        let mut options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        if let Some(stamp) = file_zip_time(source) {
            options = options.last_modified_time(stamp);
        }
        self.write_entry(name, source, options)
    }

    /// Copies a file verbatim as a stored entry.
    pub fn add_stored(&mut self, name: &str, source: &Path) -> ModResult<()> {
        let mut options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        if let Some(stamp) = file_zip_time(source) {
            options = options.last_modified_time(stamp);
        }
        self.write_entry(name, source, options)
    }

    fn write_entry(
        &mut self,
        name: &str,
        source: &Path,
        options: SimpleFileOptions,
    ) -> ModResult<()> {
        let path = self.path.clone();
        let mut input =
            fs::File::open(source).io_context(|| format!("open {}", source.display()))?;
        let writer = self.writer_mut()?;
        writer
            .start_file(name, options)
            .map_err(|err| ModError::archive(&path, err))?;
        io::copy(&mut input, writer)
            .io_context(|| format!("write {name} into {}", path.display()))?;
        Ok(())
    }

    pub fn finish(mut self) -> ModResult<PathBuf> {
        let path = self.path.clone();
        let Some(writer) = self.writer.take() else {
            return Ok(path);
        };
        let finished = writer
            .finish()
            .map_err(|err| ModError::archive(&path, err))
            .and_then(|mut file| file.flush().io_context(|| format!("flush {}", path.display())));
        if let Err(err) = finished {
            let _ = fs::remove_file(&path);
            return Err(err);
        }
        Ok(path)
    }

    fn writer_mut(&mut self) -> ModResult<&mut ZipWriter<fs::File>> {
        self.writer.as_mut().ok_or_else(|| {
            ModError::io(
                format!("write {}", self.path.display()),
                io::Error::new(io::ErrorKind::Other, "archive already finished"),
            )
        })
    }
}

impl Drop for ArchiveBuilder {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Forward-slash entry name for `path` relative to `base`.
pub fn entry_name(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|part| part.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn zip_time_to_unix(dt: zip::DateTime) -> Option<i64> {
    let month = Month::try_from(dt.month()).ok()?;
    let date = Date::from_calendar_date(dt.year() as i32, month, dt.day()).ok()?;
    let time = TimeOfDay::from_hms(dt.hour(), dt.minute(), dt.second()).ok()?;
    let datetime = PrimitiveDateTime::new(date, time).assume_utc();
    Some(datetime.unix_timestamp())
}

fn file_zip_time(path: &Path) -> Option<zip::DateTime> {
    let modified: SystemTime = fs::metadata(path).ok()?.modified().ok()?;
    let stamp = OffsetDateTime::from(modified);
    zip::DateTime::from_date_and_time(
        u16::try_from(stamp.year()).ok()?,
        stamp.month() as u8,
        stamp.day(),
        stamp.hour(),
        stamp.minute(),
        stamp.second(),
    )
    .ok()
}

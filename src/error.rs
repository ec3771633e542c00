use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModError {
    #[error("no game path configured (selection cancelled)")]
    ConfigMissing,
    #[error("{0}")]
    Validation(String),
    #[error("backup not found at {}", .0.display())]
    BackupNotFound(PathBuf),
    #[error("game folder not found: {}", .0.display())]
    GameRootMissing(PathBuf),
    #[error("invalid archive {}: {source}", path.display())]
    ArchiveFormat {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("another operation is already running")]
    Busy,
}

impl ModError {
    pub fn validation(message: impl Into<String>) -> Self {
        ModError::Validation(message.into())
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        ModError::Io {
            context: context.into(),
            source,
        }
    }

    /// Zip I/O failures are reported as I/O, everything else as a format error.
    pub fn archive(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        let path = path.into();
        match source {
            zip::result::ZipError::Io(err) => ModError::Io {
                context: format!("read archive {}", path.display()),
                source: err,
            },
            other => ModError::ArchiveFormat {
                path,
                source: other,
            },
        }
    }

    pub fn walk(context: impl Into<String>, source: walkdir::Error) -> Self {
        let context = context.into();
        let source = match source.into_io_error() {
            Some(err) => err,
            None => io::Error::new(io::ErrorKind::Other, "filesystem loop detected"),
        };
        ModError::Io { context, source }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ModError::ConfigMissing => "ConfigMissing",
            ModError::Validation(_) => "ValidationError",
            ModError::BackupNotFound(_) => "NotFoundError",
            ModError::GameRootMissing(_) => "NotFoundError",
            ModError::ArchiveFormat { .. } => "ArchiveFormatError",
            ModError::Io { .. } => "IOError",
            ModError::Config { .. } => "ConfigError",
            ModError::Busy => "Busy",
        }
    }
}

pub type ModResult<T> = std::result::Result<T, ModError>;

pub trait IoResultExt<T> {
    fn io_context<C, F>(self, context: F) -> ModResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn io_context<C, F>(self, context: F) -> ModResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|err| ModError::io(context(), err))
    }
}

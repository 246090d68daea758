use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Destination for rendered log lines.
///
/// Implementations serialize concurrent writers themselves: one
/// `write_line` call completes before the next one on the same sink starts,
/// so lines from one process land in call order and never interleave.
pub trait LogSink: Send + Sync {
    /// Append `line` followed by a newline.
    ///
    /// **Parameters**
    /// - `line`: one rendered record, without trailing newline.
    ///
    /// **Returns**
    /// - `Err(..)` on I/O failure. The logger reports it on stderr and
    ///   carries on; it is never surfaced to application code.
    fn write_line(&self, line: &str) -> Result<()>;

    /// Flush any buffered output.
    ///
    /// Default implementation is a no-op.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Size-based rotation policy for [`FileSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotationConfig {
    /// Plain append-only file when `false`.
    pub enabled: bool,
    /// Rotate before a write that would push the file past this size.
    pub max_bytes: u64,
    /// Number of `.N` backups kept; older ones are deleted.
    pub backup_count: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: 10 * 1024 * 1024,
            backup_count: 5,
        }
    }
}

impl RotationConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    #[must_use]
    pub fn with_backup_count(mut self, backup_count: usize) -> Self {
        self.backup_count = backup_count;
        self
    }
}

struct FileState {
    file: File,
    size: u64,
    rotations: u64,
}

/// Append-only file bound to one path, rotated in place by size.
///
/// Rotation is checked lazily on write: if the current size plus the new
/// line would exceed `max_bytes`, `<path>.N` moves to `<path>.N+1`, the
/// primary file becomes `<path>.1` and a fresh primary is opened. The
/// oldest backup beyond `backup_count` is removed.
pub struct FileSink {
    path: PathBuf,
    rotation: RotationConfig,
    state: Mutex<FileState>,
}

impl FileSink {
    /// Open (or create) `path` for appending. The parent directory must exist.
    pub fn open(path: impl Into<PathBuf>, rotation: RotationConfig) -> Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let size = file.metadata()?.len();
        Ok(FileSink {
            path,
            rotation,
            state: Mutex::new(FileState {
                file,
                size,
                rotations: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rotation(&self) -> &RotationConfig {
        &self.rotation
    }

    /// Number of rotations performed by this sink since it was opened.
    pub fn rotations(&self) -> u64 {
        self.state.lock().rotations
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate_locked(&self, state: &mut FileState) -> Result<()> {
        state.file.flush()?;
        let count = self.rotation.backup_count;

        if count == 0 {
            File::create(&self.path)?;
            state.file = open_append(&self.path)?;
        } else {
            let oldest = self.backup_path(count);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for n in (1..count).rev() {
                let from = self.backup_path(n);
                if from.exists() {
                    fs::rename(&from, self.backup_path(n + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
            state.file = open_append(&self.path)?;
        }

        state.size = 0;
        state.rotations += 1;
        Ok(())
    }
}

impl LogSink for FileSink {
    fn write_line(&self, line: &str) -> Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        let len = buf.len() as u64;

        let mut state = self.state.lock();
        if self.rotation.enabled
            && self.rotation.max_bytes > 0
            && state.size > 0
            && state.size + len > self.rotation.max_bytes
        {
            self.rotate_locked(&mut state)?;
        }

        state.file.write_all(buf.as_bytes())?;
        state.size += len;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.state.lock().file.flush()?;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Mirrors lines to stderr. At most one per logger; never shared by path.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    lock: Mutex<()>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogSink for ConsoleSink {
    fn write_line(&self, line: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut err = io::stderr().lock();
        writeln!(err, "{line}")?;
        Ok(())
    }
}

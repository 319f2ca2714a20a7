//! Per-connection tail state machine.
//!
//! A [`TailedFile`] starts at the current end of the file and moves between
//! three states on every [`read_chunk`](TailedFile::read_chunk) call:
//!
//! - `Start`: emit the record delimiter on its own and arm the limiter to
//!   drop the (probably partial) first record.
//! - `Dump`: read the next chunk from the handle, sampling it if needed.
//! - `Wait`: sleep one poll interval, then look for growth, truncation or
//!   rotation.

use std::fs::{self, File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::error::{TailError, TailResult};
use crate::limit::RateLimiter;
use crate::stream::ContentReader;
use crate::DEFAULT_DELIMITER;

/// Cached `stat` fields used to notice growth, truncation and rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSnapshot {
    pub mode: u32,
    pub modified: Option<SystemTime>,
    pub size: u64,
    pub dev: u64,
    pub ino: u64,
}

impl FileSnapshot {
    pub fn from_metadata(meta: &Metadata) -> Self {
        let (mode, dev, ino) = identity(meta);
        Self {
            mode,
            modified: meta.modified().ok(),
            size: meta.len(),
            dev,
            ino,
        }
    }

    /// Same mode, mtime and size.
    pub fn same_content(&self, other: &FileSnapshot) -> bool {
        self.mode == other.mode && self.modified == other.modified && self.size == other.size
    }

    /// Same device and inode.
    pub fn same_file(&self, other: &FileSnapshot) -> bool {
        self.dev == other.dev && self.ino == other.ino
    }
}

#[cfg(unix)]
fn identity(meta: &Metadata) -> (u32, u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.mode(), meta.dev(), meta.ino())
}

#[cfg(not(unix))]
fn identity(meta: &Metadata) -> (u32, u64, u64) {
    (u32::from(meta.permissions().readonly()), 0, 0)
}

#[derive(Debug, Clone)]
pub struct TailOptions {
    /// Marker that opens every record.
    pub delimiter: Vec<u8>,
    /// Keep 1 record out of every `rate_limit`.
    pub rate_limit: usize,
    /// Sleep between polls while waiting for the file to grow.
    pub poll_interval: Duration,
    /// Re-stat the path (not the handle) every this many idle polls.
    pub rotation_check_every: u32,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_vec(),
            rate_limit: 1,
            poll_interval: Duration::from_millis(250),
            rotation_check_every: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Start,
    Wait,
    Dump,
}

pub struct TailedFile {
    path: PathBuf,
    /// `None` only after a rotated file could not be reopened.
    file: Option<File>,
    snapshot: FileSnapshot,
    wait_iterations: u32,
    limiter: RateLimiter,
    state: TailState,
    poll_interval: Duration,
    rotation_check_every: u32,
}

impl TailedFile {
    /// Open `path` and position the handle at its current end, so only bytes
    /// written from now on are served.
    pub fn open(path: impl Into<PathBuf>, options: &TailOptions) -> TailResult<Self> {
        let path = path.into();
        let limiter = RateLimiter::new(&options.delimiter, options.rate_limit)?;

        let open_err = |source: io::Error| TailError::Open {
            path: path.clone(),
            source,
        };
        let mut file = File::open(&path).map_err(open_err)?;
        let meta = file.metadata().map_err(open_err)?;
        let snapshot = FileSnapshot::from_metadata(&meta);
        file.seek(SeekFrom::Start(snapshot.size)).map_err(open_err)?;

        debug!(path = %path.display(), offset = snapshot.size, "Opened tailed file");

        Ok(Self {
            path,
            file: Some(file),
            snapshot,
            wait_iterations: 0,
            limiter,
            state: TailState::Start,
            poll_interval: options.poll_interval,
            rotation_check_every: options.rotation_check_every.max(1),
        })
    }

    /// Produce the next chunk of the stream into `buf`.
    ///
    /// `Ok(0)` means "nothing new yet, call again". The only blocking point
    /// is the poll-interval sleep taken in the `Wait` state.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> TailResult<usize> {
        if self.state == TailState::Wait {
            self.wait();
        }

        match self.state {
            TailState::Start => self.emit_delimiter(buf),
            TailState::Dump => self.dump(buf),
            TailState::Wait => Ok(0),
        }
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    pub fn wait_iterations(&self) -> u32 {
        self.wait_iterations
    }

    fn emit_delimiter(&mut self, buf: &mut [u8]) -> TailResult<usize> {
        let delimiter = self.limiter.delimiter();
        let needed = delimiter.len();
        if buf.len() < needed {
            return Err(TailError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }

        buf[..needed].copy_from_slice(delimiter);
        self.limiter.skip_leading();
        self.state = TailState::Dump;
        Ok(needed)
    }

    fn dump(&mut self, buf: &mut [u8]) -> TailResult<usize> {
        let Some(file) = self.file.as_mut() else {
            self.state = TailState::Wait;
            return Ok(0);
        };

        let n = loop {
            match file.read(buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TailError::Read(e)),
            }
        };

        if n == 0 {
            self.state = TailState::Wait;
            return Ok(0);
        }

        if self.limiter.is_passthrough() {
            Ok(n)
        } else {
            Ok(self.limiter.compact(&mut buf[..n]))
        }
    }

    fn wait(&mut self) {
        thread::sleep(self.poll_interval);
        self.wait_iterations += 1;

        let current = match self.file.as_ref().map(File::metadata) {
            Some(Ok(meta)) => Some(FileSnapshot::from_metadata(&meta)),
            Some(Err(e)) => {
                // Expected while a rotation is in flight; poll again.
                debug!(path = %self.path.display(), error = %e, "fstat failed");
                return;
            }
            None => None,
        };

        match current {
            Some(current) if !current.same_content(&self.snapshot) => self.on_change(current),
            _ => {
                if self.wait_iterations >= self.rotation_check_every {
                    self.check_rotation();
                    self.wait_iterations = 0;
                }
            }
        }
    }

    fn on_change(&mut self, current: FileSnapshot) {
        // Dump reads do not refresh the snapshot, so the offset can be past it.
        let offset = self
            .file
            .as_mut()
            .and_then(|file| file.stream_position().ok())
            .unwrap_or(0);

        if current.size < self.snapshot.size || current.size < offset {
            // Shrunk in place (copytruncate): start over on the same handle.
            info!(
                path = %self.path.display(),
                previous_size = self.snapshot.size,
                offset,
                current_size = current.size,
                "File truncated, rewinding to start"
            );
            if let Some(file) = self.file.as_mut() {
                if let Err(e) = file.seek(SeekFrom::Start(0)) {
                    warn!(path = %self.path.display(), error = %e, "Rewind after truncation failed");
                }
            }
        }

        self.wait_iterations = 0;
        self.snapshot = current;
        self.state = TailState::Dump;
    }

    fn check_rotation(&mut self) {
        let current = match fs::metadata(&self.path) {
            Ok(meta) => FileSnapshot::from_metadata(&meta),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "stat by path failed");
                return;
            }
        };

        if self.file.is_some() && current.same_file(&self.snapshot) {
            return;
        }

        info!(
            path = %self.path.display(),
            old_inode = self.snapshot.ino,
            new_inode = current.ino,
            "File rotated, reopening"
        );

        // Close the old handle before opening the new one.
        self.file = None;

        match File::open(&self.path) {
            Ok(file) => {
                self.snapshot = file
                    .metadata()
                    .map(|meta| FileSnapshot::from_metadata(&meta))
                    .unwrap_or(current);
                self.file = Some(file);
                self.state = TailState::Dump;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot reopen rotated file, will retry");
            }
        }
    }
}

impl ContentReader for TailedFile {
    fn read_chunk(&mut self, buf: &mut [u8]) -> TailResult<usize> {
        TailedFile::read_chunk(self, buf)
    }
}

impl Drop for TailedFile {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "Closing tailed file");
    }
}

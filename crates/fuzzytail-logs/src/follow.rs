use std::fs::{self, File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

use tracing::{debug, info, trace, warn};

use crate::error::SourceError;
use crate::split::LineSplitter;

/// Where a [`Follower`] is in its polling cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowState {
    /// New bytes are known to be available
    Reading,
    /// Caught up; waiting for the next poll
    AwaitingMore,
    /// The file was replaced or truncated and must be reopened
    Rotated,
}

/// Identity of the file behind a path
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(meta: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(_meta: &Metadata) -> Option<Self> {
        None
    }
}

/// What changed at the followed path since the last poll
enum Change {
    Unchanged,
    Grown,
    Truncated,
    Replaced,
    Missing,
}

/// Polls one file for appended lines.
///
/// Each [`poll`](Follower::poll) runs the state machine until it is caught
/// up (`AwaitingMore`) and returns the complete lines found on the way. The
/// caller owns the timing between polls, which keeps waiting cancellable and
/// lets tests drive the machine without sleeping.
pub struct Follower {
    path: PathBuf,
    name: String,
    file: Option<File>,
    identity: Option<FileIdentity>,
    offset: u64,
    splitter: LineSplitter,
    state: FollowState,
    buffer: Vec<u8>,
    rotations: u64,
}

impl Follower {
    /// Start following `path` from byte `offset`
    pub fn open(
        path: impl Into<PathBuf>,
        offset: u64,
        buffer_size: usize,
    ) -> Result<Self, SourceError> {
        let path = path.into();
        let name = path.display().to_string();
        let open_err = |source| SourceError::Open {
            name: name.clone(),
            source,
        };

        let file = File::open(&path).map_err(open_err)?;
        let meta = file.metadata().map_err(open_err)?;

        Ok(Self {
            identity: FileIdentity::of(&meta),
            offset: offset.min(meta.len()),
            file: Some(file),
            path,
            name,
            splitter: LineSplitter::new(),
            state: FollowState::Reading,
            buffer: vec![0u8; buffer_size.max(1)],
            rotations: 0,
        })
    }

    /// Advance until caught up and return the complete lines read.
    ///
    /// Replacement and truncation are handled inside a single poll: the new
    /// file is reopened and read right away.
    pub fn poll(&mut self) -> Result<Vec<String>, SourceError> {
        let mut lines = Vec::new();

        loop {
            trace!(source = %self.name, state = ?self.state, offset = self.offset, "poll");
            match self.state {
                FollowState::Reading => {
                    if let Err(source) = self.read_available(&mut lines) {
                        // Keep what was read; the error resurfaces on the next poll
                        if lines.is_empty() {
                            return Err(self.read_error(source));
                        }
                        warn!(source = %self.name, error = %source, "read interrupted");
                        return Ok(lines);
                    }
                    self.state = FollowState::AwaitingMore;
                    return Ok(lines);
                }
                FollowState::AwaitingMore => match self.check()? {
                    Change::Unchanged => return Ok(lines),
                    Change::Grown => self.state = FollowState::Reading,
                    Change::Truncated => {
                        info!(source = %self.name, "file truncated, reading from start");
                        self.splitter.clear();
                        self.begin_rotation();
                    }
                    Change::Replaced | Change::Missing => {
                        info!(source = %self.name, "file rotated, reopening");
                        // Drain the old file; its last fragment will never be completed
                        if let Err(error) = self.read_available(&mut lines) {
                            debug!(source = %self.name, %error, "could not drain rotated file");
                        }
                        lines.extend(self.splitter.take_partial());
                        self.begin_rotation();
                    }
                },
                FollowState::Rotated => {
                    if !self.reopen()? {
                        return Ok(lines);
                    }
                    self.state = FollowState::Reading;
                }
            }
        }
    }

    pub fn state(&self) -> FollowState {
        self.state
    }

    /// Offset of the next unread byte
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes of an unterminated line being held
    pub fn pending(&self) -> usize {
        self.splitter.pending()
    }

    /// Number of rotations and truncations seen
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    fn read_available(&mut self, lines: &mut Vec<String>) -> io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        file.seek(SeekFrom::Start(self.offset))?;
        loop {
            let n = match file.read(&mut self.buffer) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.offset += n as u64;
            lines.extend(self.splitter.push(&self.buffer[..n]));
        }
    }

    fn check(&self) -> Result<Change, SourceError> {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Change::Missing),
            Err(source) => return Err(self.read_error(source)),
        };

        let identity = FileIdentity::of(&meta);
        if identity.is_some() && identity != self.identity {
            return Ok(Change::Replaced);
        }

        Ok(match meta.len().cmp(&self.offset) {
            std::cmp::Ordering::Less => Change::Truncated,
            std::cmp::Ordering::Greater => Change::Grown,
            std::cmp::Ordering::Equal => Change::Unchanged,
        })
    }

    fn begin_rotation(&mut self) {
        self.file = None;
        self.identity = None;
        self.offset = 0;
        self.rotations += 1;
        self.state = FollowState::Rotated;
    }

    /// Returns false while the path does not exist yet
    fn reopen(&mut self) -> Result<bool, SourceError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(source = %self.name, "waiting for file to reappear");
                return Ok(false);
            }
            Err(source) => {
                return Err(SourceError::Open {
                    name: self.name.clone(),
                    source,
                });
            }
        };

        let meta = file.metadata().map_err(|source| self.read_error(source))?;
        self.identity = FileIdentity::of(&meta);
        self.file = Some(file);
        debug!(source = %self.name, "reopened");
        Ok(true)
    }

    fn read_error(&self, source: io::Error) -> SourceError {
        SourceError::Read {
            name: self.name.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::Path;

    fn append(path: &Path, text: &str) {
        let mut file = OpenOptions::new().append(true).create(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_appended_line_is_returned_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "a\nb\n").unwrap();

        let mut follower = Follower::open(&path, 4, 16).unwrap();
        assert_eq!(follower.state(), FollowState::Reading);
        assert!(follower.poll().unwrap().is_empty());
        assert_eq!(follower.state(), FollowState::AwaitingMore);

        append(&path, "X\n");
        assert_eq!(follower.poll().unwrap(), vec!["X"]);
        assert!(follower.poll().unwrap().is_empty());
        assert_eq!(follower.offset(), 6);
    }

    #[test]
    fn test_partial_line_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "").unwrap();

        let mut follower = Follower::open(&path, 0, 4).unwrap();
        append(&path, "par");
        assert!(follower.poll().unwrap().is_empty());
        assert_eq!(follower.pending(), 3);

        append(&path, "tial\nnext");
        assert_eq!(follower.poll().unwrap(), vec!["partial"]);
        assert_eq!(follower.pending(), 4);
    }

    #[test]
    fn test_truncation_rereads_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "one\ntwo\n").unwrap();

        let mut follower = Follower::open(&path, 8, 16).unwrap();
        assert!(follower.poll().unwrap().is_empty());

        fs::write(&path, "new\n").unwrap();
        assert_eq!(follower.poll().unwrap(), vec!["new"]);
        assert_eq!(follower.rotations(), 1);
        assert_eq!(follower.state(), FollowState::AwaitingMore);
    }

    #[cfg(unix)]
    #[test]
    fn test_rotation_drains_old_file_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "old\n").unwrap();

        let mut follower = Follower::open(&path, 4, 16).unwrap();
        assert!(follower.poll().unwrap().is_empty());

        append(&path, "late\nfragment");
        fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        fs::write(&path, "fresh\n").unwrap();

        assert_eq!(follower.poll().unwrap(), vec!["late", "fragment", "fresh"]);
        assert_eq!(follower.rotations(), 1);
        assert!(follower.poll().unwrap().is_empty());
    }

    #[test]
    fn test_waits_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "").unwrap();

        let mut follower = Follower::open(&path, 0, 16).unwrap();
        assert!(follower.poll().unwrap().is_empty());

        fs::remove_file(&path).unwrap();
        assert!(follower.poll().unwrap().is_empty());
        assert_eq!(follower.state(), FollowState::Rotated);
        assert!(follower.poll().unwrap().is_empty());

        fs::write(&path, "back\n").unwrap();
        assert_eq!(follower.poll().unwrap(), vec!["back"]);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Follower::open(dir.path().join("nope.log"), 0, 16);
        assert!(matches!(result, Err(SourceError::Open { .. })));
    }
}

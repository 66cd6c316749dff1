//! State hand-off file shared by component instances
//!
//! A lock file next to the snapshot serializes the load, apply and save
//! sequence across instances. Saves go through a temp file that is renamed
//! into place, so a reader sees either the previous snapshot or the new one.

use crate::error::SignalingError;
use crate::outbox::Mailbox;
use crate::session::Sessions;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// A lock held longer than this was left behind by an instance that died
const STALE_LOCK_AGE: Duration = Duration::from_secs(10);

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Paths of one snapshot file and its companions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    path: PathBuf,
    lock_path: PathBuf,
    temp_path: PathBuf,
}

/// Exclusive hold on a snapshot, released on drop
#[derive(Debug)]
pub struct SnapshotLock {
    path: PathBuf,
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "Failed to release snapshot lock");
        }
    }
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            lock_path: with_suffix(&path, ".lock"),
            temp_path: with_suffix(&path, ".tmp"),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits until no other instance holds the snapshot.
    ///
    /// Returns `None` if the lock file cannot be created at all, in which
    /// case the caller carries on unlocked.
    pub fn lock(&self) -> Option<SnapshotLock> {
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(_) => {
                    return Some(SnapshotLock {
                        path: self.lock_path.clone(),
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if self.lock_is_stale() {
                        warn!(path = %self.lock_path.display(), "Breaking stale snapshot lock");
                        // another waiter may have removed it first
                        let _ = fs::remove_file(&self.lock_path);
                    } else {
                        std::thread::sleep(LOCK_RETRY_INTERVAL);
                    }
                }
                Err(err) => {
                    warn!(
                        path = %self.lock_path.display(),
                        error = %err,
                        "Cannot lock state snapshot, continuing unlocked"
                    );
                    return None;
                }
            }
        }
    }

    fn lock_is_stale(&self) -> bool {
        fs::metadata(&self.lock_path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > STALE_LOCK_AGE)
    }

    /// Loads the snapshot, or empty state if it is missing or unreadable
    pub fn load(&self) -> Sessions<Mailbox> {
        match self.read() {
            Ok(sessions) => sessions,
            Err(SignalingError::Snapshot(err)) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state snapshot yet");
                Sessions::new()
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Discarding unreadable state snapshot");
                Sessions::new()
            }
        }
    }

    pub fn read(&self) -> Result<Sessions<Mailbox>, SignalingError> {
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Replaces the snapshot atomically (temp file + rename)
    pub fn save(&self, sessions: &Sessions<Mailbox>) -> Result<(), SignalingError> {
        let json = serde_json::to_vec(sessions)?;
        fs::write(&self.temp_path, json)?;
        fs::rename(&self.temp_path, &self.path)?;
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairbox_protocol::ConnectionId;

    #[test]
    fn companion_paths_sit_next_to_the_snapshot() {
        let file = SnapshotFile::new("/var/lib/pairbox/state.json");
        assert_eq!(file.lock_path, PathBuf::from("/var/lib/pairbox/state.json.lock"));
        assert_eq!(file.temp_path, PathBuf::from("/var/lib/pairbox/state.json.tmp"));
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("state.json"));

        let held = file.lock().unwrap();
        assert!(file.lock_path.exists());
        assert!(
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&file.lock_path)
                .is_err()
        );

        drop(held);
        assert!(!file.lock_path.exists());
        assert!(file.lock().is_some());
    }

    #[test]
    fn waiting_instance_gets_the_lock_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("state.json"));
        let held = file.lock().unwrap();

        let waiter = {
            let file = file.clone();
            std::thread::spawn(move || file.lock().is_some())
        };
        std::thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn lock_in_missing_directory_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("missing").join("state.json"));
        assert!(file.lock().is_none());
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("state.json"));
        let mut sessions = Sessions::new();
        let id: ConnectionId = uuid::Uuid::new_v4().into();
        sessions.connect(id, Mailbox::new(), 1);

        file.save(&sessions).unwrap();

        assert!(!file.temp_path.exists());
        assert!(file.read().unwrap().registry().contains(&id));
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("state.json"));
        assert!(file.load().registry().is_empty());
    }
}

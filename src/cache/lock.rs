//! Cross-process advisory file locking for cache coordination.
//!
//! Provides exclusive and shared locks bound to an existing filesystem path,
//! typically an artifact entry directory. On Unix systems, uses `flock(2)`;
//! on non-Unix platforms, locking is a no-op. Locks are advisory: only
//! cooperating callers that also use [`FileLock`] are excluded.

use camino::Utf8Path;
use std::fs::File;
use std::io;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Kind of lock to acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Exclusive lock for writers.
    Exclusive,
    /// Shared lock for readers.
    Shared,
}

/// Handle holding an open descriptor to a locked (or lockable) path.
///
/// Dropping the handle closes the descriptor, which releases any lock it
/// holds.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Opens `path` for locking without acquiring a lock.
    ///
    /// The path must already exist; it may be a regular file or a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be opened.
    pub fn open(path: &Utf8Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self { file })
    }

    /// Opens `path` and blocks until an exclusive lock is held.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be opened or locked.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use camino::Utf8Path;
    /// use artifact_cache::FileLock;
    ///
    /// let entry_dir = Utf8Path::new("/var/cache/artifacts/2c/f2/4dba");
    /// let _lock = FileLock::acquire_exclusive(entry_dir)?;
    /// // Exclusive access to the entry until `_lock` drops
    /// # Ok::<(), std::io::Error>(())
    /// ```
    pub fn acquire_exclusive(path: &Utf8Path) -> io::Result<Self> {
        Self::acquire(path, LockMode::Exclusive)
    }

    /// Opens `path` and blocks until a shared lock is held.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be opened or locked.
    pub fn acquire_shared(path: &Utf8Path) -> io::Result<Self> {
        Self::acquire(path, LockMode::Shared)
    }

    fn acquire(path: &Utf8Path, mode: LockMode) -> io::Result<Self> {
        let lock = Self::open(path)?;
        lock.lock(mode)?;
        Ok(lock)
    }

    /// Blocks until an exclusive lock is held.
    ///
    /// # Errors
    ///
    /// Returns the OS error if locking fails.
    pub fn lock_exclusive(&self) -> io::Result<()> {
        self.lock(LockMode::Exclusive)
    }

    /// Blocks until a shared lock is held.
    ///
    /// # Errors
    ///
    /// Returns the OS error if locking fails.
    pub fn lock_shared(&self) -> io::Result<()> {
        self.lock(LockMode::Shared)
    }

    /// Attempts to take an exclusive lock without blocking.
    ///
    /// Returns `Ok(false)` if another holder has a conflicting lock.
    ///
    /// # Errors
    ///
    /// Returns the OS error for failures other than contention.
    pub fn try_lock_exclusive(&self) -> io::Result<bool> {
        self.try_lock(LockMode::Exclusive)
    }

    /// Attempts to take a shared lock without blocking.
    ///
    /// Returns `Ok(false)` if another holder has an exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns the OS error for failures other than contention.
    pub fn try_lock_shared(&self) -> io::Result<bool> {
        self.try_lock(LockMode::Shared)
    }

    /// Blocks until a lock of the requested mode is held.
    ///
    /// # Errors
    ///
    /// Returns the OS error if locking fails.
    pub fn lock(&self, mode: LockMode) -> io::Result<()> {
        self.flock(flock_operation(mode))
    }

    fn try_lock(&self, mode: LockMode) -> io::Result<bool> {
        match self.flock(flock_operation(mode) | NON_BLOCKING) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Releases any lock held through this handle.
    ///
    /// # Errors
    ///
    /// Returns the OS error if unlocking fails.
    pub fn unlock(&self) -> io::Result<()> {
        self.flock(UNLOCK)
    }

    #[cfg(unix)]
    fn flock(&self, operation: libc::c_int) -> io::Result<()> {
        // SAFETY: The file descriptor obtained from `self.file.as_raw_fd()` is
        // valid because `self.file` is owned by this handle and is only closed
        // when the handle drops, which cannot happen while `&self` is borrowed.
        let result = unsafe { libc::flock(self.file.as_raw_fd(), operation) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    /// No-op locking on non-Unix platforms.
    #[cfg(not(unix))]
    #[expect(
        clippy::unnecessary_wraps,
        reason = "signature matches the Unix implementation"
    )]
    fn flock(&self, _operation: i32) -> io::Result<()> {
        let _ = &self.file;
        Ok(())
    }
}

#[cfg(unix)]
const NON_BLOCKING: libc::c_int = libc::LOCK_NB;
#[cfg(unix)]
const UNLOCK: libc::c_int = libc::LOCK_UN;
#[cfg(not(unix))]
const NON_BLOCKING: i32 = 0;
#[cfg(not(unix))]
const UNLOCK: i32 = 0;

#[cfg(unix)]
const fn flock_operation(mode: LockMode) -> libc::c_int {
    match mode {
        LockMode::Exclusive => libc::LOCK_EX,
        LockMode::Shared => libc::LOCK_SH,
    }
}

#[cfg(not(unix))]
const fn flock_operation(_mode: LockMode) -> i32 {
    0
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    fn lock_target() -> (TempDir, Utf8PathBuf) {
        let temp = tempdir().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(temp.path().join("entry")).expect("utf8 path");
        std::fs::create_dir(&path).expect("create entry dir");
        (temp, path)
    }

    #[test]
    fn open_requires_existing_path() {
        let temp = tempdir().expect("tempdir");
        let missing = Utf8PathBuf::from_path_buf(temp.path().join("missing")).expect("utf8");

        let err = FileLock::open(&missing).expect_err("missing path must fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!missing.exists(), "open must not create the path");
    }

    #[test]
    fn exclusive_lock_blocks_try_lock() {
        let (_temp, path) = lock_target();
        let holder = FileLock::acquire_exclusive(&path).expect("acquire");
        let contender = FileLock::open(&path).expect("open");

        assert!(!contender.try_lock_exclusive().expect("try exclusive"));
        assert!(!contender.try_lock_shared().expect("try shared"));

        holder.unlock().expect("unlock");
        assert!(contender.try_lock_exclusive().expect("try after unlock"));
    }

    #[test]
    fn multiple_shared_locks_can_coexist() {
        let (_temp, path) = lock_target();

        let lock1 = FileLock::acquire_shared(&path).expect("acquire lock 1");
        let lock2 = FileLock::open(&path).expect("open lock 2");

        assert!(lock2.try_lock_shared().expect("second shared lock"));
        assert!(!lock2.try_lock_exclusive().expect("upgrade must not succeed"));
        drop(lock1);
    }

    #[test]
    fn shared_lock_on_open_handle_excludes_writers() {
        let (_temp, path) = lock_target();
        let reader = FileLock::open(&path).expect("open reader");
        let contender = FileLock::open(&path).expect("open contender");

        reader.lock_shared().expect("lock shared");

        assert!(!contender.try_lock_exclusive().expect("try exclusive"));
        assert!(contender.try_lock_shared().expect("try shared"));
        contender.unlock().expect("unlock contender");

        reader.unlock().expect("unlock reader");
        assert!(contender.try_lock_exclusive().expect("exclusive after unlock"));
    }

    #[test]
    fn exclusive_lock_on_open_handle_excludes_readers() {
        let (_temp, path) = lock_target();
        let writer = FileLock::open(&path).expect("open writer");
        let contender = FileLock::open(&path).expect("open contender");

        writer.lock_exclusive().expect("lock exclusive");

        assert!(!contender.try_lock_shared().expect("try shared"));
        assert!(!contender.try_lock_exclusive().expect("try exclusive"));

        drop(writer);
        assert!(contender.try_lock_shared().expect("shared after drop"));
    }

    #[test]
    fn dropping_the_handle_releases_the_lock() {
        let (_temp, path) = lock_target();
        let holder = FileLock::acquire_exclusive(&path).expect("acquire");
        drop(holder);

        let contender = FileLock::open(&path).expect("open");
        assert!(contender.try_lock_exclusive().expect("lock after drop"));
    }

    #[test]
    fn blocking_lock_waits_for_release() {
        let (_temp, path) = lock_target();
        let holder = FileLock::acquire_exclusive(&path).expect("acquire");
        let (tx, rx) = mpsc::channel();

        let waiter_path = path.clone();
        let waiter = thread::spawn(move || {
            let lock = FileLock::acquire_exclusive(&waiter_path).expect("waiter acquire");
            tx.send(()).expect("signal");
            drop(lock);
        });

        assert!(
            rx.recv_timeout(Duration::from_millis(200)).is_err(),
            "waiter must block while the lock is held"
        );
        drop(holder);
        rx.recv_timeout(Duration::from_secs(10))
            .expect("waiter acquires after release");
        waiter.join().expect("join waiter");
    }
}

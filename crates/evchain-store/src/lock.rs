//! Cross-process exclusive lock around every store mutation.
//!
//! The lock is an advisory `flock(2)` (`LockFileEx` on Windows) on a sidecar
//! file next to the active store. Acquisition polls with a non-blocking attempt and a jittered sleep
//! until the configured budget is spent, then fails with `LockTimeout`.
//! The lock is released when the guard is dropped, including on error paths
//! and when the holding process dies.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use evchain_contracts::error::{EvchainError, EvchainResult};
use evchain_core::config::StoreConfig;

/// Acquisition policy for one lock file.
#[derive(Debug, Clone)]
pub struct StoreLock {
    path: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
    jitter_ms: u64,
}

/// Holds the exclusive lock until dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    pub fn new(path: impl Into<PathBuf>, config: &StoreConfig) -> Self {
        Self {
            path: path.into(),
            timeout: config.lock_timeout(),
            poll_interval: config.lock_poll_interval(),
            jitter_ms: config.lock_poll_jitter_ms,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block (by polling) until the lock is held or the budget is spent.
    pub fn acquire(&self) -> EvchainResult<LockGuard> {
        let started = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            if let Some(guard) = self.try_acquire()? {
                if attempts > 1 {
                    debug!(
                        path = %self.path.display(),
                        attempts,
                        waited_ms = elapsed_ms(started),
                        "store lock acquired after contention"
                    );
                }
                return Ok(guard);
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                warn!(path = %self.path.display(), attempts, "store lock timed out");
                return Err(EvchainError::LockTimeout {
                    path: self.path.display().to_string(),
                    waited_ms: elapsed_ms(started),
                });
            }

            let remaining = self.timeout - waited;
            std::thread::sleep(self.next_pause().min(remaining));
        }
    }

    /// One non-blocking attempt. `Ok(None)` means another holder has it.
    pub fn try_acquire(&self) -> EvchainResult<Option<LockGuard>> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| EvchainError::io(format!("opening lock file {}", self.path.display()), e))?;

        match try_flock_exclusive(&file) {
            Ok(true) => Ok(Some(LockGuard {
                file,
                path: self.path.clone(),
            })),
            Ok(false) => Ok(None),
            Err(e) => Err(EvchainError::io(
                format!("locking {}", self.path.display()),
                e,
            )),
        }
    }

    fn next_pause(&self) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        self.poll_interval + Duration::from_millis(jitter)
    }
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = unlock(&self.file) {
            // Closing the descriptor releases the lock anyway.
            debug!(path = %self.path.display(), error = %e, "explicit unlock failed");
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fd is a valid descriptor owned by `file` for this call.
        #[allow(unsafe_code)]
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        // LockFileEx on Windows.
        match file.try_lock() {
            Ok(()) => Ok(true),
            Err(std::fs::TryLockError::WouldBlock) => Ok(false),
            Err(std::fs::TryLockError::Error(err)) => Err(err),
        }
    }
}

fn unlock(file: &File) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: same descriptor as above, still owned by `file`.
        #[allow(unsafe_code)]
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
    #[cfg(not(unix))]
    {
        file.unlock()
    }
}

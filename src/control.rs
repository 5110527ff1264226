//! Coordinator-owned control state: termination and restart requests, and the singleton lock.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Context;
use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM, SIGUSR1};
use tracing::{debug, warn};

use crate::error::ArenaError;

/// Termination and restart requests, checked by [`World::run`](crate::world::World::run)
/// between rounds.
///
/// Clones share the same flags.
#[derive(Debug, Clone, Default)]
pub struct ControlFlags {
    terminate: Arc<AtomicBool>,
    restart: Arc<AtomicBool>,
}

impl ControlFlags {
    /// Flags with nothing requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT, SIGTERM and SIGQUIT to [`request_terminate`](Self::request_terminate) and
    /// SIGUSR1 to [`request_restart`](Self::request_restart).
    ///
    /// # Errors
    /// A handler cannot be installed.
    pub fn register_signals(&self) -> anyhow::Result<()> {
        for signal in [SIGINT, SIGTERM, SIGQUIT] {
            signal_hook::flag::register(signal, self.terminate.clone())
                .with_context(|| format!("could not register handler for signal {signal}"))?;
        }
        signal_hook::flag::register(SIGUSR1, self.restart.clone())
            .context("could not register handler for SIGUSR1")?;
        debug!("signal handlers installed");
        Ok(())
    }

    /// Ask the run loop to stop after the current round.
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Release);
    }

    /// Ask the run loop to restart the world after the current round.
    pub fn request_restart(&self) {
        self.restart.store(true, Ordering::Release);
    }

    /// True once termination was requested. Never reset.
    pub fn should_terminate(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    /// Consume a pending restart request.
    pub fn take_restart(&self) -> bool {
        self.restart.swap(false, Ordering::AcqRel)
    }
}

/// Lock file holding the pid of the running coordinator. Removed on drop.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    /// Create `path` and write our pid to it.
    ///
    /// A file left behind by a process that no longer runs, or one that does not hold a pid, is
    /// replaced.
    ///
    /// # Errors
    /// [`ArenaError::AlreadyRunning`] if the recorded process is alive, or any I/O failure.
    pub fn acquire(path: impl AsRef<Path>) -> anyhow::Result<PidLock> {
        let path = path.as_ref();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    write!(file, "{}", std::process::id())
                        .with_context(|| format!("could not write pid to {path:?}"))?;
                    debug!("pid lock {path:?} acquired");
                    return Ok(PidLock {
                        path: path.to_owned(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let content = match fs::read_to_string(path) {
                        Ok(content) => content,
                        // removed in between, try again
                        Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                        Err(e) => {
                            return Err(e).with_context(|| format!("could not read {path:?}"))
                        }
                    };
                    if let Ok(pid) = content.trim().parse::<u32>() {
                        if process_alive(pid) {
                            return Err(ArenaError::AlreadyRunning {
                                pid,
                                path: path.to_owned(),
                            }
                            .into());
                        }
                    }
                    warn!("replacing stale pid file {path:?}");
                    match fs::remove_file(path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => {
                            return Err(e)
                                .with_context(|| format!("could not remove stale {path:?}"))
                        }
                    }
                }
                Err(e) => return Err(e).with_context(|| format!("could not create {path:?}")),
            }
        }
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("could not remove pid file {:?}: {e}", self.path);
        }
    }
}

fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs the permission and existence checks only
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

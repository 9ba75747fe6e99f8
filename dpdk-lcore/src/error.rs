use std::fmt;

use crate::api::Errno;

/// Error type for lcore runtime operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The privileged initializer failed.
    Init(Errno),
    /// A worker lcore could not be launched.
    Launch { lcore: u32, errno: Errno },
    /// The command-line string could not be split into arguments.
    Args(String),
    /// The target lcore has left its run-loop.
    Terminated(u32),
    /// A work unit dispatched to its own lcore found the queue full.
    WouldBlock(u32),
    /// No lcore with this id exists.
    UnknownLcore(u32),
    /// The work unit panicked before producing a result.
    WorkUnitPanicked(u32),
    /// Cleanup was requested from an lcore thread.
    CleanupFromLcore(u32),
    /// The privileged finalizer failed.
    Cleanup(Errno),
    /// The application closure handed to `run_main` panicked.
    AppPanicked,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Init(e) => write!(f, "EAL initialization failed: {e}"),
            Error::Launch { lcore, errno } => {
                write!(f, "failed to launch on lcore {lcore}: {errno}")
            }
            Error::Args(msg) => write!(f, "invalid EAL command line: {msg}"),
            Error::Terminated(id) => write!(f, "lcore {id} has terminated"),
            Error::WouldBlock(id) => write!(f, "task queue of lcore {id} is full"),
            Error::UnknownLcore(id) => write!(f, "lcore {id} is not registered"),
            Error::WorkUnitPanicked(id) => write!(f, "work unit on lcore {id} panicked"),
            Error::CleanupFromLcore(id) => {
                write!(f, "cleanup called from lcore {id}, must run outside lcore threads")
            }
            Error::Cleanup(e) => write!(f, "EAL cleanup failed: {e}"),
            Error::AppPanicked => write!(f, "application thread panicked"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Init(e) | Error::Cleanup(e) => Some(e),
            Error::Launch { errno, .. } => Some(errno),
            _ => None,
        }
    }
}

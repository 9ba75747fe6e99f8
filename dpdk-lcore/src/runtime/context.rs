//! Per-lcore context handed to every work unit.

use tokio::sync::oneshot;

use crate::api::Result;
use crate::api::lcore::Placement;

/// Stop acknowledgement, delivered once the run-loop has exited.
pub(crate) struct ExitNotice {
    pub(crate) ack: oneshot::Sender<Result<()>>,
    pub(crate) outcome: Result<()>,
}

/// Per-lcore context supplied to each work unit running on that lcore.
///
/// The context lives on the lcore's own thread for the whole run, so `value`
/// can be mutated by work units without any locking: nothing outside that
/// thread ever sees it.
///
/// # Example
///
/// ```no_run
/// use dpdk_lcore::{EalBuilder, NativeEngine};
///
/// let rt = EalBuilder::new()
///     .core_list("0-1")
///     .launch::<Vec<u32>>(NativeEngine::new())
///     .unwrap();
///
/// rt.execute_on_lcore(1, |lc| lc.value.push(1)).unwrap();
/// let len = rt.call_on_lcore(1, |lc| lc.value.len()).unwrap();
/// assert_eq!(len, 1);
/// rt.cleanup().unwrap();
/// ```
pub struct LcoreContext<S> {
    /// User-specified state. Persists across work units on this lcore and
    /// starts as `S::default()`.
    pub value: S,
    id: u32,
    placement: Placement,
    is_main: bool,
    panics: u64,
    terminating: bool,
    exit: Option<ExitNotice>,
}

impl<S: Default> LcoreContext<S> {
    pub(crate) fn new(id: u32, placement: Placement, is_main: bool) -> Self {
        Self {
            value: S::default(),
            id,
            placement,
            is_main,
            panics: 0,
            terminating: false,
            exit: None,
        }
    }
}

impl<S> LcoreContext<S> {
    /// Lcore id of the thread running this work unit.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// NUMA socket the lcore thread resides on.
    #[inline]
    pub fn socket_id(&self) -> u32 {
        self.placement.socket_id
    }

    /// Physical CPU the lcore thread is pinned to.
    #[inline]
    pub fn cpu_id(&self) -> u32 {
        self.placement.cpu_id
    }

    /// Whether this is the main (coordinator) lcore.
    #[inline]
    pub fn is_main(&self) -> bool {
        self.is_main
    }

    /// Number of work units on this lcore that panicked.
    pub fn panics(&self) -> u64 {
        self.panics
    }

    /// Whether a stop instruction has run on this lcore.
    pub fn is_terminating(&self) -> bool {
        self.terminating
    }

    pub(crate) fn record_panic(&mut self) {
        self.panics += 1;
    }

    /// Flag the run-loop to exit after the current work unit and report
    /// `outcome` once it has.
    pub(crate) fn terminate(&mut self, ack: oneshot::Sender<Result<()>>, outcome: Result<()>) {
        self.terminating = true;
        self.exit = Some(ExitNotice { ack, outcome });
    }

    pub(crate) fn take_exit(&mut self) -> Option<ExitNotice> {
        self.exit.take()
    }
}

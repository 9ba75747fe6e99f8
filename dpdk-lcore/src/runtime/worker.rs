//! Lcore run-loop.
//!
//! Every lcore thread, the main one included, runs [`LcoreWorker::run`]:
//! receive a work unit, run it inside the fault boundary, exit once a stop
//! instruction has flagged the context.

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use super::context::LcoreContext;
use super::fault;
use super::registry::Task;
use crate::api::lcore::{LCORE_ID_ANY, State};

thread_local! {
    static CURRENT_LCORE: Cell<u32> = const { Cell::new(LCORE_ID_ANY) };
}

/// Lcore id of the calling thread.
///
/// Returns `None` outside lcore threads, or on an lcore thread whose
/// run-loop has exited.
pub fn current_lcore() -> Option<u32> {
    let id = CURRENT_LCORE.get();
    if id == LCORE_ID_ANY { None } else { Some(id) }
}

/// Receiving side of one lcore: its context and the reader half of its
/// task channel.
pub(crate) struct LcoreWorker<S> {
    ctx: LcoreContext<S>,
    rx: Receiver<Task<S>>,
    state: Arc<AtomicU8>,
}

impl<S> LcoreWorker<S> {
    pub(crate) fn new(ctx: LcoreContext<S>, rx: Receiver<Task<S>>, state: Arc<AtomicU8>) -> Self {
        Self { ctx, rx, state }
    }

    pub(crate) fn id(&self) -> u32 {
        self.ctx.id()
    }

    fn set_state(&self, state: State) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Run work units until a stop instruction runs or every sender is gone.
    ///
    /// Consumes the worker; the receiver is dropped on return, so later
    /// dispatches to this lcore fail instead of queueing forever.
    pub(crate) fn run(mut self) -> LcoreContext<S> {
        let id = self.ctx.id();
        CURRENT_LCORE.set(id);
        fault::install_hook();
        info!(lcore = id, main = self.ctx.is_main(), "lcore started");

        for task in self.rx.iter() {
            self.set_state(State::Running);
            let ctx = &mut self.ctx;
            if fault::isolate(id, || task(ctx)).is_err() {
                self.ctx.record_panic();
            }
            if self.ctx.is_terminating() {
                break;
            }
            self.set_state(State::Wait);
        }

        if !self.ctx.is_terminating() {
            debug!(lcore = id, "Task channel disconnected");
        }
        self.set_state(State::Exited);
        CURRENT_LCORE.set(LCORE_ID_ANY);
        info!(lcore = id, "lcore exited");

        if let Some(exit) = self.ctx.take_exit() {
            // The waiting side may have given up; nothing left to report to.
            let _ = exit.ack.send(exit.outcome);
        }

        let LcoreWorker { ctx, rx, .. } = self;
        drop(rx);
        ctx
    }
}

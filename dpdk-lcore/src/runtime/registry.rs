//! Lcore id to task channel table.
//!
//! Built once while the runtime initializes and read-only afterwards, so
//! lookups from any number of dispatching threads need no locking.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::context::LcoreContext;
use super::worker::{LcoreWorker, current_lcore};
use crate::api::lcore::{LcoreLayout, MAX_LCORE, Placement, State};
use crate::error::Error;

/// A work unit queued for an lcore.
pub(crate) type Task<S> = Box<dyn FnOnce(&mut LcoreContext<S>) + Send + 'static>;

/// Dispatch side of one lcore: the writer half of its task channel and its
/// run-loop state.
pub(crate) struct Slot<S> {
    id: u32,
    tx: Sender<Task<S>>,
    state: Arc<AtomicU8>,
}

impl<S> Slot<S> {
    pub(crate) fn state(&self) -> State {
        State::from(self.state.load(Ordering::Acquire))
    }

    /// Queue `task`, blocking while the channel is full.
    ///
    /// A task sent from the lcore's own thread never blocks, since nothing
    /// else would drain the queue.
    pub(crate) fn send(&self, task: Task<S>) -> Result<(), Error> {
        if self.state() == State::Exited {
            return Err(Error::Terminated(self.id));
        }

        if current_lcore() == Some(self.id) {
            return self.tx.try_send(task).map_err(|e| match e {
                TrySendError::Full(_) => Error::WouldBlock(self.id),
                TrySendError::Disconnected(_) => Error::Terminated(self.id),
            });
        }

        // Fails only once the run-loop has dropped its receiver.
        self.tx.send(task).map_err(|_| Error::Terminated(self.id))
    }
}

pub(crate) struct Registry<S> {
    slots: Box<[Option<Slot<S>>]>,
}

impl<S: Default> Registry<S> {
    /// Create a slot and a worker for every lcore in `layout`.
    pub(crate) fn build(layout: &LcoreLayout, queue_depth: usize) -> (Self, Vec<LcoreWorker<S>>) {
        let mut slots: Vec<Option<Slot<S>>> = (0..MAX_LCORE).map(|_| None).collect();
        let mut workers = Vec::with_capacity(layout.count() as usize);

        for id in layout.lcores(false) {
            let (tx, rx): (Sender<Task<S>>, Receiver<Task<S>>) =
                crossbeam_channel::bounded(queue_depth);
            let state = Arc::new(AtomicU8::new(State::Wait as u8));
            let placement = layout.placement(id).unwrap_or(Placement {
                cpu_id: id,
                socket_id: 0,
            });
            let ctx = LcoreContext::new(id, placement, id == layout.main_lcore());

            slots[id as usize] = Some(Slot {
                id,
                tx,
                state: state.clone(),
            });
            workers.push(LcoreWorker::new(ctx, rx, state));
        }

        (
            Self {
                slots: slots.into_boxed_slice(),
            },
            workers,
        )
    }
}

impl<S> Registry<S> {
    pub(crate) fn get(&self, id: u32) -> Option<&Slot<S>> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }
}

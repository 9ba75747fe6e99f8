//! Lcore runtime: pinned lcore threads executing dispatched closures.
//!
//! # Architecture
//!
//! Every lcore enabled by the engine runs the same run-loop on its own
//! pinned thread. Each loop owns a [`LcoreContext`] and the reader half of a
//! bounded task channel; the [`Runtime`] handle owns the writer halves.
//!
//! 1. **Init** calls the engine's privileged initializer on the thread that
//!    becomes the main lcore, builds one context and channel per lcore, and
//!    launches the run-loop on every worker lcore.
//! 2. **Dispatch** ([`Runtime::execute_on_lcore`]) queues a closure on the
//!    target lcore's channel. It runs there, with `&mut` access to the
//!    lcore's context, in the order it was queued.
//! 3. **Cleanup** ([`Runtime::cleanup`]) queues a stop instruction behind
//!    whatever work is pending on every worker, waits for all of them to
//!    exit, then stops the main lcore, which calls the engine's finalizer.
//!
//! A panicking closure is caught and logged on its lcore; the lcore keeps
//! serving work.
//!
//! # Example
//!
//! ```no_run
//! use dpdk_lcore::{EalBuilder, NativeEngine};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! let rt = EalBuilder::new()
//!     .core_list("0-3")
//!     .launch::<()>(NativeEngine::new())
//!     .expect("EAL init failed");
//!
//! let counter = Arc::new(AtomicU32::new(0));
//! for id in rt.lcores(true) {
//!     let counter = counter.clone();
//!     rt.execute_on_lcore(id, move |_| {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     })
//!     .unwrap();
//! }
//!
//! rt.cleanup().unwrap();
//! assert_eq!(counter.load(Ordering::SeqCst), 3);
//! ```

mod context;
mod fault;
mod registry;
mod worker;

pub use context::LcoreContext;
pub use worker::current_lcore;

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::api::eal::ProcessType;
use crate::api::lcore::{LcoreIter, LcoreLayout, State};
use crate::api::{Errno, io_errno};
use crate::engine::Engine;
use crate::error::Error;
use crate::{Result, api};
use registry::Registry;
use worker::LcoreWorker;

/// Default depth of each lcore's task queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Arguments for the engine plus runtime-only settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Argument vector for the privileged initializer, program name first.
    pub args: Vec<String>,
    /// Capacity of each lcore's task queue. Dispatch blocks while the queue
    /// is full; `0` makes every dispatch wait for the lcore to pick it up.
    pub queue_depth: usize,
}

impl RuntimeConfig {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }

    /// Parse a command-line string, honoring quotes.
    pub fn parse(input: &str) -> Result<Self> {
        Ok(Self::new(api::args::split_args(input)?))
    }

    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }
}

/// Outcome of the first cleanup, `None` until one has finished. Held
/// locked for the whole shutdown so that concurrent callers wait for it.
type CleanupState = Arc<Mutex<Option<Result<()>>>>;

fn lock_cleanup(state: &Mutex<Option<Result<()>>>) -> MutexGuard<'_, Option<Result<()>>> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

struct Inner<S> {
    engine: Arc<dyn Engine>,
    layout: LcoreLayout,
    registry: Registry<S>,
    cleanup: CleanupState,
    /// Thread running the main lcore when launched in the background.
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running set of lcores.
///
/// Cheap to clone and shareable across threads. `S` is the per-lcore user
/// state, see [`LcoreContext::value`].
pub struct Runtime<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Runtime<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> std::fmt::Debug for Runtime<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("layout", &self.inner.layout)
            .field("cleaned_up", &lock_cleanup(&self.inner.cleanup).is_some())
            .finish()
    }
}

impl<S: Default + Send + 'static> Runtime<S> {
    /// Initialize from a command-line string such as
    /// `"app -l 0-3 --no-huge"` and launch in the background.
    pub fn init(engine: impl Engine, input: &str) -> Result<Self> {
        Self::launch(engine, RuntimeConfig::parse(input)?)
    }

    /// Initialize from a parsed argument vector and launch in the background.
    pub fn init_with_args<I, A>(engine: impl Engine, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self::launch(engine, RuntimeConfig::new(args))
    }

    /// Initialize the engine and launch every lcore, returning once all of
    /// them are running.
    ///
    /// The main lcore runs on a new thread (`lcore-main`), which performs the
    /// privileged initialization and then serves as the main lcore's
    /// run-loop until [`Runtime::cleanup`].
    ///
    /// Blocks the calling thread until initialization has finished; do not
    /// call it from within an async runtime.
    ///
    /// # Errors
    /// [`Error::Init`] or [`Error::Launch`]; no lcore is left running.
    pub fn launch(engine: impl Engine, config: RuntimeConfig) -> Result<Self> {
        let engine: Arc<dyn Engine> = Arc::new(engine);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<Self>>();

        info!(args = ?config.args, "EAL parameters");
        let coordinator = std::thread::Builder::new()
            .name("lcore-main".to_string())
            .spawn(move || match Self::bootstrap(engine, config) {
                Ok((rt, main)) => {
                    // The launching thread blocks on the handoff, so the
                    // receiver is alive; if not, dropping the handle
                    // disconnects the main lcore and `run` returns at once.
                    let _ = ready_tx.send(Ok(rt));
                    main.run();
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| Error::Init(io_errno(&e)))?;

        match ready_rx.blocking_recv() {
            Ok(Ok(rt)) => {
                *rt.coordinator_slot() = Some(coordinator);
                Ok(rt)
            }
            Ok(Err(e)) => {
                let _ = coordinator.join();
                Err(e)
            }
            Err(_) => {
                let _ = coordinator.join();
                error!("Main lcore thread exited during initialization");
                Err(Error::Init(Errno::EIO))
            }
        }
    }

    /// Initialize the engine and turn the calling thread into the main lcore.
    ///
    /// After a successful initialization `ready` runs on a new thread
    /// (`lcore-app`) with a handle to the runtime. This call returns once the
    /// main lcore has exited, which happens on [`Runtime::cleanup`] or when
    /// every handle has been dropped, and `ready` has returned.
    ///
    /// If the main lcore exited without a cleanup, the engine's finalizer
    /// runs here, on the calling thread, after every lcore has exited.
    ///
    /// # Errors
    /// - [`Error::Init`] or [`Error::Launch`], reported before `ready` runs.
    /// - [`Error::AppPanicked`] if `ready` panicked; the engine is still
    ///   finalized.
    /// - [`Error::Cleanup`] if the finalizer run here failed.
    pub fn run_main<F>(engine: impl Engine, config: RuntimeConfig, ready: F) -> Result<()>
    where
        F: FnOnce(Runtime<S>) + Send + 'static,
    {
        let engine: Arc<dyn Engine> = Arc::new(engine);
        info!(args = ?config.args, "EAL parameters");
        let (rt, main) = Self::bootstrap(engine.clone(), config)?;
        let cleanup = rt.inner.cleanup.clone();

        let app = std::thread::Builder::new()
            .name("lcore-app".to_string())
            .spawn(move || ready(rt));

        // If the spawn failed, the handle went down with the closure and the
        // main run-loop sees a disconnected channel right away.
        main.run();

        let app = match app {
            Ok(handle) => handle.join().map_err(|_| {
                error!("Application thread panicked");
                Error::AppPanicked
            }),
            Err(e) => {
                let errno = io_errno(&e);
                error!(%errno, "Failed to spawn application thread");
                Err(Error::Init(errno))
            }
        };

        // A cleanup still in progress on another thread holds the lock
        // until it has finished.
        let mut outcome = lock_cleanup(&cleanup);
        let finalized = match outcome.as_ref() {
            Some(_) => Ok(()),
            None => {
                warn!("Main lcore exited without cleanup, finalizing EAL");
                let result = engine.cleanup().map_err(|errno| {
                    error!(%errno, "EAL cleanup failed");
                    Error::Cleanup(errno)
                });
                *outcome = Some(result.clone());
                result
            }
        };
        app.and(finalized)
    }

    /// Privileged init, registry construction and worker launch.
    ///
    /// Runs on the thread that becomes the main lcore. Returns the runtime
    /// handle and the main lcore's worker, which the caller must run.
    fn bootstrap(
        engine: Arc<dyn Engine>,
        config: RuntimeConfig,
    ) -> Result<(Self, LcoreWorker<S>)> {
        let layout = engine.init(&config.args).map_err(|errno| {
            error!(%errno, "EAL initialization failed");
            Error::Init(errno)
        })?;

        let main_id = layout.main_lcore();
        let (registry, workers) = Registry::build(&layout, config.queue_depth);

        let mut main = None;
        for worker in workers {
            let id = worker.id();
            if id == main_id {
                main = Some(worker);
                continue;
            }
            if let Err(errno) = engine.remote_launch(id, Box::new(move || drop(worker.run()))) {
                error!(lcore = id, %errno, "Failed to launch lcore");
                // Disconnects the lcores launched so far.
                drop(registry);
                if let Err(e) = engine.cleanup() {
                    warn!(errno = %e, "EAL cleanup after failed launch failed");
                }
                return Err(Error::Launch { lcore: id, errno });
            }
        }

        let Some(main) = main else {
            error!(main_lcore = main_id, "Main lcore is not enabled");
            drop(registry);
            if let Err(e) = engine.cleanup() {
                warn!(errno = %e, "EAL cleanup after failed init failed");
            }
            return Err(Error::Init(Errno::EINVAL));
        };

        info!(
            lcores = layout.count(),
            main_lcore = main_id,
            "All lcores launched"
        );

        let rt = Runtime {
            inner: Arc::new(Inner {
                engine,
                layout,
                registry,
                cleanup: Arc::new(Mutex::new(None)),
                coordinator: Mutex::new(None),
            }),
        };
        Ok((rt, main))
    }
}

impl<S: Send + 'static> Runtime<S> {
    /// Run `f` on lcore `lcore_id`, in that lcore's thread.
    ///
    /// Returns once `f` is queued; it runs after everything this thread
    /// queued on the same lcore before. If `lcore_id` is not an lcore of
    /// this runtime the call does nothing and returns `Ok(())`.
    ///
    /// Blocks while the lcore's queue is full.
    ///
    /// # Errors
    /// - [`Error::Terminated`] if the lcore has exited its run-loop.
    /// - [`Error::WouldBlock`] if called from `lcore_id` itself and the queue
    ///   is full.
    pub fn execute_on_lcore<F>(&self, lcore_id: u32, f: F) -> Result<()>
    where
        F: FnOnce(&mut LcoreContext<S>) + Send + 'static,
    {
        match self.inner.registry.get(lcore_id) {
            Some(slot) => slot.send(Box::new(f)),
            None => Ok(()),
        }
    }

    /// Shortcut for [`Runtime::execute_on_lcore`] with the main lcore as
    /// destination.
    pub fn execute_on_main<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut LcoreContext<S>) + Send + 'static,
    {
        self.execute_on_lcore(self.main_lcore(), f)
    }

    /// Run `f` on lcore `lcore_id` and wait for its return value.
    ///
    /// Must not be called from within an async runtime.
    ///
    /// # Errors
    /// - [`Error::UnknownLcore`] if `lcore_id` is not an lcore of this runtime.
    /// - [`Error::WouldBlock`] if called from `lcore_id` itself.
    /// - [`Error::WorkUnitPanicked`] if `f` panicked.
    /// - [`Error::Terminated`] if the lcore exited before running `f`.
    pub fn call_on_lcore<F, R>(&self, lcore_id: u32, f: F) -> Result<R>
    where
        F: FnOnce(&mut LcoreContext<S>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let slot = self
            .inner
            .registry
            .get(lcore_id)
            .ok_or(Error::UnknownLcore(lcore_id))?;
        if current_lcore() == Some(lcore_id) {
            return Err(Error::WouldBlock(lcore_id));
        }

        let (tx, rx) = oneshot::channel();
        slot.send(Box::new(move |lc| {
            let _ = tx.send(f(lc));
        }))?;

        rx.blocking_recv().map_err(|_| match slot.state() {
            State::Exited => Error::Terminated(lcore_id),
            _ => Error::WorkUnitPanicked(lcore_id),
        })
    }

    /// Stop every lcore and release the engine.
    ///
    /// A stop instruction is queued on each worker lcore behind its pending
    /// work; once all workers have exited, the main lcore is stopped and
    /// calls the engine's finalizer. Returns after every lcore has exited.
    ///
    /// Make sure long-running work units return, otherwise this blocks until
    /// they do. Only the first call does anything. Later calls, including
    /// ones made while the first is still running, wait for it to finish and
    /// return its outcome.
    ///
    /// # Errors
    /// - [`Error::CleanupFromLcore`] when called on an lcore thread.
    /// - [`Error::Cleanup`] when the engine's finalizer fails.
    /// - [`Error::Terminated`] when the main lcore exited beforehand, in
    ///   which case the finalizer could not run.
    pub fn cleanup(&self) -> Result<()> {
        if let Some(id) = current_lcore() {
            return Err(Error::CleanupFromLcore(id));
        }
        let mut outcome = lock_cleanup(&self.inner.cleanup);
        if let Some(done) = outcome.as_ref() {
            debug!("EAL already cleaned up");
            return done.clone();
        }
        let result = self.shutdown();
        *outcome = Some(result.clone());
        result
    }

    /// Stop every lcore, workers first, and finalize the engine on the main
    /// lcore.
    fn shutdown(&self) -> Result<()> {
        let mut acks = Vec::new();
        for id in self.lcores(true) {
            let (tx, rx) = oneshot::channel();
            match self.execute_on_lcore(id, move |lc| lc.terminate(tx, Ok(()))) {
                Ok(()) => acks.push((id, rx)),
                Err(e) => warn!(lcore = id, error = %e, "Could not stop lcore"),
            }
        }
        for (id, rx) in acks {
            if rx.blocking_recv().is_err() {
                warn!(lcore = id, "lcore exited without acknowledging stop");
            }
        }
        debug!("All worker lcores stopped");

        let main_id = self.main_lcore();
        let engine = self.inner.engine.clone();
        let (tx, rx) = oneshot::channel();
        self.execute_on_main(move |lc| {
            let outcome = if lc.is_main() && current_lcore() == Some(main_id) {
                engine.cleanup()
            } else {
                Err(Errno::EPERM)
            };
            lc.terminate(tx, outcome);
        })?;
        let outcome = rx
            .blocking_recv()
            .map_err(|_| Error::Terminated(main_id))?;

        let coordinator = self.coordinator_slot().take();
        if let Some(handle) = coordinator {
            if handle.join().is_err() {
                warn!("Main lcore thread panicked");
            }
        }

        outcome.map_err(|errno| {
            error!(%errno, "EAL cleanup failed");
            Error::Cleanup(errno)
        })?;
        info!("EAL cleanup complete");
        Ok(())
    }
}

impl<S> Runtime<S> {
    /// The main (coordinator) lcore.
    pub fn main_lcore(&self) -> u32 {
        self.inner.layout.main_lcore()
    }

    /// Iterate over all lcores, leaving out the main lcore when `skip_main`
    /// is true.
    pub fn lcores(&self, skip_main: bool) -> LcoreIter<'_> {
        self.inner.layout.lcores(skip_main)
    }

    /// Number of lcores, main included.
    pub fn lcore_count(&self) -> u32 {
        self.inner.layout.count()
    }

    /// The layout reported by the engine at init.
    pub fn layout(&self) -> &LcoreLayout {
        &self.inner.layout
    }

    /// NUMA socket of an lcore, 0 when unknown.
    pub fn lcore_to_socket(&self, lcore_id: u32) -> u32 {
        self.inner.layout.socket_id(lcore_id)
    }

    /// Run-loop state of an lcore, `None` for unknown ids.
    pub fn lcore_state(&self, lcore_id: u32) -> Option<State> {
        self.inner.registry.get(lcore_id).map(|slot| slot.state())
    }

    /// Whether huge pages back the engine's memory.
    pub fn has_hugepages(&self) -> bool {
        self.inner.engine.has_hugepages()
    }

    /// Process type in a multi-process setup.
    pub fn process_type(&self) -> ProcessType {
        self.inner.engine.process_type()
    }

    fn coordinator_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .coordinator
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

impl<S> Drop for Inner<S> {
    fn drop(&mut self) {
        // Dropping the registry disconnects every lcore, so the run-loops
        // still exit. Only `run_main` finalizes the engine after that.
        if lock_cleanup(&self.cleanup).is_none() {
            warn!("Runtime dropped without cleanup");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NativeEngine;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn launch<S: Default + Send + 'static>(cores: &str) -> Runtime<S> {
        Runtime::launch(
            NativeEngine::new().pin_threads(false),
            RuntimeConfig::new(["runtime-test", "-l", cores, "--no-huge"]),
        )
        .unwrap()
    }

    #[test]
    fn test_config_parse() {
        let config = RuntimeConfig::parse("app -l 0-1 --vdev='net_ring0,a=b c'").unwrap();
        assert_eq!(config.args, ["app", "-l", "0-1", "--vdev=net_ring0,a=b c"]);
        assert_eq!(config.queue_depth, DEFAULT_QUEUE_DEPTH);
        assert!(matches!(
            RuntimeConfig::parse("app \"unterminated"),
            Err(Error::Args(_))
        ));
    }

    #[test]
    fn test_dispatch_in_order() {
        let rt = launch::<Vec<u32>>("0-1");
        for i in 0..10 {
            rt.execute_on_lcore(1, move |lc| lc.value.push(i)).unwrap();
        }
        let seen = rt.call_on_lcore(1, |lc| lc.value.clone()).unwrap();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        rt.cleanup().unwrap();
    }

    #[test]
    fn test_accessors() {
        let rt = launch::<()>("0-2");
        assert_eq!(rt.main_lcore(), 0);
        assert_eq!(rt.lcore_count(), 3);
        assert_eq!(rt.lcores(true).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(rt.lcores(false).len(), 3);
        assert_eq!(rt.lcore_state(2), Some(State::Wait));
        assert_eq!(rt.lcore_state(9), None);
        assert!(!rt.has_hugepages());
        assert_eq!(rt.process_type(), ProcessType::Primary);

        let (id, main) = rt.call_on_lcore(0, |lc| (lc.id(), lc.is_main())).unwrap();
        assert_eq!((id, main), (0, true));
        assert_eq!(rt.call_on_lcore(2, |_| current_lcore()).unwrap(), Some(2));
        assert_eq!(current_lcore(), None);
        rt.cleanup().unwrap();
    }

    #[test]
    fn test_unknown_lcore() {
        let rt = launch::<()>("0-1");
        assert_eq!(rt.execute_on_lcore(7, |_| unreachable!()), Ok(()));
        assert_eq!(
            rt.call_on_lcore(7, |_| ()).unwrap_err(),
            Error::UnknownLcore(7)
        );
        rt.cleanup().unwrap();
    }

    #[test]
    fn test_cleanup_stops_every_lcore() {
        let rt = launch::<()>("0-3");
        let counter = Arc::new(AtomicU32::new(0));
        for id in rt.lcores(true) {
            let counter = counter.clone();
            rt.execute_on_lcore(id, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        rt.cleanup().unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        for id in rt.lcores(false) {
            assert_eq!(rt.lcore_state(id), Some(State::Exited));
        }
        assert_eq!(
            rt.execute_on_lcore(1, |_| {}),
            Err(Error::Terminated(1))
        );
        assert_eq!(rt.execute_on_main(|_| {}), Err(Error::Terminated(0)));
        // Only the first cleanup does anything.
        assert_eq!(rt.cleanup(), Ok(()));
    }

    #[test]
    fn test_panic_is_contained() {
        let rt = launch::<u32>("0-1");
        rt.execute_on_lcore(1, |lc| lc.value = 5).unwrap();
        assert_eq!(
            rt.call_on_lcore(1, |_| -> u32 { panic!("work unit failure") }),
            Err(Error::WorkUnitPanicked(1))
        );
        let (value, panics) = rt.call_on_lcore(1, |lc| (lc.value, lc.panics())).unwrap();
        assert_eq!((value, panics), (5, 1));
        rt.cleanup().unwrap();
    }

    #[test]
    fn test_nested_dispatch() {
        let rt = launch::<Vec<&'static str>>("0-1");
        let inner = rt.clone();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        rt.execute_on_lcore(1, move |lc| {
            lc.value.push("outer");
            // Queued behind the current unit on the same lcore.
            inner
                .execute_on_lcore(1, |lc| lc.value.push("inner"))
                .unwrap();
            assert_eq!(
                inner.call_on_lcore(1, |_| ()),
                Err(Error::WouldBlock(1))
            );
            assert_eq!(inner.cleanup(), Err(Error::CleanupFromLcore(1)));
            done_tx.send(()).unwrap();
        })
        .unwrap();
        done_rx.recv().unwrap();
        assert_eq!(
            rt.call_on_lcore(1, |lc| lc.value.clone()).unwrap(),
            ["outer", "inner"]
        );
        rt.cleanup().unwrap();
    }

    #[test]
    fn test_self_dispatch_full_queue() {
        let rt = Runtime::<()>::launch(
            NativeEngine::new().pin_threads(false),
            RuntimeConfig::new(["runtime-test", "-l", "0-1"]).queue_depth(0),
        )
        .unwrap();
        let inner = rt.clone();
        let result = rt
            .call_on_lcore(1, move |_| inner.execute_on_lcore(1, |_| {}))
            .unwrap();
        assert_eq!(result, Err(Error::WouldBlock(1)));
        rt.cleanup().unwrap();
    }

    #[test]
    fn test_shared_engine() {
        let engine = Arc::new(NativeEngine::new().pin_threads(false));
        let rt = Runtime::<()>::init_with_args(engine.clone(), ["runtime-test", "-l", "0-1"])
            .unwrap();
        rt.cleanup().unwrap();

        // Finalized engines cannot be initialized again.
        assert_eq!(
            engine.init(&["runtime-test".to_string()]),
            Err(Errno::EALREADY)
        );
    }

    #[test]
    fn test_init_failure() {
        let err = Runtime::<()>::init(NativeEngine::new(), "runtime-test --bogus").unwrap_err();
        assert_eq!(err, Error::Init(Errno::EINVAL));

        let err = Runtime::<()>::init(NativeEngine::new(), "runtime-test 'open").unwrap_err();
        assert!(matches!(err, Error::Args(_)));
    }

    #[test]
    fn test_run_main() {
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();
        let main_thread = std::thread::current().id();
        Runtime::<()>::run_main(
            NativeEngine::new().pin_threads(false),
            RuntimeConfig::new(["runtime-test", "-l", "0-2"]),
            move |rt| {
                let on_main = rt
                    .call_on_lcore(0, move |_| std::thread::current().id() == main_thread)
                    .unwrap();
                assert!(on_main);
                for id in rt.lcores(false) {
                    let seen = seen.clone();
                    rt.execute_on_lcore(id, move |_| {
                        seen.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
                }
                rt.cleanup().unwrap();
            },
        )
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_run_main_app_panic_finalizes() {
        let engine = Arc::new(NativeEngine::new().pin_threads(false));
        let result = Runtime::<()>::run_main(
            engine.clone(),
            RuntimeConfig::new(["runtime-test", "-l", "0-2"]),
            |rt| {
                rt.execute_on_lcore(1, |_| {}).unwrap();
                panic!("application failure");
            },
        );
        assert_eq!(result, Err(Error::AppPanicked));
        // Already finalized by run_main.
        assert_eq!(engine.cleanup(), Err(Errno::EALREADY));
    }

    #[test]
    fn test_run_main_without_cleanup_finalizes() {
        let engine = Arc::new(NativeEngine::new().pin_threads(false));
        let result = Runtime::<u32>::run_main(
            engine.clone(),
            RuntimeConfig::new(["runtime-test", "-l", "0-1"]),
            |rt| {
                assert_eq!(rt.call_on_lcore(1, |lc| lc.id()).unwrap(), 1);
            },
        );
        assert_eq!(result, Ok(()));
        assert_eq!(engine.cleanup(), Err(Errno::EALREADY));
    }
}

//! Instrumented engine for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dpdk_lcore::api::Errno;
use dpdk_lcore::api::Result;
use dpdk_lcore::api::eal::ProcessType;
use dpdk_lcore::api::lcore::{LCORE_ID_ANY, LcoreLayout};
use dpdk_lcore::engine::LaunchFn;
use dpdk_lcore::{Engine, NativeEngine, current_lcore};
use tracing::{info, warn};

/// Calls observed by a [`CountingEngine`].
#[derive(Debug)]
pub struct EngineCounters {
    pub init: AtomicU32,
    pub launch: AtomicU32,
    pub cleanup: AtomicU32,
    /// Lcore the finalizer last ran on, `LCORE_ID_ANY` if none.
    pub cleanup_lcore: AtomicU32,
}

impl Default for EngineCounters {
    fn default() -> Self {
        Self {
            init: AtomicU32::new(0),
            launch: AtomicU32::new(0),
            cleanup: AtomicU32::new(0),
            cleanup_lcore: AtomicU32::new(LCORE_ID_ANY),
        }
    }
}

impl EngineCounters {
    pub fn init_calls(&self) -> u32 {
        self.init.load(Ordering::SeqCst)
    }

    pub fn launch_calls(&self) -> u32 {
        self.launch.load(Ordering::SeqCst)
    }

    pub fn cleanup_calls(&self) -> u32 {
        self.cleanup.load(Ordering::SeqCst)
    }

    pub fn cleanup_lcore(&self) -> Option<u32> {
        match self.cleanup_lcore.load(Ordering::SeqCst) {
            LCORE_ID_ANY => None,
            id => Some(id),
        }
    }
}

/// [`NativeEngine`] without pinning, wrapped to count calls and inject
/// failures.
pub struct CountingEngine {
    inner: NativeEngine,
    counters: Arc<EngineCounters>,
    fail_init: Option<Errno>,
    fail_launch: Option<u32>,
    fail_cleanup: Option<Errno>,
}

impl Default for CountingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CountingEngine {
    pub fn new() -> Self {
        Self {
            inner: NativeEngine::new().pin_threads(false),
            counters: Arc::new(EngineCounters::default()),
            fail_init: None,
            fail_launch: None,
            fail_cleanup: None,
        }
    }

    /// Make `init` fail with `errno`.
    pub fn fail_init(mut self, errno: Errno) -> Self {
        self.fail_init = Some(errno);
        self
    }

    /// Make `remote_launch` fail with `EAGAIN` for `lcore`.
    pub fn fail_launch_on(mut self, lcore: u32) -> Self {
        self.fail_launch = Some(lcore);
        self
    }

    /// Make `cleanup` report `errno` after the native engine has finalized.
    pub fn fail_cleanup(mut self, errno: Errno) -> Self {
        self.fail_cleanup = Some(errno);
        self
    }

    /// Shared counters; stay readable after the engine moved into a runtime.
    pub fn counters(&self) -> Arc<EngineCounters> {
        self.counters.clone()
    }
}

impl Engine for CountingEngine {
    fn init(&self, args: &[String]) -> Result<LcoreLayout> {
        self.counters.init.fetch_add(1, Ordering::SeqCst);
        match self.fail_init {
            Some(errno) => {
                warn!(%errno, "Injected init failure");
                Err(errno)
            }
            None => self.inner.init(args),
        }
    }

    fn remote_launch(&self, lcore: u32, f: LaunchFn) -> Result<()> {
        if self.fail_launch == Some(lcore) {
            warn!(lcore, "Injected launch failure");
            return Err(Errno::EAGAIN);
        }
        self.counters.launch.fetch_add(1, Ordering::SeqCst);
        self.inner.remote_launch(lcore, f)
    }

    fn cleanup(&self) -> Result<()> {
        let calls = self.counters.cleanup.fetch_add(1, Ordering::SeqCst) + 1;
        let lcore = current_lcore();
        self.counters
            .cleanup_lcore
            .store(lcore.unwrap_or(LCORE_ID_ANY), Ordering::SeqCst);
        info!(calls, lcore = ?lcore, "Finalizer called");

        self.inner.cleanup()?;
        match self.fail_cleanup {
            Some(errno) => {
                warn!(%errno, "Injected cleanup failure");
                Err(errno)
            }
            None => Ok(()),
        }
    }

    fn has_hugepages(&self) -> bool {
        self.inner.has_hugepages()
    }

    fn process_type(&self) -> ProcessType {
        self.inner.process_type()
    }
}

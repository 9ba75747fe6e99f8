//! The privileged engine behind the lcore runtime.
//!
//! An [`Engine`] owns the process-wide resources that pinned lcore threads
//! depend on. The runtime treats it as an opaque initializer/finalizer pair
//! plus a remote-launch facility:
//!
//! 1. [`Engine::init`] is called exactly once, on the thread that becomes the
//!    main lcore, and reports the activated lcores.
//! 2. [`Engine::remote_launch`] starts a function on each worker lcore.
//! 3. [`Engine::cleanup`] is called exactly once, from the main lcore, after
//!    every worker has been told to stop.
//!
//! The runtime guarantees that ordering; implementations do not need to be
//! idempotent.
//!
//! [`NativeEngine`] implements the trait with plain OS threads pinned through
//! `sched_setaffinity`.

mod native;

pub use native::NativeEngine;

use crate::api::Result;
use crate::api::eal::ProcessType;
use crate::api::lcore::LcoreLayout;

/// Function launched on a worker lcore.
pub type LaunchFn = Box<dyn FnOnce() + Send + 'static>;

/// Privileged initializer, finalizer and remote-launch facility.
pub trait Engine: Send + Sync + 'static {
    /// Initialize from an argument vector whose first element is the program
    /// name, pin the calling thread to the main lcore and report the
    /// activated lcores.
    fn init(&self, args: &[String]) -> Result<LcoreLayout>;

    /// Start `f` on a thread pinned to `lcore`.
    ///
    /// Only called after a successful [`Engine::init`], never for the main
    /// lcore.
    fn remote_launch(&self, lcore: u32, f: LaunchFn) -> Result<()>;

    /// Wait for launched functions to return and release engine resources.
    fn cleanup(&self) -> Result<()>;

    /// Whether huge pages back the engine's memory.
    fn has_hugepages(&self) -> bool {
        false
    }

    /// Process type in a multi-process setup.
    fn process_type(&self) -> ProcessType {
        ProcessType::Primary
    }
}

impl<E: Engine + ?Sized> Engine for std::sync::Arc<E> {
    fn init(&self, args: &[String]) -> Result<LcoreLayout> {
        (**self).init(args)
    }

    fn remote_launch(&self, lcore: u32, f: LaunchFn) -> Result<()> {
        (**self).remote_launch(lcore, f)
    }

    fn cleanup(&self) -> Result<()> {
        (**self).cleanup()
    }

    fn has_hugepages(&self) -> bool {
        (**self).has_hugepages()
    }

    fn process_type(&self) -> ProcessType {
        (**self).process_type()
    }
}

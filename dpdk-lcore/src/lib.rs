//! Pinned lcore threads with closure dispatch.
//!
//! An engine (see [`engine::Engine`]) decides which lcores exist and pins one
//! thread to each. [`Runtime`] then runs a loop on every lcore that executes
//! closures dispatched from any thread, in order, with exclusive access to a
//! per-lcore [`LcoreContext`].

pub mod api;
pub mod engine;
mod error;
pub mod runtime;

pub use api::eal::EalBuilder;
pub use engine::{Engine, NativeEngine};
pub use error::Error;
pub use runtime::{LcoreContext, Runtime, RuntimeConfig, current_lcore};

/// A Result type using the runtime [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

//! Typed initialization arguments.
//!
//! [`EalBuilder`] renders the options the native engine acts on into the
//! argument vector handed to [`Engine::init`]. Anything else an engine
//! understands goes through [`EalBuilder::arg`] untouched.

use std::str::FromStr;

use crate::api::Errno;
use crate::engine::Engine;
use crate::runtime::{Runtime, RuntimeConfig};

/// Process type for multi-process support
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessType {
    #[default]
    Primary,
    Secondary,
    Auto,
}

impl ProcessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessType::Primary => "primary",
            ProcessType::Secondary => "secondary",
            ProcessType::Auto => "auto",
        }
    }
}

impl FromStr for ProcessType {
    type Err = Errno;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(ProcessType::Primary),
            "secondary" => Ok(ProcessType::Secondary),
            "auto" => Ok(ProcessType::Auto),
            _ => Err(Errno::EINVAL),
        }
    }
}

/// The lcores to enable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cores {
    /// `-l <list>`, e.g. `0-3` or `0,2,4`
    List(String),
    /// `-c <mask>` in hex, e.g. `0xf` for lcores 0-3
    Mask(String),
}

/// Builder for the engine's initialization arguments.
///
/// Setting the same option twice keeps the last value. Raw arguments added
/// with [`arg`](Self::arg) follow the typed ones, in the order given.
///
/// # Example
/// ```no_run
/// use dpdk_lcore::api::eal::EalBuilder;
/// use dpdk_lcore::engine::NativeEngine;
///
/// fn main() -> Result<(), dpdk_lcore::Error> {
///     let rt = EalBuilder::new()
///         .no_huge()
///         .core_list("0-3")
///         .launch::<u64>(NativeEngine::new())?;
///
///     rt.execute_on_lcore(1, |lc| lc.value += 1)?;
///     rt.cleanup()
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct EalBuilder {
    program_name: Option<String>,
    cores: Option<Cores>,
    main_lcore: Option<u32>,
    process_type: Option<ProcessType>,
    no_huge: bool,
    extra: Vec<String>,
    queue_depth: Option<usize>,
}

impl EalBuilder {
    /// Program name is auto-detected from `std::env::args()` unless set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = Some(name.into());
        self
    }

    /// Run without hugepages (`--no-huge`).
    pub fn no_huge(mut self) -> Self {
        self.no_huge = true;
        self
    }

    pub fn cores(mut self, cores: Cores) -> Self {
        self.cores = Some(cores);
        self
    }

    pub fn core_list(self, list: impl Into<String>) -> Self {
        self.cores(Cores::List(list.into()))
    }

    pub fn core_mask(self, mask: impl Into<String>) -> Self {
        self.cores(Cores::Mask(mask.into()))
    }

    /// Choose the main (coordinator) lcore; defaults to the lowest enabled.
    pub fn main_lcore(mut self, id: u32) -> Self {
        self.main_lcore = Some(id);
        self
    }

    pub fn process_type(mut self, pt: ProcessType) -> Self {
        self.process_type = Some(pt);
        self
    }

    /// Append a raw argument for the engine.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra.push(arg.into());
        self
    }

    /// Depth of each lcore's task queue. Not passed to the engine.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = Some(depth);
        self
    }

    /// Render the argument vector, program name first.
    pub fn build_args(&self) -> Vec<String> {
        let program = self.program_name.clone().unwrap_or_else(|| {
            std::env::args()
                .next()
                .unwrap_or_else(|| "lcore-app".to_string())
        });
        let mut args = vec![program];

        match &self.cores {
            Some(Cores::List(list)) => args.extend(["-l".to_string(), list.clone()]),
            Some(Cores::Mask(mask)) => args.extend(["-c".to_string(), mask.clone()]),
            None => {}
        }
        if let Some(id) = self.main_lcore {
            args.extend(["--main-lcore".to_string(), id.to_string()]);
        }
        if let Some(pt) = self.process_type {
            args.push(format!("--proc-type={}", pt.as_str()));
        }
        if self.no_huge {
            args.push("--no-huge".to_string());
        }
        args.extend(self.extra.iter().cloned());
        args
    }

    /// Build the full runtime configuration.
    pub fn build(&self) -> RuntimeConfig {
        let config = RuntimeConfig::new(self.build_args());
        match self.queue_depth {
            Some(depth) => config.queue_depth(depth),
            None => config,
        }
    }

    /// Initialize the engine and launch the lcore runtime in the background.
    ///
    /// See [`Runtime::launch`].
    pub fn launch<S>(self, engine: impl Engine) -> crate::Result<Runtime<S>>
    where
        S: Default + Send + 'static,
    {
        Runtime::launch(engine, self.build())
    }

    /// Initialize the engine and turn the calling thread into the main lcore.
    ///
    /// See [`Runtime::run_main`].
    pub fn run_main<S, F>(self, engine: impl Engine, ready: F) -> crate::Result<()>
    where
        S: Default + Send + 'static,
        F: FnOnce(Runtime<S>) + Send + 'static,
    {
        Runtime::run_main(engine, self.build(), ready)
    }
}

//! Lcore Test Harness
//!
//! Reusable pieces for the integration tests under `tests/`:
//! - [`engine::CountingEngine`] - native engine that counts init/launch/cleanup
//!   calls and can be told to fail
//! - [`util::init_tracing`] - log to the test writer, filtered by `RUST_LOG`
//! - [`util::test_builder`] - `EalBuilder` preset for unpinned test lcores

pub mod engine;

pub mod util {
    use dpdk_lcore::EalBuilder;
    use tracing_subscriber::EnvFilter;

    /// Install a fmt subscriber once per test binary.
    ///
    /// Defaults to `info` when `RUST_LOG` is unset.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    }

    /// Builder for a runtime on `cores`, without hugepages.
    pub fn test_builder(cores: &str) -> EalBuilder {
        EalBuilder::new()
            .program_name("lcore-test")
            .no_huge()
            .core_list(cores)
    }
}

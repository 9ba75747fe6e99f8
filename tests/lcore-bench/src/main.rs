//! Lcore Dispatch Benchmark
//!
//! Measures how fast work units reach lcores.
//!
//! Supports two modes:
//! - **dispatch**: fire-and-forget units spread round-robin over the worker
//!   lcores, timed until every lcore has drained its queue
//! - **call**: blocking round-trips to one lcore, reporting mean latency
//!
//! # Usage
//!
//! ```bash
//! # 4 lcores, 1M units round-robin over the 3 workers
//! lcore-bench --cores 0-3 --iterations 1000000
//!
//! # Round-trip latency to lcore 1, without CPU pinning
//! lcore-bench --mode call --cores 0-1 --no-pin
//!
//! # Rendezvous queues
//! lcore-bench --queue-depth 0
//! ```

use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use dpdk_lcore::{EalBuilder, NativeEngine, Runtime};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BenchMode {
    /// Fire-and-forget dispatch to every worker lcore
    Dispatch,
    /// Blocking round-trips to the first worker lcore
    Call,
}

#[derive(Parser, Debug)]
#[command(name = "lcore-bench")]
#[command(about = "Dispatch benchmark for pinned lcore threads")]
struct Args {
    /// Benchmark mode: dispatch or call
    #[arg(short, long, value_enum, default_value = "dispatch")]
    mode: BenchMode,

    /// Core list handed to the engine (-l)
    #[arg(short, long, default_value = "0-3")]
    cores: String,

    /// Main lcore (defaults to the first lcore in the list)
    #[arg(long)]
    main_lcore: Option<u32>,

    /// Number of work units
    #[arg(short, long, default_value_t = 100_000)]
    iterations: u64,

    /// Task queue depth per lcore
    #[arg(short, long, default_value_t = dpdk_lcore::runtime::DEFAULT_QUEUE_DEPTH)]
    queue_depth: usize,

    /// Do not pin lcore threads to CPUs
    #[arg(long)]
    no_pin: bool,
}

fn main() -> ExitCode {
    // Initialize tracing - respects RUST_LOG, defaults to info if not set
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .init();

    let args = Args::parse();
    info!(
        mode = ?args.mode,
        cores = %args.cores,
        iterations = args.iterations,
        queue_depth = args.queue_depth,
        "Starting lcore benchmark"
    );

    let mut builder = EalBuilder::new()
        .no_huge()
        .core_list(&args.cores)
        .queue_depth(args.queue_depth);
    if let Some(main) = args.main_lcore {
        builder = builder.main_lcore(main);
    }

    let rt = match builder.launch::<u64>(NativeEngine::new().pin_threads(!args.no_pin)) {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to launch lcores");
            return ExitCode::FAILURE;
        }
    };

    let result = match args.mode {
        BenchMode::Dispatch => bench_dispatch(&rt, args.iterations),
        BenchMode::Call => bench_call(&rt, args.iterations),
    };

    if let Err(e) = rt.cleanup() {
        error!(error = %e, "Cleanup failed");
        return ExitCode::FAILURE;
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Benchmark failed");
            ExitCode::FAILURE
        }
    }
}

fn workers(rt: &Runtime<u64>) -> Vec<u32> {
    let workers: Vec<u32> = rt.lcores(true).collect();
    if workers.is_empty() {
        // Single lcore: the main one does the work.
        vec![rt.main_lcore()]
    } else {
        workers
    }
}

fn bench_dispatch(rt: &Runtime<u64>, iterations: u64) -> dpdk_lcore::Result<()> {
    let targets = workers(rt);
    let start = Instant::now();

    for (i, id) in (0..iterations).zip(targets.iter().copied().cycle()) {
        rt.execute_on_lcore(id, move |lc| lc.value += i)?;
    }

    // Each call queues behind the dispatched units, so it returns once the
    // lcore has drained them.
    let mut total = 0u64;
    for &id in &targets {
        let (sum, panics) = rt.call_on_lcore(id, |lc| (std::mem::take(&mut lc.value), lc.panics()))?;
        info!(lcore = id, sum, panics, "lcore drained");
        total = total.wrapping_add(sum);
    }

    let elapsed = start.elapsed();
    report("dispatch", iterations, elapsed);
    let expected = (0..iterations).fold(0u64, |acc, i| acc.wrapping_add(i));
    if total != expected {
        error!(total, expected, "Checksum mismatch");
    }
    Ok(())
}

fn bench_call(rt: &Runtime<u64>, iterations: u64) -> dpdk_lcore::Result<()> {
    let target = workers(rt)[0];
    let start = Instant::now();

    for _ in 0..iterations {
        rt.call_on_lcore(target, |lc| {
            lc.value += 1;
            lc.value
        })?;
    }

    report("call", iterations, start.elapsed());
    Ok(())
}

fn report(mode: &str, iterations: u64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        iterations as f64 / secs
    } else {
        0.0
    };
    let mean_ns = if iterations > 0 {
        elapsed.as_nanos() / u128::from(iterations)
    } else {
        0
    };
    info!(
        mode,
        iterations,
        elapsed_ms = elapsed.as_millis() as u64,
        units_per_sec = rate as u64,
        mean_ns = mean_ns as u64,
        "Benchmark complete"
    );
}

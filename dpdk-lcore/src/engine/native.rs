//! Engine backed by OS threads pinned with `sched_setaffinity`.
//!
//! Lcore N is pinned to CPU N, which matches what EAL does for `-l`/`-c`
//! without an explicit `--lcores` mapping.

use std::path::Path;
use std::sync::Mutex;
use std::thread::JoinHandle;

use nix::sched::{CpuSet, sched_getaffinity, sched_setaffinity};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use super::{Engine, LaunchFn};
use crate::api::eal::ProcessType;
use crate::api::lcore::{LcoreLayout, LcoreSet, MAX_LCORE, Placement};
use crate::api::{Errno, Result, io_errno};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninit,
    Running,
    Finalized,
}

struct NativeState {
    phase: Phase,
    layout: Option<LcoreLayout>,
    hugepages: bool,
    process_type: ProcessType,
    threads: Vec<(u32, JoinHandle<()>)>,
}

/// Engine running each lcore on its own pinned OS thread.
///
/// Understood arguments: `-l <list>`, `-c <mask>`, `--main-lcore <id>`,
/// `--proc-type=<type>` and `--no-huge`, as rendered by
/// [`EalBuilder`](crate::api::eal::EalBuilder). Device and memory options
/// of a full EAL command line (`--vdev`, `-a`, `--socket-mem` and the like)
/// are accepted and ignored, so existing command lines still parse. Without
/// `-l`/`-c` every CPU in the process affinity mask becomes an lcore.
///
/// The engine can be initialized once; a second `init` fails with
/// `EALREADY`, also after `cleanup`.
pub struct NativeEngine {
    pin_threads: bool,
    state: Mutex<NativeState>,
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeEngine {
    pub fn new() -> Self {
        Self {
            pin_threads: true,
            state: Mutex::new(NativeState {
                phase: Phase::Uninit,
                layout: None,
                hugepages: false,
                process_type: ProcessType::Primary,
                threads: Vec::new(),
            }),
        }
    }

    /// Enable or disable CPU pinning (enabled by default).
    pub fn pin_threads(mut self, pin: bool) -> Self {
        self.pin_threads = pin;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NativeState> {
        // A poisoned lock only means a panic elsewhere; the state stays usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pin(&self, lcore: u32, cpu: u32) {
        if !self.pin_threads {
            return;
        }
        match pin_current_thread(cpu) {
            Ok(()) => debug!(lcore, cpu, "Thread pinned to CPU"),
            Err(e) => {
                warn!(lcore, cpu, error = %e, "Failed to set CPU affinity, performance may be degraded")
            }
        }
    }
}

impl Engine for NativeEngine {
    fn init(&self, args: &[String]) -> Result<LcoreLayout> {
        let mut state = self.lock();
        if state.phase != Phase::Uninit {
            return Err(Errno::EALREADY);
        }

        let opts = NativeArgs::parse(args)?;
        let enabled = match opts.lcores {
            Some(set) => set,
            None => affinity_lcores()?,
        };
        let main = match opts.main_lcore {
            Some(id) if enabled.contains(id) => id,
            Some(id) => {
                warn!(main_lcore = id, "Main lcore is not in the core list");
                return Err(Errno::EINVAL);
            }
            None => enabled.first().ok_or(Errno::EINVAL)?,
        };

        let mut layout = LcoreLayout::new(enabled, main);
        for id in enabled.iter() {
            layout = layout.with_placement(
                id,
                Placement {
                    cpu_id: id,
                    socket_id: cpu_socket(id),
                },
            );
        }

        self.pin(main, main);

        state.hugepages = !opts.no_huge && hugepages_available();
        state.process_type = match opts.process_type {
            // Nothing else shares this engine, so auto resolves to primary.
            ProcessType::Auto => ProcessType::Primary,
            pt => pt,
        };
        state.layout = Some(layout.clone());
        state.phase = Phase::Running;

        info!(
            lcores = ?enabled.iter().collect::<Vec<_>>(),
            main_lcore = main,
            hugepages = state.hugepages,
            "Native engine initialized"
        );
        Ok(layout)
    }

    fn remote_launch(&self, lcore: u32, f: LaunchFn) -> Result<()> {
        let mut state = self.lock();
        if state.phase != Phase::Running {
            return Err(Errno::EINVAL);
        }
        let placement = match &state.layout {
            Some(layout) if lcore != layout.main_lcore() => {
                layout.placement(lcore).ok_or(Errno::EINVAL)?
            }
            _ => return Err(Errno::EINVAL),
        };
        if state.threads.iter().any(|(id, _)| *id == lcore) {
            return Err(Errno::EBUSY);
        }

        let pin_threads = self.pin_threads;
        let handle = std::thread::Builder::new()
            .name(format!("lcore-{lcore}"))
            .spawn(move || {
                if pin_threads {
                    match pin_current_thread(placement.cpu_id) {
                        Ok(()) => debug!(lcore, cpu = placement.cpu_id, "Thread pinned to CPU"),
                        Err(e) => warn!(
                            lcore,
                            cpu = placement.cpu_id,
                            error = %e,
                            "Failed to set CPU affinity, performance may be degraded"
                        ),
                    }
                }
                f();
            })
            .map_err(|e| io_errno(&e))?;

        state.threads.push((lcore, handle));
        Ok(())
    }

    fn cleanup(&self) -> Result<()> {
        let threads = {
            let mut state = self.lock();
            match state.phase {
                Phase::Running => {}
                Phase::Uninit => return Err(Errno::EINVAL),
                Phase::Finalized => return Err(Errno::EALREADY),
            }
            state.phase = Phase::Finalized;
            std::mem::take(&mut state.threads)
        };

        // Joined outside the lock: a worker may still be logging its exit.
        for (lcore, handle) in threads {
            if handle.join().is_err() {
                warn!(lcore, "Lcore thread terminated by panic");
            }
        }
        info!("Native engine cleaned up");
        Ok(())
    }

    fn has_hugepages(&self) -> bool {
        self.lock().hugepages
    }

    fn process_type(&self) -> ProcessType {
        self.lock().process_type
    }
}

/// Options the native engine acts on.
#[derive(Debug, Default, PartialEq, Eq)]
struct NativeArgs {
    lcores: Option<LcoreSet>,
    main_lcore: Option<u32>,
    no_huge: bool,
    process_type: ProcessType,
}

impl NativeArgs {
    fn parse(args: &[String]) -> Result<Self> {
        let mut opts = NativeArgs::default();
        // args[0] is the program name.
        let mut it = args.iter().skip(1).map(String::as_str);

        while let Some(arg) = it.next() {
            let (key, inline) = match arg.split_once('=') {
                Some((k, v)) if k.starts_with("--") => (k, Some(v)),
                _ => (arg, None),
            };
            let mut value = |name: &str| -> Result<String> {
                match inline {
                    Some(v) => Ok(v.to_string()),
                    None => it.next().map(str::to_string).ok_or_else(|| {
                        warn!(option = name, "Missing option value");
                        Errno::EINVAL
                    }),
                }
            };

            match key {
                "--" => break,
                "-l" => opts.lcores = Some(LcoreSet::parse_list(&value("-l")?)?),
                "-c" => opts.lcores = Some(LcoreSet::parse_mask(&value("-c")?)?),
                "--main-lcore" => {
                    let v = value("--main-lcore")?;
                    opts.main_lcore = Some(v.parse().map_err(|_| Errno::EINVAL)?);
                }
                "--proc-type" => opts.process_type = value("--proc-type")?.parse()?,
                "--no-huge" => opts.no_huge = true,
                "--no-pci" | "--in-memory" => debug!(option = key, "Ignoring option"),
                "-n" | "-a" | "--vdev" | "--file-prefix" | "--socket-mem" | "--log-level"
                | "--base-virtaddr" => {
                    let v = value(key)?;
                    debug!(option = key, value = %v, "Ignoring option");
                }
                // Glued short forms: -l0-3, -c0xf
                k if k.len() > 2 && k.starts_with("-l") && !k.starts_with("--") => {
                    opts.lcores = Some(LcoreSet::parse_list(&k[2..])?)
                }
                k if k.len() > 2 && k.starts_with("-c") && !k.starts_with("--") => {
                    opts.lcores = Some(LcoreSet::parse_mask(&k[2..])?)
                }
                other => {
                    warn!(arg = other, "Unknown EAL argument");
                    return Err(Errno::EINVAL);
                }
            }
        }

        if opts.lcores.is_some_and(|set| set.is_empty()) {
            return Err(Errno::EINVAL);
        }
        Ok(opts)
    }
}

/// Pin the calling thread to `cpu`.
fn pin_current_thread(cpu: u32) -> Result<()> {
    let mut set = CpuSet::new();
    set.set(cpu as usize)?;
    sched_setaffinity(Pid::from_raw(0), &set)
}

/// Lcores for every CPU the process may run on.
fn affinity_lcores() -> Result<LcoreSet> {
    let allowed = sched_getaffinity(Pid::from_raw(0))?;
    let mut set = LcoreSet::new();
    for cpu in 0..MAX_LCORE {
        if allowed.is_set(cpu as usize).unwrap_or(false) {
            set.insert(cpu)?;
        }
    }
    if set.is_empty() {
        return Err(Errno::EINVAL);
    }
    Ok(set)
}

/// NUMA node of a CPU from sysfs (`cpuN/nodeM`), 0 when unknown.
fn cpu_socket(cpu: u32) -> u32 {
    let dir = format!("/sys/devices/system/cpu/cpu{cpu}");
    let Ok(entries) = std::fs::read_dir(Path::new(&dir)) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            e.file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("node"))
                .and_then(|n| n.parse::<u32>().ok())
        })
        .next()
        .unwrap_or(0)
}

fn hugepages_available() -> bool {
    std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|info| {
            info.lines()
                .find_map(|l| l.strip_prefix("HugePages_Total:"))
                .and_then(|n| n.trim().parse::<u64>().ok())
        })
        .is_some_and(|n| n > 0)
}

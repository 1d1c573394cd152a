use std::fs::OpenOptions;
use std::io::Write;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::address::Address;
use crate::config::Config;
use crate::stack::RaceOutcome;

/// Which operation produced a [`RaceOutcome`], for the `RACE[...]` tag
/// (§6.4). Carried separately from `RaceOutcome` itself so that the stack
/// module stays ignorant of reporting concerns, per the "keep it a
/// distinct object" note on global mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Join,
    Sync,
    Reduce,
}

impl Phase {
    fn tag(self) -> &'static str {
        match self {
            Phase::Join => "JOIN",
            Phase::Sync => "SYNC",
            Phase::Reduce => "REDUCE",
        }
    }
}

fn format_line(phase: Phase, witness: &[Address]) -> String {
    let addrs = witness
        .iter()
        .map(|a| format!("{a}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("RACE[{}] addrs=[{}]", phase.tag(), addrs)
}

enum Writer {
    Stdout,
    File(std::fs::File),
}

impl Writer {
    fn from_config(cfg: &Config) -> Self {
        match &cfg.out_path {
            Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => Writer::File(f),
                Err(e) => {
                    log::error!("racedet: could not open CILKSCALE_OUT={path:?}: {e}, falling back to stdout");
                    Writer::Stdout
                }
            },
            None => Writer::Stdout,
        }
    }

    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        match self {
            Writer::Stdout => {
                println!("{line}");
                Ok(())
            }
            Writer::File(f) => writeln!(f, "{line}"),
        }
    }
}

/// The process-wide race report sink. One instance per process, behind a
/// lock: report emission happens off the hot per-access path (only at
/// `join`/`enter_serial`/`reduce` boundaries), so a plain mutex is the
/// right tool rather than anything lock-free.
pub struct ReportSink {
    writer: Writer,
    config: Config,
    race_count: u64,
}

impl ReportSink {
    fn new() -> Self {
        let config = Config::from_env();
        let writer = Writer::from_config(&config);
        Self {
            writer,
            config,
            race_count: 0,
        }
    }

    /// Emit a race report for `outcome` tagged with `phase`, both to the
    /// configured sink and via `log::warn!`. A sink write failure is
    /// returned to the caller rather than swallowed here; callers across
    /// the `extern "C"` boundary are expected to log and ignore it (§7).
    /// If `CILKSCALE_ABORT_ON_RACE` is set, escalates to a fatal abort
    /// after emitting.
    pub fn report(&mut self, phase: Phase, outcome: &RaceOutcome) -> std::io::Result<()> {
        if outcome.disjoint() {
            return Ok(());
        }
        self.race_count += 1;
        let line = format_line(phase, &outcome.witness);
        log::warn!("{line}");
        let result = self.writer.write_line(&line);
        if self.config.abort_on_race {
            log::error!("racedet: aborting on first reported race (CILKSCALE_ABORT_ON_RACE)");
            std::process::abort();
        }
        result
    }

    pub fn track_reads(&self) -> bool {
        self.config.track_reads
    }

    pub fn race_count(&self) -> u64 {
        self.race_count
    }
}

static SINK: Lazy<Mutex<ReportSink>> = Lazy::new(|| Mutex::new(ReportSink::new()));

/// Report `outcome` under `phase` through the global sink. Called by the
/// ABI shim at `join`, `enter_serial`, and `reduce` boundaries; a no-op if
/// `outcome` is disjoint. A write failure is returned, not swallowed: the
/// ABI layer logs it and otherwise ignores it rather than propagating
/// further.
pub fn report(phase: Phase, outcome: &RaceOutcome) -> std::io::Result<()> {
    SINK.lock().report(phase, outcome)
}

/// Whether the global sink is configured to track reads as well as
/// writes (`CILKSCALE_READS`).
pub fn track_reads() -> bool {
    SINK.lock().track_reads()
}

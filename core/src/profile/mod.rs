//! Per-instruction timing.
//!
//! Interpreters record into an explicitly attached [`NativeProfiler`]; the
//! process-wide instance from [`NativeProfiler::global`] is what most hosts
//! attach so stats aggregate across every interpreter in the process.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::info;

use crate::exec::{InstrId, Instruction, InstructionKind};

static GLOBAL_PROFILER: Lazy<Arc<NativeProfiler>> = Lazy::new(|| Arc::new(NativeProfiler::new()));

/// Accumulated timing for one instruction instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstructionStats {
    pub instr_id: InstrId,
    pub instr_repr: String,
    pub provenance: i64,
    pub kind: InstructionKind,
    pub count: u64,
    pub time_total: Duration,
}

#[derive(Debug, Default)]
pub struct NativeProfiler {
    on: AtomicBool,
    stats: DashMap<InstrId, InstructionStats>,
    t_total_nanos: AtomicU64,
}

impl NativeProfiler {
    /// A private profiler, off until `start` is called.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> Arc<NativeProfiler> {
        GLOBAL_PROFILER.clone()
    }

    pub fn start(&self) {
        self.on.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.on.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }

    /// Record one firing of `instr`. Safe to call from several workers at
    /// once; updates to the same instruction are serialized by the map shard.
    pub fn update(&self, instr: &Instruction, elapsed: Duration) {
        self.stats
            .entry(instr.id())
            .and_modify(|s| {
                s.count += 1;
                s.time_total += elapsed;
            })
            .or_insert_with(|| InstructionStats {
                instr_id: instr.id(),
                instr_repr: instr.repr().to_string(),
                provenance: instr.provenance(),
                kind: instr.kind(),
                count: 1,
                time_total: elapsed,
            });
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.t_total_nanos.fetch_add(nanos, Ordering::AcqRel);
    }

    pub fn clear_stats(&self) {
        self.stats.clear();
        self.t_total_nanos.store(0, Ordering::Release);
    }

    /// Total time recorded across all instructions since the last clear.
    pub fn get_t_total(&self) -> Duration {
        Duration::from_nanos(self.t_total_nanos.load(Ordering::Acquire))
    }

    /// Copy of the current stats, ordered by instruction creation.
    pub fn get_instr_stats(&self) -> Vec<InstructionStats> {
        let mut out: Vec<InstructionStats> = self.stats.iter().map(|entry| entry.value().clone()).collect();
        out.sort_by_key(|s| s.instr_id);
        out
    }

    /// Human-readable table, slowest instructions first.
    pub fn report(&self) -> String {
        let mut stats = self.get_instr_stats();
        stats.sort_by(|a, b| b.time_total.cmp(&a.time_total).then(a.instr_id.cmp(&b.instr_id)));
        let total = self.get_t_total().as_secs_f64();

        let mut out = String::new();
        let _ = writeln!(out, "{:>8} {:>12} {:>7}  instruction", "count", "time (s)", "frac");
        for s in &stats {
            let secs = s.time_total.as_secs_f64();
            let frac = if total > 0.0 { secs / total } else { 0.0 };
            let _ = writeln!(
                out,
                "{:>8} {:>12.6} {:>6.1}%  {} [{}]",
                s.count,
                secs,
                frac * 100.0,
                s.instr_repr,
                s.provenance
            );
        }
        let _ = write!(out, "total instrumented time: {:.6}s", total);
        out
    }

    pub fn print_stats(&self) {
        info!(target: "graphexec::profile", "\n{}", self.report());
    }

    pub fn stats_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.get_instr_stats())?)
    }
}

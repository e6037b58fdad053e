//! Converts raw cumulative counters into per-window rates and orders the result.
//!
//! The rate functions are pure: the cross-cycle state they need (previous
//! counters) lives in [`PrevTotals`], owned by the controller and replaced
//! wholesale every sampling cycle.

use std::collections::HashMap;

/// One process at one sampling instant, rates already derived.
#[derive(Debug, Clone)]
pub struct ProcessSample {
    pub pid: i32,
    pub name: String,
    /// utime + stime in jiffies, cumulative since process start.
    pub total_ticks: u64,
    pub rss_kb: u64,
    pub cpu_percent: f64,
    pub mem_mb: f64,
}

/// Previous cycle's counters. Replaced, never merged: pids that vanished are
/// dropped and new pids simply have no entry (first-sample skew).
#[derive(Debug, Default)]
pub struct PrevTotals {
    pub total_ticks: u64,
    pub proc_ticks: HashMap<i32, u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKey {
    Cpu,
    Mem,
}

impl SortKey {
    pub fn toggle(self) -> Self {
        match self {
            Self::Cpu => Self::Mem,
            Self::Mem => Self::Cpu,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::Mem => "MEM",
        }
    }
}

/// CPU share of the sampling window, in percent.
///
/// A non-positive system delta (counter reset, stalled clock) is substituted
/// with 1 so the rate stays defined. A process counter that went backwards
/// means the pid was reused by a younger process; that clamps to 0, never
/// negative. No upper clamp: multi-core totals can exceed 100.
pub fn cpu_percent(cur_ticks: u64, prev_ticks: u64, cur_total: u64, prev_total: u64) -> f64 {
    let total_delta = if cur_total > prev_total {
        cur_total - prev_total
    } else {
        1
    };
    let proc_delta = cur_ticks.saturating_sub(prev_ticks);
    100.0 * proc_delta as f64 / total_delta as f64
}

pub fn mem_mb(rss_kb: u64) -> f64 {
    rss_kb as f64 / 1024.0
}

/// Descending order on the active key. Ties break on ascending pid so a given
/// snapshot always ranks the same way.
pub fn rank(samples: &mut [ProcessSample], key: SortKey) {
    match key {
        SortKey::Cpu => samples.sort_by(|a, b| {
            b.cpu_percent
                .total_cmp(&a.cpu_percent)
                .then_with(|| a.pid.cmp(&b.pid))
        }),
        SortKey::Mem => samples.sort_by(|a, b| {
            b.mem_mb
                .total_cmp(&a.mem_mb)
                .then_with(|| a.pid.cmp(&b.pid))
        }),
    }
}

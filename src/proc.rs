//! Raw cumulative counters from the /proc filesystem.
//!
//! The proc root is injectable so the reader can be pointed at a synthetic
//! tree in tests. Per-process reads return `None` on any failure: a process
//! that exits between enumeration and read is simply absent from that cycle.

use std::fs;
use std::io;
use std::path::PathBuf;

/// Raw counters for one live process.
#[derive(Debug, Clone)]
pub struct RawCounters {
    pub name: String,
    /// utime + stime in jiffies.
    pub total_ticks: u64,
    pub rss_kb: u64,
}

/// Source of system-wide and per-process cumulative counters.
pub trait CounterSource {
    /// Monotonic aggregate busy-time counter across all cores.
    fn total_ticks(&self) -> io::Result<u64>;

    /// Currently-live process identifiers.
    fn pids(&self) -> io::Result<Vec<i32>>;

    /// Counters for one pid, `None` on any read failure.
    fn process(&self, pid: i32) -> Option<RawCounters>;
}

/// `/proc`-backed counter source.
pub struct ProcSource {
    root: PathBuf,
}

impl ProcSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CounterSource for ProcSource {
    fn total_ticks(&self) -> io::Result<u64> {
        let content = fs::read_to_string(self.root.join("stat"))?;
        parse_total_ticks(&content)
            .ok_or_else(|| io::Error::other("no aggregate cpu line in stat"))
    }

    fn pids(&self) -> io::Result<Vec<i32>> {
        let mut pids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) {
                pids.push(pid);
            }
        }
        Ok(pids)
    }

    fn process(&self, pid: i32) -> Option<RawCounters> {
        let dir = self.root.join(pid.to_string());
        let stat = fs::read_to_string(dir.join("stat")).ok()?;
        let (name, total_ticks) = parse_proc_stat(&stat)?;
        // VmRSS is absent for kernel threads; they still show, with 0 kB.
        let rss_kb = fs::read_to_string(dir.join("status"))
            .ok()
            .and_then(|s| parse_vm_rss_kb(&s))
            .unwrap_or(0);
        Some(RawCounters {
            name,
            total_ticks,
            rss_kb,
        })
    }
}

/// Sums every field of the first line of /proc/stat:
/// `cpu  3357 0 4313 1362393 ...`
fn parse_total_ticks(content: &str) -> Option<u64> {
    let line = content.lines().next()?;
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let mut sum: u64 = 0;
    let mut seen = false;
    for field in fields {
        sum = sum.saturating_add(field.parse::<u64>().ok()?);
        seen = true;
    }
    seen.then_some(sum)
}

/// Extracts the comm and utime+stime from one line of /proc/<pid>/stat.
///
/// The comm sits between the first `(` and the *last* `)` — it may itself
/// contain spaces and parentheses. utime and stime are the 12th and 13th
/// fields after the closing paren.
fn parse_proc_stat(content: &str) -> Option<(String, u64)> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    let name = content.get(open + 1..close)?.to_string();
    let rest = content.get(close + 1..)?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < 13 {
        return None;
    }
    let utime: u64 = fields[11].parse().ok()?;
    let stime: u64 = fields[12].parse().ok()?;
    Some((name, utime + stime))
}

/// Finds the `VmRSS:` line of /proc/<pid>/status. Value is in kB.
fn parse_vm_rss_kb(content: &str) -> Option<u64> {
    content
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
}

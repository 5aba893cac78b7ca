//! Deadline-bounded subprocess execution.
//!
//! Every external program the engine touches (compiler, simulator) is
//! funneled through [`run_limited`], which owns the wall-clock deadline,
//! the combined-output capture, and peak-memory accounting. Exceeding the
//! deadline is reported as a distinct outcome, not as a process failure.

use crate::prelude::*;
use std::fs::File;
use std::process::{Command, Stdio};
use std::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Captured output is clipped near 32 KiB so a chatty simulator cannot blow
/// up the verdict message.
const OUTPUT_CAP: usize = 32 * 1024;
/// Name of the combined-output capture file inside the scratch directory.
const CAPTURE_FILE: &str = "run.out";

/// Observed outcome of one finished (or killed) subprocess.
#[derive(Debug)]
pub struct FinishedRun {
    success: bool,
    timed_out: bool,
    wall_time: Duration,
    peak_rss_kb: u64,
    output: String,
}

impl FinishedRun {
    /// True when the process exited non-zero or was killed at the deadline.
    pub fn is_failed(&self) -> bool {
        self.timed_out || !self.success
    }

    /// True when the deadline elapsed before the process exited.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn wall_time_usage(&self) -> Duration {
        self.wall_time
    }

    /// Peak resident set size observed while the process ran, in KB.
    /// Zero when `/proc` is unavailable or the process was too short-lived
    /// to sample.
    pub fn peak_memory_kb(&self) -> u64 {
        self.peak_rss_kb
    }

    /// Combined stdout and stderr, lossily decoded and clipped.
    pub fn output(&self) -> &str {
        &self.output
    }
}

/// Run `program` with `args` in `dir`, killing it once `wall_limit`
/// elapses. Stdin is null; stdout and stderr share one capture file in
/// `dir` so a blocked pipe can never wedge the child.
pub async fn run_limited(
    program: &str,
    args: &[&str],
    dir: &Path,
    wall_limit: Duration,
) -> Result<FinishedRun> {
    let capture_path = dir.join(CAPTURE_FILE);
    let capture = File::create(&capture_path)?;
    let capture_err = capture.try_clone()?;

    let mut child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(capture))
        .stderr(Stdio::from(capture_err))
        .spawn()?;

    let start = Instant::now();
    let mut peak_rss_kb = 0u64;
    let mut timed_out = false;

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if let Some(rss) = proc_peak_rss_kb(child.id()) {
            peak_rss_kb = peak_rss_kb.max(rss);
        }
        if start.elapsed() >= wall_limit {
            timed_out = true;
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        async_std::task::sleep(POLL_INTERVAL).await;
    };
    let wall_time = start.elapsed();

    let output = read_capped(&capture_path);
    let _ = std::fs::remove_file(&capture_path);

    Ok(FinishedRun {
        success: status.map_or(false, |s| s.success()),
        timed_out,
        wall_time,
        peak_rss_kb,
        output,
    })
}

/// `VmHWM` from `/proc/<pid>/status`, the kernel's high-water mark for the
/// resident set, in KB.
fn proc_peak_rss_kb(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    let line = status.lines().find(|l| l.starts_with("VmHWM:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

fn read_capped(path: &Path) -> String {
    let raw = std::fs::read(path).unwrap_or_default();
    let mut text = String::from_utf8_lossy(&raw).into_owned();
    if text.len() > OUTPUT_CAP {
        let mut cut = OUTPUT_CAP;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

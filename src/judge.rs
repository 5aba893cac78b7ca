//! The judge engine: one request in, one verdict out.
//!
//! Grading failures are verdicts, not errors. The engine only surfaces an
//! [`Error`] when no meaningful [`JudgeResult`] can be constructed at all,
//! so the worker loop can always attempt to publish whatever comes back.

use crate::config::Config;
use crate::data::{JudgeRequest, JudgeResult, Status, TestCase};
use crate::prelude::*;
use crate::run::run_limited;
use crate::vcd;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const DESIGN_FILE: &str = "design.v";
const TESTBENCH_FILE: &str = "testbench.v";
const SIM_BINARY: &str = "simulation";
/// Dump name produced by the conventional `$dumpfile("output.vcd")`
/// testbench preamble; other names are accepted too.
const DEFAULT_DUMP: &str = "output.vcd";

pub struct Judge {
    work_dir: PathBuf,
    compiler: String,
    simulator: String,
    compile_timeout: Duration,
}

/// Outcome of one test case, aggregated by [`Judge::judge`].
struct CaseOutcome {
    status: Status,
    error_message: String,
    run_time_ms: u64,
    memory_kb: u64,
}

impl Judge {
    pub fn new(cfg: &Config) -> Self {
        Self {
            work_dir: cfg.work_dir.clone(),
            compiler: cfg.compiler.clone(),
            simulator: cfg.simulator.clone(),
            compile_timeout: cfg.compile_timeout,
        }
    }

    /// Judge one request. The verdict carries the stamp of the moment it
    /// was produced. `stop` is the external cancellation signal; once set,
    /// the in-flight request aborts as `system_error` with no partial
    /// score.
    pub async fn judge(&self, request: &JudgeRequest, stop: &AtomicBool) -> Result<JudgeResult> {
        let mut result = self.evaluate(request, stop).await;
        result.judged_at = Utc::now();
        Ok(result)
    }

    async fn evaluate(&self, request: &JudgeRequest, stop: &AtomicBool) -> JudgeResult {
        let mut result = JudgeResult::skeleton(request);

        if request.test_cases.is_empty() {
            result.status = Status::SystemError;
            result.error_message = "no test cases provided".into();
            return result;
        }
        if request.time_limit == 0 {
            result.status = Status::SystemError;
            result.error_message = "time limit must be positive".into();
            return result;
        }

        let scratch = match Scratch::create(&self.work_dir, &request.submission_id) {
            Ok(s) => s,
            Err(e) => {
                result.status = Status::SystemError;
                result.error_message = format!("failed to create scratch directory: {}", e);
                return result;
            }
        };
        debug!("judging {} in {}", request.submission_id, scratch.path().display());

        // Compile gate: a first-pass failure against the first testbench is
        // fatal for the whole submission; no test case runs.
        match self
            .compile(scratch.path(), &request.code, &request.test_cases[0].testbench)
            .await
        {
            Ok(None) => {}
            Ok(Some(message)) => {
                result.status = Status::CompileError;
                result.error_message = message;
                return result;
            }
            Err(e) => {
                result.status = Status::SystemError;
                result.error_message = format!("compiler could not be invoked: {}", e);
                return result;
            }
        }

        let time_limit = Duration::from_millis(request.time_limit);
        let mut passed = 0u32;
        let mut total_time_ms = 0u64;
        let mut max_memory_kb = 0u64;
        // First failure wins; later failures never overwrite the latch.
        let mut first_failure: Option<(Status, String)> = None;

        for (index, case) in request.test_cases.iter().enumerate() {
            if stop.load(Ordering::Relaxed) {
                result.status = Status::SystemError;
                result.error_message = "judge timeout".into();
                return result;
            }

            let outcome = match self
                .run_case(scratch.path(), &request.code, case, time_limit)
                .await
            {
                Ok(o) => o,
                Err(e) => {
                    result.status = Status::SystemError;
                    result.error_message = format!("test case {} failed: {}", index + 1, e);
                    return result;
                }
            };

            total_time_ms += outcome.run_time_ms;
            max_memory_kb = max_memory_kb.max(outcome.memory_kb);
            if outcome.status == Status::Accepted {
                passed += 1;
            } else if first_failure.is_none() {
                first_failure = Some((outcome.status, outcome.error_message));
            }
        }

        result.passed_tests = passed;
        result.run_time = total_time_ms;
        result.memory = max_memory_kb;
        result.score = score(passed, result.total_tests);
        if passed == result.total_tests {
            // Full success always wins over any latched bookkeeping state.
            result.status = Status::Accepted;
            result.error_message.clear();
        } else if let Some((status, message)) = first_failure {
            result.status = status;
            result.error_message = message;
        }
        result
    }

    /// Compile the design together with one testbench. `Ok(None)` on
    /// success, `Ok(Some(message))` on a compilation failure; `Err` is
    /// reserved for not being able to invoke the compiler at all.
    async fn compile(
        &self,
        dir: &Path,
        design: &str,
        testbench: &str,
    ) -> Result<Option<String>> {
        std::fs::write(dir.join(DESIGN_FILE), design)?;
        std::fs::write(dir.join(TESTBENCH_FILE), testbench)?;

        let run = run_limited(
            &self.compiler,
            &["-o", SIM_BINARY, DESIGN_FILE, TESTBENCH_FILE],
            dir,
            self.compile_timeout,
        )
        .await?;
        if run.is_failed() {
            return Ok(Some(format!("compilation failed: {}", run.output())));
        }
        Ok(None)
    }

    /// Compile and simulate one test case. Compilation is testbench-specific
    /// because the testbench is the simulation entry point.
    async fn run_case(
        &self,
        dir: &Path,
        design: &str,
        case: &TestCase,
        time_limit: Duration,
    ) -> Result<CaseOutcome> {
        if let Some(message) = self.compile(dir, design, &case.testbench).await? {
            return Ok(CaseOutcome {
                status: Status::CompileError,
                error_message: message,
                run_time_ms: 0,
                memory_kb: 0,
            });
        }

        // A dump left over from the previous case must not satisfy this one.
        remove_stale_dumps(dir)?;

        let run = run_limited(&self.simulator, &[SIM_BINARY], dir, time_limit).await?;
        let mut outcome = CaseOutcome {
            status: Status::Accepted,
            error_message: String::new(),
            run_time_ms: run.wall_time_usage().as_millis() as u64,
            memory_kb: run.peak_memory_kb(),
        };

        if run.timed_out() {
            outcome.status = Status::TimeLimitExceeded;
            return Ok(outcome);
        }
        if run.is_failed() {
            outcome.status = Status::RuntimeError;
            outcome.error_message = format!("simulation failed: {}", run.output());
            return Ok(outcome);
        }

        let dump = match find_dump(dir)? {
            Some(path) => std::fs::read_to_string(path)?,
            None => {
                outcome.status = Status::RuntimeError;
                outcome.error_message = "VCD file not generated".into();
                return Ok(outcome);
            }
        };

        if !vcd::matches_expectation(&dump, &case.expected_vcd) {
            outcome.status = Status::WrongAnswer;
            outcome.error_message = "VCD output does not match expected results".into();
        }
        Ok(outcome)
    }
}

/// `floor(100 * passed / total)`. Callers guard `total > 0`.
pub fn score(passed: u32, total: u32) -> u32 {
    passed * 100 / total
}

fn scratch_name(submission_id: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("judge_{}_{}", submission_id, nanos)
}

fn is_dump(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "vcd")
}

fn remove_stale_dumps(dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if is_dump(&path) {
            std::fs::remove_file(path)?;
        }
    }
    Ok(())
}

/// The waveform dump produced by the simulation, if any. `output.vcd` is
/// preferred when a testbench dumps more than one trace.
fn find_dump(dir: &Path) -> Result<Option<PathBuf>> {
    let default = dir.join(DEFAULT_DUMP);
    if default.exists() {
        return Ok(Some(default));
    }
    let mut dumps: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| is_dump(p))
        .collect();
    dumps.sort();
    Ok(dumps.into_iter().next())
}

/// A per-job scratch directory, removed on every exit path when dropped.
struct Scratch {
    path: PathBuf,
}

impl Scratch {
    fn create(work_dir: &Path, submission_id: &str) -> Result<Self> {
        let path = work_dir.join(scratch_name(submission_id));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            error!(
                "failed to remove scratch directory {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn score_is_floored_integer_percentage() {
        for total in 1u32..=20 {
            for passed in 0..=total {
                assert_eq!(score(passed, total), passed * 100 / total);
            }
        }
        assert_eq!(score(1, 3), 33);
        assert_eq!(score(2, 3), 66);
        assert_eq!(score(3, 3), 100);
        assert_eq!(score(0, 7), 0);
    }

    #[test]
    fn scratch_names_do_not_collide_across_jobs() {
        let mut seen = HashSet::new();
        for i in 0..1000 {
            let id = format!("sub-{}", i);
            assert!(seen.insert(scratch_name(&id)), "collision for {}", id);
        }
        // Retries of the same id rely on the high-resolution timestamp.
        let a = scratch_name("same");
        let b = scratch_name("same");
        assert_ne!(a, b);
    }

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let work = tempfile::tempdir().unwrap();
        let path = {
            let scratch = Scratch::create(work.path(), "drop-test").unwrap();
            assert!(scratch.path().is_dir());
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn dump_discovery_prefers_the_conventional_name() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_dump(dir.path()).unwrap(), None);
        std::fs::write(dir.path().join("alt.vcd"), "x").unwrap();
        assert_eq!(
            find_dump(dir.path()).unwrap(),
            Some(dir.path().join("alt.vcd"))
        );
        std::fs::write(dir.path().join("output.vcd"), "x").unwrap();
        assert_eq!(
            find_dump(dir.path()).unwrap(),
            Some(dir.path().join("output.vcd"))
        );
        remove_stale_dumps(dir.path()).unwrap();
        assert_eq!(find_dump(dir.path()).unwrap(), None);
    }
}

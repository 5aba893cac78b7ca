//! Wire types shared between the enqueuer and the worker.
//!
//! Requests travel as JSON on the request list; verdicts travel as JSON on
//! the per-submission result channel. Both are immutable once serialized.

use crate::prelude::*;
use chrono::{DateTime, Utc};

/// Terminal verdict classification for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Initial state before judging; never produced by the engine.
    Pending,
    SystemError,
    CompileError,
    TimeLimitExceeded,
    RuntimeError,
    WrongAnswer,
    Accepted,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::SystemError => "system_error",
            Status::CompileError => "compile_error",
            Status::TimeLimitExceeded => "time_limit_exceeded",
            Status::RuntimeError => "runtime_error",
            Status::WrongAnswer => "wrong_answer",
            Status::Accepted => "accepted",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One test unit: a hidden testbench driving the submitted design, plus the
/// expectation its waveform dump must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// Testbench source; the simulation entry point for this case.
    pub testbench: String,
    /// Expectation for the produced dump: a `{`-prefixed signal-value spec,
    /// or a regular expression.
    pub expected_vcd: String,
    /// Free text shown to problem authors, not used for grading.
    #[serde(default)]
    pub description: String,
    /// Simulation time units; advisory, the wall-clock limit governs.
    #[serde(default)]
    pub sim_time: u64,
}

/// One judging job, created by the enqueuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeRequest {
    /// Correlation key for the result channel; unique per job.
    pub submission_id: String,
    /// The learner's design source.
    pub code: String,
    /// Source dialect tag.
    pub language: String,
    /// Wall-clock budget per test case, in milliseconds.
    pub time_limit: u64,
    /// Declared memory budget in MB; advisory.
    #[serde(default)]
    pub memory_limit: u64,
    pub test_cases: Vec<TestCase>,
}

/// The verdict for a whole request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeResult {
    pub submission_id: String,
    pub status: Status,
    /// `floor(100 * passed_tests / total_tests)`.
    pub score: u32,
    /// Summed wall-clock milliseconds across executed test cases.
    pub run_time: u64,
    /// Peak resident memory across test cases, in KB.
    pub memory: u64,
    /// Detail for the first non-passing test case; empty on full success.
    pub error_message: String,
    pub passed_tests: u32,
    pub total_tests: u32,
    pub judged_at: DateTime<Utc>,
}

impl JudgeResult {
    /// A result skeleton echoing the request's identity, in the `pending`
    /// state the engine always overwrites.
    pub fn skeleton(request: &JudgeRequest) -> Self {
        Self {
            submission_id: request.submission_id.clone(),
            status: Status::Pending,
            score: 0,
            run_time: 0,
            memory: 0,
            error_message: String::new(),
            passed_tests: 0,
            total_tests: request.test_cases.len() as u32,
            judged_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_snake_case_on_the_wire() {
        let s = serde_json::to_string(&Status::TimeLimitExceeded).unwrap();
        assert_eq!(s, "\"time_limit_exceeded\"");
        let s: Status = serde_json::from_str("\"wrong_answer\"").unwrap();
        assert_eq!(s, Status::WrongAnswer);
        assert_eq!(Status::Accepted.to_string(), "accepted");
    }

    #[test]
    fn request_parses_documented_wire_format() {
        let raw = r#"{
            "submission_id": "sub-1",
            "code": "module adder; endmodule",
            "language": "verilog",
            "time_limit": 1000,
            "memory_limit": 128,
            "test_cases": [
                {"testbench": "module tb; endmodule",
                 "expected_vcd": "b101",
                 "description": "adds",
                 "sim_time": 100}
            ]
        }"#;
        let req: JudgeRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.submission_id, "sub-1");
        assert_eq!(req.time_limit, 1000);
        assert_eq!(req.test_cases.len(), 1);
        assert_eq!(req.test_cases[0].expected_vcd, "b101");
    }

    #[test]
    fn testcase_description_and_sim_time_are_optional() {
        let raw = r#"{"testbench": "module tb; endmodule", "expected_vcd": "x"}"#;
        let tc: TestCase = serde_json::from_str(raw).unwrap();
        assert!(tc.description.is_empty());
        assert_eq!(tc.sim_time, 0);
    }

    #[test]
    fn result_round_trips_with_rfc3339_stamp() {
        let req: JudgeRequest = serde_json::from_str(
            r#"{"submission_id": "s", "code": "", "language": "verilog",
                "time_limit": 100, "test_cases": []}"#,
        )
        .unwrap();
        let res = JudgeResult::skeleton(&req);
        let raw = serde_json::to_string(&res).unwrap();
        assert!(raw.contains("\"status\":\"pending\""));
        let back: JudgeResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.submission_id, "s");
        assert_eq!(back.judged_at, res.judged_at);
    }
}

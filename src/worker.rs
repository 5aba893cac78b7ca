//! The long-running worker loop: pop, judge, publish.
//!
//! One worker judges one job at a time; horizontal scaling is more worker
//! processes popping from the same list. Delivery is at-most-once: nothing
//! here retries a judging attempt or re-queues a verdict, failures are
//! logged and the loop moves on.

use crate::data::JudgeRequest;
use crate::judge::Judge;
use crate::prelude::*;
use crate::queue::Broker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Backoff after a failed pop, so a down broker does not spin the loop hot.
const POP_RETRY_DELAY: Duration = Duration::from_secs(2);

pub struct Worker<B: Broker> {
    judge: Judge,
    broker: B,
    stop: Arc<AtomicBool>,
    /// Judge but never publish; for rehearsing a worker against live jobs.
    dry: bool,
}

impl<B: Broker> Worker<B> {
    pub fn new(judge: Judge, broker: B, stop: Arc<AtomicBool>, dry: bool) -> Self {
        Self {
            judge,
            broker,
            stop,
            dry,
        }
    }

    /// Run until the stop flag is observed. The flag is checked between
    /// jobs, never mid-job: an in-flight judgement finishes (or is aborted
    /// by the engine's own cancellation check) before the loop exits.
    pub async fn run(mut self) {
        info!("judge worker running");
        while !self.stop.load(Ordering::Relaxed) {
            let request = match self.broker.pop().await {
                Err(e) => {
                    error!("failed to pop from queue: {}", e);
                    async_std::task::sleep(POP_RETRY_DELAY).await;
                    continue;
                }
                Ok(None) => continue,
                Ok(Some(request)) => request,
            };

            self.process(request).await;
        }
        info!("judge worker stopped");
    }

    async fn process(&mut self, request: JudgeRequest) {
        info!("processing submission {}", request.submission_id);

        let result = match self.judge.judge(&request, &self.stop).await {
            Err(e) => {
                // The consumer gets no verdict at all for this job; it must
                // treat the missing message as inconclusive.
                error!("judge failed for submission {}: {}", request.submission_id, e);
                return;
            }
            Ok(result) => result,
        };

        if self.dry {
            info!(
                "dry run, not publishing submission {}: status={} score={}",
                result.submission_id, result.status, result.score
            );
            return;
        }

        if let Err(e) = self.broker.publish_result(&result).await {
            error!(
                "failed to publish result for submission {}: {}",
                result.submission_id, e
            );
            return;
        }

        info!(
            "completed submission {}: status={} score={} passed={}/{}",
            result.submission_id,
            result.status,
            result.score,
            result.passed_tests,
            result.total_tests
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, QueueConfig};
    use crate::data::{JudgeResult, Status};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory broker: a queue of canned requests and a shared log of
    /// published verdicts. Sets the stop flag once drained so the loop
    /// terminates.
    struct MockBroker {
        requests: VecDeque<JudgeRequest>,
        published: Arc<Mutex<Vec<JudgeResult>>>,
        stop: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl Broker for MockBroker {
        async fn pop(&mut self) -> Result<Option<JudgeRequest>> {
            match self.requests.pop_front() {
                Some(r) => Ok(Some(r)),
                None => {
                    self.stop.store(true, Ordering::Relaxed);
                    Ok(None)
                }
            }
        }

        async fn publish_result(&mut self, result: &JudgeResult) -> Result<()> {
            self.published.lock().unwrap().push(result.clone());
            Ok(())
        }

        async fn health(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn test_config(work_dir: &Path) -> Config {
        Config {
            work_dir: work_dir.to_path_buf(),
            compiler: "iverilog".into(),
            simulator: "vvp".into(),
            compile_timeout: Duration::from_secs(5),
            queue: QueueConfig {
                host: "localhost".into(),
                port: 6379,
                password: String::new(),
                db: 0,
                queue_name: "judge_queue".into(),
            },
        }
    }

    fn empty_request(id: &str) -> JudgeRequest {
        JudgeRequest {
            submission_id: id.into(),
            code: String::new(),
            language: "verilog".into(),
            time_limit: 1000,
            memory_limit: 128,
            test_cases: Vec::new(),
        }
    }

    #[async_std::test]
    async fn publishes_a_verdict_for_each_popped_job() {
        let work = tempfile::tempdir().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let published = Arc::new(Mutex::new(Vec::new()));
        let broker = MockBroker {
            requests: VecDeque::from([empty_request("w-1"), empty_request("w-2")]),
            published: Arc::clone(&published),
            stop: Arc::clone(&stop),
        };
        let judge = Judge::new(&test_config(work.path()));

        Worker::new(judge, broker, stop, false).run().await;

        let published = published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].submission_id, "w-1");
        assert_eq!(published[1].submission_id, "w-2");
        // A request with no test cases never spawns a subprocess and comes
        // back as a system error.
        assert_eq!(published[0].status, Status::SystemError);
        assert_eq!(published[0].total_tests, 0);
    }

    #[async_std::test]
    async fn dry_mode_judges_but_never_publishes() {
        let work = tempfile::tempdir().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let published = Arc::new(Mutex::new(Vec::new()));
        let broker = MockBroker {
            requests: VecDeque::from([empty_request("w-dry")]),
            published: Arc::clone(&published),
            stop: Arc::clone(&stop),
        };
        let judge = Judge::new(&test_config(work.path()));

        Worker::new(judge, broker, stop, true).run().await;

        assert!(published.lock().unwrap().is_empty());
    }

    #[async_std::test]
    async fn stop_flag_ends_the_loop_without_popping() {
        let work = tempfile::tempdir().unwrap();
        let stop = Arc::new(AtomicBool::new(true));
        let published = Arc::new(Mutex::new(Vec::new()));
        let broker = MockBroker {
            requests: VecDeque::from([empty_request("w-late")]),
            published: Arc::clone(&published),
            stop: Arc::clone(&stop),
        };
        let judge = Judge::new(&test_config(work.path()));

        Worker::new(judge, broker, stop, false).run().await;

        assert!(published.lock().unwrap().is_empty());
    }
}

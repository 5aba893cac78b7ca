//! Worker configuration, resolved from the environment at process start.
//!
//! Every knob has a sane default, so a bare `verilog-judge` next to a local
//! Redis judges with the stock Icarus Verilog toolchain. A `.env` file is
//! honored if present. Nothing is re-read after startup.

use crate::prelude::*;

/// Connection settings for the shared queue broker.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,
    /// Name of the FIFO request list all workers pop from.
    pub queue_name: String,
}

impl QueueConfig {
    /// Connection URL understood by the redis client.
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.db
            )
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Parent directory for per-job scratch directories and the log file.
    pub work_dir: PathBuf,
    /// Verilog compiler executable, resolved on `PATH`.
    pub compiler: String,
    /// Simulation runtime executable, resolved on `PATH`.
    pub simulator: String,
    /// Wall-clock budget for one compiler invocation. Submissions do not
    /// control this; it only guards against a pathological compiler hang.
    pub compile_timeout: Duration,
    pub queue: QueueConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            work_dir: env_or("JUDGE_WORK_DIR", "/tmp/judge").into(),
            compiler: env_or("JUDGE_COMPILER", "iverilog"),
            simulator: env_or("JUDGE_SIMULATOR", "vvp"),
            compile_timeout: Duration::from_millis(env_parse(
                "JUDGE_COMPILE_TIMEOUT_MS",
                15_000,
            )),
            queue: QueueConfig {
                host: env_or("QUEUE_HOST", "localhost"),
                port: env_parse("QUEUE_PORT", 6379),
                password: env_or("QUEUE_PASSWORD", ""),
                db: env_parse("QUEUE_DB", 0),
                queue_name: env_or("QUEUE_NAME", "judge_queue"),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_owned(),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_without_password() {
        let q = QueueConfig {
            host: "localhost".into(),
            port: 6379,
            password: String::new(),
            db: 0,
            queue_name: "judge_queue".into(),
        };
        assert_eq!(q.url(), "redis://localhost:6379/0");
    }

    #[test]
    fn url_with_password_and_db() {
        let q = QueueConfig {
            host: "broker".into(),
            port: 6380,
            password: "hunter2".into(),
            db: 3,
            queue_name: "judge_queue".into(),
        };
        assert_eq!(q.url(), "redis://:hunter2@broker:6380/3");
    }

    #[test]
    fn env_fallbacks() {
        assert_eq!(env_or("VERILOG_JUDGE_TEST_UNSET_VAR", "fallback"), "fallback");
        assert_eq!(env_parse("VERILOG_JUDGE_TEST_UNSET_VAR", 42u16), 42);
    }

    #[test]
    fn defaults_are_usable() {
        let cfg = Config::from_env();
        assert!(!cfg.compiler.is_empty());
        assert!(!cfg.simulator.is_empty());
        assert!(cfg.compile_timeout > Duration::ZERO);
        assert!(!cfg.queue.queue_name.is_empty());
    }
}

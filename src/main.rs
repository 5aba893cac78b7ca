use clap::Parser;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Config as LogConfig, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use verilog_judge::config::Config;
use verilog_judge::judge::Judge;
use verilog_judge::prelude::*;
use verilog_judge::queue::{Broker, RedisQueue};
use verilog_judge::worker::Worker;

/// Bounded grace period for an in-flight job after a stop signal.
const GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct LogLevel(log::LevelFilter);

impl std::str::FromStr for LogLevel {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "error" | "Error" => Self(log::LevelFilter::Error),
            "warn" | "Warn" => Self(log::LevelFilter::Warn),
            "info" | "Info" => Self(log::LevelFilter::Info),
            "debug" | "Debug" => Self(log::LevelFilter::Debug),
            "trace" | "Trace" => Self(log::LevelFilter::Trace),
            _ => return Err(Error::BadLogLevel(s.to_string())),
        })
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        l.0
    }
}

#[derive(Debug, Parser)]
#[clap(about = "Judge worker for the Verilog online judge")]
struct Cli {
    /// Parent directory for scratch space and the log file.
    #[clap(long)]
    work_dir: Option<PathBuf>,
    /// Name of the request queue to pop from.
    #[clap(long)]
    queue: Option<String>,
    /// Log level.
    #[clap(long)]
    log_level: Option<LogLevel>,
    /// Dump the log onto stderr.
    #[clap(long)]
    stderr: bool,
    /// Judge jobs but don't publish verdicts.
    #[clap(long)]
    dry: bool,
}

fn init_logging(cli: &Cli, work_dir: &Path) {
    let log_level = cli
        .log_level
        .or_else(|| std::env::var("LOG_LEVEL").ok().and_then(|s| s.parse().ok()))
        .map_or(log::LevelFilter::Info, LogLevel::into);

    let stderr_level = if cli.stderr {
        log_level
    } else {
        // Dump errors to stderr even if it's not enabled for normal log.
        log::LevelFilter::Error
    };

    let console_fmt = "{h({d(%Y-%m-%d %H:%M:%S)(utc)} - {l}: {m}{n})}";
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(console_fmt)))
        .build();

    let text_fmt = "{d(%Y-%m-%d %H:%M:%S)(utc)} - {l}: {m}{n}";
    let log_path = work_dir.join("judge.log");
    let log_file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(text_fmt)))
        .build(&log_path)
        .unwrap_or_else(|e| panic!("cannot open log file {}: {}", log_path.display(), e));

    let config = LogConfig::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(stderr_level)))
                .build("stderr", Box::new(stderr)),
        )
        .appender(Appender::builder().build("file", Box::new(log_file)))
        .build(
            Root::builder()
                .appenders(["stderr", "file"])
                .build(log_level),
        )
        .expect("log config is statically valid");
    log4rs::init_config(config).expect("logging initialized once");
}

#[async_std::main]
async fn main() {
    let cli = Cli::parse();

    let mut cfg = Config::from_env();
    if let Some(dir) = cli.work_dir.clone() {
        cfg.work_dir = dir;
    }
    if let Some(queue) = cli.queue.clone() {
        cfg.queue.queue_name = queue;
    }

    // Without a usable work directory this program can't judge anything.
    if let Err(e) = std::fs::create_dir_all(&cfg.work_dir) {
        eprintln!("cannot create work dir {}: {}", cfg.work_dir.display(), e);
        exit(1);
    }

    init_logging(&cli, &cfg.work_dir);

    let stop = Arc::new(AtomicBool::new(false));
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(e) = signal_hook::flag::register(sig, Arc::clone(&stop)) {
            error!("signal handler is not registered: {}", e);
        }
    }

    let mut queue = match RedisQueue::connect(&cfg.queue).await {
        Ok(q) => q,
        Err(e) => {
            error!("cannot connect to queue broker: {}", e);
            exit(1);
        }
    };
    if let Err(e) = queue.health().await {
        error!("queue broker health check failed: {}", e);
        exit(1);
    }

    info!(
        "starting judge service: queue {}, work dir {}",
        cfg.queue.queue_name,
        cfg.work_dir.display()
    );

    let judge = Judge::new(&cfg);
    let worker = Worker::new(judge, queue, Arc::clone(&stop), cli.dry);
    let handle = async_std::task::spawn(worker.run());

    while !stop.load(Ordering::Relaxed) {
        async_std::task::sleep(Duration::from_millis(200)).await;
    }
    info!("shutting down judge service");

    if async_std::future::timeout(GRACE_PERIOD, handle).await.is_err() {
        warn!("worker did not stop within the grace period");
    }
    info!("judge service stopped");
}

use std::path::PathBuf;

use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Initialize logging. Writes daily-rotated files when a log directory is
/// given, stdout otherwise. The returned guard must be held for the
/// lifetime of the process.
pub fn init_log(log: Option<PathBuf>) -> tracing_appender::non_blocking::WorkerGuard {
    let subscriber_builder = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_file(true)
        .with_line_number(true)
        .with_thread_names(true);
    let (non_blocking, guard) = if let Some(log) = log {
        if !log.is_dir() {
            panic!("log path is not a directory");
        }
        let file_appender = tracing_appender::rolling::daily(log, "course_market.log");
        tracing_appender::non_blocking(file_appender)
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };
    tracing::subscriber::set_global_default(
        subscriber_builder.with_ansi(false).with_writer(non_blocking).finish(),
    )
    .expect("init log failed");
    guard
}

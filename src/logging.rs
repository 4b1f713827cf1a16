use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "KONG_LOG";

fn filter(default: &str) -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
}

/// Warnings only, on stderr, so command output stays clean.
pub fn init_cli() {
  tracing_subscriber::fmt()
    .with_env_filter(filter("kong=warn"))
    .with_writer(std::io::stderr)
    .without_time()
    .with_target(false)
    .init();
}

/// Stderr plus a daily rolling file under the user cache directory.
///
/// The returned guard flushes the file writer and must be held until exit.
pub fn init_daemon() -> Option<WorkerGuard> {
  let stderr = fmt::layer().with_writer(std::io::stderr);
  let registry = tracing_subscriber::registry()
    .with(filter("kong=info"))
    .with(stderr);

  match dirs::cache_dir().map(|dir| dir.join("kong")) {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "daemon.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      registry
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
      Some(guard)
    }
    None => {
      registry.init();
      None
    }
  }
}

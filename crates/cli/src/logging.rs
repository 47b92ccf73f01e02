use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn";

/// Keeps the non-blocking writer flushing until dropped.
pub struct LoggingHandle {
    pub guard: WorkerGuard,
}

/// `CHATMEND_LOG` > `RUST_LOG` > warn. Logs go to stderr unless `log_file`
/// is given; `CHATMEND_LOG_FORMAT=json` switches to flattened JSON events.
pub fn init_logging(log_file: Option<&Path>) -> anyhow::Result<LoggingHandle> {
    let filter = std::env::var("CHATMEND_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let (writer, guard, ansi) = match log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            std::fs::create_dir_all(dir)?;
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("log file path has no file name: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (writer, guard, false)
        }
        None => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            (writer, guard, console::colors_enabled_stderr())
        }
    };
    let format = std::env::var("CHATMEND_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_target(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(ansi)
                    .with_target(false),
            )
            .try_init()?;
    }

    tracing::debug!(
        component = "logging",
        event = "logging.initialized",
        format = %format,
        log_file = ?log_file,
    );

    Ok(LoggingHandle { guard })
}

//! Logging setup.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

use retrace_config::{LogFormat, LoggingConfig};

type BoxedLayer = Box<dyn tracing_subscriber::Layer<Registry> + Send + Sync>;

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Build the filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber.
///
/// Logs go to stderr and, when `config.file` is set, to that file as well.
/// Keep the returned guard alive until exit so buffered file output is
/// flushed.
pub fn setup_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let mut layers = vec![format_layer(config.format, std::io::stderr, true)];

    let guard = config.file.as_deref().map(|path| {
        let (writer, guard) = tracing_appender::non_blocking(file_appender(path));
        layers.push(format_layer(config.format, writer, false));
        guard
    });

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(&config.level))
        .init();

    guard
}

fn file_appender(path: &Path) -> tracing_appender::rolling::RollingFileAppender {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "retrace.log".into());
    tracing_appender::rolling::never(dir, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_parses_directives() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let filter = env_filter("retrace_backtest=debug,info");
        assert!(filter.to_string().contains("retrace_backtest=debug"));
    }
}

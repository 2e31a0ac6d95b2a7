//! Console logging for hubsrv
//!
//! Output format: `timestamp [LEVEL] component: message`, e.g.
//! `2025-12-02T00:50:44.809Z [INFO] tcp: Connected to Modbus TCP endpoint: 10.0.0.5:502`

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};

fn level_label(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "\x1b[35m",
        Level::DEBUG => "\x1b[34m",
        Level::INFO => "\x1b[32m",
        Level::WARN => "\x1b[33m",
        Level::ERROR => "\x1b[31m",
    }
}

/// Last path segment of an event target
///
/// `voltage_hub::coordinator` becomes `coordinator`, so hub, coordinator and
/// transport lines can be told apart without the crate prefix.
fn component(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

/// Event formatter writing `timestamp [LEVEL] component: message`
pub struct HubEventFormat;

impl<S, N> FormatEvent<S, N> for HubEventFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.3fZ"))?;

        let level = metadata.level();
        if writer.has_ansi_escapes() {
            write!(writer, "{}{}\x1b[0m ", level_color(level), level_label(level))?;
        } else {
            write!(writer, "{} ", level_label(level))?;
        }
        write!(writer, "{}: ", component(metadata.target()))?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Filter from `RUST_LOG` when set, otherwise `level` for hubsrv and the hub
/// library and `warn` for everything else
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level: Level = level
        .parse()
        .map_err(|_| anyhow!("Invalid log level '{}'", level))?;
    let directives = format!("warn,hubsrv={level},voltage_hub={level}").to_lowercase();
    EnvFilter::try_new(&directives).map_err(|e| anyhow!("Invalid log filter: {}", e))
}

/// Install the global subscriber
pub fn init_logging(level: &str, no_color: bool) -> Result<()> {
    let filter = build_filter(level)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(HubEventFormat)
                .with_ansi(!no_color),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_component_strips_crate_path() {
        assert_eq!(component("voltage_hub::coordinator"), "coordinator");
        assert_eq!(component("hubsrv::service"), "service");
        assert_eq!(component("hubsrv"), "hubsrv");
    }

    #[test]
    fn test_event_line_layout() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .event_format(HubEventFormat)
            .with_writer(captured.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "voltage_hub::coordinator", "Update failed");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.ends_with("[WARN] coordinator: Update failed\n"), "{output}");
        assert!(output.contains('T') && output.contains("Z "), "{output}");
    }

    #[test]
    fn test_build_filter_rejects_unknown_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        assert!(build_filter("debug").is_ok());
        assert!(build_filter("loud").is_err());
    }
}

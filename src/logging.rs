use crate::state::DiagnosticLog;
use anyhow::{Result, anyhow};
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup logging for the service.
///
/// Events go to two places:
/// - the console (stderr, through a non-blocking writer), filtered by
///   `console_filter` (an `EnvFilter` directive such as `"info"`)
/// - the service's [`DiagnosticLog`], through a [`DiagnosticLayer`]
///
/// # Returns
/// A guard that must be held for the duration of the program to keep console
/// output flowing
pub fn setup_logging(
    log: Arc<DiagnosticLog>,
    console_filter: &str,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());

    let env_filter = EnvFilter::try_new(console_filter)
        .map_err(|e| anyhow!("Invalid console log filter {:?}: {}", console_filter, e))?;

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(DiagnosticLayer::new(log))
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    tracing::info!("Logging initialized: console={}", console_filter);

    Ok(guard)
}

/// `tracing` layer that appends formatted events to a [`DiagnosticLog`].
///
/// DEBUG events are recorded only while the log's detail flag is set (driven by
/// the configuration's `detailLog`). TRACE events are never recorded.
#[derive(Debug, Clone)]
pub struct DiagnosticLayer {
    log: Arc<DiagnosticLog>,
}

impl DiagnosticLayer {
    pub fn new(log: Arc<DiagnosticLog>) -> Self {
        Self { log }
    }

    fn records(&self, level: &Level) -> bool {
        match *level {
            Level::TRACE => false,
            Level::DEBUG => self.log.detail_enabled(),
            _ => true,
        }
    }
}

impl<S: Subscriber> Layer<S> for DiagnosticLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if !self.records(meta.level()) || !self.log.is_available() {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = format_line(
            meta.level(),
            &chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            meta.target(),
            &visitor.message,
            &visitor.fields,
        );

        // Nowhere left to report a failing log sink.
        let _ = self.log.append(&line);
    }
}

/// `[ INFO] 2024-01-01 12:00:00.000 target: message key=value`
fn format_line(level: &Level, timestamp: &str, target: &str, message: &str, fields: &str) -> String {
    format!("[{:>5}] {} {}: {}{}\n", level.as_str(), timestamp, target, message, fields)
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

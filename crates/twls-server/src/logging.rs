//! Tracing setup: a rolling log file plus forwarding to the editor.
//!
//! [`LspLayer`] turns tracing events into `window/logMessage` notifications.
//! Only INFO and above reach the editor; everything passing `RUST_LOG`
//! (default `info`) lands in `twls.log` under the system temp directory.

use std::sync::Arc;

use tower_lsp_server::lsp_types::MessageType;
use tracing::field::Visit;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

pub const LOG_FILE_NAME: &str = "twls.log";

type SendMessage = dyn Fn(MessageType, String) + Send + Sync;

pub struct LspLayer {
    send_message: Arc<SendMessage>,
}

impl LspLayer {
    pub fn new<F>(send_message: F) -> Self
    where
        F: Fn(MessageType, String) + Send + Sync + 'static,
    {
        Self {
            send_message: Arc::new(send_message),
        }
    }
}

/// Collects the `message` field and renders the remaining fields as
/// `key=value` pairs after it.
#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> Option<String> {
        let message = self.message?;
        if self.fields.is_empty() {
            Some(message)
        } else {
            Some(format!("{message} {}", self.fields.join(" ")))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields.push(format!("{}={value:?}", field.name()));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(format!("{}={value}", field.name()));
        }
    }
}

fn message_type(level: Level) -> Option<MessageType> {
    match level {
        Level::ERROR => Some(MessageType::ERROR),
        Level::WARN => Some(MessageType::WARNING),
        Level::INFO => Some(MessageType::INFO),
        Level::DEBUG => Some(MessageType::LOG),
        Level::TRACE => None,
    }
}

impl<S> Layer<S> for LspLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let Some(message_type) = message_type(*event.metadata().level()) else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if let Some(message) = visitor.finish() {
            (self.send_message)(message_type, message);
        }
    }
}

/// Install the global subscriber. `default_filter` applies when `RUST_LOG`
/// is unset. Keep the returned guard alive for as long as file logging
/// should work.
pub fn init_tracing<F>(default_filter: &str, send_message: F) -> WorkerGuard
where
    F: Fn(MessageType, String) + Send + Sync + 'static,
{
    let file_appender = tracing_appender::rolling::daily(std::env::temp_dir(), LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_target(true)
        .with_line_number(true)
        .with_filter(env_filter);

    let lsp_layer = LspLayer::new(send_message).with_filter(LevelFilter::INFO);

    if Registry::default()
        .with(file_layer)
        .with(lsp_layer)
        .try_init()
        .is_err()
    {
        tracing::warn!("tracing subscriber already installed");
    }

    guard
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tracing::subscriber::with_default;

    use super::*;

    #[test]
    fn test_forwards_info_with_fields() {
        let sent: Arc<Mutex<Vec<(MessageType, String)>>> = Arc::default();
        let sink = Arc::clone(&sent);
        let layer = LspLayer::new(move |typ, msg| sink.lock().unwrap().push((typ, msg)));
        let subscriber = Registry::default().with(layer.with_filter(LevelFilter::INFO));

        with_default(subscriber, || {
            tracing::info!(projects = 2, "discovered projects");
            tracing::debug!("not forwarded");
        });

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, MessageType::INFO);
        assert_eq!(sent[0].1, "discovered projects projects=2");
    }

    #[test]
    fn test_trace_is_never_forwarded() {
        assert_eq!(message_type(Level::TRACE), None);
        assert_eq!(message_type(Level::ERROR), Some(MessageType::ERROR));
    }
}

use std::path::Path;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::audit::AUDIT_TARGET;

pub const ENGINE_LOG_FILE: &str = "fluency-engine.log";
pub const AUDIT_LOG_FILE: &str = "fluency-audit.log";

/// Flushes both log files on drop.
pub struct FileLogGuard {
    _engine: WorkerGuard,
    _audit: WorkerGuard,
}

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Stdout logging, plus daily-rolling files under `log_dir` when one is given. Keep
/// the returned guard alive for the life of the process.
pub fn init_tracing(log_level: &str, log_dir: Option<&Path>) -> Option<FileLogGuard> {
    let (subscriber, guard) = build_subscriber(log_level, log_dir);
    subscriber.init();
    guard
}

fn build_subscriber(
    log_level: &str,
    log_dir: Option<&Path>,
) -> (impl Subscriber + Send + Sync + 'static, Option<FileLogGuard>) {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true);

    let mut guard = None;
    let files = match log_dir {
        Some(dir) => match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let (layers, file_guard) = file_layers(dir);
                guard = Some(file_guard);
                Some(layers)
            }
            Err(err) => {
                eprintln!("failed to create log directory {}: {err}", dir.display());
                None
            }
        },
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(files);
    (subscriber, guard)
}

/// Audit records go to their own file; the engine file gets everything else.
fn file_layers<S>(log_dir: &Path) -> (Vec<BoxedLayer<S>>, FileLogGuard)
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let (engine_writer, engine_guard) =
        tracing_appender::non_blocking(RollingFileAppender::new(Rotation::DAILY, log_dir, ENGINE_LOG_FILE));
    let (audit_writer, audit_guard) =
        tracing_appender::non_blocking(RollingFileAppender::new(Rotation::DAILY, log_dir, AUDIT_LOG_FILE));

    let engine = fmt::layer()
        .with_writer(engine_writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter_fn(|meta| meta.target() != AUDIT_TARGET))
        .boxed();
    let audit = fmt::layer()
        .with_writer(audit_writer)
        .with_ansi(false)
        .with_target(false)
        .with_filter(filter_fn(|meta| meta.target() == AUDIT_TARGET))
        .boxed();

    (
        vec![engine, audit],
        FileLogGuard {
            _engine: engine_guard,
            _audit: audit_guard,
        },
    )
}

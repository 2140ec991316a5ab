//! Tracing subscriber and Prometheus recorder setup.

use std::{io, path::Path, sync::OnceLock, thread, time::Duration};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;
use tracing_subscriber::{
    filter::{EnvFilter, filter_fn},
    fmt,
    layer::SubscriberExt,
    prelude::*,
};

use crate::control::config::TelemetryOptions;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static PROM_UPKEEP_THREAD: OnceLock<thread::JoinHandle<()>> = OnceLock::new();

/// Keeps the chrome trace writer alive; dropping it flushes the file.
pub struct TelemetryGuard {
    _chrome_guard: Option<tracing_chrome::FlushGuard>,
}

/// Install the global tracing subscriber. A second call leaves the first
/// subscriber in place.
pub fn install_tracing(opts: &TelemetryOptions) -> TelemetryGuard {
    let default_level = if opts.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (chrome_layer, chrome_guard) = match opts.chrome_trace_path.as_deref() {
        Some(path) => match build_chrome_layer(path) {
            Ok((layer, guard)) => (Some(layer), Some(guard)),
            Err(err) => {
                eprintln!(
                    "failed to initialise chrome trace writer at {}: {err}",
                    path.display()
                );
                (None, None)
            }
        },
        None => (None, None),
    };

    let span_only_filter = filter_fn(|metadata| metadata.is_span());
    let installed = tracing_subscriber::registry()
        .with(chrome_layer.map(|layer| layer.with_filter(span_only_filter)))
        .with(
            fmt::layer()
                .with_target(false)
                .with_timer(fmt::time::uptime())
                .with_filter(env_filter),
        )
        .with(tracing_error::ErrorLayer::default())
        .try_init();
    if installed.is_err() {
        warn!("tracing subscriber already installed; keeping the existing one");
    }

    TelemetryGuard {
        _chrome_guard: chrome_guard,
    }
}

/// Ensure the global metrics recorder is installed and return the Prometheus handle.
pub fn init_metrics_recorder() -> &'static PrometheusHandle {
    PROM_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        if let Err(err) = metrics::set_global_recorder(recorder) {
            warn!("metrics recorder already installed, /prometheus will be empty: {err}");
        }

        let upkeep_handle = handle.clone();
        match spawn_thread("prometheus-upkeep", move || {
            loop {
                thread::sleep(Duration::from_secs(5));
                upkeep_handle.run_upkeep();
            }
        }) {
            Ok(join) => {
                let _ = PROM_UPKEEP_THREAD.set(join);
            }
            Err(err) => warn!("failed to spawn prometheus upkeep thread: {err}"),
        }

        handle
    })
}

/// Access the Prometheus handle when already initialised.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROM_HANDLE.get()
}

/// Spawn a thread that inherits the current tracing dispatcher.
pub fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

fn build_chrome_layer(
    path: &Path,
) -> Result<
    (
        tracing_chrome::ChromeLayer<tracing_subscriber::Registry>,
        tracing_chrome::FlushGuard,
    ),
    io::Error,
> {
    let file = std::fs::File::create(path)?;
    let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .writer(file)
        .include_args(true)
        .trace_style(tracing_chrome::TraceStyle::Threaded)
        .build();
    Ok((layer, guard))
}

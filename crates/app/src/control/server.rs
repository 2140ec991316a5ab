//! Actix Web control surface: MJPEG preview, live metrics, pause toggle and
//! session reports.
//!
//! The server runs on a dedicated thread with its own actix runtime so the
//! pipeline thread never touches async code.

use std::{
    net::SocketAddr,
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header::{self, ContentDisposition, DispositionParam, DispositionType},
    web::{self, Bytes},
};
use anyhow::{Context, Result, anyhow};
use async_stream::stream;
use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::control::{
    data::{
        MetricsResponse, SharedFrame, StatusResponse, ToggleRequest, ToggleResponse, latest_frame,
    },
    encoding::{MULTIPART_CONTENT_TYPE, multipart_chunk},
    report::export_session,
    state::SessionState,
    telemetry,
};

/// How often each stream consumer checks the latest-frame slot.
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(15);

/// Shared state backing HTTP handlers.
pub struct ServerState {
    pub session: Arc<SessionState>,
    pub latest: SharedFrame,
}

/// Handle for the HTTP server thread.
#[derive(Default)]
pub struct ControlServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl ControlServer {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Signal the server to stop and block until the thread exits.
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Register every route on an app or test service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/video_feed", web::get().to(video_feed_handler))
        .route("/frame.jpg", web::get().to(frame_handler))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/toggle", web::post().to(toggle_handler))
        .route("/save_report", web::get().to(save_report_handler))
        .route("/logout", web::get().to(logout_handler))
        .route("/logout", web::post().to(logout_handler))
        .route("/status", web::get().to(status_handler))
        .route("/prometheus", web::get().to(prometheus_handler));
}

/// Bind `addr` and serve on a background thread. Bind failures are returned
/// to the caller rather than logged from the server thread.
pub fn spawn_http_server(
    addr: SocketAddr,
    session: Arc<SessionState>,
    latest: SharedFrame,
) -> Result<ControlServer> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (ready_tx, ready_rx) = mpsc::channel::<std::io::Result<SocketAddr>>();
    let handle = telemetry::spawn_thread("gesture-http-server", move || {
        let result = actix_web::rt::System::new().block_on(async move {
            let bound = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(ServerState {
                        session: session.clone(),
                        latest: latest.clone(),
                    }))
                    .configure(configure)
            })
            .workers(2)
            .bind(addr);

            let server = match bound {
                Ok(server) => {
                    let local = server.addrs().first().copied().unwrap_or(addr);
                    let _ = ready_tx.send(Ok(local));
                    server.run()
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return Ok(());
                }
            };

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        });
        if let Err(err) = result {
            error!("HTTP server error: {err}");
        }
    })
    .context("Failed to spawn HTTP server thread")?;

    let local_addr = ready_rx
        .recv()
        .map_err(|_| anyhow!("HTTP server thread exited before binding"))?
        .with_context(|| format!("Failed to bind HTTP server on {addr}"))?;
    info!("HTTP server listening on http://{local_addr}");

    Ok(ControlServer {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
        local_addr: Some(local_addr),
    })
}

/// Stream the annotated feed as multipart JPEG.
///
/// Every client polls the shared slot independently and only emits when a
/// newer frame has been published, so extra viewers cost no camera reads.
async fn video_feed_handler(state: web::Data<ServerState>) -> HttpResponse {
    let state = state.clone();
    let stream = stream! {
        let mut interval = actix_web::rt::time::interval(STREAM_POLL_INTERVAL);
        let mut last_sent: Option<u64> = None;
        loop {
            interval.tick().await;
            if let Some(packet) = latest_frame(&state.latest) {
                if last_sent != Some(packet.frame_number) {
                    last_sent = Some(packet.frame_number);
                    yield Ok::<Bytes, actix_web::Error>(multipart_chunk(&packet));
                }
            }
        }
    };

    metrics::counter!("gesture_stream_clients_total").increment(1);
    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .append_header((header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE))
        .streaming(stream)
}

async fn frame_handler(state: web::Data<ServerState>) -> HttpResponse {
    match latest_frame(&state.latest) {
        Some(packet) => HttpResponse::Ok()
            .content_type("image/jpeg")
            .append_header(("X-Sequence", packet.frame_number.to_string()))
            .body(packet.jpeg),
        None => HttpResponse::NoContent().finish(),
    }
}

async fn metrics_handler(state: web::Data<ServerState>) -> HttpResponse {
    let live = state.session.live();
    HttpResponse::Ok()
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .json(MetricsResponse::from(&live))
}

/// Missing or empty bodies resume processing.
async fn toggle_handler(state: web::Data<ServerState>, body: Bytes) -> HttpResponse {
    let running = if body.iter().all(u8::is_ascii_whitespace) {
        true
    } else {
        match serde_json::from_slice::<ToggleRequest>(&body) {
            Ok(request) => request.running,
            Err(err) => {
                return HttpResponse::BadRequest().body(format!("invalid toggle payload: {err}"));
            }
        }
    };
    let running = state.session.set_running(running);
    info!(running, "volume control toggled");
    HttpResponse::Ok().json(ToggleResponse { running })
}

async fn save_report_handler(state: web::Data<ServerState>) -> HttpResponse {
    let report = export_session(&state.session, Utc::now());
    info!(rows = report.rows, file = %report.filename, "session report exported");
    metrics::counter!("gesture_reports_total").increment(1);
    HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(report.filename)],
        })
        .body(report.csv)
}

async fn logout_handler(state: web::Data<ServerState>) -> HttpResponse {
    let removed = state.session.clear_history();
    info!(removed, "session ended; telemetry cleared");
    HttpResponse::NoContent().finish()
}

async fn status_handler(state: web::Data<ServerState>) -> HttpResponse {
    let latest = latest_frame(&state.latest);
    HttpResponse::Ok().json(StatusResponse {
        running: state.session.is_running(),
        buffered: state.session.history_len(),
        capacity: state.session.history_capacity(),
        frame_number: latest.as_ref().map(|packet| packet.frame_number),
        fps: latest.as_ref().map(|packet| packet.fps),
    })
}

async fn prometheus_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

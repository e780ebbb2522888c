//! Request handler for daemon IPC.

use async_trait::async_trait;
use imgwatch_core::Metrics;
use imgwatch_indexer::{extract_from_bytes, sniff, validate_name, ImageEntry, ImageService};
use imgwatch_ipc::{ErrorCode, ImageInfo, Request, RequestHandler, Response, ResponseData};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Prefix of the staging files uploads are written to before the rename
const UPLOAD_PREFIX: &str = ".imgwatch-upload-";

/// Handles incoming IPC requests
pub struct DaemonHandler {
    service: Arc<ImageService>,
    metrics: Arc<Metrics>,
    shutdown_tx: broadcast::Sender<()>,
    shutting_down: AtomicBool,
    max_upload_bytes: usize,
}

impl DaemonHandler {
    /// Create a new handler
    pub fn new(
        service: Arc<ImageService>,
        shutdown_tx: broadcast::Sender<()>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            service,
            metrics: Arc::new(Metrics::new()),
            shutdown_tx,
            shutting_down: AtomicBool::new(false),
            max_upload_bytes,
        }
    }

    /// Request metrics recorded by this handler
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    async fn dispatch(&self, request: Request) -> Response {
        if request.mutates() && self.shutting_down.load(Ordering::SeqCst) {
            return Response::error(ErrorCode::ShuttingDown, "Daemon is shutting down");
        }

        match request {
            Request::ListImages => Response::ok_with(ResponseData::Images {
                images: self.service.files().iter().map(image_info).collect(),
            }),

            Request::GetImage { name } => self.get_image(&name).await,

            Request::RemoveImage { name } => self.remove_image(&name).await,

            Request::UploadImage { name, data } => self.upload_image(&name, data).await,

            Request::Status => {
                let watch_dir = self.service.watch_dir().unwrap_or_default();

                Response::ok_with(ResponseData::Status {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    uptime_secs: self.metrics.uptime_secs(),
                    watch_dir,
                    images_indexed: self.service.len(),
                    events_applied: self.service.stats().applied(),
                    requests_total: self.metrics.total(),
                    avg_latency_ms: self.metrics.avg_latency().as_millis() as u64,
                })
            }

            Request::Ping => Response::ok_with(ResponseData::Pong {
                timestamp: chrono::Utc::now().timestamp(),
            }),

            Request::Shutdown => {
                tracing::info!("Shutdown requested");
                self.shutting_down.store(true, Ordering::SeqCst);
                // No receivers only means shutdown is already underway
                let _ = self.shutdown_tx.send(());
                Response::ack()
            }
        }
    }

    async fn get_image(&self, name: &str) -> Response {
        if let Err(e) = validate_name(name) {
            return Response::error(ErrorCode::InvalidName, e.to_string());
        }

        let Some(entry) = self.service.get(name) else {
            return not_found(name);
        };

        match tokio::fs::read(&entry.location).await {
            Ok(data) => Response::ok_with(ResponseData::Image {
                info: image_info(&entry),
                data,
            }),
            // Deleted on disk, removal event still in flight
            Err(e) if e.kind() == ErrorKind::NotFound => not_found(name),
            Err(e) => {
                tracing::warn!(name, error = %e, "Failed to read image");
                Response::error(ErrorCode::InternalError, e.to_string())
            }
        }
    }

    async fn remove_image(&self, name: &str) -> Response {
        if let Err(e) = validate_name(name) {
            return Response::error(ErrorCode::InvalidName, e.to_string());
        }

        let dir = match self.watch_dir() {
            Ok(dir) => dir,
            Err(response) => return response,
        };

        // The index entry goes away when the removal event is reconciled.
        match tokio::fs::remove_file(dir.join(name)).await {
            Ok(()) => {
                tracing::info!(name, "Image removed");
                Response::ack()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => not_found(name),
            Err(e) => {
                tracing::warn!(name, error = %e, "Failed to remove image");
                Response::error(ErrorCode::InternalError, e.to_string())
            }
        }
    }

    async fn upload_image(&self, name: &str, data: Vec<u8>) -> Response {
        if let Err(e) = validate_name(name) {
            return Response::error(ErrorCode::InvalidName, e.to_string());
        }

        if data.len() > self.max_upload_bytes {
            return Response::error(
                ErrorCode::TooLarge,
                format!(
                    "upload of {} bytes exceeds limit of {} bytes",
                    data.len(),
                    self.max_upload_bytes
                ),
            );
        }

        let dir = match self.watch_dir() {
            Ok(dir) => dir,
            Err(response) => return response,
        };
        let target = dir.join(name);

        let entry = match extract_from_bytes(&target, &data) {
            Ok(Some(entry)) => entry,
            Ok(None) | Err(_) => {
                tracing::warn!(name, "Rejected upload of non-image content");
                return Response::error(
                    ErrorCode::NotAnImage,
                    format!("{} is not a recognized image", name),
                );
            }
        };

        let format = sniff(&data);
        let result =
            tokio::task::spawn_blocking(move || store_atomically(&dir, &target, &data)).await;

        match result {
            Ok(Ok(())) => {
                tracing::info!(
                    name,
                    format = ?format,
                    width = entry.width,
                    height = entry.height,
                    "Image uploaded"
                );
                Response::ok_with(ResponseData::Stored {
                    info: image_info(&entry),
                })
            }
            Ok(Err(e)) => {
                tracing::warn!(name, error = %e, "Failed to store upload");
                Response::error(ErrorCode::InternalError, e.to_string())
            }
            Err(e) => Response::error(ErrorCode::InternalError, e.to_string()),
        }
    }

    fn watch_dir(&self) -> Result<PathBuf, Response> {
        self.service.watch_dir().ok_or_else(|| {
            Response::error(ErrorCode::InternalError, "No directory is being watched")
        })
    }
}

#[async_trait]
impl RequestHandler for DaemonHandler {
    async fn handle(&self, request: Request) -> Response {
        let start = Instant::now();
        let action = request.action();

        let response = self.dispatch(request).await;

        let elapsed = start.elapsed();
        let failed = matches!(response, Response::Error { .. });
        self.metrics.record_request(elapsed, failed);

        tracing::info!(
            action,
            elapsed_us = elapsed.as_micros() as u64,
            ok = !failed,
            "Request handled"
        );

        response
    }
}

fn image_info(entry: &ImageEntry) -> ImageInfo {
    ImageInfo {
        name: entry.name.clone(),
        width: entry.width,
        height: entry.height,
    }
}

fn not_found(name: &str) -> Response {
    Response::error(ErrorCode::NotFound, format!("no such image: {}", name))
}

/// Write `data` to a staging file in `dir`, then rename it onto `target`.
///
/// The watcher sees the finished file appear in one step.
fn store_atomically(dir: &Path, target: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut staged = tempfile::Builder::new()
        .prefix(UPLOAD_PREFIX)
        .tempfile_in(dir)?;
    staged.write_all(data)?;
    staged.as_file().sync_all()?;
    staged.persist(target).map_err(|e| e.error)?;
    Ok(())
}

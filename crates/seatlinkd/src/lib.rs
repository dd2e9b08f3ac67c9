//! seatlinkd service
//!
//! Wires the configuration, the IPC server and the per-client rate limiter
//! together and answers client commands. `main.rs` only parses arguments,
//! sets up logging and hands a shutdown signal to [`Service::run`].

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use seatlink_api::{
    Command, DaemonStatus, ErrorCode, ErrorInfo, Event, EventPayload, Request, Response,
    ResponsePayload, API_VERSION,
};
use seatlink_config::DaemonConfig;
use seatlink_ipc::{IpcServer, ServerMessage};
use seatlink_util::{ClientId, RateLimiter};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Main service state
pub struct Service {
    config: DaemonConfig,
    ipc: Arc<IpcServer>,
    rate_limiter: RateLimiter,
    started_at: DateTime<Local>,
    started_mono: Instant,
}

impl Service {
    /// Bind the IPC socket. Clients may connect as soon as this returns.
    pub async fn new(config: DaemonConfig) -> Result<Self> {
        let mut ipc = IpcServer::new(&config.socket_path, config.buffer_size)
            .with_max_clients(config.max_clients);
        ipc.start()
            .await
            .with_context(|| format!("Failed to start IPC server on {:?}", config.socket_path))?;

        info!(socket_path = %config.socket_path.display(), "IPC server started");

        let rate_limiter = RateLimiter::new(config.rate_limit_per_second, Duration::from_secs(1));

        Ok(Self {
            config,
            ipc: Arc::new(ipc),
            rate_limiter,
            started_at: Local::now(),
            started_mono: Instant::now(),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Serve clients until `shutdown` completes.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut ipc_messages = self
            .ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = self.ipc.clone();
        let accept_handle = tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        tokio::pin!(shutdown);

        info!("Service running");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }

                Some(msg) = ipc_messages.recv() => {
                    self.handle_ipc_message(msg).await;
                }
            }
        }

        info!("Shutting down seatlinkd");
        self.ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        // Let client tasks write the shutdown event before the runtime goes away
        tokio::time::sleep(Duration::from_millis(50)).await;

        accept_handle.abort();
        self.ipc.shutdown();

        info!("Shutdown complete");
        Ok(())
    }

    async fn handle_ipc_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let response = if self.rate_limiter.check(&client_id) {
                    self.handle_request(&client_id, request).await
                } else {
                    Response::error(
                        request.request_id,
                        ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                    )
                };

                if let Err(e) = self.ipc.send_response(&client_id, response).await {
                    warn!(client_id = %client_id, error = %e, "Failed to send response");
                }
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    pid = ?info.pid,
                    "Client connected"
                );

                self.ipc
                    .broadcast_event(Event::new(EventPayload::ClientConnected {
                        client_id,
                        role: info.role,
                    }));
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                self.rate_limiter.remove_client(&client_id);
                self.ipc
                    .broadcast_event(Event::new(EventPayload::ClientDisconnected { client_id }));
            }
        }
    }

    async fn handle_request(&self, client_id: &ClientId, request: Request) -> Response {
        let request_id = request.request_id;

        if request.api_version != API_VERSION {
            warn!(
                client_id = %client_id,
                api_version = request.api_version,
                "Unsupported API version"
            );
            return Response::error(
                request_id,
                ErrorInfo::new(
                    ErrorCode::UnsupportedVersion,
                    format!("API version {} is not supported", request.api_version),
                ),
            );
        }

        match request.command {
            Command::Ping => Response::success(request_id, ResponsePayload::Pong),

            Command::Echo { data } => Response::success(request_id, ResponsePayload::Echo { data }),

            Command::GetStatus => {
                let status = DaemonStatus {
                    api_version: API_VERSION,
                    started_at: self.started_at,
                    uptime_secs: self.started_mono.elapsed().as_secs(),
                    client_count: self.ipc.client_count().await,
                    buffer_size: self.config.buffer_size,
                };
                Response::success(request_id, ResponsePayload::Status(status))
            }

            Command::SubscribeEvents => {
                debug!(client_id = %client_id, "Client subscribed to events");
                Response::success(request_id, ResponsePayload::Subscribed)
            }

            Command::UnsubscribeEvents => {
                debug!(client_id = %client_id, "Client unsubscribed from events");
                Response::success(request_id, ResponsePayload::Unsubscribed)
            }
        }
    }
}
